pub mod annotation;
pub mod cli;
pub mod commands;
pub mod error;
pub mod filter;
pub mod logging;
pub mod navigation;
pub mod range;
pub mod remote;
pub mod render;
pub mod series;
pub mod session;
pub mod storage;
pub mod tree;
pub mod tui;

pub use error::{Error, Result};
