use crate::error::Result;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Where the interactive viewer logs unless told otherwise
pub fn default_log_file() -> PathBuf {
    std::env::temp_dir().join("memview.log")
}

/// Install the global logger. `RUST_LOG` overrides the default `info` filter.
///
/// With a file the output is appended there, which keeps it off a terminal
/// that is in raw mode. Without one it goes to stderr.
pub fn init(file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if let Some(path) = file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    // A logger may already be installed (tests, embedding); keep it
    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
    Ok(())
}
