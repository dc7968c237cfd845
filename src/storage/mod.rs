mod schema;
pub mod reader;
pub mod writer;

pub use reader::{load_allocations, load_memory_series, load_meta, open};
pub use writer::ProfileWriter;
