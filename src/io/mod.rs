// src/io/mod.rs
pub mod reader;
pub mod writer;

pub use reader::{read_archives_parallel, read_geometry};
pub use writer::write_json;
