// src/lib.rs
pub mod batch;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod geometry;
pub mod io;
pub mod logging;
pub mod processing;
pub mod provider;
pub mod request;

pub use catalog::IndexName;
pub use dispatch::{MonthResult, QueryDispatcher};
pub use error::{QueryError, RegistryError, ValidationError};
pub use request::{IndexRequest, IndexResponse, IndexResult};

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
