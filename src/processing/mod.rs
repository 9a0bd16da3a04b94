// src/processing/mod.rs
pub mod aggregate;
pub mod collection;
pub mod expr;
pub mod extract;
pub mod indices;
pub mod parallel;
pub mod registry;
pub mod sensor;

// Re-export main components
pub use aggregate::{AggregatedImage, Aggregator};
pub use collection::{CollectionBuilder, ImageCollection};
pub use extract::{TileRenderer, ValueExtractor};
pub use parallel::{ParallelEvaluator, RasterGrid};
pub use registry::FormulaRegistry;
pub use sensor::{Sensor, SensorRouter};
