// src/provider/types.rs
//! Provider types and traits

use std::future::Future;

use geo_types::Rect;
use thiserror::Error;

use super::plan::{CollectionPlan, ImagePlan};
use crate::catalog::Visualization;
use crate::geometry::Region;

/// Infrastructure failures of the imagery backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Connection, timeout or body read failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend answered with a non-success status (quota, auth, bad geometry)
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Band '{band}' missing from scene {scene}")]
    MissingBand { scene: String, band: String },

    /// Backend could not produce a render handle
    #[error("Render failed: {0}")]
    Render(String),
}

/// Structured outcome of a region reduction.
///
/// `Empty` is the backend telling us every pixel in the region was masked;
/// it is not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reduction {
    Value(f64),
    Empty,
}

impl Reduction {
    pub fn value(self) -> Option<f64> {
        match self {
            Reduction::Value(v) => Some(v),
            Reduction::Empty => None,
        }
    }
}

impl From<Option<f64>> for Reduction {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Reduction::Value(v),
            _ => Reduction::Empty,
        }
    }
}

/// Remote imagery capability.
///
/// Implementors receive lazy plans describing the filtered, masked and mapped
/// collection and evaluate them on their own side. Nothing is computed until
/// a size, a reduction or a render handle is asked for.
pub trait ImageryProvider: Send + Sync {
    /// Number of images the collection plan selects after filtering.
    fn collection_size(
        &self,
        plan: &CollectionPlan,
    ) -> impl Future<Output = Result<usize, ProviderError>> + Send;

    /// Area-weighted mean of the composite over `region` at `scale_m` meters.
    fn reduce_region(
        &self,
        image: &ImagePlan,
        region: &Region,
        scale_m: f64,
    ) -> impl Future<Output = Result<Reduction, ProviderError>> + Send;

    /// Map tile URL template with `{z}`, `{x}` and `{y}` placeholders.
    fn tile_template(
        &self,
        image: &ImagePlan,
        visualization: &Visualization,
        region: &Rect<f64>,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;

    /// One static image URL of `dimensions` pixels on the longer side.
    fn thumbnail_url(
        &self,
        image: &ImagePlan,
        visualization: &Visualization,
        region: &Rect<f64>,
        dimensions: u32,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;

    /// Returns the provider's name for logging and identification.
    fn name(&self) -> &str;
}
