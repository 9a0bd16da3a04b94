// src/processing/aggregate.rs
//! Collapsing a collection into one clipped image.
//!
//! The temporal mean feeds scalar extraction; the freshest mosaic feeds
//! rendering. They are separate plans with different masking semantics and
//! are evaluated by the provider.

use geo_types::Rect;

use crate::catalog::IndexName;
use crate::processing::collection::ImageCollection;
use crate::processing::sensor::Sensor;
use crate::provider::{Composite, ImagePlan};

/// A composite image plan, clipped to the request's clip geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedImage {
    pub plan: ImagePlan,
    pub sensor: Sensor,
    pub index: IndexName,
    pub scale_m: f64,
    pub query_rectangle: Rect<f64>,
}

pub struct Aggregator;

impl Aggregator {
    /// Per-pixel mean over time. A pixel masked in one image simply does
    /// not contribute at that time.
    pub fn mean(collection: &ImageCollection) -> AggregatedImage {
        Self::composite(collection, Composite::Mean)
    }

    /// Newest unmasked value per pixel, older images filling the gaps.
    pub fn freshest_mosaic(collection: &ImageCollection) -> AggregatedImage {
        Self::composite(collection, Composite::FreshestMosaic)
    }

    fn composite(collection: &ImageCollection, composite: Composite) -> AggregatedImage {
        AggregatedImage {
            plan: ImagePlan {
                collection: collection.plan.clone(),
                composite,
                clip: collection.clip.clone(),
            },
            sensor: collection.sensor,
            index: collection.index,
            scale_m: collection.scale_m,
            query_rectangle: collection.query_rectangle(),
        }
    }
}
