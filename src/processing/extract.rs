// src/processing/extract.rs
//! Scalar extraction and render handles over an aggregated image.

use tracing::debug;

use crate::catalog::Visualization;
use crate::geometry::{BoundingBox, LatLng, Region};
use crate::processing::aggregate::AggregatedImage;
use crate::provider::{ImageryProvider, ProviderError};

pub struct ValueExtractor<'a, P> {
    provider: &'a P,
}

impl<'a, P: ImageryProvider> ValueExtractor<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Mean over the buffered square around `point`.
    pub async fn extract_point(
        &self,
        image: &AggregatedImage,
        point: LatLng,
        scale_m: f64,
    ) -> Result<Option<f64>, ProviderError> {
        let region = Region::Rectangle(BoundingBox::around_point(point).rect());
        self.extract_area(image, &region, scale_m).await
    }

    /// Area-weighted mean over `region`; `None` when every pixel is masked.
    pub async fn extract_area(
        &self,
        image: &AggregatedImage,
        region: &Region,
        scale_m: f64,
    ) -> Result<Option<f64>, ProviderError> {
        let reduction = self.provider.reduce_region(&image.plan, region, scale_m).await?;
        debug!(
            provider = self.provider.name(),
            index = %image.index,
            scale_m,
            ?reduction,
            "Reduced region"
        );
        Ok(reduction.value())
    }
}

pub struct TileRenderer<'a, P> {
    provider: &'a P,
}

impl<'a, P: ImageryProvider> TileRenderer<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// URL template with `{z}`, `{x}` and `{y}` placeholders.
    ///
    /// The region is the query rectangle, not the clip, so imagery reaches
    /// the tile edges.
    pub async fn tile(
        &self,
        image: &AggregatedImage,
        visualization: &Visualization,
    ) -> Result<String, ProviderError> {
        self.provider
            .tile_template(&image.plan, visualization, &image.query_rectangle)
            .await
    }

    /// One resolved static image URL.
    pub async fn thumbnail(
        &self,
        image: &AggregatedImage,
        visualization: &Visualization,
        dimensions: u32,
    ) -> Result<String, ProviderError> {
        self.provider
            .thumbnail_url(&image.plan, visualization, &image.query_rectangle, dimensions)
            .await
    }
}
