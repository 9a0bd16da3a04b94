// src/provider/mod.rs
//! Imagery provider abstraction
//!
//! The pipeline never touches pixels itself. It builds serializable plans and
//! hands them to an [`ImageryProvider`]:
//!
//! - [`RemoteProvider`] posts plans to an imagery service over HTTP.
//! - [`LocalArchive`] evaluates plans in-process over an in-memory archive.
//!
//! [`AnyProvider`] picks one of them at runtime.

mod archive;
mod http;
mod plan;
mod remote;
mod types;

use geo_types::Rect;

pub use archive::{ArchiveCollection, LocalArchive, ProviderCall, RenderedImage, Scene};
pub use http::{AsyncHttpClient, AsyncReqwestClient};
pub use plan::{CollectionPlan, Composite, ImagePlan, QualityMask, SceneFilter};
pub use remote::RemoteProvider;
pub use types::{ImageryProvider, ProviderError, Reduction};

use crate::catalog::Visualization;
use crate::geometry::Region;

/// Runtime choice between the concrete providers.
pub enum AnyProvider {
    Remote(RemoteProvider<AsyncReqwestClient>),
    Local(LocalArchive),
}

impl ImageryProvider for AnyProvider {
    async fn collection_size(&self, plan: &CollectionPlan) -> Result<usize, ProviderError> {
        match self {
            Self::Remote(p) => p.collection_size(plan).await,
            Self::Local(p) => p.collection_size(plan).await,
        }
    }

    async fn reduce_region(
        &self,
        image: &ImagePlan,
        region: &Region,
        scale_m: f64,
    ) -> Result<Reduction, ProviderError> {
        match self {
            Self::Remote(p) => p.reduce_region(image, region, scale_m).await,
            Self::Local(p) => p.reduce_region(image, region, scale_m).await,
        }
    }

    async fn tile_template(
        &self,
        image: &ImagePlan,
        visualization: &Visualization,
        region: &Rect<f64>,
    ) -> Result<String, ProviderError> {
        match self {
            Self::Remote(p) => p.tile_template(image, visualization, region).await,
            Self::Local(p) => p.tile_template(image, visualization, region).await,
        }
    }

    async fn thumbnail_url(
        &self,
        image: &ImagePlan,
        visualization: &Visualization,
        region: &Rect<f64>,
        dimensions: u32,
    ) -> Result<String, ProviderError> {
        match self {
            Self::Remote(p) => p.thumbnail_url(image, visualization, region, dimensions).await,
            Self::Local(p) => p.thumbnail_url(image, visualization, region, dimensions).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Remote(p) => p.name(),
            Self::Local(p) => p.name(),
        }
    }
}
