// src/provider/archive.rs
//! In-process provider over an in-memory scene archive.
//!
//! Evaluates plans the way the remote backend does, which makes the whole
//! pipeline runnable offline and observable in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use geo_types::{coord, Rect};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::plan::{CollectionPlan, Composite, ImagePlan};
use super::types::{ImageryProvider, ProviderError, Reduction};
use crate::catalog::Visualization;
use crate::geometry::{rects_intersect, Region};
use crate::processing::parallel::{MaskedImage, ParallelEvaluator, RasterGrid};

const MAP_URL_PREFIX: &str = "local://maps/";
const THUMBNAIL_URL_PREFIX: &str = "local://thumbnails/";

/// One acquisition on its collection's grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub acquired: DateTime<Utc>,
    /// `[minLon, minLat, maxLon, maxLat]`; the whole grid when absent.
    #[serde(default)]
    pub footprint: Option<[f64; 4]>,
    /// Scene metadata such as `CLOUDY_PIXEL_PERCENTAGE`.
    #[serde(default)]
    pub properties: HashMap<String, f64>,
    /// Row-major pixel values per band, `null` for nodata.
    pub bands: HashMap<String, Vec<Option<f64>>>,
}

impl Scene {
    fn footprint_rect(&self, grid: &RasterGrid) -> Rect<f64> {
        match self.footprint {
            Some([min_x, min_y, max_x, max_y]) => {
                Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y })
            }
            None => grid.extent(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveCollection {
    pub id: String,
    pub grid: RasterGrid,
    pub scenes: Vec<Scene>,
}

/// A provider call as observed by the archive.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    CollectionSize { collection: String },
    ReduceRegion { collection: String, composite: Composite, scale_m: f64 },
    TileTemplate { collection: String },
    Thumbnail { collection: String, dimensions: u32 },
}

/// A composite kept alive behind a render handle.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub collection: String,
    pub composite: Composite,
    pub grid: RasterGrid,
    pub values: Vec<Option<f64>>,
    /// Region the handle was requested for.
    pub region: Rect<f64>,
    pub visualization: Visualization,
    pub dimensions: Option<u32>,
}

pub struct LocalArchive {
    collections: HashMap<String, ArchiveCollection>,
    evaluator: ParallelEvaluator,
    calls: Mutex<Vec<ProviderCall>>,
    renders: Mutex<HashMap<String, RenderedImage>>,
    next_render: AtomicU64,
}

impl LocalArchive {
    pub fn new(evaluator: ParallelEvaluator) -> Self {
        Self {
            collections: HashMap::new(),
            evaluator,
            calls: Mutex::new(Vec::new()),
            renders: Mutex::new(HashMap::new()),
            next_render: AtomicU64::new(1),
        }
    }

    /// Adds a collection after checking every band matches its grid.
    pub fn add_collection(&mut self, collection: ArchiveCollection) -> Result<(), ProviderError> {
        let expected = collection.grid.len();
        for scene in &collection.scenes {
            if let Some((band, values)) = scene.bands.iter().find(|(_, v)| v.len() != expected) {
                return Err(ProviderError::InvalidResponse(format!(
                    "band '{}' of scene {} has {} pixels, grid has {}",
                    band,
                    scene.id,
                    values.len(),
                    expected
                )));
            }
        }
        debug!(
            collection = %collection.id,
            scenes = collection.scenes.len(),
            pixels = expected,
            "Loaded archive collection"
        );
        self.collections.insert(collection.id.clone(), collection);
        Ok(())
    }

    pub fn with_collection(mut self, collection: ArchiveCollection) -> Result<Self, ProviderError> {
        self.add_collection(collection)?;
        Ok(self)
    }

    /// Every call received so far, oldest first.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// The composite behind a `local://` handle returned by this archive.
    pub fn rendered(&self, url: &str) -> Option<RenderedImage> {
        let id = url
            .strip_prefix(MAP_URL_PREFIX)
            .and_then(|rest| rest.split('/').next())
            .or_else(|| {
                url.strip_prefix(THUMBNAIL_URL_PREFIX)
                    .and_then(|rest| rest.split(".png").next())
            })?;
        self.renders.lock().get(id).cloned()
    }

    fn record(&self, call: ProviderCall) {
        self.calls.lock().push(call);
    }

    fn collection(&self, id: &str) -> Result<&ArchiveCollection, ProviderError> {
        self.collections
            .get(id)
            .ok_or_else(|| ProviderError::UnknownCollection(id.to_string()))
    }

    /// Spatial, temporal and scene-metadata filtering.
    fn matching_scenes<'a>(
        &self,
        collection: &'a ArchiveCollection,
        plan: &CollectionPlan,
    ) -> Vec<&'a Scene> {
        collection
            .scenes
            .iter()
            .filter(|scene| rects_intersect(&scene.footprint_rect(&collection.grid), &plan.region))
            .filter(|scene| {
                let day = scene.acquired.date_naive();
                day >= plan.start && day < plan.end_exclusive
            })
            .filter(|scene| {
                plan.scene_filter
                    .as_ref()
                    .map_or(true, |filter| filter.accepts(&scene.properties))
            })
            .collect()
    }

    /// Masks and maps every matching scene.
    fn map_collection(
        &self,
        plan: &CollectionPlan,
    ) -> Result<(RasterGrid, Vec<MaskedImage>), ProviderError> {
        let collection = self.collection(&plan.collection)?;
        let scenes = self.matching_scenes(collection, plan);

        let mut required: Vec<&str> = plan.expression.bands().into_iter().collect();
        if let Some(mask) = &plan.quality_mask {
            required.push(mask.band());
        }

        let images = scenes
            .into_iter()
            .map(|scene| {
                if let Some(band) = required.iter().find(|b| !scene.bands.contains_key(**b)) {
                    return Err(ProviderError::MissingBand {
                        scene: scene.id.clone(),
                        band: band.to_string(),
                    });
                }
                let values = self.evaluator.evaluate_scene(
                    &scene.bands,
                    &plan.expression,
                    plan.quality_mask.as_ref(),
                    collection.grid.len(),
                );
                Ok(MaskedImage {
                    acquired: scene.acquired,
                    values,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((collection.grid, images))
    }

    /// Composite then clip.
    fn composite(&self, image: &ImagePlan) -> Result<(RasterGrid, Vec<Option<f64>>), ProviderError> {
        let (grid, images) = self.map_collection(&image.collection)?;
        let values = match image.composite {
            Composite::Mean => self.evaluator.mean_composite(&images, grid.len()),
            Composite::FreshestMosaic => self.evaluator.freshest_mosaic(&images, grid.len()),
        };
        Ok((grid, self.evaluator.clip(&grid, values, &image.clip)))
    }

    fn register_render(&self, rendered: RenderedImage) -> String {
        let id = format!("{:08x}", self.next_render.fetch_add(1, Ordering::Relaxed));
        self.renders.lock().insert(id.clone(), rendered);
        id
    }
}

impl Default for LocalArchive {
    fn default() -> Self {
        Self::new(ParallelEvaluator::default())
    }
}

impl ImageryProvider for LocalArchive {
    async fn collection_size(&self, plan: &CollectionPlan) -> Result<usize, ProviderError> {
        self.record(ProviderCall::CollectionSize {
            collection: plan.collection.clone(),
        });
        let collection = self.collection(&plan.collection)?;
        Ok(self.matching_scenes(collection, plan).len())
    }

    async fn reduce_region(
        &self,
        image: &ImagePlan,
        region: &Region,
        scale_m: f64,
    ) -> Result<Reduction, ProviderError> {
        self.record(ProviderCall::ReduceRegion {
            collection: image.collection.collection.clone(),
            composite: image.composite,
            scale_m,
        });
        let (grid, values) = self.composite(image)?;
        Ok(Reduction::from(
            self.evaluator.reduce_weighted_mean(&grid, &values, region),
        ))
    }

    async fn tile_template(
        &self,
        image: &ImagePlan,
        visualization: &Visualization,
        region: &Rect<f64>,
    ) -> Result<String, ProviderError> {
        self.record(ProviderCall::TileTemplate {
            collection: image.collection.collection.clone(),
        });
        let (grid, values) = self.composite(image)?;
        let id = self.register_render(RenderedImage {
            collection: image.collection.collection.clone(),
            composite: image.composite,
            grid,
            values,
            region: *region,
            visualization: visualization.clone(),
            dimensions: None,
        });
        Ok(format!("{MAP_URL_PREFIX}{id}/{{z}}/{{x}}/{{y}}"))
    }

    async fn thumbnail_url(
        &self,
        image: &ImagePlan,
        visualization: &Visualization,
        region: &Rect<f64>,
        dimensions: u32,
    ) -> Result<String, ProviderError> {
        self.record(ProviderCall::Thumbnail {
            collection: image.collection.collection.clone(),
            dimensions,
        });
        let (grid, values) = self.composite(image)?;
        let id = self.register_render(RenderedImage {
            collection: image.collection.collection.clone(),
            composite: image.composite,
            grid,
            values,
            region: *region,
            visualization: visualization.clone(),
            dimensions: Some(dimensions),
        });
        Ok(format!("{THUMBNAIL_URL_PREFIX}{id}.png?dimensions={dimensions}"))
    }

    fn name(&self) -> &str {
        "local-archive"
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::catalog::{visualization, IndexName};
    use crate::processing::expr::Expr;
    use crate::provider::plan::SceneFilter;

    fn grid() -> RasterGrid {
        RasterGrid {
            west: 0.0,
            north: 1.0,
            pixel_size: 0.5,
            width: 2,
            height: 2,
        }
    }

    fn scene(id: &str, day: u32, cloud: f64, value: f64) -> Scene {
        Scene {
            id: id.to_string(),
            acquired: Utc.with_ymd_and_hms(2023, 6, day, 10, 0, 0).unwrap(),
            footprint: None,
            properties: HashMap::from([("CLOUD".to_string(), cloud)]),
            bands: HashMap::from([("v".to_string(), vec![Some(value); 4])]),
        }
    }

    fn archive() -> LocalArchive {
        LocalArchive::default()
            .with_collection(ArchiveCollection {
                id: "test".to_string(),
                grid: grid(),
                scenes: vec![scene("a", 1, 5.0, 0.2), scene("b", 15, 50.0, 0.4), scene("c", 30, 0.0, 0.6)],
            })
            .unwrap()
    }

    fn plan(start: (u32, u32), end_exclusive: (u32, u32)) -> CollectionPlan {
        CollectionPlan {
            collection: "test".to_string(),
            region: grid().extent(),
            start: NaiveDate::from_ymd_opt(2023, start.0, start.1).unwrap(),
            end_exclusive: NaiveDate::from_ymd_opt(2023, end_exclusive.0, end_exclusive.1).unwrap(),
            scene_filter: None,
            quality_mask: None,
            expression: Expr::band("v"),
            output_band: "V".to_string(),
        }
    }

    fn image_plan(collection: CollectionPlan, composite: Composite) -> ImagePlan {
        let clip = Region::Rectangle(collection.region);
        ImagePlan {
            collection,
            composite,
            clip,
        }
    }

    #[tokio::test]
    async fn test_date_filter_excludes_upper_bound() {
        let archive = archive();
        assert_eq!(archive.collection_size(&plan((6, 1), (6, 30))).await.unwrap(), 2);
        assert_eq!(archive.collection_size(&plan((6, 1), (7, 1))).await.unwrap(), 3);
        assert_eq!(archive.collection_size(&plan((6, 15), (6, 16))).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scene_filter_and_spatial_filter() {
        let archive = archive();
        let mut filtered = plan((6, 1), (7, 1));
        filtered.scene_filter = Some(SceneFilter {
            property: "CLOUD".to_string(),
            max_value: 5.0,
        });
        assert_eq!(archive.collection_size(&filtered).await.unwrap(), 2);

        let mut elsewhere = plan((6, 1), (7, 1));
        elsewhere.region = Rect::new(coord! { x: 10.0, y: 10.0 }, coord! { x: 11.0, y: 11.0 });
        assert_eq!(archive.collection_size(&elsewhere).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mean_and_mosaic_reductions_differ() {
        let archive = archive();
        let mean = image_plan(plan((6, 1), (7, 1)), Composite::Mean);
        let mosaic = image_plan(plan((6, 1), (7, 1)), Composite::FreshestMosaic);

        let mean_value = archive.reduce_region(&mean, &mean.clip, 10.0).await.unwrap();
        let mosaic_value = archive.reduce_region(&mosaic, &mosaic.clip, 10.0).await.unwrap();
        assert!((mean_value.value().unwrap() - 0.4).abs() < 1e-9);
        assert!((mosaic_value.value().unwrap() - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_collection_reduces_to_empty() {
        let archive = archive();
        let image = image_plan(plan((1, 1), (2, 1)), Composite::Mean);
        let reduction = archive.reduce_region(&image, &image.clip, 10.0).await.unwrap();
        assert_eq!(reduction, Reduction::Empty);
    }

    #[tokio::test]
    async fn test_missing_band_is_an_error() {
        let archive = archive();
        let mut bad = plan((6, 1), (7, 1));
        bad.expression = Expr::band("nope");
        let image = image_plan(bad, Composite::Mean);
        let err = archive.reduce_region(&image, &image.clip, 10.0).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingBand { .. }));
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let archive = archive();
        let mut unknown = plan((6, 1), (7, 1));
        unknown.collection = "missing".to_string();
        assert_eq!(
            archive.collection_size(&unknown).await,
            Err(ProviderError::UnknownCollection("missing".to_string()))
        );
    }

    #[tokio::test]
    async fn test_render_handles_resolve_to_composites() {
        let archive = archive();
        let image = image_plan(plan((6, 1), (7, 1)), Composite::FreshestMosaic);
        let vis = visualization(IndexName::Ndvi);

        let template = archive
            .tile_template(&image, &vis, &image.collection.region)
            .await
            .unwrap();
        assert!(template.starts_with("local://maps/"));
        assert!(template.ends_with("/{z}/{x}/{y}"));

        let thumb = archive
            .thumbnail_url(&image, &vis, &image.collection.region, 512)
            .await
            .unwrap();
        assert!(thumb.ends_with(".png?dimensions=512"));

        let rendered = archive.rendered(&thumb).unwrap();
        assert_eq!(rendered.dimensions, Some(512));
        assert_eq!(rendered.values, vec![Some(0.6); 4]);
        assert!(archive.rendered(&template).is_some());
        assert_eq!(archive.call_count(), 2);
    }

    #[test]
    fn test_rejects_band_with_wrong_pixel_count() {
        let mut bad = scene("bad", 1, 0.0, 0.1);
        bad.bands.insert("v".to_string(), vec![Some(0.1); 3]);
        let result = LocalArchive::default().with_collection(ArchiveCollection {
            id: "test".to_string(),
            grid: grid(),
            scenes: vec![bad],
        });
        assert!(result.is_err());
    }
}
