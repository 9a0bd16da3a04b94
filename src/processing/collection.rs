// src/processing/collection.rs
//! Filtered, masked and mapped image collections.

use geo_types::Rect;
use tracing::debug;

use crate::catalog::IndexName;
use crate::error::RegistryError;
use crate::geometry::{Region, ResolvedGeometry};
use crate::processing::registry::{FormulaRegistry, PixelFormula};
use crate::processing::sensor::{CloudPolicy, QualityScheme, Sensor};
use crate::provider::{CollectionPlan, ImageryProvider, ProviderError, QualityMask, SceneFilter};
use crate::request::DateRange;

/// A collection plan together with what later stages need to finish it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCollection {
    pub plan: CollectionPlan,
    pub sensor: Sensor,
    pub index: IndexName,
    /// Native pixel scale of the source product, in meters.
    pub scale_m: f64,
    pub clip: Region,
    /// Number of images left after filtering. Zero means no data.
    pub size: usize,
}

impl ImageCollection {
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn query_rectangle(&self) -> Rect<f64> {
        self.plan.region
    }
}

pub struct CollectionBuilder<'a> {
    registry: &'a FormulaRegistry,
}

impl<'a> CollectionBuilder<'a> {
    pub fn new(registry: &'a FormulaRegistry) -> Self {
        Self { registry }
    }

    /// Describes the collection without contacting the provider.
    ///
    /// Fails only on a registry defect: a missing formula or a quality
    /// scheme that cannot express the routed cloud policy.
    pub fn plan(
        &self,
        sensor: Sensor,
        geometry: &ResolvedGeometry,
        date_range: &DateRange,
        policy: CloudPolicy,
        index: IndexName,
    ) -> Result<(CollectionPlan, &'a PixelFormula), RegistryError> {
        let formula = self.registry.formula_for(sensor, index)?;
        let (scene_filter, quality_mask) = cloud_filters(formula, policy)?;

        let plan = CollectionPlan {
            collection: formula.product.collection.to_string(),
            region: geometry.query_rectangle,
            start: date_range.start(),
            end_exclusive: date_range.end_exclusive(),
            scene_filter,
            quality_mask,
            expression: formula.expression.clone(),
            output_band: formula.output_band().to_string(),
        };
        debug!(
            %sensor,
            %index,
            collection = %plan.collection,
            start = %plan.start,
            end_exclusive = %plan.end_exclusive,
            ?policy,
            "Planned collection"
        );
        Ok((plan, formula))
    }

    /// Plans the collection and asks the provider how many images survive.
    pub async fn build<P: ImageryProvider>(
        &self,
        provider: &P,
        sensor: Sensor,
        geometry: &ResolvedGeometry,
        date_range: &DateRange,
        policy: CloudPolicy,
        index: IndexName,
    ) -> Result<ImageCollection, CollectionError> {
        let (plan, formula) = self.plan(sensor, geometry, date_range, policy, index)?;
        let size = provider.collection_size(&plan).await?;
        debug!(collection = %plan.collection, size, "Collection built");

        Ok(ImageCollection {
            plan,
            sensor,
            index,
            scale_m: formula.product.scale_m,
            clip: geometry.clip.clone(),
            size,
        })
    }
}

/// Build failures. Registry defects happen before the provider is contacted.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Translates the cloud policy into the product's own quality scheme.
fn cloud_filters(
    formula: &PixelFormula,
    policy: CloudPolicy,
) -> Result<(Option<SceneFilter>, Option<QualityMask>), RegistryError> {
    match (&formula.product.quality, policy) {
        (
            QualityScheme::SceneCloudPercentage { property },
            CloudPolicy::SceneThreshold { max_cloud_percent },
        ) => Ok((
            Some(SceneFilter {
                property: property.to_string(),
                max_value: f64::from(max_cloud_percent),
            }),
            None,
        )),
        (QualityScheme::ReliabilityBand { band }, CloudPolicy::PixelReliability { reliability }) => {
            Ok((
                None,
                Some(QualityMask::ReliabilityCode {
                    band: band.to_string(),
                    accepted: reliability.accepted_codes(),
                }),
            ))
        }
        (QualityScheme::StateFlags { band }, CloudPolicy::PixelReliability { reliability }) => {
            let (mask, accepted) = reliability.state_patterns();
            Ok((
                None,
                Some(QualityMask::StateBits {
                    band: band.to_string(),
                    mask,
                    accepted,
                }),
            ))
        }
        _ => Err(RegistryError::QualityMismatch {
            sensor: formula.sensor,
            index: formula.index,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{resolve, BoundingBox};
    use crate::processing::sensor::Reliability;

    fn geometry() -> ResolvedGeometry {
        resolve(&BoundingBox::from_wire([-74.6, 40.0, -74.4, 40.2]).unwrap(), None)
    }

    fn june() -> DateRange {
        DateRange::parse("2023-06-01", "2023-06-30").unwrap()
    }

    #[test]
    fn test_high_res_plan_uses_scene_threshold() {
        let registry = FormulaRegistry::new();
        let (plan, formula) = CollectionBuilder::new(&registry)
            .plan(
                Sensor::Sentinel2,
                &geometry(),
                &june(),
                CloudPolicy::SceneThreshold { max_cloud_percent: 10 },
                IndexName::Ndvi,
            )
            .unwrap();
        assert_eq!(plan.collection, "COPERNICUS/S2_SR_HARMONIZED");
        assert_eq!(
            plan.scene_filter,
            Some(SceneFilter {
                property: "CLOUDY_PIXEL_PERCENTAGE".to_string(),
                max_value: 10.0
            })
        );
        assert_eq!(plan.quality_mask, None);
        assert_eq!(plan.end_exclusive.to_string(), "2023-07-01");
        assert_eq!(formula.product.scale_m, 10.0);
    }

    #[test]
    fn test_precalculated_fallback_masks_reliability_codes() {
        let registry = FormulaRegistry::new();
        let (plan, _) = CollectionBuilder::new(&registry)
            .plan(
                Sensor::Modis,
                &geometry(),
                &june(),
                CloudPolicy::PixelReliability { reliability: Reliability::Good },
                IndexName::Ndvi,
            )
            .unwrap();
        assert_eq!(plan.collection, "MODIS/061/MOD13Q1");
        assert_eq!(plan.scene_filter, None);
        assert_eq!(
            plan.quality_mask,
            Some(QualityMask::ReliabilityCode {
                band: "SummaryQA".to_string(),
                accepted: vec![0]
            })
        );
    }

    #[test]
    fn test_band_algebra_fallback_masks_state_bits() {
        let registry = FormulaRegistry::new();
        let (plan, _) = CollectionBuilder::new(&registry)
            .plan(
                Sensor::Modis,
                &geometry(),
                &june(),
                CloudPolicy::PixelReliability { reliability: Reliability::Marginal },
                IndexName::Nbr,
            )
            .unwrap();
        assert_eq!(plan.collection, "MODIS/061/MOD09A1");
        assert!(matches!(
            plan.quality_mask,
            Some(QualityMask::StateBits { mask: 0b011, .. })
        ));
    }

    #[test]
    fn test_mismatched_policy_is_a_registry_defect() {
        let registry = FormulaRegistry::new();
        let err = CollectionBuilder::new(&registry)
            .plan(
                Sensor::Sentinel2,
                &geometry(),
                &june(),
                CloudPolicy::PixelReliability { reliability: Reliability::Good },
                IndexName::Ndvi,
            )
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::QualityMismatch {
                sensor: Sensor::Sentinel2,
                index: IndexName::Ndvi
            }
        );
    }
}
