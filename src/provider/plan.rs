// src/provider/plan.rs
//! Serializable plans handed to the provider.

use std::collections::HashMap;

use chrono::NaiveDate;
use geo_types::Rect;
use serde::{Deserialize, Serialize};

use crate::geometry::Region;
use crate::processing::expr::Expr;

/// Whole-scene rejection on a metadata property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneFilter {
    pub property: String,
    /// Scenes pass when `property <= max_value`.
    pub max_value: f64,
}

impl SceneFilter {
    /// A scene without the property never passes.
    pub fn accepts(&self, properties: &HashMap<String, f64>) -> bool {
        properties
            .get(&self.property)
            .is_some_and(|v| *v <= self.max_value)
    }
}

/// Per-pixel mask from a companion quality band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityMask {
    /// Keep pixels whose code is one of `accepted`.
    ReliabilityCode { band: String, accepted: Vec<u8> },
    /// Keep pixels where `value & mask` is one of `accepted`.
    StateBits {
        band: String,
        mask: u32,
        accepted: Vec<u32>,
    },
}

impl QualityMask {
    pub fn band(&self) -> &str {
        match self {
            QualityMask::ReliabilityCode { band, .. } | QualityMask::StateBits { band, .. } => band,
        }
    }

    pub fn accepts(&self, raw: f64) -> bool {
        if !raw.is_finite() || raw < 0.0 {
            return false;
        }
        let code = raw as u64;
        match self {
            QualityMask::ReliabilityCode { accepted, .. } => u8::try_from(code)
                .map(|c| accepted.contains(&c))
                .unwrap_or(false),
            QualityMask::StateBits { mask, accepted, .. } => {
                accepted.contains(&((code as u32) & mask))
            }
        }
    }
}

/// Lazy description of a filtered, masked and mapped image collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPlan {
    pub collection: String,
    /// Scenes must intersect this rectangle.
    pub region: Rect<f64>,
    pub start: NaiveDate,
    /// The date filter excludes this day.
    pub end_exclusive: NaiveDate,
    pub scene_filter: Option<SceneFilter>,
    pub quality_mask: Option<QualityMask>,
    /// Per-image transform, evaluated after masking.
    pub expression: Expr,
    pub output_band: String,
}

/// How a collection collapses into one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Composite {
    /// Per-pixel temporal mean of unmasked values.
    Mean,
    /// Most recent unmasked value per pixel.
    FreshestMosaic,
}

/// Lazy description of one composite image, clipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePlan {
    pub collection: CollectionPlan,
    pub composite: Composite,
    pub clip: Region,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_filter_is_inclusive() {
        let filter = SceneFilter {
            property: "CLOUDY_PIXEL_PERCENTAGE".to_string(),
            max_value: 10.0,
        };
        let scene = |v: f64| HashMap::from([("CLOUDY_PIXEL_PERCENTAGE".to_string(), v)]);
        assert!(filter.accepts(&scene(10.0)));
        assert!(filter.accepts(&scene(0.0)));
        assert!(!filter.accepts(&scene(10.5)));
        assert!(!filter.accepts(&HashMap::new()));
    }

    #[test]
    fn test_reliability_code_mask() {
        let mask = QualityMask::ReliabilityCode {
            band: "SummaryQA".to_string(),
            accepted: vec![0, 1],
        };
        assert!(mask.accepts(0.0));
        assert!(mask.accepts(1.0));
        assert!(!mask.accepts(3.0));
        assert!(!mask.accepts(-1.0));
        assert!(!mask.accepts(f64::NAN));
    }

    #[test]
    fn test_state_bits_mask() {
        let mask = QualityMask::StateBits {
            band: "StateQA".to_string(),
            mask: 0b111,
            accepted: vec![0],
        };
        assert!(mask.accepts(0b1000_0000 as f64));
        assert!(!mask.accepts(0b001 as f64));
        assert!(!mask.accepts(0b100 as f64));
    }
}
