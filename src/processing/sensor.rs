// src/processing/sensor.rs
//! Sensor routing and the per-sensor product descriptions.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::IndexName;
use crate::request::CloudTolerance;

/// First Sentinel-2 surface reflectance acquisition in the archive.
pub const SENTINEL2_SR_FIRST_ACQUISITION: NaiveDate = match NaiveDate::from_ymd_opt(2017, 3, 28) {
    Some(date) => date,
    None => panic!("invalid cutoff date"),
};

/// Provider-side fixed-point factor for reflectance and precalculated index bands.
pub const FIXED_POINT_SCALE: f64 = 0.0001;

/// Tolerances at or below this keep only pixels the fallback product marks good.
const GOOD_RELIABILITY_MAX_TOLERANCE: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensor {
    /// High-resolution sensor, only available from its launch onwards.
    Sentinel2,
    /// Coarser long-running sensor used for historical requests.
    Modis,
}

impl Sensor {
    pub fn name(self) -> &'static str {
        match self {
            Sensor::Sentinel2 => "Sentinel-2",
            Sensor::Modis => "MODIS",
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sensor-independent band roles used by index formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpectralBand {
    Blue,
    Green,
    Red,
    Nir,
    Swir1,
    Swir2,
}

/// Picks one sensor for a whole request from its start date alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorRouter {
    high_res_from: NaiveDate,
}

impl SensorRouter {
    pub fn new(high_res_from: NaiveDate) -> Self {
        Self { high_res_from }
    }

    pub fn high_res_from(&self) -> NaiveDate {
        self.high_res_from
    }

    /// A window straddling the cutoff is routed entirely by its start.
    pub fn sensor_for(&self, start: NaiveDate) -> Sensor {
        let sensor = if start < self.high_res_from {
            Sensor::Modis
        } else {
            Sensor::Sentinel2
        };
        debug!(%start, cutoff = %self.high_res_from, %sensor, "Routed request");
        sensor
    }
}

impl Default for SensorRouter {
    fn default() -> Self {
        Self::new(SENTINEL2_SR_FIRST_ACQUISITION)
    }
}

/// How a product reports cloud contamination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityScheme {
    /// Whole-scene metadata percentage; rejects entire images.
    SceneCloudPercentage { property: &'static str },
    /// Per-pixel discrete reliability code band.
    ReliabilityBand { band: &'static str },
    /// Per-pixel bit-packed state flags band.
    StateFlags { band: &'static str },
}

/// One provider collection and how to read it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceProduct {
    pub collection: &'static str,
    /// Native pixel size in meters, used as the reduction scale.
    pub scale_m: f64,
    pub quality: QualityScheme,
    bands: &'static [(SpectralBand, &'static str)],
    precalculated: &'static [(IndexName, &'static str)],
}

impl SourceProduct {
    pub fn band_name(&self, band: SpectralBand) -> Option<&'static str> {
        self.bands
            .iter()
            .find(|(role, _)| *role == band)
            .map(|(_, name)| *name)
    }

    /// Band shipped with the index already computed, stored in fixed point.
    pub fn precalculated_band(&self, index: IndexName) -> Option<&'static str> {
        self.precalculated
            .iter()
            .find(|(name, _)| *name == index)
            .map(|(_, band)| *band)
    }
}

pub const SENTINEL2_SR: SourceProduct = SourceProduct {
    collection: "COPERNICUS/S2_SR_HARMONIZED",
    scale_m: 10.0,
    quality: QualityScheme::SceneCloudPercentage {
        property: "CLOUDY_PIXEL_PERCENTAGE",
    },
    bands: &[
        (SpectralBand::Blue, "B2"),
        (SpectralBand::Green, "B3"),
        (SpectralBand::Red, "B4"),
        (SpectralBand::Nir, "B8"),
        (SpectralBand::Swir1, "B11"),
        (SpectralBand::Swir2, "B12"),
    ],
    precalculated: &[],
};

/// 8-day surface reflectance composite, used for band algebra.
pub const MODIS_SURFACE_REFLECTANCE: SourceProduct = SourceProduct {
    collection: "MODIS/061/MOD09A1",
    scale_m: 500.0,
    quality: QualityScheme::StateFlags { band: "StateQA" },
    bands: &[
        (SpectralBand::Blue, "sur_refl_b03"),
        (SpectralBand::Green, "sur_refl_b04"),
        (SpectralBand::Red, "sur_refl_b01"),
        (SpectralBand::Nir, "sur_refl_b02"),
        (SpectralBand::Swir1, "sur_refl_b06"),
        (SpectralBand::Swir2, "sur_refl_b07"),
    ],
    precalculated: &[],
};

/// 16-day vegetation indices product shipping NDVI and EVI precomputed.
pub const MODIS_VEGETATION_INDICES: SourceProduct = SourceProduct {
    collection: "MODIS/061/MOD13Q1",
    scale_m: 250.0,
    quality: QualityScheme::ReliabilityBand { band: "SummaryQA" },
    bands: &[
        (SpectralBand::Blue, "sur_refl_b03"),
        (SpectralBand::Red, "sur_refl_b01"),
        (SpectralBand::Nir, "sur_refl_b02"),
        (SpectralBand::Swir2, "sur_refl_b07"),
    ],
    precalculated: &[(IndexName::Ndvi, "NDVI"), (IndexName::Evi, "EVI")],
};

/// Pixel reliability accepted on the fallback sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    Good,
    Marginal,
}

impl Reliability {
    /// Accepted `SummaryQA` codes (0 good, 1 marginal, 2 snow, 3 cloudy).
    pub fn accepted_codes(self) -> Vec<u8> {
        match self {
            Reliability::Good => vec![0],
            Reliability::Marginal => vec![0, 1],
        }
    }

    /// `(mask, accepted patterns)` over `StateQA`.
    /// Bits 0-1 are cloud state (00 clear, 01 cloudy, 10 mixed, 11 unset), bit 2 shadow.
    pub fn state_patterns(self) -> (u32, Vec<u32>) {
        match self {
            Reliability::Good => (0b111, vec![0b000]),
            Reliability::Marginal => (0b011, vec![0b00, 0b10, 0b11]),
        }
    }
}

/// Cloud tolerance after translation for the routed sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CloudPolicy {
    /// Scenes whose cloud percentage is at most this value are kept.
    SceneThreshold { max_cloud_percent: u8 },
    /// Pixels at or above this reliability are kept.
    PixelReliability { reliability: Reliability },
}

impl CloudPolicy {
    pub fn translate(sensor: Sensor, tolerance: CloudTolerance) -> Self {
        match sensor {
            Sensor::Sentinel2 => CloudPolicy::SceneThreshold {
                max_cloud_percent: tolerance.value(),
            },
            Sensor::Modis => {
                let reliability = if tolerance.value() <= GOOD_RELIABILITY_MAX_TOLERANCE {
                    Reliability::Good
                } else {
                    Reliability::Marginal
                };
                CloudPolicy::PixelReliability { reliability }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_routes_by_start_date() {
        let router = SensorRouter::default();
        assert_eq!(router.sensor_for(date(2023, 6, 1)), Sensor::Sentinel2);
        assert_eq!(router.sensor_for(date(2015, 6, 1)), Sensor::Modis);
    }

    #[test]
    fn test_cutoff_day_routes_high_res() {
        let router = SensorRouter::default();
        assert_eq!(router.sensor_for(router.high_res_from()), Sensor::Sentinel2);
        let day_before = router.high_res_from().pred_opt().unwrap();
        assert_eq!(router.sensor_for(day_before), Sensor::Modis);
    }

    #[test]
    fn test_custom_cutoff() {
        let router = SensorRouter::new(date(2020, 1, 1));
        assert_eq!(router.sensor_for(date(2019, 12, 31)), Sensor::Modis);
        assert_eq!(router.sensor_for(date(2020, 1, 1)), Sensor::Sentinel2);
    }

    #[test]
    fn test_reflectance_products_map_every_band_role() {
        let roles = [
            SpectralBand::Blue,
            SpectralBand::Green,
            SpectralBand::Red,
            SpectralBand::Nir,
            SpectralBand::Swir1,
            SpectralBand::Swir2,
        ];
        for product in [SENTINEL2_SR, MODIS_SURFACE_REFLECTANCE] {
            for role in roles {
                assert!(product.band_name(role).is_some());
            }
        }
        assert_eq!(SENTINEL2_SR.band_name(SpectralBand::Nir), Some("B8"));
        assert_eq!(
            MODIS_SURFACE_REFLECTANCE.band_name(SpectralBand::Red),
            Some("sur_refl_b01")
        );
    }

    #[test]
    fn test_only_vegetation_product_ships_precalculated_bands() {
        assert_eq!(
            MODIS_VEGETATION_INDICES.precalculated_band(IndexName::Ndvi),
            Some("NDVI")
        );
        assert_eq!(
            MODIS_VEGETATION_INDICES.precalculated_band(IndexName::Evi),
            Some("EVI")
        );
        assert_eq!(MODIS_VEGETATION_INDICES.precalculated_band(IndexName::Ndmi), None);
        assert_eq!(SENTINEL2_SR.precalculated_band(IndexName::Ndvi), None);
    }

    #[test]
    fn test_cloud_translation_per_sensor() {
        let ten = CloudTolerance::new(10).unwrap();
        let sixty = CloudTolerance::new(60).unwrap();
        assert_eq!(
            CloudPolicy::translate(Sensor::Sentinel2, ten),
            CloudPolicy::SceneThreshold { max_cloud_percent: 10 }
        );
        assert_eq!(
            CloudPolicy::translate(Sensor::Modis, ten),
            CloudPolicy::PixelReliability { reliability: Reliability::Good }
        );
        assert_eq!(
            CloudPolicy::translate(Sensor::Modis, sixty),
            CloudPolicy::PixelReliability { reliability: Reliability::Marginal }
        );
    }

    #[test]
    fn test_reliability_boundary() {
        let at = CloudTolerance::try_from(GOOD_RELIABILITY_MAX_TOLERANCE).unwrap();
        let above = CloudTolerance::try_from(GOOD_RELIABILITY_MAX_TOLERANCE + 1).unwrap();
        assert_eq!(
            CloudPolicy::translate(Sensor::Modis, at),
            CloudPolicy::PixelReliability { reliability: Reliability::Good }
        );
        assert_eq!(
            CloudPolicy::translate(Sensor::Modis, above),
            CloudPolicy::PixelReliability { reliability: Reliability::Marginal }
        );
    }
}
