// src/processing/indices/ndi.rs
use crate::processing::expr::Expr;
use crate::processing::indices::IndexFormula;
use crate::processing::sensor::SpectralBand;

/// Normalized Difference Index (NDI): (A - B) / (A + B)
/// Backs NDVI, GNDVI, NDWI, NDMI and NBR
pub struct NDI {
    band_a: SpectralBand,
    band_b: SpectralBand,
}

impl NDI {
    pub fn new(band_a: SpectralBand, band_b: SpectralBand) -> Self {
        Self { band_a, band_b }
    }
}

impl IndexFormula for NDI {
    fn formula(&self, band: &dyn Fn(SpectralBand) -> Expr) -> Expr {
        Expr::normalized_difference(band(self.band_a), band(self.band_b))
    }

    fn required_bands(&self) -> Vec<SpectralBand> {
        vec![self.band_a, self.band_b]
    }
}
