// src/processing/indices/savi.rs
use crate::processing::expr::Expr;
use crate::processing::indices::IndexFormula;
use crate::processing::sensor::SpectralBand;

/// Soil Adjusted Vegetation Index (SAVI)
/// SAVI = ((NIR - RED) / (NIR + RED + L)) * (1 + L)
pub struct SAVI {
    nir: SpectralBand,
    red: SpectralBand,
    soil_factor: f64,
}

impl SAVI {
    pub fn new(nir: SpectralBand, red: SpectralBand, soil_factor: f64) -> Self {
        Self { nir, red, soil_factor }
    }
}

impl IndexFormula for SAVI {
    fn formula(&self, band: &dyn Fn(SpectralBand) -> Expr) -> Expr {
        let nir = band(self.nir);
        let red = band(self.red);
        let l = self.soil_factor;

        (nir.clone() - red.clone()) / (nir + red + l) * (1.0 + l)
    }

    fn required_bands(&self) -> Vec<SpectralBand> {
        vec![self.nir, self.red]
    }

    fn needs_input_scaling(&self) -> bool {
        true // soil factor L is expressed in reflectance units
    }
}
