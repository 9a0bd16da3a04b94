// src/processing/indices/osavi.rs
use crate::processing::expr::Expr;
use crate::processing::indices::IndexFormula;
use crate::processing::sensor::SpectralBand;

// Fixed soil adjustment factor for OSAVI
const L: f64 = 0.16;

/// Optimized Soil Adjusted Vegetation Index (OSAVI)
/// OSAVI = (NIR - RED) / (NIR + RED + 0.16) * (1 + 0.16)
pub struct OSAVI {
    nir: SpectralBand,
    red: SpectralBand,
}

impl OSAVI {
    pub fn new(nir: SpectralBand, red: SpectralBand) -> Self {
        Self { nir, red }
    }
}

impl IndexFormula for OSAVI {
    fn formula(&self, band: &dyn Fn(SpectralBand) -> Expr) -> Expr {
        let nir = band(self.nir);
        let red = band(self.red);

        (nir.clone() - red.clone()) / (nir + red + L) * (1.0 + L)
    }

    fn required_bands(&self) -> Vec<SpectralBand> {
        vec![self.nir, self.red]
    }

    fn needs_input_scaling(&self) -> bool {
        true // L=0.16 is a reflectance offset
    }
}
