// src/processing/indices/evi.rs
use crate::processing::expr::Expr;
use crate::processing::indices::IndexFormula;
use crate::processing::sensor::SpectralBand;

// EVI coefficients from MODIS documentation
const G: f64 = 2.5; // Gain factor
const L: f64 = 1.0; // Soil adjustment factor
const C1: f64 = 6.0; // Aerosol resistance (red)
const C2: f64 = 7.5; // Aerosol resistance (blue)

/// Enhanced Vegetation Index (EVI)
/// EVI = G * (NIR - RED) / (NIR + C1 * RED - C2 * BLUE + L)
pub struct EVI {
    nir: SpectralBand,
    red: SpectralBand,
    blue: SpectralBand,
}

impl EVI {
    pub fn new(nir: SpectralBand, red: SpectralBand, blue: SpectralBand) -> Self {
        Self { nir, red, blue }
    }
}

impl IndexFormula for EVI {
    fn formula(&self, band: &dyn Fn(SpectralBand) -> Expr) -> Expr {
        let nir = band(self.nir);
        let red = band(self.red);
        let blue = band(self.blue);

        let denominator = nir.clone() + C1 * red.clone() - C2 * blue + L;
        G * (nir - red) / denominator
    }

    fn required_bands(&self) -> Vec<SpectralBand> {
        vec![self.nir, self.red, self.blue]
    }

    fn needs_input_scaling(&self) -> bool {
        true // L=1.0, C1=6.0, C2=7.5 only make sense on reflectance
    }
}
