// src/processing/indices/msavi2.rs
use crate::processing::expr::Expr;
use crate::processing::indices::IndexFormula;
use crate::processing::sensor::SpectralBand;

/// Modified Soil Adjusted Vegetation Index 2 (MSAVI2)
/// MSAVI2 = (2 * NIR + 1 - sqrt((2 * NIR + 1)^2 - 8 * (NIR - RED))) / 2
pub struct MSAVI2 {
    nir: SpectralBand,
    red: SpectralBand,
}

impl MSAVI2 {
    pub fn new(nir: SpectralBand, red: SpectralBand) -> Self {
        Self { nir, red }
    }
}

impl IndexFormula for MSAVI2 {
    fn formula(&self, band: &dyn Fn(SpectralBand) -> Expr) -> Expr {
        let nir = band(self.nir);
        let red = band(self.red);

        let two_nir_plus_one = 2.0 * nir.clone() + 1.0;
        // A negative discriminant masks the pixel
        let discriminant =
            two_nir_plus_one.clone() * two_nir_plus_one.clone() - 8.0 * (nir - red);
        (two_nir_plus_one - discriminant.sqrt()) / 2.0
    }

    fn required_bands(&self) -> Vec<SpectralBand> {
        vec![self.nir, self.red]
    }

    fn needs_input_scaling(&self) -> bool {
        true // constants 1, 2 and 8 assume reflectance
    }
}
