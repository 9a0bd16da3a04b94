// src/processing/indices/mod.rs
pub mod ndi;
pub mod evi;
pub mod savi;
pub mod msavi2;
pub mod osavi;

// Re-export indices
pub use ndi::NDI;
pub use evi::EVI;
pub use savi::SAVI;
pub use msavi2::MSAVI2;
pub use osavi::OSAVI;

use crate::catalog::IndexName;
use crate::processing::expr::Expr;
use crate::processing::sensor::SpectralBand;

/// Trait for spectral index formulas
pub trait IndexFormula: Send + Sync {
    /// Build the band algebra, reading each spectral role through `band`
    fn formula(&self, band: &dyn Fn(SpectralBand) -> Expr) -> Expr;

    /// Spectral roles the formula reads
    fn required_bands(&self) -> Vec<SpectralBand>;

    /// Return true if this index requires reflectance-scaled inputs
    /// Indices with additive constants (EVI, SAVI, MSAVI, OSAVI) need scaling
    /// Pure ratio indices (NDVI, NDWI, NBR, ...) do not
    fn needs_input_scaling(&self) -> bool {
        false
    }
}

/// The formula behind each catalog entry.
pub fn formula_for_index(name: IndexName) -> Box<dyn IndexFormula> {
    use SpectralBand::*;

    match name {
        IndexName::Ndvi => Box::new(NDI::new(Nir, Red)),
        IndexName::Gndvi => Box::new(NDI::new(Nir, Green)),
        IndexName::Ndwi => Box::new(NDI::new(Green, Nir)),
        IndexName::Ndmi => Box::new(NDI::new(Nir, Swir1)),
        IndexName::Nbr => Box::new(NDI::new(Nir, Swir2)),
        IndexName::Evi => Box::new(EVI::new(Nir, Red, Blue)),
        IndexName::Savi => Box::new(SAVI::new(Nir, Red, 0.5)),
        IndexName::Msavi => Box::new(MSAVI2::new(Nir, Red)),
        IndexName::Osavi => Box::new(OSAVI::new(Nir, Red)),
    }
}
