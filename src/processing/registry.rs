// src/processing/registry.rs
//! Per-sensor, per-index pixel formulas.

use std::collections::HashMap;

use serde::Serialize;

use crate::catalog::IndexName;
use crate::error::RegistryError;
use crate::processing::expr::Expr;
use crate::processing::indices::{formula_for_index, IndexFormula};
use crate::processing::sensor::{
    Sensor, SourceProduct, SpectralBand, FIXED_POINT_SCALE, MODIS_SURFACE_REFLECTANCE,
    MODIS_VEGETATION_INDICES, SENTINEL2_SR,
};

/// How the fallback sensor obtains an index value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormulaStrategy {
    /// Band algebra over the sensor's own reflectance bands.
    BandAlgebra,
    /// A band the provider ships precomputed, stored in fixed point.
    Precalculated { band: &'static str, scale: f64 },
}

/// A pure per-image transform plus the product it must run against.
#[derive(Debug, Clone)]
pub struct PixelFormula {
    pub index: IndexName,
    pub sensor: Sensor,
    pub product: SourceProduct,
    pub strategy: FormulaStrategy,
    pub expression: Expr,
}

impl PixelFormula {
    /// Output band name of the mapped collection.
    pub fn output_band(&self) -> &'static str {
        self.index.as_str()
    }
}

pub struct FormulaRegistry {
    formulas: HashMap<(Sensor, IndexName), PixelFormula>,
}

impl FormulaRegistry {
    /// Builds the table for every catalog entry on both sensors.
    pub fn new() -> Self {
        let mut formulas = HashMap::new();
        for index in IndexName::ALL {
            let calculator = formula_for_index(index);
            for sensor in [Sensor::Sentinel2, Sensor::Modis] {
                if let Some(formula) = build_formula(sensor, index, calculator.as_ref()) {
                    formulas.insert((sensor, index), formula);
                }
            }
        }
        Self { formulas }
    }

    pub fn formula_for(&self, sensor: Sensor, index: IndexName) -> Result<&PixelFormula, RegistryError> {
        self.formulas
            .get(&(sensor, index))
            .ok_or(RegistryError::MissingFormula { sensor, index })
    }

    pub fn strategy_for(&self, sensor: Sensor, index: IndexName) -> Result<&FormulaStrategy, RegistryError> {
        self.formula_for(sensor, index).map(|f| &f.strategy)
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }
}

impl Default for FormulaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn build_formula(
    sensor: Sensor,
    index: IndexName,
    calculator: &dyn IndexFormula,
) -> Option<PixelFormula> {
    if sensor == Sensor::Modis {
        if let Some(band) = MODIS_VEGETATION_INDICES.precalculated_band(index) {
            return Some(PixelFormula {
                index,
                sensor,
                product: MODIS_VEGETATION_INDICES,
                strategy: FormulaStrategy::Precalculated {
                    band,
                    scale: FIXED_POINT_SCALE,
                },
                expression: Expr::band(band) * FIXED_POINT_SCALE,
            });
        }
    }

    let product = match sensor {
        Sensor::Sentinel2 => SENTINEL2_SR,
        Sensor::Modis => MODIS_SURFACE_REFLECTANCE,
    };
    let expression = band_algebra(&product, calculator)?;

    Some(PixelFormula {
        index,
        sensor,
        product,
        strategy: FormulaStrategy::BandAlgebra,
        expression,
    })
}

/// Binds spectral roles to the product's band names, scaling to
/// reflectance when the index has additive constants.
fn band_algebra(product: &SourceProduct, calculator: &dyn IndexFormula) -> Option<Expr> {
    let missing = calculator
        .required_bands()
        .into_iter()
        .any(|role| product.band_name(role).is_none());
    if missing {
        return None;
    }

    let scaled = calculator.needs_input_scaling();
    let bind = |role: SpectralBand| {
        // required_bands was checked above; the fallback keeps the closure total
        let raw = Expr::band(product.band_name(role).unwrap_or_default());
        if scaled {
            raw * FIXED_POINT_SCALE
        } else {
            raw
        }
    };

    Some(calculator.formula(&bind))
}
