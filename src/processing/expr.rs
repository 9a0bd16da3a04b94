// src/processing/expr.rs
//! Band algebra submitted to the provider as a per-image transform.
//!
//! An [`Expr`] is pure data: it serializes to JSON for the remote backend and
//! can be evaluated pixel by pixel by the local evaluator.

use std::collections::BTreeSet;
use std::ops::{Add, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    Band { name: String },
    Constant { value: f64 },
    Add { lhs: Box<Expr>, rhs: Box<Expr> },
    Subtract { lhs: Box<Expr>, rhs: Box<Expr> },
    Multiply { lhs: Box<Expr>, rhs: Box<Expr> },
    Divide { lhs: Box<Expr>, rhs: Box<Expr> },
    Sqrt { arg: Box<Expr> },
}

impl Expr {
    pub fn band(name: impl Into<String>) -> Self {
        Expr::Band { name: name.into() }
    }

    pub fn constant(value: f64) -> Self {
        Expr::Constant { value }
    }

    pub fn sqrt(self) -> Self {
        Expr::Sqrt { arg: Box::new(self) }
    }

    /// (a - b) / (a + b)
    pub fn normalized_difference(a: Expr, b: Expr) -> Self {
        (a.clone() - b.clone()) / (a + b)
    }

    /// Names of every band the expression reads.
    pub fn bands(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_bands(&mut out);
        out
    }

    fn collect_bands<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Band { name } => {
                out.insert(name.as_str());
            }
            Expr::Constant { .. } => {}
            Expr::Add { lhs, rhs }
            | Expr::Subtract { lhs, rhs }
            | Expr::Multiply { lhs, rhs }
            | Expr::Divide { lhs, rhs } => {
                lhs.collect_bands(out);
                rhs.collect_bands(out);
            }
            Expr::Sqrt { arg } => arg.collect_bands(out),
        }
    }

    /// Evaluate for one pixel. `None` means the output pixel is masked:
    /// a masked input, a zero divisor, a negative square root or a
    /// non-finite result.
    pub fn evaluate<F>(&self, lookup: &F) -> Option<f64>
    where
        F: Fn(&str) -> Option<f64>,
    {
        let value = match self {
            Expr::Band { name } => lookup(name.as_str())?,
            Expr::Constant { value } => *value,
            Expr::Add { lhs, rhs } => lhs.evaluate(lookup)? + rhs.evaluate(lookup)?,
            Expr::Subtract { lhs, rhs } => lhs.evaluate(lookup)? - rhs.evaluate(lookup)?,
            Expr::Multiply { lhs, rhs } => lhs.evaluate(lookup)? * rhs.evaluate(lookup)?,
            Expr::Divide { lhs, rhs } => {
                let divisor = rhs.evaluate(lookup)?;
                if divisor.abs() < 1e-12 {
                    return None;
                }
                lhs.evaluate(lookup)? / divisor
            }
            Expr::Sqrt { arg } => {
                let inner = arg.evaluate(lookup)?;
                if inner < 0.0 {
                    return None;
                }
                inner.sqrt()
            }
        };

        value.is_finite().then_some(value)
    }
}

macro_rules! binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl $trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant {
                    lhs: Box::new(self),
                    rhs: Box::new(rhs),
                }
            }
        }

        impl $trait<f64> for Expr {
            type Output = Expr;

            fn $method(self, rhs: f64) -> Expr {
                Expr::$variant {
                    lhs: Box::new(self),
                    rhs: Box::new(Expr::constant(rhs)),
                }
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant {
                    lhs: Box::new(Expr::constant(self)),
                    rhs: Box::new(rhs),
                }
            }
        }
    };
}

binary_op!(Add, add, Add);
binary_op!(Sub, sub, Subtract);
binary_op!(Mul, mul, Multiply);
binary_op!(Div, div, Divide);

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(nir: f64, red: f64) -> impl Fn(&str) -> Option<f64> {
        move |name: &str| match name {
            "nir" => Some(nir),
            "red" => Some(red),
            _ => None,
        }
    }

    #[test]
    fn test_normalized_difference() {
        let ndvi = Expr::normalized_difference(Expr::band("nir"), Expr::band("red"));
        let value = ndvi.evaluate(&pixel(5000.0, 2500.0)).unwrap();
        assert!((value - 0.33333).abs() < 1e-4);
    }

    #[test]
    fn test_zero_divisor_masks_pixel() {
        let ndvi = Expr::normalized_difference(Expr::band("nir"), Expr::band("red"));
        assert_eq!(ndvi.evaluate(&pixel(0.0, 0.0)), None);
    }

    #[test]
    fn test_missing_band_masks_pixel() {
        let expr = Expr::band("blue") * 2.0;
        assert_eq!(expr.evaluate(&pixel(1.0, 1.0)), None);
    }

    #[test]
    fn test_negative_sqrt_masks_pixel() {
        let expr = (Expr::band("red") - Expr::band("nir")).sqrt();
        assert_eq!(expr.evaluate(&pixel(4.0, 0.0)), None);
        assert_eq!(expr.evaluate(&pixel(0.0, 4.0)), Some(2.0));
    }

    #[test]
    fn test_bands_lists_every_reference_once() {
        let expr = Expr::normalized_difference(Expr::band("nir"), Expr::band("red")) * 1.5;
        let bands: Vec<_> = expr.bands().into_iter().collect();
        assert_eq!(bands, vec!["nir", "red"]);
    }

    #[test]
    fn test_serializes_as_tagged_tree() {
        let expr = Expr::band("B8") * 0.0001;
        let json = serde_json::to_value(&expr).unwrap();
        assert_eq!(json["op"], "multiply");
        assert_eq!(json["lhs"]["op"], "band");
        assert_eq!(json["lhs"]["name"], "B8");
        assert_eq!(json["rhs"]["value"], 0.0001);
        let back: Expr = serde_json::from_value(json).unwrap();
        assert_eq!(back, expr);
    }
}
