// src/processing/parallel.rs
//! Pixel-parallel evaluation of plans over in-memory rasters.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use geo_types::{coord, Coord, Rect};
use itertools::Itertools;
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::geometry::{rects_intersect, Region};
use crate::processing::expr::Expr;
use crate::provider::QualityMask;

/// Coverage below this is rounding noise from edges through pixel corners.
const MIN_COVERAGE: f64 = 1e-9;

/// Pixels per rayon task; below this a raster is effectively processed serially.
const DEFAULT_MIN_CHUNK: usize = 1024;

/// North-up lon/lat grid shared by every scene of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RasterGrid {
    pub west: f64,
    pub north: f64,
    /// Pixel side in degrees.
    pub pixel_size: f64,
    pub width: usize,
    pub height: usize,
}

impl RasterGrid {
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn extent(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.west, y: self.north - self.height as f64 * self.pixel_size },
            coord! { x: self.west + self.width as f64 * self.pixel_size, y: self.north },
        )
    }

    /// Bounds of pixel `idx` in row-major order, row 0 at the north edge.
    pub fn pixel_bounds(&self, idx: usize) -> Rect<f64> {
        let (row, col) = (idx / self.width, idx % self.width);
        let west = self.west + col as f64 * self.pixel_size;
        let north = self.north - row as f64 * self.pixel_size;
        Rect::new(
            coord! { x: west, y: north - self.pixel_size },
            coord! { x: west + self.pixel_size, y: north },
        )
    }

    pub fn pixel_center(&self, idx: usize) -> Coord<f64> {
        self.pixel_bounds(idx).center()
    }
}

/// One mapped image: formula applied, masked pixels are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedImage {
    pub acquired: DateTime<Utc>,
    pub values: Vec<Option<f64>>,
}

pub struct ParallelEvaluator {
    min_chunk: usize,
}

impl ParallelEvaluator {
    pub fn new(min_chunk: Option<usize>) -> Self {
        Self {
            min_chunk: min_chunk.unwrap_or(DEFAULT_MIN_CHUNK).max(1),
        }
    }

    /// Applies the quality mask, then the formula, to every pixel of one scene.
    pub fn evaluate_scene(
        &self,
        bands: &HashMap<String, Vec<Option<f64>>>,
        expression: &Expr,
        mask: Option<&QualityMask>,
        len: usize,
    ) -> Vec<Option<f64>> {
        let sample = |name: &str, i: usize| bands.get(name).and_then(|b| b.get(i).copied().flatten());

        (0..len)
            .into_par_iter()
            .with_min_len(self.min_chunk)
            .map(|i| {
                if let Some(mask) = mask {
                    if !sample(mask.band(), i).is_some_and(|q| mask.accepts(q)) {
                        return None;
                    }
                }
                expression.evaluate(&|name: &str| sample(name, i))
            })
            .collect()
    }

    /// Per-pixel mean over the images unmasked at that pixel.
    pub fn mean_composite(&self, images: &[MaskedImage], len: usize) -> Vec<Option<f64>> {
        (0..len)
            .into_par_iter()
            .with_min_len(self.min_chunk)
            .map(|i| {
                let (sum, count) = images
                    .iter()
                    .filter_map(|image| image.values.get(i).copied().flatten())
                    .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
                (count > 0).then(|| sum / count as f64)
            })
            .collect()
    }

    /// Per-pixel value of the most recent image unmasked at that pixel.
    pub fn freshest_mosaic(&self, images: &[MaskedImage], len: usize) -> Vec<Option<f64>> {
        let newest_first = images
            .iter()
            .sorted_by(|a, b| b.acquired.cmp(&a.acquired))
            .collect::<Vec<_>>();

        (0..len)
            .into_par_iter()
            .with_min_len(self.min_chunk)
            .map(|i| {
                newest_first
                    .iter()
                    .find_map(|image| image.values.get(i).copied().flatten())
            })
            .collect()
    }

    /// Fraction of each pixel's area inside `region`, in 0..=1.
    pub fn coverage(&self, grid: &RasterGrid, region: &Region) -> Vec<f64> {
        let Some(bounds) = region.bounding_rect() else {
            return vec![0.0; grid.len()];
        };
        let pixel_area = grid.pixel_size * grid.pixel_size;

        (0..grid.len())
            .into_par_iter()
            .with_min_len(self.min_chunk)
            .map(|i| {
                let pixel = grid.pixel_bounds(i);
                if !rects_intersect(&pixel, &bounds) {
                    return 0.0;
                }
                let fraction = region.overlap_area(&pixel) / pixel_area;
                if fraction < MIN_COVERAGE {
                    0.0
                } else {
                    fraction.min(1.0)
                }
            })
            .collect()
    }

    /// Masks every pixel the region does not touch.
    pub fn clip(&self, grid: &RasterGrid, values: Vec<Option<f64>>, region: &Region) -> Vec<Option<f64>> {
        let coverage = self.coverage(grid, region);
        values
            .into_par_iter()
            .zip(coverage)
            .map(|(v, c)| if c > 0.0 { v } else { None })
            .collect()
    }

    /// Mean of unmasked pixels weighted by covered area.
    ///
    /// Weights are the covered fraction of each pixel times the cosine of its
    /// latitude, so pixels shrink toward the poles. `None` when no unmasked
    /// pixel overlaps the region.
    pub fn reduce_weighted_mean(
        &self,
        grid: &RasterGrid,
        values: &[Option<f64>],
        region: &Region,
    ) -> Option<f64> {
        let coverage = self.coverage(grid, region);
        let (sum, weight) = (0..grid.len().min(values.len()))
            .into_par_iter()
            .with_min_len(self.min_chunk)
            .filter_map(|i| {
                let v = values[i]?;
                let w = coverage[i] * grid.pixel_center(i).y.to_radians().cos();
                (w > 0.0).then_some((v * w, w))
            })
            .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));

        (weight > 0.0).then(|| sum / weight)
    }
}

impl Default for ParallelEvaluator {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn grid() -> RasterGrid {
        // 2x2 pixels of 0.1 degrees over [-74.6, 40.0] .. [-74.4, 40.2]
        RasterGrid {
            west: -74.6,
            north: 40.2,
            pixel_size: 0.1,
            width: 2,
            height: 2,
        }
    }

    fn image(day: u32, values: Vec<Option<f64>>) -> MaskedImage {
        MaskedImage {
            acquired: Utc.with_ymd_and_hms(2023, 6, day, 15, 0, 0).unwrap(),
            values,
        }
    }

    #[test]
    fn test_pixel_bounds_are_row_major_from_north() {
        let g = grid();
        let first = g.pixel_bounds(0);
        assert!((first.max().y - 40.2).abs() < 1e-12);
        assert!((first.min().x - -74.6).abs() < 1e-12);
        let last = g.pixel_bounds(3);
        assert!((last.min().y - 40.0).abs() < 1e-9);
        assert!((last.max().x - -74.4).abs() < 1e-9);
        let extent = g.extent();
        assert!((extent.min().y - 40.0).abs() < 1e-9);
        assert!((extent.max().x - -74.4).abs() < 1e-9);
    }

    #[test]
    fn test_quality_mask_applies_before_formula() {
        let bands = HashMap::from([
            ("nir".to_string(), vec![Some(0.5), Some(0.5), Some(0.5), None]),
            ("qa".to_string(), vec![Some(0.0), Some(3.0), Some(0.0), Some(0.0)]),
        ]);
        let mask = QualityMask::ReliabilityCode {
            band: "qa".to_string(),
            accepted: vec![0],
        };
        let out = ParallelEvaluator::default().evaluate_scene(&bands, &(Expr::band("nir") * 2.0), Some(&mask), 4);
        assert_eq!(out, vec![Some(1.0), None, Some(1.0), None]);
    }

    #[test]
    fn test_mean_skips_masked_pixels() {
        let images = vec![
            image(1, vec![Some(0.2), None, None, Some(1.0)]),
            image(2, vec![Some(0.4), Some(0.6), None, Some(0.0)]),
        ];
        let out = ParallelEvaluator::default().mean_composite(&images, 4);
        assert!((out[0].unwrap() - 0.3).abs() < 1e-12);
        assert_eq!(out[1], Some(0.6));
        assert_eq!(out[2], None);
        assert_eq!(out[3], Some(0.5));
    }

    #[test]
    fn test_mosaic_prefers_newest_unmasked() {
        // given out of order on purpose
        let images = vec![
            image(1, vec![Some(0.1), Some(0.1), Some(0.1), None]),
            image(20, vec![Some(0.9), None, None, None]),
            image(10, vec![Some(0.5), Some(0.5), None, None]),
        ];
        let out = ParallelEvaluator::default().freshest_mosaic(&images, 4);
        assert_eq!(out, vec![Some(0.9), Some(0.5), Some(0.1), None]);
    }

    #[test]
    fn test_clip_masks_pixels_outside_region() {
        let g = grid();
        // only the south-west pixel
        let region = Region::Rectangle(Rect::new(
            coord! { x: -74.6, y: 40.0 },
            coord! { x: -74.55, y: 40.05 },
        ));
        let out = ParallelEvaluator::default().clip(&g, vec![Some(1.0); 4], &region);
        assert_eq!(out, vec![None, None, Some(1.0), None]);
    }

    #[test]
    fn test_weighted_mean_uses_fractional_coverage() {
        let g = grid();
        // whole west column plus half of the east column
        let region = Region::Rectangle(Rect::new(
            coord! { x: -74.6, y: 40.0 },
            coord! { x: -74.45, y: 40.2 },
        ));
        let values = vec![Some(0.0), Some(1.0), Some(0.0), Some(1.0)];
        let mean = ParallelEvaluator::default()
            .reduce_weighted_mean(&g, &values, &region)
            .unwrap();
        // weights 1 : 0.5, latitude factor nearly equal between rows
        assert!((mean - 1.0 / 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_region_inside_one_pixel_still_reduces() {
        let g = grid();
        // far smaller than a pixel, within the north-west one
        let region = Region::Rectangle(Rect::new(
            coord! { x: -74.58, y: 40.12 },
            coord! { x: -74.57, y: 40.13 },
        ));
        let values = vec![Some(0.25), Some(1.0), Some(1.0), Some(1.0)];
        let evaluator = ParallelEvaluator::default();

        let coverage = evaluator.coverage(&g, &region);
        assert!((coverage[0] - 0.01).abs() < 1e-9);
        assert_eq!(&coverage[1..], &[0.0, 0.0, 0.0]);

        let mean = evaluator.reduce_weighted_mean(&g, &values, &region).unwrap();
        assert!((mean - 0.25).abs() < 1e-12);
        assert_eq!(evaluator.clip(&g, values, &region), vec![Some(0.25), None, None, None]);
    }

    #[test]
    fn test_fully_masked_region_reduces_to_none() {
        let g = grid();
        let region = Region::Rectangle(g.extent());
        let values = vec![None; 4];
        assert_eq!(
            ParallelEvaluator::default().reduce_weighted_mean(&g, &values, &region),
            None
        );
    }

    #[test]
    fn test_region_outside_grid_reduces_to_none() {
        let g = grid();
        let region = Region::Rectangle(Rect::new(coord! { x: 10.0, y: 10.0 }, coord! { x: 11.0, y: 11.0 }));
        assert_eq!(
            ParallelEvaluator::default().reduce_weighted_mean(&g, &[Some(1.0); 4], &region),
            None
        );
    }
}
