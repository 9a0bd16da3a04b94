// src/geometry.rs
//! Query rectangles and clip geometries.
//!
//! Public inputs name points as (lat, lon). Everything handed to the provider
//! is (lon, lat), i.e. `x = lon`, `y = lat`. [`LatLng::to_coord`] is the only
//! place the axes are swapped.

use geo_types::{coord, Coord, LineString, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Half-width of the square buffered around a point query, in degrees.
pub const POINT_BUFFER_DEG: f64 = 0.01;

/// Context margin added around render requests without a polygon.
pub const RENDER_MARGIN_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(ValidationError::InvalidGeometry(format!(
                "point ({lat}, {lng}) is outside lat/lon range"
            )));
        }
        Ok(Self { lat, lng })
    }

    pub fn to_coord(self) -> Coord<f64> {
        coord! { x: self.lng, y: self.lat }
    }
}

/// Caller bounding box, stored in provider axis order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox(Rect<f64>);

impl BoundingBox {
    /// From the wire order `[minLon, minLat, maxLon, maxLat]`.
    pub fn from_wire(bbox: [f64; 4]) -> Result<Self, ValidationError> {
        let [min_lon, min_lat, max_lon, max_lat] = bbox;
        if bbox.iter().any(|v| !v.is_finite()) {
            return Err(ValidationError::InvalidBoundingBox(
                "coordinates must be finite".to_string(),
            ));
        }
        if min_lon >= max_lon || min_lat >= max_lat {
            return Err(ValidationError::InvalidBoundingBox(format!(
                "min must be below max, got {bbox:?}"
            )));
        }
        if min_lon < -180.0 || max_lon > 180.0 || min_lat < -90.0 || max_lat > 90.0 {
            return Err(ValidationError::InvalidBoundingBox(format!(
                "{bbox:?} is outside lon/lat range"
            )));
        }
        Ok(Self(Rect::new(
            coord! { x: min_lon, y: min_lat },
            coord! { x: max_lon, y: max_lat },
        )))
    }

    pub fn from_corners(south_west: LatLng, north_east: LatLng) -> Result<Self, ValidationError> {
        let sw = south_west.to_coord();
        let ne = north_east.to_coord();
        Self::from_wire([sw.x, sw.y, ne.x, ne.y])
    }

    /// The ±[`POINT_BUFFER_DEG`] square around a point.
    pub fn around_point(point: LatLng) -> Self {
        let c = point.to_coord();
        Self(Rect::new(
            coord! { x: (c.x - POINT_BUFFER_DEG).max(-180.0), y: (c.y - POINT_BUFFER_DEG).max(-90.0) },
            coord! { x: (c.x + POINT_BUFFER_DEG).min(180.0), y: (c.y + POINT_BUFFER_DEG).min(90.0) },
        ))
    }

    pub fn rect(&self) -> Rect<f64> {
        self.0
    }

    pub fn to_wire(&self) -> [f64; 4] {
        [self.0.min().x, self.0.min().y, self.0.max().x, self.0.max().y]
    }

    /// Grown by `fraction` of the larger side on every edge.
    pub fn expanded(&self, fraction: f64) -> Self {
        let margin = self.0.width().max(self.0.height()) * fraction;
        let min = self.0.min();
        let max = self.0.max();
        Self(Rect::new(
            coord! { x: (min.x - margin).max(-180.0), y: (min.y - margin).max(-90.0) },
            coord! { x: (max.x + margin).min(180.0), y: (max.y + margin).min(90.0) },
        ))
    }
}

/// Region used to clip an image or to bound a reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "geometry", rename_all = "snake_case")]
pub enum Region {
    Rectangle(Rect<f64>),
    Polygons(MultiPolygon<f64>),
}

impl Region {
    pub fn contains(&self, c: Coord<f64>) -> bool {
        match self {
            Region::Rectangle(rect) => rect_contains(rect, c),
            Region::Polygons(polygons) => polygons.0.iter().any(|p| polygon_contains(p, c)),
        }
    }

    /// Planar area in square degrees.
    pub fn area(&self) -> f64 {
        match self {
            Region::Rectangle(rect) => rect.width() * rect.height(),
            Region::Polygons(polygons) => polygons.0.iter().map(polygon_area).sum(),
        }
    }

    /// Exact planar area shared with `rect`, in square degrees.
    pub fn overlap_area(&self, rect: &Rect<f64>) -> f64 {
        match self {
            Region::Rectangle(region) => {
                let width = region.max().x.min(rect.max().x) - region.min().x.max(rect.min().x);
                let height = region.max().y.min(rect.max().y) - region.min().y.max(rect.min().y);
                width.max(0.0) * height.max(0.0)
            }
            Region::Polygons(polygons) => polygons
                .0
                .iter()
                .map(|p| {
                    let holes: f64 = p.interiors().iter().map(|h| shoelace(&clip_ring(h, rect))).sum();
                    (shoelace(&clip_ring(p.exterior(), rect)) - holes).max(0.0)
                })
                .sum(),
        }
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            Region::Rectangle(rect) => Some(*rect),
            Region::Polygons(polygons) => {
                let mut coords = polygons.0.iter().flat_map(|p| p.exterior().0.iter());
                let first = coords.next()?;
                let (min, max) = coords.fold((*first, *first), |(min, max), c| {
                    (
                        coord! { x: min.x.min(c.x), y: min.y.min(c.y) },
                        coord! { x: max.x.max(c.x), y: max.y.max(c.y) },
                    )
                });
                Some(Rect::new(min, max))
            }
        }
    }
}

fn rect_contains(rect: &Rect<f64>, c: Coord<f64>) -> bool {
    c.x >= rect.min().x && c.x <= rect.max().x && c.y >= rect.min().y && c.y <= rect.max().y
}

pub fn rects_intersect(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && b.min().x <= a.max().x && a.min().y <= b.max().y && b.min().y <= a.max().y
}

/// Even-odd ray cast.
fn ring_contains(ring: &LineString<f64>, c: Coord<f64>) -> bool {
    let mut inside = false;
    for line in ring.lines() {
        let (a, b) = (line.start, line.end);
        if (a.y > c.y) != (b.y > c.y) {
            let x_cross = a.x + (c.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if c.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

fn polygon_contains(polygon: &Polygon<f64>, c: Coord<f64>) -> bool {
    ring_contains(polygon.exterior(), c) && !polygon.interiors().iter().any(|h| ring_contains(h, c))
}

fn ring_area(ring: &LineString<f64>) -> f64 {
    ring.lines()
        .map(|l| l.start.x * l.end.y - l.end.x * l.start.y)
        .sum::<f64>()
        .abs()
        / 2.0
}

/// One side of an axis-aligned clip window.
#[derive(Debug, Clone, Copy)]
enum ClipEdge {
    MinX(f64),
    MaxX(f64),
    MinY(f64),
    MaxY(f64),
}

impl ClipEdge {
    fn keeps(self, c: Coord<f64>) -> bool {
        match self {
            ClipEdge::MinX(v) => c.x >= v,
            ClipEdge::MaxX(v) => c.x <= v,
            ClipEdge::MinY(v) => c.y >= v,
            ClipEdge::MaxY(v) => c.y <= v,
        }
    }

    /// Only called for a segment that crosses the edge.
    fn crossing(self, a: Coord<f64>, b: Coord<f64>) -> Coord<f64> {
        match self {
            ClipEdge::MinX(v) | ClipEdge::MaxX(v) => {
                let t = (v - a.x) / (b.x - a.x);
                coord! { x: v, y: a.y + t * (b.y - a.y) }
            }
            ClipEdge::MinY(v) | ClipEdge::MaxY(v) => {
                let t = (v - a.y) / (b.y - a.y);
                coord! { x: a.x + t * (b.x - a.x), y: v }
            }
        }
    }
}

/// Sutherland-Hodgman clip of one ring to `rect`. Concave rings may leave
/// zero-width slivers along the window, which add no area.
fn clip_ring(ring: &LineString<f64>, rect: &Rect<f64>) -> Vec<Coord<f64>> {
    let mut points = ring.0.clone();
    if ring.is_closed() {
        points.pop();
    }
    let edges = [
        ClipEdge::MinX(rect.min().x),
        ClipEdge::MaxX(rect.max().x),
        ClipEdge::MinY(rect.min().y),
        ClipEdge::MaxY(rect.max().y),
    ];
    for edge in edges {
        if points.is_empty() {
            break;
        }
        let mut kept = Vec::with_capacity(points.len() + 4);
        for (i, &current) in points.iter().enumerate() {
            let previous = points[(i + points.len() - 1) % points.len()];
            match (edge.keeps(previous), edge.keeps(current)) {
                (true, true) => kept.push(current),
                (true, false) => kept.push(edge.crossing(previous, current)),
                (false, true) => {
                    kept.push(edge.crossing(previous, current));
                    kept.push(current);
                }
                (false, false) => {}
            }
        }
        points = kept;
    }
    points
}

fn shoelace(points: &[Coord<f64>]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        .abs()
        / 2.0
}

fn polygon_area(polygon: &Polygon<f64>) -> f64 {
    ring_area(polygon.exterior()) - polygon.interiors().iter().map(ring_area).sum::<f64>()
}

/// GeoJSON Polygon / MultiPolygon as it arrives on the wire, rings in `[lon, lat]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeoJsonGeometry {
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<[f64; 2]>>> },
}

impl GeoJsonGeometry {
    pub fn to_multi_polygon(&self) -> Result<MultiPolygon<f64>, ValidationError> {
        let polygons = match self {
            GeoJsonGeometry::Polygon { coordinates } => vec![build_polygon(coordinates)?],
            GeoJsonGeometry::MultiPolygon { coordinates } => coordinates
                .iter()
                .map(|rings| build_polygon(rings))
                .collect::<Result<Vec<_>, _>>()?,
        };
        if polygons.is_empty() {
            return Err(ValidationError::InvalidGeometry(
                "MultiPolygon has no polygons".to_string(),
            ));
        }
        Ok(MultiPolygon(polygons))
    }
}

fn build_polygon(rings: &[Vec<[f64; 2]>]) -> Result<Polygon<f64>, ValidationError> {
    let mut rings = rings.iter().map(|ring| build_ring(ring));
    let exterior = rings
        .next()
        .ok_or_else(|| ValidationError::InvalidGeometry("polygon has no rings".to_string()))??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn build_ring(ring: &[[f64; 2]]) -> Result<LineString<f64>, ValidationError> {
    if ring.len() < 4 {
        return Err(ValidationError::InvalidGeometry(format!(
            "ring needs at least 4 positions, got {}",
            ring.len()
        )));
    }
    if ring.first() != ring.last() {
        return Err(ValidationError::InvalidGeometry("ring is not closed".to_string()));
    }
    for &[lon, lat] in ring {
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Err(ValidationError::InvalidGeometry(format!(
                "position [{lon}, {lat}] is outside lon/lat range"
            )));
        }
    }
    Ok(LineString::from(
        ring.iter().map(|&[x, y]| coord! { x: x, y: y }).collect::<Vec<_>>(),
    ))
}

/// Where to search and what to keep.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGeometry {
    pub query_rectangle: Rect<f64>,
    pub clip: Region,
}

/// Scalar path: without a polygon the clip is the rectangle itself.
pub fn resolve(bbox: &BoundingBox, polygon: Option<&MultiPolygon<f64>>) -> ResolvedGeometry {
    let clip = match polygon {
        Some(p) => Region::Polygons(p.clone()),
        None => Region::Rectangle(bbox.rect()),
    };
    ResolvedGeometry {
        query_rectangle: bbox.rect(),
        clip,
    }
}

/// Render path: widen the search for context, keep the clip unexpanded.
pub fn resolve_for_render(bbox: &BoundingBox, polygon: Option<&MultiPolygon<f64>>) -> ResolvedGeometry {
    match polygon {
        Some(_) => resolve(bbox, polygon),
        None => ResolvedGeometry {
            query_rectangle: bbox.expanded(RENDER_MARGIN_FRACTION).rect(),
            clip: Region::Rectangle(bbox.rect()),
        },
    }
}
