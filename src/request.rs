// src/request.rs
//! Request and result shapes, and the JSON wire contract around them.

use std::fmt;

use chrono::{Datelike, Months, NaiveDate};
use geo_types::MultiPolygon;
use serde::{Deserialize, Serialize};

use crate::catalog::IndexName;
use crate::error::{QueryError, ValidationError};
use crate::geometry::{BoundingBox, GeoJsonGeometry, LatLng};

pub const DEFAULT_THUMBNAIL_DIMENSIONS: u32 = 1024;
const MAX_THUMBNAIL_DIMENSIONS: u32 = 4096;

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, ValidationError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Upper bound for the provider's date filter, which excludes it.
    pub fn end_exclusive(&self) -> NaiveDate {
        self.end.succ_opt().unwrap_or(NaiveDate::MAX)
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(value.to_string()))
}

/// A calendar month, the unit of time-series expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    first_day: NaiveDate,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, ValidationError> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|first_day| Self { first_day })
            .ok_or_else(|| ValidationError::InvalidMonthRange(format!("{year}-{month:02}")))
    }

    /// Parses `YYYY-MM`.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidMonthRange(value.to_string());
        let (year, month) = value.split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    pub fn next(&self) -> Self {
        Self {
            first_day: self.first_day + Months::new(1),
        }
    }

    pub fn date_range(&self) -> DateRange {
        let last_day = self.next().first_day.pred_opt().unwrap_or(self.first_day);
        DateRange {
            start: self.first_day,
            end: last_day,
        }
    }

    /// Every month from `first` to `last`, inclusive.
    pub fn span(first: YearMonth, last: YearMonth) -> Result<Vec<YearMonth>, ValidationError> {
        if first > last {
            return Err(ValidationError::InvalidMonthRange(format!("{first} is after {last}")));
        }
        let mut months = vec![first];
        while let Some(&current) = months.last() {
            if current >= last {
                break;
            }
            months.push(current.next());
        }
        Ok(months)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl Serialize for YearMonth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Caller cloud tolerance, 0..=100. Meaning depends on the routed sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloudTolerance(u8);

impl CloudTolerance {
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .map(Self)
            .ok_or(ValidationError::CloudToleranceOutOfRange(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for CloudTolerance {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(i64::from(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderHint {
    Scalar,
    Tile,
    Thumbnail { dimensions: u32 },
}

impl RenderHint {
    pub fn thumbnail(dimensions: u32) -> Result<Self, ValidationError> {
        if dimensions == 0 || dimensions > MAX_THUMBNAIL_DIMENSIONS {
            return Err(ValidationError::InvalidDimensions(dimensions));
        }
        Ok(RenderHint::Thumbnail { dimensions })
    }
}

/// Where to compute.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialRequest {
    /// Point query, buffered into a small square.
    Point(LatLng),
    /// Bounding box, optionally clipped to a polygon.
    Area {
        bbox: BoundingBox,
        polygon: Option<MultiPolygon<f64>>,
    },
}

impl SpatialRequest {
    pub fn area(bbox: BoundingBox) -> Self {
        SpatialRequest::Area { bbox, polygon: None }
    }

    pub fn clipped(bbox: BoundingBox, polygon: MultiPolygon<f64>) -> Self {
        SpatialRequest::Area {
            bbox,
            polygon: Some(polygon),
        }
    }
}

/// One fully described, validated query.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRequest {
    pub spatial: SpatialRequest,
    pub date_range: DateRange,
    pub cloud_tolerance: CloudTolerance,
    pub index: IndexName,
    pub render: RenderHint,
}

/// Outcome of a successful request. `None` means no data.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexResult {
    Value(Option<f64>),
    Url(Option<String>),
}

impl IndexResult {
    pub fn is_no_data(&self) -> bool {
        matches!(self, IndexResult::Value(None) | IndexResult::Url(None))
    }
}

/// JSON request as callers send it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest {
    /// `[minLon, minLat, maxLon, maxLat]`
    pub bbox: Option<[f64; 4]>,
    /// `[lat, lon]`
    pub point: Option<[f64; 2]>,
    pub geometry: Option<GeoJsonGeometry>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub cloud_tolerance: Option<i64>,
    pub index: Option<String>,
    #[serde(default)]
    pub mode: WireMode,
    pub dimensions: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireMode {
    #[default]
    Scalar,
    Tile,
    Thumbnail,
}

impl TryFrom<WireRequest> for IndexRequest {
    type Error = ValidationError;

    fn try_from(wire: WireRequest) -> Result<Self, Self::Error> {
        wire.into_request(DEFAULT_THUMBNAIL_DIMENSIONS)
    }
}

impl WireRequest {
    /// Validates the request; thumbnails without `dimensions` get `default_dimensions`.
    pub fn into_request(self, default_dimensions: u32) -> Result<IndexRequest, ValidationError> {
        let index = self
            .index
            .as_deref()
            .ok_or(ValidationError::MissingField("index"))?
            .parse::<IndexName>()?;

        let cloud_tolerance = CloudTolerance::new(
            self.cloud_tolerance
                .ok_or(ValidationError::MissingField("cloudTolerance"))?,
        )?;

        let start = self
            .start_date
            .as_deref()
            .ok_or(ValidationError::MissingField("startDate"))?;
        let end = self
            .end_date
            .as_deref()
            .ok_or(ValidationError::MissingField("endDate"))?;
        let date_range = DateRange::parse(start, end)?;

        let spatial = match (self.point, self.bbox) {
            (Some([lat, lng]), None) if self.geometry.is_none() => {
                SpatialRequest::Point(LatLng::new(lat, lng)?)
            }
            (Some(_), _) => {
                return Err(ValidationError::InvalidGeometry(
                    "point cannot be combined with bbox or geometry".to_string(),
                ))
            }
            (None, Some(bbox)) => SpatialRequest::Area {
                bbox: BoundingBox::from_wire(bbox)?,
                polygon: self
                    .geometry
                    .as_ref()
                    .map(GeoJsonGeometry::to_multi_polygon)
                    .transpose()?,
            },
            (None, None) => return Err(ValidationError::MissingField("bbox")),
        };

        let render = match self.mode {
            WireMode::Scalar => RenderHint::Scalar,
            WireMode::Tile => RenderHint::Tile,
            WireMode::Thumbnail => {
                RenderHint::thumbnail(self.dimensions.unwrap_or(default_dimensions))?
            }
        };

        Ok(IndexRequest {
            spatial,
            date_range,
            cloud_tolerance,
            index,
            render,
        })
    }
}

/// JSON response: exactly one of `value`, `url` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexResponse {
    Value { value: Option<f64> },
    Url { url: Option<String> },
    Error { error: String },
}

impl From<Result<IndexResult, QueryError>> for IndexResponse {
    fn from(outcome: Result<IndexResult, QueryError>) -> Self {
        match outcome {
            Ok(IndexResult::Value(value)) => IndexResponse::Value { value },
            Ok(IndexResult::Url(url)) => IndexResponse::Url { url },
            Err(e) => IndexResponse::Error {
                error: e.to_string(),
            },
        }
    }
}

impl From<ValidationError> for IndexResponse {
    fn from(e: ValidationError) -> Self {
        IndexResponse::Error {
            error: e.to_string(),
        }
    }
}
