// src/error.rs
use chrono::NaiveDate;
use thiserror::Error;

use crate::catalog::IndexName;
use crate::processing::collection::CollectionError;
use crate::processing::sensor::Sensor;
use crate::provider::ProviderError;

/// Request rejected before any provider call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Unknown index name: {0}")]
    UnknownIndex(String),

    #[error("Cloud tolerance must be within 0..=100, got {0}")]
    CloudToleranceOutOfRange(i64),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Start date {start} is after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Thumbnail dimensions must be within 1..=4096, got {0}")]
    InvalidDimensions(u32),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid month range: {0}")]
    InvalidMonthRange(String),
}

/// Catalog and formula table disagree. Always a code defect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("No formula registered for {index} on {sensor}")]
    MissingFormula { sensor: Sensor, index: IndexName },

    #[error("Quality scheme for {index} on {sensor} does not match the routed cloud policy")]
    QualityMismatch { sensor: Sensor, index: IndexName },
}

/// Every way a query can fail. "No data" is not in here.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Imagery provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Request was cancelled before its result was applied")]
    Cancelled,
}

impl From<CollectionError> for QueryError {
    fn from(e: CollectionError) -> Self {
        match e {
            CollectionError::Registry(e) => QueryError::Registry(e),
            CollectionError::Provider(e) => QueryError::Provider(e),
        }
    }
}
