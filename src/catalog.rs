// src/catalog.rs
//! Registry of index names and the shared visualization scheme.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Spectral indices this crate knows how to compute on every sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexName {
    #[serde(rename = "NDVI")]
    Ndvi,
    #[serde(rename = "GNDVI")]
    Gndvi,
    #[serde(rename = "NDWI")]
    Ndwi,
    #[serde(rename = "NDMI")]
    Ndmi,
    #[serde(rename = "NBR")]
    Nbr,
    #[serde(rename = "EVI")]
    Evi,
    #[serde(rename = "SAVI")]
    Savi,
    #[serde(rename = "MSAVI")]
    Msavi,
    #[serde(rename = "OSAVI")]
    Osavi,
}

impl IndexName {
    pub const ALL: [IndexName; 9] = [
        IndexName::Ndvi,
        IndexName::Gndvi,
        IndexName::Ndwi,
        IndexName::Ndmi,
        IndexName::Nbr,
        IndexName::Evi,
        IndexName::Savi,
        IndexName::Msavi,
        IndexName::Osavi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IndexName::Ndvi => "NDVI",
            IndexName::Gndvi => "GNDVI",
            IndexName::Ndwi => "NDWI",
            IndexName::Ndmi => "NDMI",
            IndexName::Nbr => "NBR",
            IndexName::Evi => "EVI",
            IndexName::Savi => "SAVI",
            IndexName::Msavi => "MSAVI",
            IndexName::Osavi => "OSAVI",
        }
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact, case-sensitive match against the catalog.
impl FromStr for IndexName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndexName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownIndex(s.to_string()))
    }
}

pub fn is_valid_index(name: &str) -> bool {
    name.parse::<IndexName>().is_ok()
}

/// Value range and color ramp used to render an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    pub min: f64,
    pub max: f64,
    pub palette: Vec<String>,
}

const SHARED_MIN: f64 = -0.2;
const SHARED_MAX: f64 = 0.8;
const SHARED_PALETTE: [&str; 7] = [
    "8c510a", "d8b365", "f6e8c3", "f5f5f5", "c7eae5", "5ab4ac", "01665e",
];

/// Every index renders with the same stretch today.
pub fn visualization(_name: IndexName) -> Visualization {
    Visualization {
        min: SHARED_MIN,
        max: SHARED_MAX,
        palette: SHARED_PALETTE.iter().map(|c| c.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_nine_unique_names() {
        let mut names: Vec<_> = IndexName::ALL.iter().map(|n| n.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 9);
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!(is_valid_index("NDVI"));
        assert!(!is_valid_index("ndvi"));
        assert!(!is_valid_index("NOT_REAL"));
        assert_eq!(
            "ndvi".parse::<IndexName>(),
            Err(ValidationError::UnknownIndex("ndvi".to_string()))
        );
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for name in IndexName::ALL {
            assert_eq!(name.to_string().parse::<IndexName>(), Ok(name));
        }
    }

    #[test]
    fn test_serde_uses_catalog_spelling() {
        let json = serde_json::to_string(&IndexName::Msavi).unwrap();
        assert_eq!(json, "\"MSAVI\"");
    }

    #[test]
    fn test_visualization_is_shared() {
        let ndvi = visualization(IndexName::Ndvi);
        assert!(ndvi.min < ndvi.max);
        assert!(!ndvi.palette.is_empty());
        assert_eq!(ndvi, visualization(IndexName::Nbr));
    }
}
