// src/io/reader.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use geo_types::MultiPolygon;
use rayon::prelude::*;
use serde::Deserialize;

use crate::geometry::GeoJsonGeometry;
use crate::processing::parallel::ParallelEvaluator;
use crate::provider::{ArchiveCollection, LocalArchive};

/// On-disk archive: one or more collections of scenes.
#[derive(Deserialize, Debug)]
pub struct ArchiveFile {
    pub collections: Vec<ArchiveCollection>,
}

/// Parses archive files in parallel and merges them into one provider.
pub fn read_archives_parallel(paths: &[PathBuf]) -> Result<LocalArchive> {
    let files = paths
        .par_iter()
        .map(|path| -> Result<ArchiveFile> {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read archive {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid archive {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut archive = LocalArchive::new(ParallelEvaluator::default());
    for collection in files.into_iter().flat_map(|f| f.collections) {
        archive.add_collection(collection)?;
    }
    Ok(archive)
}

/// Reads a GeoJSON Polygon or MultiPolygon. A Feature wrapping one is accepted too.
pub fn read_geometry(path: &Path) -> Result<MultiPolygon<f64>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum GeometryFile {
        Feature { geometry: GeoJsonGeometry },
        Bare(GeoJsonGeometry),
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read geometry {}", path.display()))?;
    let parsed: GeometryFile = serde_json::from_str(&content)
        .with_context(|| format!("Invalid GeoJSON in {}", path.display()))?;
    let geometry = match parsed {
        GeometryFile::Feature { geometry } | GeometryFile::Bare(geometry) => geometry,
    };
    Ok(geometry.to_multi_polygon()?)
}
