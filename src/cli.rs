// src/cli.rs
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "index-calc")]
#[command(about = "Spectral index queries with sensor-aware routing")]
#[command(version = crate::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Local archive JSON files; without them the remote provider is used
    #[arg(long, global = true, num_args = 1..)]
    pub archive: Vec<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Filters shared by every query command.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Index name, e.g. NDVI
    #[arg(short, long)]
    pub index: String,

    /// Cloud tolerance, 0-100
    #[arg(short, long, default_value = "20")]
    pub cloud: i64,
}

#[derive(Args, Debug, Clone)]
pub struct DateArgs {
    /// First day, YYYY-MM-DD
    #[arg(long)]
    pub start: String,

    /// Last day (inclusive), YYYY-MM-DD
    #[arg(long)]
    pub end: String,
}

#[derive(Args, Debug, Clone)]
pub struct AreaArgs {
    /// minLon,minLat,maxLon,maxLat
    #[arg(long, required = true, value_delimiter = ',', allow_hyphen_values = true)]
    pub bbox: Vec<f64>,

    /// GeoJSON Polygon/MultiPolygon clip
    #[arg(long)]
    pub geometry: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mean index around a point (±0.01°)
    Point {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        #[command(flatten)]
        dates: DateArgs,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Mean index over a bounding box, optionally clipped to a polygon
    Area {
        #[command(flatten)]
        area: AreaArgs,

        #[command(flatten)]
        dates: DateArgs,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Mean index over one calendar month
    Month {
        #[arg(long)]
        year: i32,

        #[arg(long)]
        month: u32,

        #[command(flatten)]
        area: AreaArgs,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// One value per month, fetched concurrently
    Series {
        /// First month, YYYY-MM
        #[arg(long)]
        from: String,

        /// Last month, YYYY-MM
        #[arg(long)]
        to: String,

        #[command(flatten)]
        area: AreaArgs,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Tile URL template, or a thumbnail URL with --thumbnail
    Render {
        #[command(flatten)]
        area: AreaArgs,

        #[command(flatten)]
        dates: DateArgs,

        #[command(flatten)]
        query: QueryArgs,

        #[arg(long)]
        thumbnail: bool,

        /// Thumbnail size in pixels (defaults to the config value)
        #[arg(long)]
        dimensions: Option<u32>,
    },

    /// Process requests from a JSON batch file
    Batch {
        /// Path to JSON batch file
        #[arg(short, long)]
        file: PathBuf,

        /// Write responses here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
