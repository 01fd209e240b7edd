use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PrepError {
    #[error("no coordinate columns found, missing: {}", missing.join(", "))]
    #[diagnostic(help("use one of the pairs lon/lat, lng/lat, x/y or longitude/latitude"))]
    Schema { missing: Vec<String> },

    #[error("unsupported outlet file extension: {0:?} (expected .csv or .geojson)")]
    UnsupportedFormat(String),

    #[error("invalid region code: {0}")]
    #[diagnostic(help("region codes are Pfafstetter level-2 codes such as 11, 42 or 91"))]
    InvalidRegionCode(String),

    #[error("fetch of {url} into {} failed: {message}", destination.display())]
    Fetch {
        url: String,
        destination: PathBuf,
        message: String,
    },

    #[error("archive {} could not be unpacked: {message}", path.display())]
    Archive { path: PathBuf, message: String },

    #[error("feature {index} does not carry a point geometry")]
    NonPointGeometry { index: usize },

    #[error("row {row}: column {column} is not a valid coordinate: {value:?}")]
    InvalidCoordinate {
        row: usize,
        column: String,
        value: String,
    },

    #[error("coordinate reference system error: {0}")]
    Crs(String),

    #[error("failed to read CSV {}: {message}", path.display())]
    Csv { path: PathBuf, message: String },

    #[error("failed to parse GeoJSON {}: {message}", path.display())]
    GeoJson { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}
