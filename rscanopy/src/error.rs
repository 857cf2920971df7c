//! Error types for rscanopy

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for rscanopy operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("point cloud dataset not found: {}", path.display())]
    DatasetNotFound { path: PathBuf },

    #[error("unsupported point cloud format: {0}")]
    UnsupportedFormat(String),

    #[error("rasters are not aligned: {0}")]
    RasterAlignment(String),

    #[error("table name '{name}' does not follow the '<prefix>_<year>_trees' convention")]
    NameFormat { name: String },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("artifact '{0}' already exists and overwrite is disabled")]
    ArtifactExists(String),

    #[error("artifact '{0}' not found in workspace")]
    ArtifactNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("GeoTIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("LAS error: {0}")]
    #[cfg(feature = "las")]
    Las(#[from] las::Error),
}

impl Error {
    pub(crate) fn invalid(name: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for rscanopy operations
pub type Result<T> = std::result::Result<T, Error>;
