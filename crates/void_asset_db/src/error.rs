//! Error types for the asset database

use std::path::PathBuf;

use thiserror::Error;

/// Asset database errors
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("An asset named '{0}' already exists")]
    AlreadyExists(String),

    #[error("Invalid asset name: {0}")]
    InvalidName(String),

    #[error("Invalid metadata in {path:?}: {reason}")]
    Meta { path: PathBuf, reason: String },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[cfg(feature = "file-watcher")]
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AssetError {
    /// Wrap an IO error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a metadata error
    pub fn meta(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Meta {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type AssetResult<T> = Result<T, AssetError>;
