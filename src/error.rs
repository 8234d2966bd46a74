//! Error types for model loading

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while resolving, fetching, or caching a model
#[derive(Debug, Error)]
pub enum LoadError {
    /// Transport-level HTTP failure (connect, timeout, body read)
    #[error("failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("unexpected status {status} fetching {url}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    /// Filesystem failure while reading or writing model files
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest was fetched but is not a valid graph model manifest
    #[error("invalid model manifest at {location}: {reason}")]
    Manifest { location: String, reason: String },

    /// Loaded weight blob is smaller than the manifest declares
    #[error(
        "truncated weights for {name}: manifest declares {declared} bytes, loaded {loaded} bytes"
    )]
    TruncatedWeights {
        name: String,
        declared: u64,
        loaded: u64,
    },

    /// Cache bookkeeping failure (invalid name, unwritable root)
    #[error("cache error: {0}")]
    Cache(String),
}

/// Result alias used throughout the crate
pub type LoadResult<T> = Result<T, LoadError>;
