//! graphload - caching-aware graph model loader
//!
//! Loads machine-learning inference graphs (a `model.json` manifest plus
//! binary weight shards) from a remote HTTP location or a local cache,
//! tracking byte-size statistics per model and opportunistically persisting
//! fetched models into the cache for faster subsequent loads.

pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod known;
pub mod loader;
pub mod manifest;
pub mod stats;

pub use config::LoaderConfig;
pub use error::{LoadError, LoadResult};
pub use handler::{FileHandler, HttpHandler, IoHandler, resolve_handler};
pub use loader::{GraphModel, Loader, ModelSource};
pub use manifest::{GraphManifest, ModelArtifacts, WeightSpec, WeightsGroup};
pub use stats::{ModelInfo, ModelStats};
