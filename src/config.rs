//! Configuration structures and loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Loader configuration
///
/// Layered file → environment → CLI, in increasing precedence.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Persist remotely fetched models into the local cache
    pub cache_models: bool,

    /// Base URL or directory prefix joined with model paths
    pub model_base_path: String,

    /// Cache root override; defaults to the standard cache directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Evict least-recently-used models when the cache exceeds this size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_quota_bytes: Option<u64>,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_models: true,
            model_base_path: String::new(),
            cache_dir: None,
            cache_quota_bytes: None,
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl LoaderConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(base_path) = std::env::var("GRAPHLOAD_BASE_PATH") {
            config.model_base_path = base_path;
        }
        if let Ok(cache_dir) = std::env::var("GRAPHLOAD_CACHE_DIR") {
            config.cache_dir = Some(PathBuf::from(cache_dir));
        }
        if let Ok(quota) = std::env::var("GRAPHLOAD_CACHE_QUOTA_BYTES") {
            config.cache_quota_bytes = Some(
                quota
                    .parse()
                    .context("Invalid GRAPHLOAD_CACHE_QUOTA_BYTES value")?,
            );
        }
        if let Ok(no_cache) = std::env::var("GRAPHLOAD_NO_CACHE") {
            config.cache_models = !matches!(no_cache.as_str(), "1" | "true" | "yes");
        }
        if let Ok(timeout) = std::env::var("GRAPHLOAD_FETCH_TIMEOUT") {
            config.fetch_timeout_secs = timeout
                .parse()
                .context("Invalid GRAPHLOAD_FETCH_TIMEOUT value")?;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("fetch_timeout_secs must be > 0");
        }

        if self.cache_quota_bytes == Some(0) {
            anyhow::bail!("cache_quota_bytes must be > 0 when set (unset disables the quota)");
        }

        Ok(())
    }
}

fn default_fetch_timeout() -> u64 {
    120
}
