//! IO handlers for fetching model artifacts
//!
//! A handler knows how to materialize `ModelArtifacts` from one kind of
//! location. `resolve_handler` picks the handler for a source string the same
//! way the load path decides between remote and local models: `http://` and
//! `https://` go over the network, everything else is a filesystem path.

use crate::error::{LoadError, LoadResult};
use crate::manifest::{GraphManifest, ModelArtifacts};
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Loads model artifacts from a single location
#[async_trait]
pub trait IoHandler: Send + Sync {
    /// Fetch the manifest and all shards it references
    async fn load(&self) -> LoadResult<ModelArtifacts>;

    /// Human-readable location, used in logs and error messages
    fn location(&self) -> String;
}

/// Fetches `model.json` and weight shards over HTTP(S)
pub struct HttpHandler {
    client: Client,
    manifest_url: String,
}

impl HttpHandler {
    pub fn new(manifest_url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                // Default client carries no timeout, so losing it is worth a warning
                tracing::warn!(
                    timeout_secs,
                    error = %e,
                    "failed to build HTTP client with timeout, falling back to default client"
                );
                Client::new()
            });
        Self {
            client,
            manifest_url: manifest_url.into(),
        }
    }

    /// Resolve a shard path relative to the manifest URL
    fn shard_url(&self, shard: &str) -> String {
        match self.manifest_url.rsplit_once('/') {
            Some((base, _)) => format!("{}/{}", base, shard),
            None => shard.to_string(),
        }
    }

    async fn fetch(&self, url: &str) -> LoadResult<Vec<u8>> {
        tracing::debug!(url = %url, "fetching");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LoadError::Http {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let bytes = response.bytes().await.map_err(|e| LoadError::Http {
            url: url.to_string(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl IoHandler for HttpHandler {
    async fn load(&self) -> LoadResult<ModelArtifacts> {
        let manifest_bytes = self.fetch(&self.manifest_url).await?;
        let manifest = GraphManifest::from_slice(&manifest_bytes, &self.manifest_url)?;

        let mut weight_data = Vec::new();
        for shard in manifest.shard_paths() {
            let url = self.shard_url(shard);
            let bytes = self.fetch(&url).await?;
            weight_data.extend_from_slice(&bytes);
        }

        Ok(ModelArtifacts {
            manifest,
            weight_data,
        })
    }

    fn location(&self) -> String {
        self.manifest_url.clone()
    }
}

/// Reads `model.json` and weight shards from the local filesystem
///
/// Serves both plain filesystem loads and cache hits (a cached model is just
/// a directory holding its manifest and consolidated shard).
pub struct FileHandler {
    manifest_path: PathBuf,
}

impl FileHandler {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
        }
    }

    async fn read(&self, path: &Path) -> LoadResult<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[async_trait]
impl IoHandler for FileHandler {
    async fn load(&self) -> LoadResult<ModelArtifacts> {
        let manifest_bytes = self.read(&self.manifest_path).await?;
        let manifest =
            GraphManifest::from_slice(&manifest_bytes, &self.manifest_path.to_string_lossy())?;

        let base = self
            .manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut weight_data = Vec::new();
        for shard in manifest.shard_paths() {
            let bytes = self.read(&base.join(shard)).await?;
            weight_data.extend_from_slice(&bytes);
        }

        Ok(ModelArtifacts {
            manifest,
            weight_data,
        })
    }

    fn location(&self) -> String {
        self.manifest_path.to_string_lossy().into_owned()
    }
}

/// Pick the IO handler for a model source
pub fn resolve_handler(source: &str, timeout_secs: u64) -> Box<dyn IoHandler> {
    let lower = source.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Box::new(HttpHandler::new(source, timeout_secs))
    } else {
        Box::new(FileHandler::new(source))
    }
}
