//! Caching-aware load orchestration
//!
//! The load sequence: resolve the manifest URL, check the local cache, pick
//! an IO handler for whichever source wins, materialize the artifacts while
//! recording size statistics, then opportunistically persist remote loads
//! into the cache. Cache failures degrade to remote-only loading, they never
//! fail a load that otherwise succeeded.

use crate::cache;
use crate::config::LoaderConfig;
use crate::error::{LoadError, LoadResult};
use crate::handler::{FileHandler, IoHandler, resolve_handler};
use crate::known;
use crate::manifest::ModelArtifacts;
use crate::stats::ModelStats;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Where a loaded model was served from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Served from the local cache
    Cache { path: PathBuf },
    /// Fetched over HTTP(S)
    Remote { url: String },
    /// Read from a plain filesystem path outside the cache
    File { path: PathBuf },
}

/// A loaded graph model
#[derive(Debug, Clone)]
pub struct GraphModel {
    /// Short model name (manifest file name without extension)
    pub name: String,
    pub source: ModelSource,
    pub artifacts: ModelArtifacts,
}

/// Caching-aware model loader
pub struct Loader {
    config: LoaderConfig,
    stats: ModelStats,
    /// Flipped off for the process when the cache root proves unusable
    cache_supported: AtomicBool,
    /// Per-model locks serializing concurrent loads of the same name
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            stats: ModelStats::new(),
            cache_supported: AtomicBool::new(true),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Per-model load statistics registry
    pub fn stats(&self) -> &ModelStats {
        &self.stats
    }

    /// Cache root this loader reads and writes
    pub fn cache_root(&self) -> PathBuf {
        self.config
            .cache_dir
            .clone()
            .unwrap_or_else(cache::resolve_cache_dir)
    }

    async fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop a per-name lock entry once no load holds it any more
    ///
    /// Keeps the lock map from growing with every distinct model name a
    /// long-lived process ever loads.
    async fn prune_name_lock(&self, name: &str) {
        let mut locks = self.locks.lock().await;
        let unused = locks
            .get(name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if unused {
            locks.remove(name);
        }
    }

    /// Load a model, serving from cache when possible
    ///
    /// `model_path` is joined with the configured base path; a `.json`
    /// extension is appended when missing. Concurrent loads of the same model
    /// are serialized so the fetch and cache save happen once.
    pub async fn load(&self, model_path: &str) -> LoadResult<GraphModel> {
        let model_url = resolve_model_url(&self.config.model_base_path, model_path);
        let name = short_model_name(&model_url);

        let lock = self.name_lock(&name).await;
        let result = {
            let _guard = lock.lock().await;
            self.load_serialized(&name, &model_url).await
        };
        drop(lock);
        self.prune_name_lock(&name).await;
        result
    }

    /// The load sequence proper, entered holding the per-name lock
    async fn load_serialized(&self, name: &str, model_url: &str) -> LoadResult<GraphModel> {
        self.stats.record(name, known::desired_size(name)).await;

        let root = self.cache_root();
        let caching = self.config.cache_models && self.cache_supported.load(Ordering::Relaxed);

        let mut cached_models = Vec::new();
        if caching {
            match cache::ensure_root(&root) {
                Ok(()) => cached_models = cache::list_cached(&root),
                Err(e) => {
                    // Same degradation as the original: an unusable store
                    // disables caching for the process, loads continue remote
                    tracing::warn!(root = ?root, error = %e, "model cache unusable, disabling caching");
                    self.cache_supported.store(false, Ordering::Relaxed);
                }
            }
        }
        let caching = self.config.cache_models && self.cache_supported.load(Ordering::Relaxed);

        let in_cache = caching && cached_models.iter().any(|m| m.as_str() == name);
        self.stats.set_in_cache(name, in_cache).await;

        let (handler, source): (Box<dyn IoHandler>, ModelSource) = if in_cache {
            let path = root.join(name);
            (
                Box::new(FileHandler::new(path.join(cache::MANIFEST_FILE))),
                ModelSource::Cache { path },
            )
        } else {
            let handler = resolve_handler(model_url, self.config.fetch_timeout_secs);
            let lower = model_url.to_ascii_lowercase();
            let source = if lower.starts_with("http://") || lower.starts_with("https://") {
                ModelSource::Remote {
                    url: model_url.to_string(),
                }
            } else {
                ModelSource::File {
                    path: PathBuf::from(model_url),
                }
            };
            (handler, source)
        };

        tracing::debug!(model = %name, location = %handler.location(), "loading model");

        let artifacts = handler.load().await?;

        let declared = artifacts.manifest.declared_weight_bytes();
        let loaded = artifacts.weight_bytes();
        self.stats.set_manifest_bytes(name, declared).await;
        self.stats.set_loaded_bytes(name, loaded).await;

        if loaded < declared {
            return Err(LoadError::TruncatedWeights {
                name: name.to_string(),
                declared,
                loaded,
            });
        }
        if loaded > declared {
            // Shards may carry alignment padding beyond the declared tensors
            tracing::debug!(model = %name, declared, loaded, "weight blob larger than manifest declares");
        }

        tracing::info!(
            model = %name,
            bytes = loaded,
            in_cache,
            location = %handler.location(),
            "model loaded"
        );

        if caching && !in_cache {
            self.save_to_cache(&root, name, &artifacts).await;
        }
        if in_cache {
            cache::touch_last_used(&root, name);
        }

        Ok(GraphModel {
            name: name.to_string(),
            source,
            artifacts,
        })
    }

    /// Persist a freshly fetched model; failures are logged and swallowed
    async fn save_to_cache(&self, root: &std::path::Path, name: &str, artifacts: &ModelArtifacts) {
        match cache::save_model(root, name, artifacts).await {
            Ok(result) => {
                tracing::info!(
                    model = %name,
                    path = ?result.path,
                    weight_bytes = result.weight_bytes,
                    "model saved to cache"
                );
                if let Some(quota) = self.config.cache_quota_bytes {
                    let evicted = cache::enforce_quota(root, quota, name);
                    if !evicted.is_empty() {
                        tracing::info!(quota, evicted = ?evicted, "evicted models over cache quota");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(model = %name, error = %e, "failed to save model to cache");
            }
        }
    }
}

/// Join the base path with a model path and ensure a `.json` extension
pub fn resolve_model_url(base_path: &str, model_path: &str) -> String {
    let mut url = if base_path.is_empty() {
        model_path.to_string()
    } else if model_path.is_empty() {
        base_path.to_string()
    } else {
        format!(
            "{}/{}",
            base_path.trim_end_matches('/'),
            model_path.trim_start_matches('/')
        )
    };

    if !url.to_ascii_lowercase().ends_with(".json") {
        url.push_str(".json");
    }
    url
}

/// Derive the short model name from a manifest URL or path
///
/// Final path segment (either separator style) with the `.json` suffix
/// stripped.
pub fn short_model_name(model_url: &str) -> String {
    let segment = if model_url.contains('/') {
        model_url.rsplit('/').next().unwrap_or(model_url)
    } else {
        model_url.rsplit('\\').next().unwrap_or(model_url)
    };

    let lower = segment.to_ascii_lowercase();
    if lower.ends_with(".json") {
        segment[..segment.len() - ".json".len()].to_string()
    } else {
        segment.to_string()
    }
}
