//! Per-model size bookkeeping
//!
//! Tracks the byte-size statistics the loader records over a model's load
//! life cycle: the expected size from the bundled known-models table, the
//! size the manifest declares, and the size of the weight blob actually
//! materialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Size statistics for one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Short model name (manifest file name without extension)
    pub name: String,
    /// Whether the load was served from the local cache
    pub in_cache: bool,
    /// Expected weight bytes from the known-models table (0 when unknown)
    pub size_desired: u64,
    /// Weight bytes the manifest declares
    pub size_from_manifest: u64,
    /// Weight bytes actually loaded
    pub size_loaded_weights: u64,
    /// When the load was started
    pub loaded_at: DateTime<Utc>,
}

impl ModelInfo {
    pub fn new(name: String, size_desired: u64) -> Self {
        Self {
            name,
            in_cache: false,
            size_desired,
            size_from_manifest: 0,
            size_loaded_weights: 0,
            loaded_at: Utc::now(),
        }
    }
}

/// Process-wide registry of per-model load statistics
#[derive(Clone, Default)]
pub struct ModelStats {
    models: Arc<RwLock<HashMap<String, ModelInfo>>>,
}

impl ModelStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh entry at load start, resetting any previous record
    pub async fn record(&self, name: &str, size_desired: u64) -> ModelInfo {
        let info = ModelInfo::new(name.to_string(), size_desired);
        let mut models = self.models.write().await;
        models.insert(name.to_string(), info.clone());
        info
    }

    pub async fn get(&self, name: &str) -> Option<ModelInfo> {
        let models = self.models.read().await;
        models.get(name).cloned()
    }

    pub async fn set_in_cache(&self, name: &str, in_cache: bool) {
        let mut models = self.models.write().await;
        if let Some(info) = models.get_mut(name) {
            info.in_cache = in_cache;
        }
    }

    pub async fn set_manifest_bytes(&self, name: &str, bytes: u64) {
        let mut models = self.models.write().await;
        if let Some(info) = models.get_mut(name) {
            info.size_from_manifest = bytes;
        }
    }

    pub async fn set_loaded_bytes(&self, name: &str, bytes: u64) {
        let mut models = self.models.write().await;
        if let Some(info) = models.get_mut(name) {
            info.size_loaded_weights = bytes;
        }
    }

    /// All recorded entries, sorted by model name
    pub async fn snapshot(&self) -> Vec<ModelInfo> {
        let models = self.models.read().await;
        let mut entries: Vec<_> = models.values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub async fn count(&self) -> usize {
        let models = self.models.read().await;
        models.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_get() {
        let stats = ModelStats::new();
        stats.record("facemesh", 1_477_958).await;

        let info = stats.get("facemesh").await.unwrap();
        assert_eq!(info.name, "facemesh");
        assert_eq!(info.size_desired, 1_477_958);
        assert_eq!(info.size_from_manifest, 0);
        assert_eq!(info.size_loaded_weights, 0);
        assert!(!info.in_cache);
    }

    #[tokio::test]
    async fn test_record_resets_previous_entry() {
        let stats = ModelStats::new();
        stats.record("facemesh", 100).await;
        stats.set_loaded_bytes("facemesh", 999).await;

        stats.record("facemesh", 100).await;
        let info = stats.get("facemesh").await.unwrap();
        assert_eq!(info.size_loaded_weights, 0);
    }

    #[tokio::test]
    async fn test_life_cycle_updates() {
        let stats = ModelStats::new();
        stats.record("blazeface", 538_928).await;
        stats.set_in_cache("blazeface", true).await;
        stats.set_manifest_bytes("blazeface", 538_000).await;
        stats.set_loaded_bytes("blazeface", 538_928).await;

        let info = stats.get("blazeface").await.unwrap();
        assert!(info.in_cache);
        assert_eq!(info.size_from_manifest, 538_000);
        assert_eq!(info.size_loaded_weights, 538_928);
    }

    #[tokio::test]
    async fn test_updates_to_unknown_model_are_noops() {
        let stats = ModelStats::new();
        stats.set_in_cache("ghost", true).await;
        stats.set_manifest_bytes("ghost", 1).await;
        stats.set_loaded_bytes("ghost", 1).await;
        assert!(stats.get("ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_sorted() {
        let stats = ModelStats::new();
        stats.record("iris", 0).await;
        stats.record("blazeface", 0).await;

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "blazeface");
        assert_eq!(snapshot[1].name, "iris");
    }

    #[tokio::test]
    async fn test_count() {
        let stats = ModelStats::new();
        assert_eq!(stats.count().await, 0);
        stats.record("a", 0).await;
        stats.record("b", 0).await;
        assert_eq!(stats.count().await, 2);
    }

    #[test]
    fn test_model_info_serialize() {
        let info = ModelInfo::new("facemesh".to_string(), 1000);
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("facemesh"));
        assert!(json.contains("size_desired"));
        assert!(json.contains("in_cache"));
    }
}
