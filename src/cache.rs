//! Local model cache
//!
//! Filesystem stand-in for the browser model store the original loader used.
//! Cache structure:
//! ```text
//! ~/.cache/graphload/models/
//! ├── facemesh/
//! │   ├── model.json
//! │   ├── model.weights.bin
//! │   └── .last-used
//! └── blazeface/
//!     └── ...
//! ```
//! Each model directory holds the manifest plus one consolidated weight
//! shard; `.last-used` carries the last cache-hit timestamp for quota
//! eviction ordering.

use crate::error::{LoadError, LoadResult};
use crate::manifest::{ModelArtifacts, WeightSpec, WeightsGroup};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Manifest file name inside a cached model directory
pub const MANIFEST_FILE: &str = "model.json";

/// Consolidated weight shard written on save
pub const WEIGHTS_FILE: &str = "model.weights.bin";

/// Last-use marker, written on every cache hit
const LAST_USED_FILE: &str = ".last-used";

/// Resolve the cache root directory
///
/// Checks in order:
/// 1. `$GRAPHLOAD_CACHE_DIR`
/// 2. `$XDG_CACHE_HOME/graphload/models`
/// 3. `~/.cache/graphload/models`
pub fn resolve_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("GRAPHLOAD_CACHE_DIR") {
        return PathBuf::from(dir);
    }

    if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
        return PathBuf::from(xdg_cache).join("graphload/models");
    }

    dirs::home_dir()
        .map(|h| h.join(".cache/graphload/models"))
        .unwrap_or_else(|| PathBuf::from("/tmp/graphload/models"))
}

/// Validate a model short name for use as a cache directory name
fn validate_name(name: &str) -> LoadResult<()> {
    if name.is_empty() {
        return Err(LoadError::Cache("model name cannot be empty".to_string()));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(LoadError::Cache(format!(
            "model name '{}' cannot contain path separators",
            name
        )));
    }
    Ok(())
}

/// Check whether the cache root exists and is writable
///
/// A root that cannot be created or written disables caching for the process
/// rather than failing loads.
pub fn ensure_root(root: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(root)?;
    let probe = root.join(".probe");
    std::fs::write(&probe, b"")?;
    std::fs::remove_file(&probe)
}

/// Check if a model is cached (directory with a manifest)
pub fn is_cached(root: &Path, name: &str) -> bool {
    validate_name(name).is_ok() && root.join(name).join(MANIFEST_FILE).exists()
}

/// Path to a model's cache directory, if cached
pub fn model_cache_path(root: &Path, name: &str) -> Option<PathBuf> {
    let path = root.join(name);
    if is_cached(root, name) { Some(path) } else { None }
}

/// List all validly cached models, sorted by name
pub fn list_cached(root: &Path) -> Vec<String> {
    if !root.exists() {
        return Vec::new();
    }

    let mut models = Vec::new();

    if let Ok(entries) = std::fs::read_dir(root) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();

            // Skip in-progress saves and markers
            if name.starts_with('.') {
                continue;
            }

            if is_cached(root, &name) {
                models.push(name);
            }
        }
    }

    models.sort();
    models
}

/// Total size of a cached model in bytes
pub fn cached_size(root: &Path, name: &str) -> Option<u64> {
    let model_dir = model_cache_path(root, name)?;
    Some(dir_size(&model_dir))
}

/// Recursively calculate directory size
pub fn dir_size(path: &Path) -> u64 {
    let mut size = 0;

    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                size += dir_size(&path);
            } else if let Ok(metadata) = std::fs::metadata(&path) {
                size += metadata.len();
            }
        }
    }

    size
}

/// Total size of the whole cache in bytes
pub fn total_size(root: &Path) -> u64 {
    list_cached(root)
        .iter()
        .filter_map(|name| cached_size(root, name))
        .sum()
}

/// Record a cache hit for quota eviction ordering
pub fn touch_last_used(root: &Path, name: &str) {
    let marker = root.join(name).join(LAST_USED_FILE);
    let stamp = chrono::Utc::now().to_rfc3339();
    if let Err(e) = std::fs::write(&marker, stamp) {
        tracing::debug!(model = %name, error = %e, "failed to write last-used marker");
    }
}

/// When the model was last served from cache
///
/// Falls back to the directory mtime for models saved before their first hit.
fn last_used(root: &Path, name: &str) -> SystemTime {
    let model_dir = root.join(name);
    let marker = model_dir.join(LAST_USED_FILE);
    std::fs::metadata(&marker)
        .or_else(|_| std::fs::metadata(&model_dir))
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Outcome of persisting a model into the cache
#[derive(Debug, Clone)]
pub struct SaveResult {
    pub path: PathBuf,
    pub manifest_bytes: u64,
    pub weight_bytes: u64,
}

/// Persist model artifacts into the cache
///
/// The weight blob is written as a single consolidated shard and the saved
/// manifest's shard paths are rewritten to reference it. Writes land in a
/// temp directory first and are renamed into place, so a crashed save never
/// leaves a half-cached model behind.
pub async fn save_model(
    root: &Path,
    name: &str,
    artifacts: &ModelArtifacts,
) -> LoadResult<SaveResult> {
    validate_name(name)?;

    let mut manifest = artifacts.manifest.clone();
    let weights: Vec<WeightSpec> = manifest
        .weights_manifest
        .iter()
        .flat_map(|group| group.weights.iter().cloned())
        .collect();
    manifest.weights_manifest = vec![WeightsGroup {
        paths: vec![WEIGHTS_FILE.to_string()],
        weights,
    }];

    let manifest_json = serde_json::to_vec_pretty(&manifest).map_err(|e| LoadError::Manifest {
        location: name.to_string(),
        reason: e.to_string(),
    })?;

    let tmp_dir = root.join(format!(".tmp-{}-{}", name, std::process::id()));
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| LoadError::Io { path, source }
    };

    tokio::fs::create_dir_all(&tmp_dir)
        .await
        .map_err(io_err(&tmp_dir))?;

    let manifest_path = tmp_dir.join(MANIFEST_FILE);
    tokio::fs::write(&manifest_path, &manifest_json)
        .await
        .map_err(io_err(&manifest_path))?;

    let weights_path = tmp_dir.join(WEIGHTS_FILE);
    tokio::fs::write(&weights_path, &artifacts.weight_data)
        .await
        .map_err(io_err(&weights_path))?;

    let final_dir = root.join(name);
    if final_dir.exists() {
        tokio::fs::remove_dir_all(&final_dir)
            .await
            .map_err(io_err(&final_dir))?;
    }

    if let Err(source) = tokio::fs::rename(&tmp_dir, &final_dir).await {
        let _ = tokio::fs::remove_dir_all(&tmp_dir).await;
        return Err(LoadError::Io {
            path: final_dir,
            source,
        });
    }

    Ok(SaveResult {
        path: final_dir,
        manifest_bytes: manifest_json.len() as u64,
        weight_bytes: artifacts.weight_bytes(),
    })
}

/// Remove a cached model
pub fn evict(root: &Path, name: &str) -> LoadResult<()> {
    validate_name(name)?;
    let model_dir = root.join(name);
    if !model_dir.exists() {
        return Ok(());
    }
    std::fs::remove_dir_all(&model_dir).map_err(|source| LoadError::Io {
        path: model_dir,
        source,
    })
}

/// Remove all cached models, returning the evicted names
pub fn evict_all(root: &Path) -> LoadResult<Vec<String>> {
    let names = list_cached(root);
    for name in &names {
        evict(root, name)?;
    }
    Ok(names)
}

/// Evict least-recently-used models until the cache fits `max_bytes`
///
/// `keep` is never evicted, even when the cache stays over quota. Returns the
/// evicted names.
pub fn enforce_quota(root: &Path, max_bytes: u64, keep: &str) -> Vec<String> {
    let mut entries: Vec<(String, u64, SystemTime)> = list_cached(root)
        .into_iter()
        .map(|name| {
            let size = cached_size(root, &name).unwrap_or(0);
            let used = last_used(root, &name);
            (name, size, used)
        })
        .collect();

    let mut total: u64 = entries.iter().map(|(_, size, _)| size).sum();
    entries.sort_by_key(|(_, _, used)| *used);

    let mut evicted = Vec::new();
    for (name, size, _) in entries {
        if total <= max_bytes {
            break;
        }
        if name == keep {
            continue;
        }
        match evict(root, &name) {
            Ok(()) => {
                total = total.saturating_sub(size);
                evicted.push(name);
            }
            Err(e) => {
                tracing::warn!(model = %name, error = %e, "failed to evict model for quota");
            }
        }
    }

    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::GraphManifest;
    use serial_test::serial;

    fn sample_artifacts() -> ModelArtifacts {
        let manifest = GraphManifest::from_slice(
            br#"{
                "format": "graph-model",
                "weightsManifest": [
                    {
                        "paths": ["a.bin", "b.bin"],
                        "weights": [{"name": "w", "shape": [4], "dtype": "float32"}]
                    }
                ]
            }"#,
            "test",
        )
        .unwrap();
        ModelArtifacts {
            manifest,
            weight_data: vec![7u8; 16],
        }
    }

    #[test]
    #[serial]
    fn test_resolve_cache_dir_env_override() {
        unsafe {
            std::env::set_var("GRAPHLOAD_CACHE_DIR", "/custom/cache");
        }
        assert_eq!(resolve_cache_dir(), PathBuf::from("/custom/cache"));
        unsafe {
            std::env::remove_var("GRAPHLOAD_CACHE_DIR");
        }
    }

    #[test]
    #[serial]
    fn test_resolve_cache_dir_default() {
        unsafe {
            std::env::remove_var("GRAPHLOAD_CACHE_DIR");
            std::env::remove_var("XDG_CACHE_HOME");
        }
        let dir = resolve_cache_dir();
        assert!(dir.to_string_lossy().contains("graphload/models"));
    }

    #[test]
    fn test_validate_name_rejects_separators() {
        assert!(validate_name("facemesh").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("..").is_err());
    }

    #[test]
    fn test_is_cached_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_cached(dir.path(), "nonexistent-model"));
        assert!(model_cache_path(dir.path(), "nonexistent-model").is_none());
    }

    #[test]
    fn test_list_cached_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_cached(&dir.path().join("missing")).is_empty());
    }

    #[tokio::test]
    async fn test_save_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = sample_artifacts();

        let result = save_model(dir.path(), "facemesh", &artifacts).await.unwrap();
        assert_eq!(result.weight_bytes, 16);
        assert!(result.path.join(MANIFEST_FILE).exists());
        assert!(result.path.join(WEIGHTS_FILE).exists());

        assert!(is_cached(dir.path(), "facemesh"));
        assert_eq!(list_cached(dir.path()), vec!["facemesh".to_string()]);
    }

    #[tokio::test]
    async fn test_saved_manifest_references_consolidated_shard() {
        let dir = tempfile::tempdir().unwrap();
        let result = save_model(dir.path(), "facemesh", &sample_artifacts())
            .await
            .unwrap();

        let bytes = std::fs::read(result.path.join(MANIFEST_FILE)).unwrap();
        let saved = GraphManifest::from_slice(&bytes, "saved").unwrap();
        assert_eq!(saved.shard_paths(), vec![WEIGHTS_FILE]);
        // Weight specs survive consolidation
        assert_eq!(saved.weights_manifest[0].weights.len(), 1);
    }

    #[tokio::test]
    async fn test_save_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifacts = sample_artifacts();
        save_model(dir.path(), "facemesh", &artifacts).await.unwrap();

        artifacts.weight_data = vec![9u8; 32];
        let result = save_model(dir.path(), "facemesh", &artifacts).await.unwrap();
        assert_eq!(result.weight_bytes, 32);

        let blob = std::fs::read(result.path.join(WEIGHTS_FILE)).unwrap();
        assert_eq!(blob.len(), 32);
    }

    #[tokio::test]
    async fn test_save_rejects_bad_name() {
        let dir = tempfile::tempdir().unwrap();
        let result = save_model(dir.path(), "../escape", &sample_artifacts()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cached_size_and_total() {
        let dir = tempfile::tempdir().unwrap();
        save_model(dir.path(), "facemesh", &sample_artifacts())
            .await
            .unwrap();

        let size = cached_size(dir.path(), "facemesh").unwrap();
        assert!(size >= 16); // weights plus manifest
        assert_eq!(total_size(dir.path()), size);
    }

    #[tokio::test]
    async fn test_evict() {
        let dir = tempfile::tempdir().unwrap();
        save_model(dir.path(), "facemesh", &sample_artifacts())
            .await
            .unwrap();

        evict(dir.path(), "facemesh").unwrap();
        assert!(!is_cached(dir.path(), "facemesh"));

        // Evicting an absent model is a no-op
        evict(dir.path(), "facemesh").unwrap();
    }

    #[tokio::test]
    async fn test_evict_all() {
        let dir = tempfile::tempdir().unwrap();
        save_model(dir.path(), "a-model", &sample_artifacts())
            .await
            .unwrap();
        save_model(dir.path(), "b-model", &sample_artifacts())
            .await
            .unwrap();

        let evicted = evict_all(dir.path()).unwrap();
        assert_eq!(evicted, vec!["a-model".to_string(), "b-model".to_string()]);
        assert!(list_cached(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_enforce_quota_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        save_model(dir.path(), "old-model", &sample_artifacts())
            .await
            .unwrap();
        save_model(dir.path(), "new-model", &sample_artifacts())
            .await
            .unwrap();

        // Mark new-model as recently used
        touch_last_used(dir.path(), "new-model");

        let size = cached_size(dir.path(), "new-model").unwrap();
        let evicted = enforce_quota(dir.path(), size, "new-model");

        assert_eq!(evicted, vec!["old-model".to_string()]);
        assert!(is_cached(dir.path(), "new-model"));
    }

    #[tokio::test]
    async fn test_enforce_quota_never_evicts_keep() {
        let dir = tempfile::tempdir().unwrap();
        save_model(dir.path(), "only-model", &sample_artifacts())
            .await
            .unwrap();

        let evicted = enforce_quota(dir.path(), 1, "only-model");
        assert!(evicted.is_empty());
        assert!(is_cached(dir.path(), "only-model"));
    }

    #[tokio::test]
    async fn test_enforce_quota_under_budget_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        save_model(dir.path(), "a-model", &sample_artifacts())
            .await
            .unwrap();

        let evicted = enforce_quota(dir.path(), u64::MAX, "");
        assert!(evicted.is_empty());
    }

    #[test]
    fn test_dir_size_nested() {
        let dir = tempfile::tempdir().unwrap();
        let subdir = dir.path().join("subdir");
        std::fs::create_dir(&subdir).unwrap();
        std::fs::write(subdir.join("file1.bin"), "abc").unwrap();
        std::fs::write(dir.path().join("file2.bin"), "defgh").unwrap();

        assert_eq!(dir_size(dir.path()), 8);
    }

    #[test]
    fn test_ensure_root_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/cache");
        ensure_root(&root).unwrap();
        assert!(root.exists());
    }
}
