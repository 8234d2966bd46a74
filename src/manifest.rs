//! Graph model manifest parsing
//!
//! Parses `model.json` manifests in the TF.js graph-model layout: an opaque
//! `modelTopology` plus a `weightsManifest` array of shard groups, each group
//! naming its shard files and the tensors stored in them. Byte accounting is
//! derived from the declared tensor shapes and dtypes, the topology itself is
//! never interpreted.

use crate::error::{LoadError, LoadResult};
use serde::{Deserialize, Serialize};

/// One tensor declared in the weights manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightSpec {
    pub name: String,
    pub shape: Vec<i64>,
    pub dtype: String,
}

impl WeightSpec {
    /// Bytes this tensor occupies according to its declared shape and dtype
    ///
    /// Unknown dtypes contribute 0 bytes rather than failing the load.
    /// Saturates at `u64::MAX`: dims are manifest-supplied, and a wrapped
    /// product would let a truncated download pass the size check.
    pub fn declared_bytes(&self) -> u64 {
        self.shape
            .iter()
            .map(|&d| d.max(0) as u64)
            .try_fold(1u64, |acc, d| acc.checked_mul(d))
            .and_then(|elements| elements.checked_mul(dtype_width(&self.dtype)))
            .unwrap_or(u64::MAX)
    }
}

/// Byte width of a manifest dtype string, matched case-insensitively
fn dtype_width(dtype: &str) -> u64 {
    match dtype.to_ascii_lowercase().as_str() {
        "float32" | "int32" => 4,
        "float16" => 2,
        "uint8" | "int8" | "bool" => 1,
        "int64" | "float64" | "complex64" => 8,
        _ => 0,
    }
}

/// One entry of the `weightsManifest` array
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightsGroup {
    /// Shard file names, relative to the manifest location
    pub paths: Vec<String>,
    pub weights: Vec<WeightSpec>,
}

/// Parsed `model.json` manifest
///
/// Serde names follow the camelCase wire format of the manifest file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphManifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_by: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_by: Option<String>,

    /// Graph topology, carried opaquely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_topology: Option<serde_json::Value>,

    /// Required: JSON without this field is not a graph model manifest
    pub weights_manifest: Vec<WeightsGroup>,
}

impl GraphManifest {
    /// Parse a manifest from raw JSON bytes
    ///
    /// `location` is only used to label the error when parsing fails.
    pub fn from_slice(bytes: &[u8], location: &str) -> LoadResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| LoadError::Manifest {
            location: location.to_string(),
            reason: e.to_string(),
        })
    }

    /// Shard file names across all groups, in manifest order
    pub fn shard_paths(&self) -> Vec<&str> {
        self.weights_manifest
            .iter()
            .flat_map(|group| group.paths.iter().map(String::as_str))
            .collect()
    }

    /// Total bytes the manifest declares across every weight spec
    ///
    /// Saturating, like `declared_bytes`.
    pub fn declared_weight_bytes(&self) -> u64 {
        self.weights_manifest
            .iter()
            .flat_map(|group| group.weights.iter())
            .map(WeightSpec::declared_bytes)
            .fold(0u64, u64::saturating_add)
    }
}

/// A fully materialized model: parsed manifest plus concatenated shard bytes
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub manifest: GraphManifest,
    /// Shard bytes concatenated in manifest order
    pub weight_data: Vec<u8>,
}

impl ModelArtifacts {
    /// Size of the loaded weight blob in bytes
    pub fn weight_bytes(&self) -> u64 {
        self.weight_data.len() as u64
    }
}
