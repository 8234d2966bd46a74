//! Bundled known-model size table
//!
//! Ships the expected weight byte size for models this crate is commonly
//! pointed at, used to populate the `size_desired` statistic before a
//! manifest has been fetched.

use std::collections::HashMap;
use std::sync::OnceLock;

fn table() -> &'static HashMap<String, u64> {
    static TABLE: OnceLock<HashMap<String, u64>> = OnceLock::new();
    TABLE.get_or_init(|| {
        serde_json::from_str(include_str!("../models.json")).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "bundled models.json is invalid, sizes unavailable");
            HashMap::new()
        })
    })
}

/// Expected weight bytes for a known model, 0 when unknown
pub fn desired_size(name: &str) -> u64 {
    table().get(name).copied().unwrap_or(0)
}

/// Names in the bundled table, sorted
pub fn known_models() -> Vec<&'static str> {
    let mut names: Vec<_> = table().keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}
