//! Engine-wide configuration.
//!
//! Loaded once at construction (`CoreConfig::load` or `CoreConfig::default`)
//! and threaded immutably into the Coordinator and Retriever. Nothing
//! re-reads configuration per call.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub use_disk_storage: bool,
    pub name_cache_size: usize,
    pub semantic_cache_size: usize,
    pub structural_cache_size: usize,
    pub max_memory_mb: usize,
    pub auto_persist: bool,
    pub auto_persist_interval_minutes: u64,
    pub hybrid_vector_weight: f32,
    pub min_score: f32,
    pub sentence_window_size: usize,
    pub max_parent_document_chars: usize,
    pub file_cache_size: usize,
    pub file_cache_ttl_ms: u64,
    pub log_level: String,
    pub log_file: Option<String>,
    pub embedding_dimensions: usize,
    pub worker_threads: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            use_disk_storage: false,
            name_cache_size: 10_000,
            semantic_cache_size: 10_000,
            structural_cache_size: 10_000,
            max_memory_mb: 1024,
            auto_persist: false,
            auto_persist_interval_minutes: 10,
            hybrid_vector_weight: 0.7,
            min_score: 0.3,
            sentence_window_size: 3,
            max_parent_document_chars: 5000,
            file_cache_size: 50,
            file_cache_ttl_ms: 300_000,
            log_level: "info".to_string(),
            log_file: None,
            embedding_dimensions: 384,
            worker_threads: num_cpus::get().max(1),
        }
    }
}

impl CoreConfig {
    /// Load from a TOML file; a missing file falls back to defaults rather
    /// than erroring, matching the workspace config's load-or-default
    /// behavior.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "malformed config, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let toml = toml::to_string_pretty(self)
            .expect("CoreConfig serialization is infallible for this field set");
        std::fs::write(path, toml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = CoreConfig::load("/nonexistent/path/does/not/exist.toml");
        assert_eq!(config.hybrid_vector_weight, 0.7);
        assert_eq!(config.min_score, 0.3);
        assert_eq!(config.sentence_window_size, 3);
        assert_eq!(config.max_parent_document_chars, 5000);
        assert_eq!(config.file_cache_size, 50);
        assert_eq!(config.file_cache_ttl_ms, 300_000);
        assert_eq!(config.auto_persist_interval_minutes, 10);
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = CoreConfig::default();
        config.hybrid_vector_weight = 0.5;
        config.save(&path).unwrap();

        let loaded = CoreConfig::load(&path);
        assert_eq!(loaded.hybrid_vector_weight, 0.5);
    }
}
