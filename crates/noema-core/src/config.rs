//! Typed configuration surface.
//!
//! Plain `serde` structs with `Default` impls matching the documented
//! defaults. Loading from a file or environment is out of scope —
//! callers build these programmatically.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    pub max_title_length: usize,
    pub max_summary_length: usize,
    pub max_content_bytes: usize,
    pub max_tags_per_memory: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_title_length: 500,
            max_summary_length: 2000,
            max_content_bytes: 524_288,
            max_tags_per_memory: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingsConfig {
    pub enabled: bool,
    pub dim: usize,
    pub max_sequence_length: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dim: 384,
            max_sequence_length: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub decay_enabled: bool,
    pub decay_interval_hours: u64,
    pub prune_threshold: f32,
    pub consolidation_enabled: bool,
    pub consolidation_interval_hours: u64,
    pub similarity_threshold: f32,
    pub initial_delay_minutes: u64,
    pub shutdown_timeout_seconds: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            decay_enabled: true,
            decay_interval_hours: 24,
            prune_threshold: 0.1,
            consolidation_enabled: true,
            consolidation_interval_hours: 24,
            similarity_threshold: 0.8,
            initial_delay_minutes: 5,
            shutdown_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictConfig {
    pub duplicate_threshold: f32,
    pub supersede_threshold: f32,
    pub coexist_threshold: f32,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: 0.95,
            supersede_threshold: 0.80,
            coexist_threshold: 0.60,
        }
    }
}

/// Top-level engine configuration. Validate once at `Engine::new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Path to the SQLite database file. `None` resolves to a
    /// platform-appropriate default via `directories::ProjectDirs`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub db_path: Option<PathBuf>,
    pub storage: StorageConfig,
    pub embeddings: EmbeddingsConfig,
    pub maintenance: MaintenanceConfig,
    pub conflict: ConflictConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            storage: StorageConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            maintenance: MaintenanceConfig::default(),
            conflict: ConflictConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate cross-field invariants that a `Default::default()` always
    /// satisfies but a hand-built config might not.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.conflict;
        let ordered = 0.0 < c.coexist_threshold
            && c.coexist_threshold < c.supersede_threshold
            && c.supersede_threshold < c.duplicate_threshold
            && c.duplicate_threshold <= 1.0;
        if !ordered {
            return Err(ConfigError::InvalidThresholdOrdering {
                coexist: c.coexist_threshold,
                supersede: c.supersede_threshold,
                duplicate: c.duplicate_threshold,
            });
        }

        if self.embeddings.dim == 0 {
            return Err(ConfigError::InvalidEmbeddingDim);
        }

        let s = &self.storage;
        if s.max_title_length == 0
            || s.max_summary_length == 0
            || s.max_content_bytes == 0
            || s.max_tags_per_memory == 0
        {
            return Err(ConfigError::InvalidStorageLimit);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_misordered_thresholds() {
        let mut cfg = EngineConfig::default();
        cfg.conflict.supersede_threshold = 0.5;
        cfg.conflict.coexist_threshold = 0.6;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_embedding_dim() {
        let mut cfg = EngineConfig::default();
        cfg.embeddings.dim = 0;
        assert!(cfg.validate().is_err());
    }
}
