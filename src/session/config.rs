//! Process-wide configuration (spec §4.5's table), with validation and a
//! database-local persistence round-trip (spec §6 "Config persistence").

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    Fast,
    Balanced,
    Accurate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageOptimization {
    pub max_dimension_px: u32,
    pub max_bytes: u64,
    pub filter_min_area_px: u32,
}

impl Default for ImageOptimization {
    fn default() -> Self {
        Self {
            max_dimension_px: 2048,
            max_bytes: 5 * 1024 * 1024,
            filter_min_area_px: 64 * 64,
        }
    }
}

/// Recognized config options and their effects (spec §4.5). Credentials
/// (`OCR_API_KEY`, `VISION_API_KEY`) are deliberately absent: they are read
/// from the environment at call time, never persisted (spec §6
/// "Environment").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub default_storage_path: PathBuf,
    pub default_ocr_mode: OcrMode,
    pub max_concurrent: u32,
    pub embedding_batch_size: u32,
    pub embedding_device: String,
    pub chunk_size: u32,
    pub chunk_overlap_percent: u32,
    pub max_chunk_size: u32,
    pub auto_cluster_enabled: bool,
    pub auto_cluster_threshold: u32,
    pub auto_cluster_algorithm: String,
    pub image_optimization: ImageOptimization,
    /// Not in spec §4.5's table directly, but named as an implementer
    /// choice in spec §9 Open Questions: the stuck-`processing` reaper
    /// threshold, in seconds.
    pub stuck_processing_threshold_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_storage_path: PathBuf::from("./data"),
            default_ocr_mode: OcrMode::Balanced,
            max_concurrent: 4,
            embedding_batch_size: 32,
            embedding_device: "auto".to_string(),
            chunk_size: 1000,
            chunk_overlap_percent: 10,
            max_chunk_size: 2000,
            auto_cluster_enabled: false,
            auto_cluster_threshold: 50,
            auto_cluster_algorithm: "hdbscan".to_string(),
            image_optimization: ImageOptimization::default(),
            stuck_processing_threshold_secs: 3600,
        }
    }
}

impl Config {
    /// Validates every bound named in spec §4.5's table.
    pub fn validate(&self) -> Result<(), SessionError> {
        if !(1..=10).contains(&self.max_concurrent) {
            return Err(SessionError::Storage(crate::error::StorageError::Other(
                "max_concurrent must be in [1, 10]".to_string(),
            )));
        }
        if !(1..=1024).contains(&self.embedding_batch_size) {
            return Err(SessionError::Storage(crate::error::StorageError::Other(
                "embedding_batch_size must be in [1, 1024]".to_string(),
            )));
        }
        if !(100..=10_000).contains(&self.chunk_size) {
            return Err(SessionError::Storage(crate::error::StorageError::Other(
                "chunk_size must be in [100, 10000]".to_string(),
            )));
        }
        if self.chunk_overlap_percent > 50 {
            return Err(SessionError::Storage(crate::error::StorageError::Other(
                "chunk_overlap_percent must be in [0, 50]".to_string(),
            )));
        }
        if !(1_000..=50_000).contains(&self.max_chunk_size) {
            return Err(SessionError::Storage(crate::error::StorageError::Other(
                "max_chunk_size must be in [1000, 50000]".to_string(),
            )));
        }
        Ok(())
    }

    /// Merges a JSON subset (as loaded from `config_json`) over these
    /// defaults. Unrecognized keys are ignored; recognized keys override.
    pub fn apply_persisted(&mut self, persisted: serde_json::Value) -> Result<(), SessionError> {
        let merged_defaults = serde_json::to_value(&*self)
            .map_err(|e| SessionError::Storage(crate::error::StorageError::Serde(e)))?;
        let mut merged = merged_defaults;
        if let (Some(base), Some(overrides)) = (merged.as_object_mut(), persisted.as_object()) {
            for (k, v) in overrides {
                base.insert(k.clone(), v.clone());
            }
        }
        *self = serde_json::from_value(merged)
            .map_err(|e| SessionError::Storage(crate::error::StorageError::Serde(e)))?;
        self.validate()
    }
}
