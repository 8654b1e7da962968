//! Pre-ingest scan (spec §4.3): for each candidate path, compute file hash,
//! look up by path then by hash, and decide an outcome.

use crate::error::IngestionError;
use crate::hash::content_hash;
use crate::provenance::{NewProvenance, ProvenanceService, ProvenanceType};
use crate::storage::documents;
use serde_json::json;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Skipped { reason: String, existing_document_id: String },
    VersionUpdated { document_id: String, previous_document_id: String },
    New { document_id: String },
}

/// Scans one candidate file path and either records a new pending document
/// or reports why nothing new was created (spec §4.3 Pre-ingest scan).
#[instrument(skip(pool), fields(path = %path.as_ref().display()))]
pub async fn scan_file(pool: &SqlitePool, path: impl AsRef<Path>) -> Result<ScanOutcome, IngestionError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IngestionError::PathNotFound(path.display().to_string()));
    }
    let bytes = tokio::fs::read(path).await?;
    let hash = content_hash(&bytes);
    let path_str = path.display().to_string();

    let by_path = documents::get_by_path(pool, &path_str).await?;
    let by_hash = documents::get_by_hash(pool, &hash).await?;

    match (by_path, by_hash) {
        (Some(existing_path), Some(existing_hash)) if existing_path.id == existing_hash.id => {
            Ok(ScanOutcome::Skipped {
                reason: format!("identical to already-ingested file at {path_str}"),
                existing_document_id: existing_path.id,
            })
        }
        (Some(existing_path), _) => {
            // Same path, different hash: a new version.
            let new_id = Uuid::new_v4().to_string();
            let mut tx = pool.begin().await.map_err(crate::error::StorageError::from)?;
            let provenance = ProvenanceService::new(pool)
                .create(
                    &mut *tx,
                    NewProvenance {
                        r#type: ProvenanceType::Document,
                        source_type: "FILE".to_string(),
                        parent_id: None,
                        content_hash: hash.clone(),
                        processor: "provgraph-scan".to_string(),
                        processor_version: env!("CARGO_PKG_VERSION").to_string(),
                        processing_params: json!({ "previous_version_id": existing_path.id }),
                        location: None,
                        processing_duration_ms: None,
                        processing_quality_score: None,
                    },
                )
                .await?;
            documents::insert_pending(&mut *tx, &new_id, &provenance.id, &hash, &path_str).await?;
            tx.commit().await.map_err(crate::error::StorageError::from)?;
            Ok(ScanOutcome::VersionUpdated {
                document_id: new_id,
                previous_document_id: existing_path.id,
            })
        }
        (None, Some(existing_hash)) => Ok(ScanOutcome::Skipped {
            reason: format!("duplicate content of {}", existing_hash.file_path),
            existing_document_id: existing_hash.id,
        }),
        (None, None) => {
            let new_id = Uuid::new_v4().to_string();
            let mut tx = pool.begin().await.map_err(crate::error::StorageError::from)?;
            let provenance = ProvenanceService::new(pool)
                .create(
                    &mut *tx,
                    NewProvenance {
                        r#type: ProvenanceType::Document,
                        source_type: "FILE".to_string(),
                        parent_id: None,
                        content_hash: hash.clone(),
                        processor: "provgraph-scan".to_string(),
                        processor_version: env!("CARGO_PKG_VERSION").to_string(),
                        processing_params: json!({}),
                        location: None,
                        processing_duration_ms: None,
                        processing_quality_score: None,
                    },
                )
                .await?;
            documents::insert_pending(&mut *tx, &new_id, &provenance.id, &hash, &path_str).await?;
            tx.commit().await.map_err(crate::error::StorageError::from)?;
            Ok(ScanOutcome::New { document_id: new_id })
        }
    }
}

/// Scans every file under `dir` (recursively) via [`scan_file`].
#[instrument(skip(pool), fields(dir = %dir.as_ref().display()))]
pub async fn scan_directory(
    pool: &SqlitePool,
    dir: impl AsRef<Path>,
) -> Result<Vec<(String, ScanOutcome)>, IngestionError> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Err(IngestionError::PathNotFound(dir.display().to_string()));
    }
    if !dir.is_dir() {
        return Err(IngestionError::PathNotDirectory(dir.display().to_string()));
    }

    let mut outcomes = Vec::new();
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            let path = entry.path().to_path_buf();
            let outcome = scan_file(pool, &path).await?;
            outcomes.push((path.display().to_string(), outcome));
        }
    }
    Ok(outcomes)
}
