//! Raw row access to the `provenance` table. The `provenance` module owns
//! the domain logic (chain-hash derivation, traversal, verification); this
//! module is pure storage I/O, mirroring the split between
//! `runtimes::checkpointer` and `runtimes::checkpointer_sqlite` in the
//! teacher.

use crate::error::StorageError;
use crate::provenance::types::{Location, ProvenanceRecord, ProvenanceType};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, FromRow)]
pub struct ProvenanceRow {
    pub id: String,
    pub r#type: String,
    pub source_type: String,
    pub processor: String,
    pub processor_version: String,
    pub processing_params: String,
    pub content_hash: String,
    pub input_hash: Option<String>,
    pub file_hash: String,
    pub parent_id: Option<String>,
    pub parent_ids: String,
    pub root_document_id: String,
    pub chain_depth: i64,
    pub chain_path: String,
    pub chain_hash: Option<String>,
    pub location: Option<String>,
    pub processing_duration_ms: Option<i64>,
    pub processing_quality_score: Option<f64>,
    pub created_at: String,
    pub processed_at: Option<String>,
}

impl ProvenanceRow {
    pub fn into_record(self) -> Result<ProvenanceRecord, StorageError> {
        let r#type = ProvenanceType::decode(&self.r#type)
            .ok_or_else(|| StorageError::Other(format!("unknown provenance type {:?}", self.r#type)))?;
        let parent_ids: Vec<String> = serde_json::from_str(&self.parent_ids)?;
        let chain_path_raw: Vec<String> = serde_json::from_str(&self.chain_path)?;
        let chain_path = chain_path_raw
            .iter()
            .map(|s| ProvenanceType::decode(s).ok_or_else(|| StorageError::Other(format!("unknown type in chain_path: {s}"))))
            .collect::<Result<Vec<_>, _>>()?;
        let location: Option<Location> = match self.location {
            Some(s) => Some(serde_json::from_str(&s)?),
            None => None,
        };
        Ok(ProvenanceRecord {
            id: self.id,
            r#type,
            source_type: self.source_type,
            processor: self.processor,
            processor_version: self.processor_version,
            processing_params: serde_json::from_str(&self.processing_params)?,
            content_hash: self.content_hash,
            input_hash: self.input_hash,
            file_hash: self.file_hash,
            parent_id: self.parent_id,
            parent_ids,
            root_document_id: self.root_document_id,
            chain_depth: self.chain_depth,
            chain_path,
            chain_hash: self.chain_hash.unwrap_or_default(),
            location,
            processing_duration_ms: self.processing_duration_ms,
            processing_quality_score: self.processing_quality_score,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| StorageError::Other(e.to_string()))?,
            processed_at: self
                .processed_at
                .map(|s| DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)))
                .transpose()
                .map_err(|e| StorageError::Other(e.to_string()))?,
        })
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn insert<'e, E>(executor: E, record: &ProvenanceRecord) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let parent_ids = serde_json::to_string(&record.parent_ids)?;
    let chain_path: Vec<&str> = record.chain_path.iter().map(|t| t.encode()).collect();
    let chain_path = serde_json::to_string(&chain_path)?;
    let location = record
        .location
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        "INSERT INTO provenance (id, type, source_type, processor, processor_version, \
         processing_params, content_hash, input_hash, file_hash, parent_id, parent_ids, \
         root_document_id, chain_depth, chain_path, chain_hash, location, \
         processing_duration_ms, processing_quality_score, created_at, processed_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(record.r#type.encode())
    .bind(&record.source_type)
    .bind(&record.processor)
    .bind(&record.processor_version)
    .bind(serde_json::to_string(&record.processing_params)?)
    .bind(&record.content_hash)
    .bind(&record.input_hash)
    .bind(&record.file_hash)
    .bind(&record.parent_id)
    .bind(parent_ids)
    .bind(&record.root_document_id)
    .bind(record.chain_depth)
    .bind(chain_path)
    .bind(&record.chain_hash)
    .bind(location)
    .bind(record.processing_duration_ms)
    .bind(record.processing_quality_score)
    .bind(record.created_at.to_rfc3339())
    .bind(record.processed_at.map(|t| t.to_rfc3339()))
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<ProvenanceRow>, StorageError> {
    let row = sqlx::query_as("SELECT * FROM provenance WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get_many(pool: &SqlitePool, ids: &[String]) -> Result<Vec<ProvenanceRow>, StorageError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("SELECT * FROM provenance WHERE id IN ({placeholders})");
    let mut q = sqlx::query_as(&sql);
    for id in ids {
        q = q.bind(id);
    }
    Ok(q.fetch_all(pool).await?)
}

pub async fn get_children(pool: &SqlitePool, parent_id: &str) -> Result<Vec<ProvenanceRow>, StorageError> {
    let rows = sqlx::query_as("SELECT * FROM provenance WHERE parent_id = ?")
        .bind(parent_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Rows with a null `chain_hash`, ordered by `chain_depth` ascending so
/// backfill can proceed in dependency order (spec §4.1 Backfill).
pub async fn list_missing_chain_hash(pool: &SqlitePool) -> Result<Vec<ProvenanceRow>, StorageError> {
    let rows = sqlx::query_as(
        "SELECT * FROM provenance WHERE chain_hash IS NULL ORDER BY chain_depth ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn set_chain_hash(pool: &SqlitePool, id: &str, chain_hash: &str) -> Result<(), StorageError> {
    sqlx::query("UPDATE provenance SET chain_hash = ? WHERE id = ?")
        .bind(chain_hash)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
