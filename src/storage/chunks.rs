//! The `chunks` table: text segments produced by the chunker (spec §3).

use crate::error::StorageError;
use chrono::Utc;
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, FromRow)]
pub struct ChunkRow {
    pub id: String,
    pub provenance_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub char_start: i64,
    pub char_end: i64,
    pub page_number: Option<i64>,
    pub page_range_start: Option<i64>,
    pub page_range_end: Option<i64>,
    pub heading_context: Option<String>,
    pub section_path: Option<String>,
    pub content_type_tags: String,
    pub is_atomic: bool,
    pub overlap_previous: i64,
    pub overlap_next: i64,
    pub system_tags: String,
    pub embedding_status: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewChunk {
    pub id: String,
    pub provenance_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub char_start: i64,
    pub char_end: i64,
    pub page_number: Option<i64>,
    pub page_range_start: Option<i64>,
    pub page_range_end: Option<i64>,
    pub heading_context: Option<String>,
    pub section_path: Option<String>,
    pub content_type_tags: Vec<String>,
    pub is_atomic: bool,
    pub overlap_previous: i64,
    pub overlap_next: i64,
}

pub async fn insert<'e, E>(executor: E, chunk: &NewChunk) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO chunks (id, provenance_id, document_id, chunk_index, content, char_start, \
         char_end, page_number, page_range_start, page_range_end, heading_context, section_path, \
         content_type_tags, is_atomic, overlap_previous, overlap_next, system_tags, \
         embedding_status, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, '[]', 'pending', ?)",
    )
    .bind(&chunk.id)
    .bind(&chunk.provenance_id)
    .bind(&chunk.document_id)
    .bind(chunk.chunk_index)
    .bind(&chunk.content)
    .bind(chunk.char_start)
    .bind(chunk.char_end)
    .bind(chunk.page_number)
    .bind(chunk.page_range_start)
    .bind(chunk.page_range_end)
    .bind(&chunk.heading_context)
    .bind(&chunk.section_path)
    .bind(serde_json::to_string(&chunk.content_type_tags).unwrap_or_else(|_| "[]".into()))
    .bind(chunk.is_atomic)
    .bind(chunk.overlap_previous)
    .bind(chunk.overlap_next)
    .bind(Utc::now().to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn list_by_document(pool: &SqlitePool, document_id: &str) -> Result<Vec<ChunkRow>, StorageError> {
    let rows = sqlx::query_as(
        "SELECT * FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<ChunkRow>, StorageError> {
    let row = sqlx::query_as("SELECT * FROM chunks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Applies system tags (e.g. a repeated-header/footer marker) to a chunk.
/// Header/footer tagging failures are caught by the caller as
/// post-processing warnings (spec §4.3 step 4); this call itself is
/// infallible beyond ordinary storage errors.
pub async fn add_system_tag(pool: &SqlitePool, chunk_id: &str, tag: &str) -> Result<(), StorageError> {
    let current: Option<(String,)> = sqlx::query_as("SELECT system_tags FROM chunks WHERE id = ?")
        .bind(chunk_id)
        .fetch_optional(pool)
        .await?;
    let Some((tags_json,)) = current else {
        return Ok(());
    };
    let mut tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    if !tags.iter().any(|t| t == tag) {
        tags.push(tag.to_string());
    }
    sqlx::query("UPDATE chunks SET system_tags = ? WHERE id = ?")
        .bind(serde_json::to_string(&tags).unwrap_or_else(|_| "[]".into()))
        .bind(chunk_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_embedding_status(pool: &SqlitePool, chunk_id: &str, status: &str) -> Result<(), StorageError> {
    sqlx::query("UPDATE chunks SET embedding_status = ? WHERE id = ?")
        .bind(status)
        .bind(chunk_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Structural fingerprint inputs aggregated over one document's chunks
/// (spec §4.3 step 5).
#[derive(Debug, Clone, Default)]
pub struct ChunkStats {
    pub chunk_count: i64,
    pub atomic_count: i64,
    pub average_chunk_size: f64,
    pub content_type_distribution: Value,
}

pub async fn stats_for_document(pool: &SqlitePool, document_id: &str) -> Result<ChunkStats, StorageError> {
    let chunks = list_by_document(pool, document_id).await?;
    if chunks.is_empty() {
        return Ok(ChunkStats::default());
    }
    let chunk_count = chunks.len() as i64;
    let atomic_count = chunks.iter().filter(|c| c.is_atomic).count() as i64;
    let total_len: i64 = chunks.iter().map(|c| c.content.len() as i64).sum();
    let mut distribution: std::collections::BTreeMap<String, i64> = std::collections::BTreeMap::new();
    for chunk in &chunks {
        let tags: Vec<String> = serde_json::from_str(&chunk.content_type_tags).unwrap_or_default();
        for tag in tags {
            *distribution.entry(tag).or_insert(0) += 1;
        }
    }
    Ok(ChunkStats {
        chunk_count,
        atomic_count,
        average_chunk_size: total_len as f64 / chunk_count as f64,
        content_type_distribution: serde_json::to_value(distribution).unwrap_or(Value::Null),
    })
}
