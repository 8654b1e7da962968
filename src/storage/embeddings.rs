//! The `embeddings` table. Exactly one of `chunk_id`/`image_id`/`extraction_id`
//! is set per row (spec §3); `source_type` is derived from which is set.

use crate::error::StorageError;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingSource {
    Chunk,
    Image,
    Extraction,
}

#[derive(Debug, Clone, FromRow)]
pub struct EmbeddingRow {
    pub id: String,
    pub provenance_id: String,
    pub chunk_id: Option<String>,
    pub image_id: Option<String>,
    pub extraction_id: Option<String>,
    pub original_text: String,
    pub model: String,
    pub model_version: String,
    pub task_type: String,
    pub inference_mode: String,
    pub vector_id: String,
    pub created_at: String,
}

impl EmbeddingRow {
    pub fn source(&self) -> EmbeddingSource {
        if self.chunk_id.is_some() {
            EmbeddingSource::Chunk
        } else if self.image_id.is_some() {
            EmbeddingSource::Image
        } else {
            EmbeddingSource::Extraction
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewEmbedding {
    pub id: String,
    pub provenance_id: String,
    pub chunk_id: Option<String>,
    pub image_id: Option<String>,
    pub extraction_id: Option<String>,
    pub original_text: String,
    pub model: String,
    pub model_version: String,
    pub task_type: String,
    pub inference_mode: String,
    pub vector_id: String,
}

pub async fn insert<'e, E>(executor: E, e: &NewEmbedding) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO embeddings (id, provenance_id, chunk_id, image_id, extraction_id, \
         original_text, model, model_version, task_type, inference_mode, vector_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&e.id)
    .bind(&e.provenance_id)
    .bind(&e.chunk_id)
    .bind(&e.image_id)
    .bind(&e.extraction_id)
    .bind(&e.original_text)
    .bind(&e.model)
    .bind(&e.model_version)
    .bind(&e.task_type)
    .bind(&e.inference_mode)
    .bind(&e.vector_id)
    .bind(Utc::now().to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<EmbeddingRow>, StorageError> {
    let row = sqlx::query_as("SELECT * FROM embeddings WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get_by_chunk(pool: &SqlitePool, chunk_id: &str) -> Result<Option<EmbeddingRow>, StorageError> {
    let row = sqlx::query_as("SELECT * FROM embeddings WHERE chunk_id = ?")
        .bind(chunk_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get_by_vector_id(pool: &SqlitePool, vector_id: &str) -> Result<Option<EmbeddingRow>, StorageError> {
    let row = sqlx::query_as("SELECT * FROM embeddings WHERE vector_id = ?")
        .bind(vector_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn count_for_document(pool: &SqlitePool, document_id: &str) -> Result<i64, StorageError> {
    let (n,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM embeddings e \
         LEFT JOIN chunks c ON e.chunk_id = c.id \
         LEFT JOIN images im ON e.image_id = im.id \
         LEFT JOIN extractions x ON e.extraction_id = x.id \
         WHERE c.document_id = ? OR im.document_id = ? OR x.document_id = ?",
    )
    .bind(document_id)
    .bind(document_id)
    .bind(document_id)
    .fetch_one(pool)
    .await?;
    Ok(n)
}
