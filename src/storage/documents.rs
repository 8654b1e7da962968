//! The `documents` table: the one entity with permitted in-place mutation
//! (title/author/subject/status/error_message/modified_at — spec §9).

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "complete" => Self::Complete,
            "failed" => Self::Failed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: String,
    pub provenance_id: String,
    pub file_hash: String,
    pub file_path: String,
    pub status: String,
    pub page_count: Option<i64>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub ocr_completed_at: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub modified_at: String,
}

impl DocumentRow {
    pub fn status(&self) -> DocumentStatus {
        DocumentStatus::parse(&self.status).unwrap_or(DocumentStatus::Failed)
    }
}

pub async fn insert_pending<'e, E>(
    executor: E,
    id: &str,
    provenance_id: &str,
    file_hash: &str,
    file_path: &str,
) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO documents (id, provenance_id, file_hash, file_path, status, created_at, modified_at) \
         VALUES (?, ?, ?, ?, 'pending', ?, ?)",
    )
    .bind(id)
    .bind(provenance_id)
    .bind(file_hash)
    .bind(file_path)
    .bind(&now)
    .bind(&now)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<DocumentRow>, StorageError> {
    let row = sqlx::query_as("SELECT * FROM documents WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get_by_path(pool: &SqlitePool, path: &str) -> Result<Option<DocumentRow>, StorageError> {
    let row = sqlx::query_as("SELECT * FROM documents WHERE file_path = ? ORDER BY created_at DESC LIMIT 1")
        .bind(path)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get_by_hash(pool: &SqlitePool, hash: &str) -> Result<Option<DocumentRow>, StorageError> {
    let row = sqlx::query_as("SELECT * FROM documents WHERE file_hash = ?")
        .bind(hash)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Atomically promotes up to `max_concurrent` `pending` documents to
/// `processing`, oldest-first, and returns exactly those rows
/// (UPDATE-then-SELECT, spec §4.3 Claim phase).
pub async fn claim_pending(
    pool: &SqlitePool,
    max_concurrent: u32,
) -> Result<Vec<DocumentRow>, StorageError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "UPDATE documents SET status = 'processing', modified_at = ? \
         WHERE id IN ( \
             SELECT id FROM documents WHERE status = 'pending' \
             ORDER BY created_at ASC LIMIT ? \
         )",
    )
    .bind(&now)
    .bind(max_concurrent)
    .execute(pool)
    .await?;

    let rows = sqlx::query_as(
        "SELECT * FROM documents WHERE status = 'processing' AND modified_at = ? \
         ORDER BY created_at ASC",
    )
    .bind(&now)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// All `complete` documents, oldest first (spec §4.6 Clustering reads).
pub async fn list_complete(pool: &SqlitePool) -> Result<Vec<DocumentRow>, StorageError> {
    let rows = sqlx::query_as(
        "SELECT * FROM documents WHERE status = 'complete' ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn mark_complete(pool: &SqlitePool, id: &str) -> Result<(), StorageError> {
    sqlx::query("UPDATE documents SET status = 'complete', modified_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_failed(pool: &SqlitePool, id: &str, error_message: &str) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE documents SET status = 'failed', error_message = ?, modified_at = ? WHERE id = ?",
    )
    .bind(error_message)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_pending(pool: &SqlitePool, id: &str) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE documents SET status = 'pending', error_message = NULL, modified_at = ? WHERE id = ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_metadata(
    pool: &SqlitePool,
    id: &str,
    page_count: Option<i64>,
    title: Option<&str>,
    author: Option<&str>,
    subject: Option<&str>,
    ocr_completed_at: Option<DateTime<Utc>>,
) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE documents SET page_count = ?, title = ?, author = ?, subject = ?, \
         ocr_completed_at = ?, modified_at = ? WHERE id = ?",
    )
    .bind(page_count)
    .bind(title)
    .bind(author)
    .bind(subject)
    .bind(ocr_completed_at.map(|t| t.to_rfc3339()))
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Deletes a document. Cascades (spec §3 invariant 6, §4.2 Cascade rules)
/// are realized by `ON DELETE CASCADE` foreign keys on every derived table;
/// this only needs to also remove the root provenance row and its vectors
/// and FTS rows, which have no FK path back to `documents`.
pub async fn delete_cascade(pool: &SqlitePool, id: &str) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;

    let vector_ids: Vec<(String,)> = sqlx::query_as(
        "SELECT e.vector_id FROM embeddings e \
         JOIN chunks c ON e.chunk_id = c.id WHERE c.document_id = ? \
         UNION \
         SELECT e.vector_id FROM embeddings e \
         JOIN images im ON e.image_id = im.id WHERE im.document_id = ? \
         UNION \
         SELECT e.vector_id FROM embeddings e \
         JOIN extractions x ON e.extraction_id = x.id WHERE x.document_id = ?",
    )
    .bind(id)
    .bind(id)
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;

    for (vector_id,) in &vector_ids {
        sqlx::query("DELETE FROM vectors WHERE vector_id = ?")
            .bind(vector_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM vlm_fts WHERE document_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM extractions_fts WHERE document_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    // root_document_id on provenance rows is the DOCUMENT provenance's id,
    // not the documents table's own id, so fetch it before the row is gone.
    let doc = sqlx::query_as::<_, (String,)>("SELECT provenance_id FROM documents WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

    // Removes documents row; ON DELETE CASCADE takes ocr_results, chunks,
    // embeddings, images, extractions, form_fills, comparisons with it.
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if let Some((provenance_id,)) = doc {
        sqlx::query("DELETE FROM provenance WHERE root_document_id = ?")
            .bind(&provenance_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM provenance WHERE id = ?")
            .bind(&provenance_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}
