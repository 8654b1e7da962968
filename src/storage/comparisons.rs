//! The `comparisons` table (spec §4.6).

use crate::error::StorageError;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, FromRow)]
pub struct ComparisonRow {
    pub id: String,
    pub provenance_id: String,
    pub document_a_id: String,
    pub document_b_id: String,
    pub text_diff: String,
    pub structural_diff: String,
    pub content_hash: String,
    pub created_at: String,
}

#[allow(clippy::too_many_arguments)]
pub async fn insert<'e, E>(
    executor: E,
    id: &str,
    provenance_id: &str,
    document_a_id: &str,
    document_b_id: &str,
    text_diff: &str,
    structural_diff: &str,
    content_hash: &str,
) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO comparisons (id, provenance_id, document_a_id, document_b_id, text_diff, \
         structural_diff, content_hash, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(provenance_id)
    .bind(document_a_id)
    .bind(document_b_id)
    .bind(text_diff)
    .bind(structural_diff)
    .bind(content_hash)
    .bind(Utc::now().to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<ComparisonRow>, StorageError> {
    let row = sqlx::query_as("SELECT * FROM comparisons WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<ComparisonRow>, StorageError> {
    let rows = sqlx::query_as("SELECT * FROM comparisons ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn find_existing(
    pool: &SqlitePool,
    document_a_id: &str,
    document_b_id: &str,
) -> Result<Option<ComparisonRow>, StorageError> {
    let row = sqlx::query_as(
        "SELECT * FROM comparisons WHERE \
         (document_a_id = ? AND document_b_id = ?) OR (document_a_id = ? AND document_b_id = ?) \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(document_a_id)
    .bind(document_b_id)
    .bind(document_b_id)
    .bind(document_a_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
