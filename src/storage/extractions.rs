//! The `extractions` table (spec §4.3 step 8, structured extraction).

use crate::error::StorageError;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, FromRow)]
pub struct ExtractionRow {
    pub id: String,
    pub provenance_id: String,
    pub document_id: String,
    pub schema_name: String,
    pub payload: String,
    pub created_at: String,
}

pub async fn insert<'e, E>(
    executor: E,
    id: &str,
    provenance_id: &str,
    document_id: &str,
    schema_name: &str,
    payload: &str,
) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO extractions (id, provenance_id, document_id, schema_name, payload, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(provenance_id)
    .bind(document_id)
    .bind(schema_name)
    .bind(payload)
    .bind(Utc::now().to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn list_by_document(pool: &SqlitePool, document_id: &str) -> Result<Vec<ExtractionRow>, StorageError> {
    let rows = sqlx::query_as("SELECT * FROM extractions WHERE document_id = ?")
        .bind(document_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<ExtractionRow>, StorageError> {
    let row = sqlx::query_as("SELECT * FROM extractions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}
