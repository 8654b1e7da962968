//! The `clusters` and `cluster_documents` tables (spec §4.6).

use crate::error::StorageError;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, FromRow)]
pub struct ClusterRow {
    pub id: String,
    pub provenance_id: String,
    pub algorithm: String,
    pub centroid: String,
    pub top_terms: String,
    pub coherence_score: Option<f64>,
    pub created_at: String,
}

pub async fn insert<'e, E>(
    executor: E,
    id: &str,
    provenance_id: &str,
    algorithm: &str,
    centroid: &str,
    top_terms: &str,
    coherence_score: Option<f64>,
) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO clusters (id, provenance_id, algorithm, centroid, top_terms, \
         coherence_score, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(provenance_id)
    .bind(algorithm)
    .bind(centroid)
    .bind(top_terms)
    .bind(coherence_score)
    .bind(Utc::now().to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn link_document<'e, E>(
    executor: E,
    cluster_id: &str,
    document_id: &str,
    similarity_to_centroid: f64,
    is_noise: bool,
) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO cluster_documents (cluster_id, document_id, similarity_to_centroid, is_noise) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(cluster_id)
    .bind(document_id)
    .bind(similarity_to_centroid)
    .bind(is_noise)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<ClusterRow>, StorageError> {
    let rows = sqlx::query_as("SELECT * FROM clusters ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn last_run_at(pool: &SqlitePool) -> Result<Option<chrono::DateTime<Utc>>, StorageError> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT created_at FROM clusters ORDER BY created_at DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;
    Ok(row.and_then(|(s,)| chrono::DateTime::parse_from_rfc3339(&s).ok().map(|t| t.with_timezone(&Utc))))
}

pub async fn complete_document_count(pool: &SqlitePool) -> Result<i64, StorageError> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents WHERE status = 'complete'")
        .fetch_one(pool)
        .await?;
    Ok(n)
}
