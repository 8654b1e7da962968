//! Full-text search over the FTS5 virtual tables (spec §4.4, BM25 side).
//!
//! SQLite's `bm25()` auxiliary function returns a more-negative-is-better
//! score; every query here negates it so results satisfy spec §4.4's
//! "non-negative, unbounded" contract (DESIGN.md, Open Question decision 4).

use crate::error::StorageError;
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtsSource {
    Chunk,
    Vlm,
    Extraction,
}

impl FtsSource {
    fn table(self) -> &'static str {
        match self {
            Self::Chunk => "chunks_fts",
            Self::Vlm => "vlm_fts",
            Self::Extraction => "extractions_fts",
        }
    }

    fn id_column(self) -> &'static str {
        match self {
            Self::Chunk => "chunk_id",
            Self::Vlm => "vlm_id",
            Self::Extraction => "extraction_id",
        }
    }

    fn text_column(self) -> &'static str {
        match self {
            Self::Chunk => "content",
            Self::Vlm => "description",
            Self::Extraction => "payload",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FtsMatch {
    pub source: FtsSource,
    pub id: String,
    pub document_id: String,
    pub score: f64,
}

pub async fn index_chunk<'e, E>(
    executor: E,
    chunk_id: &str,
    document_id: &str,
    content: &str,
) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query("INSERT INTO chunks_fts(chunk_id, document_id, content) VALUES (?, ?, ?)")
        .bind(chunk_id)
        .bind(document_id)
        .bind(content)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn index_vlm<'e, E>(
    executor: E,
    vlm_id: &str,
    image_id: &str,
    document_id: &str,
    description: &str,
) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO vlm_fts(vlm_id, image_id, document_id, description) VALUES (?, ?, ?, ?)",
    )
    .bind(vlm_id)
    .bind(image_id)
    .bind(document_id)
    .bind(description)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn index_extraction<'e, E>(
    executor: E,
    extraction_id: &str,
    document_id: &str,
    payload: &str,
) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query("INSERT INTO extractions_fts(extraction_id, document_id, payload) VALUES (?, ?, ?)")
        .bind(extraction_id)
        .bind(document_id)
        .bind(payload)
        .execute(executor)
        .await?;
    Ok(())
}

/// Queries one FTS table for `query`, returning up to `limit` matches
/// ordered by descending (negated) BM25 score.
pub async fn search_one(
    pool: &SqlitePool,
    source: FtsSource,
    query: &str,
    limit: u32,
) -> Result<Vec<FtsMatch>, StorageError> {
    let table = source.table();
    let id_col = source.id_column();
    let text_col = source.text_column();
    let sql = format!(
        "SELECT {id_col}, document_id, -bm25({table}) AS score \
         FROM {table} WHERE {text_col} MATCH ? ORDER BY score DESC LIMIT ?"
    );
    let rows: Vec<(String, String, f64)> = sqlx::query_as(&sql)
        .bind(query)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(id, document_id, score)| FtsMatch {
            source,
            id,
            document_id,
            score,
        })
        .collect())
}

/// Searches all three FTS sources and merges results, each contributing its
/// own score scale (field weighting between sources happens at the
/// retrieval layer, not here).
pub async fn search_all(
    pool: &SqlitePool,
    query: &str,
    limit_per_source: u32,
) -> Result<Vec<FtsMatch>, StorageError> {
    let mut all = Vec::new();
    for source in [FtsSource::Chunk, FtsSource::Vlm, FtsSource::Extraction] {
        all.extend(search_one(pool, source, query, limit_per_source).await?);
    }
    Ok(all)
}

/// Rebuilds an FTS table from its content table. Called after a batch makes
/// non-zero ingestion progress (spec §4.3).
pub async fn rebuild(pool: &SqlitePool, source: FtsSource) -> Result<(), StorageError> {
    let table = source.table();
    sqlx::query(&format!("INSERT INTO {table}({table}) VALUES('rebuild')"))
        .execute(pool)
        .await?;
    Ok(())
}
