//! Image search (spec §4.4 "Image search"): a keyword filter over structured
//! VLM metadata, or a semantic query against the VLM-embedding subset.

use crate::error::RetrievalError;
use crate::external::EmbeddingClient;
use crate::retrieval::vector_search::VectorFilter;
use crate::retrieval::{vector_search, RetrievedHit, Source};
use crate::storage::images::{self, ImageRow};
use sqlx::SqlitePool;
use tracing::instrument;

#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    pub document_id: Option<String>,
    pub block_type: Option<String>,
    pub page_number: Option<i64>,
    pub description_like: Option<String>,
}

/// Structured metadata search: no ranking beyond recency, matches spec
/// §4.4's "keyword filter over structured VLM metadata".
#[instrument(skip(pool, filter))]
pub async fn search_keyword(
    pool: &SqlitePool,
    filter: &KeywordFilter,
    limit: u32,
    offset: u32,
) -> Result<Vec<ImageRow>, RetrievalError> {
    images::search_keyword(
        pool,
        filter.document_id.as_deref(),
        filter.block_type.as_deref(),
        filter.page_number,
        filter.description_like.as_deref(),
        limit,
        offset,
    )
    .await
    .map_err(RetrievalError::Storage)
}

/// Semantic search restricted to the VLM-embedding subset (`image_id IS NOT
/// NULL`, spec §4.4), with offset/limit pagination applied after ranking.
#[instrument(skip(pool, embedder))]
pub async fn search_semantic(
    pool: &SqlitePool,
    embedder: &dyn EmbeddingClient,
    query: &str,
    limit: u32,
    offset: u32,
) -> Result<Vec<RetrievedHit>, RetrievalError> {
    let fan_out = limit + offset;
    let filter = VectorFilter::default();
    let hits = vector_search::search(pool, embedder, query, fan_out.max(limit), &filter).await?;

    let image_hits: Vec<RetrievedHit> = hits
        .into_iter()
        .filter(|h| matches!(h.source, Source::Image(_)))
        .skip(offset as usize)
        .take(limit as usize)
        .collect();
    Ok(image_hits)
}
