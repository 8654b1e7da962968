//! Vector similarity search (spec §4.4 "Vector"): embed the query in
//! search-query mode, L2-normalize, and rank by cosine similarity over the
//! stored unit vectors.

use crate::error::RetrievalError;
use crate::external::{EmbeddingClient, TaskType};
use crate::retrieval::RetrievedHit;
use crate::storage::vector;
use sqlx::SqlitePool;
use tracing::instrument;

/// Optional narrowing applied before or after the nearest-neighbor scan.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub document_ids: Option<Vec<String>>,
    pub min_similarity: Option<f64>,
}

#[instrument(skip(pool, embedder, filter))]
pub async fn search(
    pool: &SqlitePool,
    embedder: &dyn EmbeddingClient,
    query: &str,
    limit: u32,
    filter: &VectorFilter,
) -> Result<Vec<RetrievedHit>, RetrievalError> {
    let mut embedded = embedder
        .embed_batch(&[query.to_string()], TaskType::Query)
        .await
        .map_err(RetrievalError::EmbeddingFailed)?;
    let Some(mut query_vector) = embedded.pop() else {
        return Ok(Vec::new());
    };
    vector::l2_normalize(&mut query_vector);

    let vector_id_filter = match &filter.document_ids {
        Some(ids) => Some(vector_id_filter_for_documents(pool, ids).await?),
        None => None,
    };

    let matches = vector::search(
        pool,
        &query_vector,
        limit,
        vector_id_filter.as_deref(),
    )
    .await
    .map_err(RetrievalError::Storage)?;

    let mut hits = Vec::with_capacity(matches.len());
    for m in matches {
        if let Some(min) = filter.min_similarity {
            if m.similarity < min {
                continue;
            }
        }
        if let Some(hit) = crate::retrieval::hit_for_vector_id(pool, &m.vector_id, m.similarity).await? {
            hits.push(hit);
        }
    }
    Ok(hits)
}

/// Resolves a document id set down to the vector ids belonging to any of
/// their chunks, images, or extractions, for use as the similarity search's
/// candidate filter.
async fn vector_id_filter_for_documents(
    pool: &SqlitePool,
    document_ids: &[String],
) -> Result<Vec<String>, RetrievalError> {
    if document_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = document_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT e.vector_id FROM embeddings e \
         LEFT JOIN chunks c ON e.chunk_id = c.id \
         LEFT JOIN images im ON e.image_id = im.id \
         LEFT JOIN extractions x ON e.extraction_id = x.id \
         WHERE c.document_id IN ({placeholders}) \
            OR im.document_id IN ({placeholders}) \
            OR x.document_id IN ({placeholders})"
    );
    let mut q = sqlx::query_as::<_, (String,)>(&sql);
    for _ in 0..3 {
        for id in document_ids {
            q = q.bind(id);
        }
    }
    let rows = q.fetch_all(pool).await.map_err(|e| RetrievalError::Storage(e.into()))?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
