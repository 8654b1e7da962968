//! BM25 full-text search (spec §4.4 "BM25"): tokenizes the query and
//! searches `chunks_fts`, `vlm_fts`, and `extractions_fts`, each weighted
//! independently before merging.

use crate::error::RetrievalError;
use crate::retrieval::{Location, RetrievedHit, Score, Source};
use crate::storage::fts::{self, FtsSource};
use crate::storage::{chunks, extractions, images};
use sqlx::SqlitePool;
use tracing::instrument;

/// Per-source field weights applied after SQLite's own `bm25()` score
/// (spec §4.4 "each with its own field weight").
#[derive(Debug, Clone, Copy)]
pub struct FieldWeights {
    pub chunk: f64,
    pub vlm: f64,
    pub extraction: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            chunk: 1.0,
            vlm: 0.75,
            extraction: 0.6,
        }
    }
}

#[instrument(skip(pool, weights))]
pub async fn search(
    pool: &SqlitePool,
    query: &str,
    limit: u32,
    weights: FieldWeights,
) -> Result<Vec<RetrievedHit>, RetrievalError> {
    let fts_query = escape_fts_query(query);
    if fts_query.is_empty() {
        return Ok(Vec::new());
    }

    let mut hits = Vec::new();
    for source in [FtsSource::Chunk, FtsSource::Vlm, FtsSource::Extraction] {
        let weight = match source {
            FtsSource::Chunk => weights.chunk,
            FtsSource::Vlm => weights.vlm,
            FtsSource::Extraction => weights.extraction,
        };
        let matches = fts::search_one(pool, source, &fts_query, limit)
            .await
            .map_err(RetrievalError::Storage)?;
        for m in matches {
            if let Some(hit) = hit_for_fts_match(pool, source, &m.id, &m.document_id, m.score * weight).await? {
                hits.push(hit);
            }
        }
    }

    hits.sort_by(|a, b| b.score_value().partial_cmp(&a.score_value()).unwrap());
    hits.truncate(limit as usize);
    Ok(hits)
}

/// FTS5 `MATCH` syntax treats bare punctuation and dangling quotes as
/// syntax errors; wraps each token in double quotes so arbitrary user text
/// is always a valid phrase query.
pub fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|tok| format!("\"{}\"", tok.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

async fn hit_for_fts_match(
    pool: &SqlitePool,
    source: FtsSource,
    id: &str,
    document_id: &str,
    score: f64,
) -> Result<Option<RetrievedHit>, RetrievalError> {
    let hit = match source {
        FtsSource::Chunk => {
            let Some(chunk) = chunks::get(pool, id).await.map_err(RetrievalError::Storage)? else {
                return Ok(None);
            };
            RetrievedHit {
                embedding_id: None,
                source: Source::Chunk(chunk.id.clone()),
                document_id: document_id.to_string(),
                score: Score::Bm25(score),
                location: Location {
                    page_number: chunk.page_number,
                    char_start: Some(chunk.char_start),
                    char_end: Some(chunk.char_end),
                    heading_context: chunk.heading_context.clone(),
                },
                snippet: chunk.content,
                provenance: None,
            }
        }
        FtsSource::Vlm => {
            let Some((image_id,)) = sqlx::query_as::<_, (String,)>(
                "SELECT image_id FROM vlm_fts WHERE vlm_id = ?",
            )
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| RetrievalError::Storage(e.into()))?
            else {
                return Ok(None);
            };
            let Some(image) = images::get(pool, &image_id).await.map_err(RetrievalError::Storage)? else {
                return Ok(None);
            };
            RetrievedHit {
                embedding_id: None,
                source: Source::Image(image.id.clone()),
                document_id: document_id.to_string(),
                score: Score::Bm25(score),
                location: Location {
                    page_number: image.page_number,
                    char_start: None,
                    char_end: None,
                    heading_context: image.context_text.clone(),
                },
                snippet: String::new(),
                provenance: None,
            }
        }
        FtsSource::Extraction => {
            let Some(extraction) = extractions::get(pool, id).await.map_err(RetrievalError::Storage)? else {
                return Ok(None);
            };
            RetrievedHit {
                embedding_id: None,
                source: Source::Extraction(extraction.id.clone()),
                document_id: document_id.to_string(),
                score: Score::Bm25(score),
                location: Location::default(),
                snippet: extraction.payload,
                provenance: None,
            }
        }
    };
    Ok(Some(hit))
}
