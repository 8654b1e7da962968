//! Reciprocal-rank fusion of the vector and BM25 modes (spec §4.4
//! "Hybrid"): `1 / (k + rank)` per method, k=60, tie-broken by vector
//! similarity, capped at the requested limit.

use crate::error::RetrievalError;
use crate::external::EmbeddingClient;
use crate::retrieval::bm25_search::{self, FieldWeights};
use crate::retrieval::vector_search::{self, VectorFilter};
use crate::retrieval::{RetrievedHit, Score, Source};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::instrument;

const RRF_K: f64 = 60.0;

#[instrument(skip(pool, embedder, vector_filter, field_weights))]
pub async fn search(
    pool: &SqlitePool,
    embedder: &dyn EmbeddingClient,
    query: &str,
    limit: u32,
    vector_filter: &VectorFilter,
    field_weights: FieldWeights,
) -> Result<Vec<RetrievedHit>, RetrievalError> {
    // Over-fetch each method so fusion has enough candidates to rank past
    // the requested limit before truncating.
    let fan_out = (limit * 4).max(limit).max(20);

    let vector_hits = vector_search::search(pool, embedder, query, fan_out, vector_filter).await?;
    let bm25_hits = bm25_search::search(pool, query, fan_out, field_weights).await?;

    let mut fused: HashMap<SourceKey, FusedEntry> = HashMap::new();

    for (rank, hit) in vector_hits.iter().enumerate() {
        let similarity = match hit.score {
            Score::Similarity(s) => s,
            _ => 0.0,
        };
        let entry = fused.entry(SourceKey::from(&hit.source)).or_insert_with(|| FusedEntry {
            hit: hit.clone(),
            fused_score: 0.0,
            vector_similarity: None,
            bm25: None,
        });
        entry.fused_score += 1.0 / (RRF_K + (rank as f64 + 1.0));
        entry.vector_similarity = Some(similarity);
    }

    for (rank, hit) in bm25_hits.iter().enumerate() {
        let bm25 = match hit.score {
            Score::Bm25(s) => s,
            _ => 0.0,
        };
        let entry = fused.entry(SourceKey::from(&hit.source)).or_insert_with(|| FusedEntry {
            hit: hit.clone(),
            fused_score: 0.0,
            vector_similarity: None,
            bm25: None,
        });
        entry.fused_score += 1.0 / (RRF_K + (rank as f64 + 1.0));
        entry.bm25 = Some(bm25);
    }

    let mut results: Vec<RetrievedHit> = fused
        .into_values()
        .map(|entry| {
            let mut hit = entry.hit;
            hit.score = Score::Fused {
                fused: entry.fused_score,
                vector_similarity: entry.vector_similarity,
                bm25: entry.bm25,
            };
            hit
        })
        .collect();

    results.sort_by(|a, b| {
        let (a_fused, a_sim) = fused_and_similarity(a);
        let (b_fused, b_sim) = fused_and_similarity(b);
        b_fused
            .partial_cmp(&a_fused)
            .unwrap()
            .then_with(|| b_sim.partial_cmp(&a_sim).unwrap())
    });
    results.truncate(limit as usize);
    Ok(results)
}

fn fused_and_similarity(hit: &RetrievedHit) -> (f64, f64) {
    match &hit.score {
        Score::Fused { fused, vector_similarity, .. } => (*fused, vector_similarity.unwrap_or(0.0)),
        _ => (hit.score_value(), 0.0),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SourceKey {
    Chunk(String),
    Image(String),
    Extraction(String),
}

impl From<&Source> for SourceKey {
    fn from(s: &Source) -> Self {
        match s {
            Source::Chunk(id) => SourceKey::Chunk(id.clone()),
            Source::Image(id) => SourceKey::Image(id.clone()),
            Source::Extraction(id) => SourceKey::Extraction(id.clone()),
        }
    }
}

struct FusedEntry {
    hit: RetrievedHit,
    fused_score: f64,
    vector_similarity: Option<f64>,
    bm25: Option<f64>,
}
