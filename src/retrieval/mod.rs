//! The hybrid retrieval engine (spec §4.4): vector similarity, BM25
//! full-text search, and their reciprocal-rank fusion, plus image search in
//! keyword and semantic modes.

pub mod bm25_search;
pub mod hybrid;
pub mod image_search;
pub mod vector_search;

use crate::error::RetrievalError;
use crate::provenance::types::ProvenanceRecord;
use crate::provenance::ProvenanceService;
use crate::storage::{chunks, embeddings, extractions, images};
use sqlx::SqlitePool;

/// Which derived entity a hit's embedding/text match belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Chunk(String),
    Image(String),
    Extraction(String),
}

/// Page/offset/heading metadata a UI can use to anchor a hit (spec §4.4
/// "enough location metadata... to anchor a UI").
#[derive(Debug, Clone, Default)]
pub struct Location {
    pub page_number: Option<i64>,
    pub char_start: Option<i64>,
    pub char_end: Option<i64>,
    pub heading_context: Option<String>,
}

/// How a hit was scored. Hybrid results keep the contributing method
/// scores alongside the fused score (spec §4.4 "Hybrid").
#[derive(Debug, Clone)]
pub enum Score {
    Similarity(f64),
    Bm25(f64),
    Fused {
        fused: f64,
        vector_similarity: Option<f64>,
        bm25: Option<f64>,
    },
}

#[derive(Debug, Clone)]
pub struct RetrievedHit {
    pub embedding_id: Option<String>,
    pub source: Source,
    pub document_id: String,
    pub score: Score,
    pub location: Location,
    pub snippet: String,
    pub provenance: Option<Vec<ProvenanceRecord>>,
}

impl RetrievedHit {
    /// Sort key shared by every mode: highest score first.
    pub fn score_value(&self) -> f64 {
        match &self.score {
            Score::Similarity(s) => *s,
            Score::Bm25(s) => *s,
            Score::Fused { fused, .. } => *fused,
        }
    }
}

/// Enriches `hit` with its full provenance chain if requested (spec §4.4
/// "If `include_provenance` is requested...").
pub async fn enrich_provenance(
    pool: &SqlitePool,
    hit: &mut RetrievedHit,
    include_provenance: bool,
) -> Result<(), RetrievalError> {
    if !include_provenance {
        return Ok(());
    }
    let provenance_id = provenance_id_for_source(pool, &hit.source).await?;
    if let Some(provenance_id) = provenance_id {
        let service = ProvenanceService::new(pool);
        let chain = service
            .get_chain(&provenance_id)
            .await
            .map_err(|e| RetrievalError::Storage(crate::error::StorageError::Other(e.to_string())))?;
        hit.provenance = Some(chain);
    }
    Ok(())
}

async fn provenance_id_for_source(pool: &SqlitePool, source: &Source) -> Result<Option<String>, RetrievalError> {
    let id = match source {
        Source::Chunk(id) => chunks::get(pool, id).await.map_err(RetrievalError::Storage)?.map(|c| c.provenance_id),
        Source::Image(id) => images::get(pool, id).await.map_err(RetrievalError::Storage)?.map(|i| i.provenance_id),
        Source::Extraction(id) => extractions::get(pool, id)
            .await
            .map_err(RetrievalError::Storage)?
            .map(|x| x.provenance_id),
    };
    Ok(id)
}

/// Resolves a stored vector id back to a full [`RetrievedHit`] by walking
/// `embeddings` to whichever of chunk/image/extraction it belongs to, and
/// pulling that row's location metadata and snippet text.
pub(crate) async fn hit_for_vector_id(
    pool: &SqlitePool,
    vector_id: &str,
    similarity: f64,
) -> Result<Option<RetrievedHit>, RetrievalError> {
    let Some(embedding) = embeddings::get_by_vector_id(pool, vector_id)
        .await
        .map_err(RetrievalError::Storage)?
    else {
        return Ok(None);
    };

    let hit = if let Some(chunk_id) = &embedding.chunk_id {
        let Some(chunk) = chunks::get(pool, chunk_id).await.map_err(RetrievalError::Storage)? else {
            return Ok(None);
        };
        RetrievedHit {
            embedding_id: Some(embedding.id.clone()),
            source: Source::Chunk(chunk.id.clone()),
            document_id: chunk.document_id.clone(),
            score: Score::Similarity(similarity),
            location: Location {
                page_number: chunk.page_number,
                char_start: Some(chunk.char_start),
                char_end: Some(chunk.char_end),
                heading_context: chunk.heading_context.clone(),
            },
            snippet: chunk.content,
            provenance: None,
        }
    } else if let Some(image_id) = &embedding.image_id {
        let Some(image) = images::get(pool, image_id).await.map_err(RetrievalError::Storage)? else {
            return Ok(None);
        };
        RetrievedHit {
            embedding_id: Some(embedding.id.clone()),
            source: Source::Image(image.id.clone()),
            document_id: image.document_id.clone(),
            score: Score::Similarity(similarity),
            location: Location {
                page_number: image.page_number,
                char_start: None,
                char_end: None,
                heading_context: image.context_text.clone(),
            },
            snippet: embedding.original_text.clone(),
            provenance: None,
        }
    } else if let Some(extraction_id) = &embedding.extraction_id {
        let Some(extraction) = extractions::get(pool, extraction_id)
            .await
            .map_err(RetrievalError::Storage)?
        else {
            return Ok(None);
        };
        RetrievedHit {
            embedding_id: Some(embedding.id.clone()),
            source: Source::Extraction(extraction.id.clone()),
            document_id: extraction.document_id.clone(),
            score: Score::Similarity(similarity),
            location: Location::default(),
            snippet: extraction.payload,
            provenance: None,
        }
    } else {
        return Ok(None);
    };

    Ok(Some(hit))
}
