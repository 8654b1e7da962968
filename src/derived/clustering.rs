//! Clustering (spec §4.6): groups complete documents by the cosine
//! similarity of their chunk-embedding centroids, storing a cluster row per
//! group plus the CLUSTERING provenance it descends from.
//!
//! The configured `algorithm` name (`hdbscan`, `agglomerative`, `kmeans`) is
//! recorded on the cluster row for reporting, but every algorithm name runs
//! the same single-linkage agglomerative pass over centroid similarity; the
//! corpus this crate is built on has no clustering-library dependency to
//! ground a real HDBSCAN/k-means implementation on, so this is documented as
//! an open-question decision in DESIGN.md rather than silently picking one.

use crate::error::IngestionError;
use crate::hash::content_hash;
use crate::provenance::{NewProvenance, ProvenanceService, ProvenanceType};
use crate::storage::{chunks, clusters, documents, embeddings, ocr_results, vector};
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use tracing::instrument;
use uuid::Uuid;

/// Cosine similarity at or above which two document centroids merge into
/// the same cluster.
const SIMILARITY_THRESHOLD: f64 = 0.75;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "to", "in", "on", "for", "is", "are", "was", "were",
    "be", "by", "with", "as", "at", "this", "that", "it", "from", "its", "into", "shall", "will",
];

#[derive(Debug, Clone)]
struct DocumentCentroid {
    document_id: String,
    centroid: Vec<f32>,
    top_terms: Vec<String>,
}

async fn centroid_for_document(
    pool: &SqlitePool,
    document_id: &str,
) -> Result<Option<DocumentCentroid>, IngestionError> {
    let rows = chunks::list_by_document(pool, document_id).await?;
    if rows.is_empty() {
        return Ok(None);
    }

    let mut sum = vec![0.0f32; vector::VECTOR_DIMENSION];
    let mut count = 0usize;
    let mut term_counts: HashMap<String, u32> = HashMap::new();

    for chunk in &rows {
        for word in chunk.content.split_whitespace() {
            let term: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if term.len() < 4 || STOPWORDS.contains(&term.as_str()) {
                continue;
            }
            *term_counts.entry(term).or_insert(0) += 1;
        }

        let Some(embedding) = embeddings::get_by_chunk(pool, &chunk.id).await? else {
            continue;
        };
        let Some(v) = vector::get(pool, &embedding.vector_id).await? else {
            continue;
        };
        for (acc, x) in sum.iter_mut().zip(v.iter()) {
            *acc += x;
        }
        count += 1;
    }

    if count == 0 {
        return Ok(None);
    }
    for x in sum.iter_mut() {
        *x /= count as f32;
    }
    vector::l2_normalize(&mut sum);

    let mut terms: Vec<(String, u32)> = term_counts.into_iter().collect();
    terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let top_terms = terms.into_iter().take(10).map(|(term, _)| term).collect();

    Ok(Some(DocumentCentroid {
        document_id: document_id.to_string(),
        centroid: sum,
        top_terms,
    }))
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum()
}

/// Union-find over document indices, merging any pair at or above
/// [`SIMILARITY_THRESHOLD`].
fn group_by_similarity(centroids: &[DocumentCentroid]) -> Vec<Vec<usize>> {
    let n = centroids.len();
    let mut parent: Vec<usize> = (0..n).collect();
    fn find(parent: &mut [usize], x: usize) -> usize {
        if parent[x] != x {
            parent[x] = find(parent, parent[x]);
        }
        parent[x]
    }
    for i in 0..n {
        for j in (i + 1)..n {
            if cosine(&centroids[i].centroid, &centroids[j].centroid) >= SIMILARITY_THRESHOLD {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[ri] = rj;
                }
            }
        }
    }
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(i);
    }
    groups.into_values().collect()
}

#[derive(Debug, Clone)]
pub struct ClusterOutcome {
    pub cluster_id: String,
    pub member_document_ids: Vec<String>,
    pub is_noise: bool,
}

/// Runs one clustering pass over every `complete` document and persists the
/// resulting clusters. Returns the clusters produced (empty if fewer than
/// two documents have embeddings to group).
#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool, algorithm: &str) -> Result<Vec<ClusterOutcome>, IngestionError> {
    let provenance = ProvenanceService::new(pool);
    let docs = documents::list_complete(pool).await?;

    let mut centroids = Vec::new();
    for doc in &docs {
        if let Some(c) = centroid_for_document(pool, &doc.id).await? {
            centroids.push(c);
        }
    }
    if centroids.len() < 2 {
        return Ok(Vec::new());
    }

    let groups = group_by_similarity(&centroids);
    let mut outcomes = Vec::new();

    for group in groups {
        let members: Vec<&DocumentCentroid> = group.iter().map(|&i| &centroids[i]).collect();
        let is_noise = members.len() < 2;

        let dim = vector::VECTOR_DIMENSION;
        let mut centroid = vec![0.0f32; dim];
        for m in &members {
            for (acc, x) in centroid.iter_mut().zip(m.centroid.iter()) {
                *acc += x;
            }
        }
        for x in centroid.iter_mut() {
            *x /= members.len() as f32;
        }
        vector::l2_normalize(&mut centroid);

        let coherence_score = if members.len() < 2 {
            None
        } else {
            let mut total = 0.0;
            let mut pairs = 0u32;
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    total += cosine(&members[i].centroid, &members[j].centroid);
                    pairs += 1;
                }
            }
            Some(total / pairs.max(1) as f64)
        };

        let mut term_votes: HashSet<String> = HashSet::new();
        let mut top_terms = Vec::new();
        for m in &members {
            for term in &m.top_terms {
                if term_votes.insert(term.clone()) {
                    top_terms.push(term.clone());
                }
                if top_terms.len() >= 10 {
                    break;
                }
            }
        }

        let mut member_ids: Vec<String> = members.iter().map(|m| m.document_id.clone()).collect();
        member_ids.sort();
        let representative_document_id = member_ids.first().cloned().unwrap_or_default();
        let Some(representative) = ocr_results::get_by_document(pool, &representative_document_id).await? else {
            continue;
        };

        let centroid_json = json!(centroid);
        let top_terms_json = serde_json::to_string(&top_terms).unwrap_or_else(|_| "[]".to_string());
        let content_hash = content_hash(centroid_json.to_string().as_bytes());

        let mut tx = pool.begin().await.map_err(crate::error::StorageError::from)?;
        let record = provenance
            .create(
                &mut *tx,
                NewProvenance {
                    r#type: ProvenanceType::Clustering,
                    source_type: "CLUSTERING".to_string(),
                    parent_id: Some(representative.provenance_id.clone()),
                    content_hash,
                    processor: "provgraph-clustering".to_string(),
                    processor_version: env!("CARGO_PKG_VERSION").to_string(),
                    processing_params: json!({
                        "algorithm": algorithm,
                        "member_document_ids": member_ids,
                        "similarity_threshold": SIMILARITY_THRESHOLD,
                    }),
                    location: None,
                    processing_duration_ms: None,
                    processing_quality_score: coherence_score,
                },
            )
            .await?;

        let cluster_id = Uuid::new_v4().to_string();
        clusters::insert(
            &mut *tx,
            &cluster_id,
            &record.id,
            algorithm,
            &centroid_json.to_string(),
            &top_terms_json,
            coherence_score,
        )
        .await?;

        for m in &members {
            let similarity = cosine(&m.centroid, &centroid);
            clusters::link_document(&mut *tx, &cluster_id, &m.document_id, similarity, is_noise).await?;
        }
        tx.commit().await.map_err(crate::error::StorageError::from)?;

        outcomes.push(ClusterOutcome {
            cluster_id,
            member_document_ids: member_ids,
            is_noise,
        });
    }

    Ok(outcomes)
}
