//! Document comparison (spec §4.6): a text diff and a structural diff
//! between two complete documents, persisted once per (unordered) pair.
//!
//! The documents are ordered lexicographically by id before comparing so
//! the stored diff, content hash, and COMPARISON provenance are independent
//! of call order (`compare(a, b) == compare(b, a)`).

use crate::error::IngestionError;
use crate::hash::{canonical_json, content_hash};
use crate::provenance::{NewProvenance, ProvenanceService, ProvenanceType};
use crate::storage::{chunks, comparisons, documents, ocr_results};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::instrument;
use uuid::Uuid;

/// Longest-common-subsequence line diff, reported the way a unified diff
/// groups runs of equal/inserted/deleted lines.
fn line_diff(a: &[&str], b: &[&str]) -> (f64, Vec<Value>) {
    let n = a.len();
    let m = b.len();
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    let mut matches = 0u32;
    while i < n && j < m {
        if a[i] == b[j] {
            ops.push(json!({ "op": "equal", "line": a[i] }));
            matches += 1;
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            ops.push(json!({ "op": "delete", "line": a[i] }));
            i += 1;
        } else {
            ops.push(json!({ "op": "insert", "line": b[j] }));
            j += 1;
        }
    }
    while i < n {
        ops.push(json!({ "op": "delete", "line": a[i] }));
        i += 1;
    }
    while j < m {
        ops.push(json!({ "op": "insert", "line": b[j] }));
        j += 1;
    }

    let total = (n + m).max(1) as f64;
    let ratio = (2 * matches) as f64 / total;
    (ratio, ops)
}

async fn structural_summary(pool: &SqlitePool, document_id: &str) -> Result<Value, IngestionError> {
    let stats = chunks::stats_for_document(pool, document_id).await?;
    let rows = chunks::list_by_document(pool, document_id).await?;
    let heading_sections: Vec<String> = rows
        .iter()
        .filter_map(|c| c.section_path.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    Ok(json!({
        "chunk_count": stats.chunk_count,
        "atomic_count": stats.atomic_count,
        "average_chunk_size": stats.average_chunk_size,
        "section_count": heading_sections.len(),
        "sections": heading_sections,
    }))
}

/// Compares two complete documents, reusing an existing comparison row for
/// the same unordered pair if one already exists.
#[instrument(skip(pool))]
pub async fn compare(
    pool: &SqlitePool,
    document_a_id: &str,
    document_b_id: &str,
) -> Result<comparisons::ComparisonRow, IngestionError> {
    let (lo, hi) = if document_a_id <= document_b_id {
        (document_a_id, document_b_id)
    } else {
        (document_b_id, document_a_id)
    };

    if let Some(existing) = comparisons::find_existing(pool, lo, hi).await? {
        return Ok(existing);
    }

    let _doc_a = documents::get_by_id(pool, lo)
        .await?
        .ok_or_else(|| IngestionError::DocumentNotFound(lo.to_string()))?;
    let doc_b = documents::get_by_id(pool, hi)
        .await?
        .ok_or_else(|| IngestionError::DocumentNotFound(hi.to_string()))?;

    let ocr_a = ocr_results::get_by_document(pool, lo)
        .await?
        .ok_or_else(|| IngestionError::DocumentNotFound(lo.to_string()))?;
    let text_b = ocr_results::get_by_document(pool, hi).await?.map(|r| r.text).unwrap_or_default();
    let lines_a: Vec<&str> = ocr_a.text.lines().collect();
    let lines_b: Vec<&str> = text_b.lines().collect();
    let (ratio, ops) = line_diff(&lines_a, &lines_b);
    let text_diff = json!({ "ratio": ratio, "chunks": ops });

    let structural_diff = json!({
        "a": structural_summary(pool, lo).await?,
        "b": structural_summary(pool, hi).await?,
    });

    let combined = json!({ "text_diff": text_diff, "structural_diff": structural_diff });
    let content_hash_value = content_hash(canonical_json(&combined).as_bytes());

    let provenance = ProvenanceService::new(pool);
    let mut tx = pool.begin().await.map_err(crate::error::StorageError::from)?;
    let record = provenance
        .create(
            &mut *tx,
            NewProvenance {
                r#type: ProvenanceType::Comparison,
                source_type: "COMPARISON".to_string(),
                parent_id: Some(ocr_a.provenance_id.clone()),
                content_hash: content_hash_value.clone(),
                processor: "provgraph-comparison".to_string(),
                processor_version: env!("CARGO_PKG_VERSION").to_string(),
                processing_params: json!({ "other_document_id": doc_b.id }),
                location: None,
                processing_duration_ms: None,
                processing_quality_score: None,
            },
        )
        .await?;

    let id = Uuid::new_v4().to_string();
    comparisons::insert(
        &mut *tx,
        &id,
        &record.id,
        lo,
        hi,
        &text_diff.to_string(),
        &structural_diff.to_string(),
        &content_hash_value,
    )
    .await?;
    tx.commit().await.map_err(crate::error::StorageError::from)?;

    comparisons::get(pool, &id)
        .await?
        .ok_or_else(|| IngestionError::Storage(crate::error::StorageError::Other("comparison row vanished after insert".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_lines_yield_ratio_one() {
        let a = vec!["one", "two", "three"];
        let (ratio, _) = line_diff(&a, &a);
        assert_eq!(ratio, 1.0);
    }

    #[test]
    fn disjoint_lines_yield_ratio_zero() {
        let a = vec!["one"];
        let b = vec!["two"];
        let (ratio, _) = line_diff(&a, &b);
        assert_eq!(ratio, 0.0);
    }
}
