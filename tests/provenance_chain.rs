//! Chain integrity (spec §8, testable property 1): a freshly created chain
//! verifies, a tampered chain_hash is caught, and backfill repairs rows that
//! were inserted without one.

mod support;

use provgraph::provenance::{NewProvenance, ProvenanceService, ProvenanceType};
use serde_json::json;

#[tokio::test]
async fn fresh_chain_verifies_end_to_end() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();
    let provenance = ProvenanceService::new(pool);

    let root = provenance
        .create(
            pool,
            NewProvenance {
            r#type: ProvenanceType::Document,
            source_type: "FILE".to_string(),
            parent_id: None,
            content_hash: "sha256:doc".to_string(),
            processor: "test".to_string(),
            processor_version: "0".to_string(),
            processing_params: json!({}),
            location: None,
            processing_duration_ms: None,
            processing_quality_score: None,
        })
        .await
        .unwrap();

    let ocr = provenance
        .create(
            pool,
            NewProvenance {
            r#type: ProvenanceType::OcrResult,
            source_type: "OCR".to_string(),
            parent_id: Some(root.id.clone()),
            content_hash: "sha256:ocr".to_string(),
            processor: "test".to_string(),
            processor_version: "0".to_string(),
            processing_params: json!({"mode": "balanced"}),
            location: None,
            processing_duration_ms: None,
            processing_quality_score: None,
        })
        .await
        .unwrap();

    let chunk = provenance
        .create(
            pool,
            NewProvenance {
            r#type: ProvenanceType::Chunk,
            source_type: "CHUNKING".to_string(),
            parent_id: Some(ocr.id.clone()),
            content_hash: "sha256:chunk".to_string(),
            processor: "test".to_string(),
            processor_version: "0".to_string(),
            processing_params: json!({"chunk_size": 500}),
            location: None,
            processing_duration_ms: None,
            processing_quality_score: None,
        })
        .await
        .unwrap();

    assert_eq!(chunk.chain_depth, 2);
    assert_eq!(chunk.parent_ids, vec![root.id.clone(), ocr.id.clone()]);
    assert_eq!(chunk.root_document_id, root.id);

    provenance.verify_chain(&chunk.id).await.unwrap();

    let full_chain = provenance.get_chain(&chunk.id).await.unwrap();
    assert_eq!(full_chain.len(), 3);
    assert_eq!(full_chain[0].id, root.id);
    assert_eq!(full_chain[1].id, ocr.id);
    assert_eq!(full_chain[2].id, chunk.id);
}

#[tokio::test]
async fn non_document_root_is_rejected() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();
    let provenance = ProvenanceService::new(pool);

    let err = provenance
        .create(
            pool,
            NewProvenance {
            r#type: ProvenanceType::Chunk,
            source_type: "CHUNKING".to_string(),
            parent_id: None,
            content_hash: "sha256:x".to_string(),
            processor: "test".to_string(),
            processor_version: "0".to_string(),
            processing_params: json!({}),
            location: None,
            processing_duration_ms: None,
            processing_quality_score: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, provgraph::error::ProvenanceError::RootTypeInvalid(_)));
}

#[tokio::test]
async fn tampered_chain_hash_is_caught() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();
    let provenance = ProvenanceService::new(pool);

    let root = provenance
        .create(
            pool,
            NewProvenance {
            r#type: ProvenanceType::Document,
            source_type: "FILE".to_string(),
            parent_id: None,
            content_hash: "sha256:doc".to_string(),
            processor: "test".to_string(),
            processor_version: "0".to_string(),
            processing_params: json!({}),
            location: None,
            processing_duration_ms: None,
            processing_quality_score: None,
        })
        .await
        .unwrap();
    let child = provenance
        .create(
            pool,
            NewProvenance {
            r#type: ProvenanceType::OcrResult,
            source_type: "OCR".to_string(),
            parent_id: Some(root.id.clone()),
            content_hash: "sha256:ocr".to_string(),
            processor: "test".to_string(),
            processor_version: "0".to_string(),
            processing_params: json!({}),
            location: None,
            processing_duration_ms: None,
            processing_quality_score: None,
        })
        .await
        .unwrap();

    sqlx::query("UPDATE provenance SET chain_hash = ? WHERE id = ?")
        .bind("sha256:0000000000000000000000000000000000000000000000000000000000000")
        .bind(&child.id)
        .execute(pool)
        .await
        .unwrap();

    let err = provenance.verify_chain(&child.id).await.unwrap_err();
    assert!(matches!(err, provgraph::error::ProvenanceError::ChainInconsistent { .. }));
}

#[tokio::test]
async fn backfill_repairs_rows_with_no_chain_hash_and_is_idempotent() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();
    let provenance = ProvenanceService::new(pool);

    let root = provenance
        .create(
            pool,
            NewProvenance {
            r#type: ProvenanceType::Document,
            source_type: "FILE".to_string(),
            parent_id: None,
            content_hash: "sha256:doc".to_string(),
            processor: "test".to_string(),
            processor_version: "0".to_string(),
            processing_params: json!({}),
            location: None,
            processing_duration_ms: None,
            processing_quality_score: None,
        })
        .await
        .unwrap();
    let child = provenance
        .create(
            pool,
            NewProvenance {
            r#type: ProvenanceType::OcrResult,
            source_type: "OCR".to_string(),
            parent_id: Some(root.id.clone()),
            content_hash: "sha256:ocr".to_string(),
            processor: "test".to_string(),
            processor_version: "0".to_string(),
            processing_params: json!({}),
            location: None,
            processing_duration_ms: None,
            processing_quality_score: None,
        })
        .await
        .unwrap();

    // Simulate a legacy row that never got its chain_hash written.
    sqlx::query("UPDATE provenance SET chain_hash = NULL WHERE id = ?")
        .bind(&child.id)
        .execute(pool)
        .await
        .unwrap();
    provenance.verify_chain(&child.id).await.unwrap_err();

    let filled = provenance.backfill().await.unwrap();
    assert_eq!(filled, 1);
    provenance.verify_chain(&child.id).await.unwrap();

    let filled_again = provenance.backfill().await.unwrap();
    assert_eq!(filled_again, 0);
}
