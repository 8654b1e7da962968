//! End-to-end pipeline behavior (spec §8 scenarios 1-3): claim atomicity,
//! a full pending-to-complete run, cascade delete, and the fail/retry cycle.

mod support;

use provgraph::external::OcrMode;
use provgraph::ingestion::pipeline::{PipelineClients, PipelineOptions};
use provgraph::ingestion::{batch, claim, scan};
use provgraph::storage::documents::{self, DocumentStatus};
use provgraph::storage::{chunks, embeddings};

fn options() -> PipelineOptions {
    PipelineOptions { ocr_mode: OcrMode::Balanced, extraction_schema: None }
}

#[tokio::test]
async fn claim_pending_is_atomic_and_oldest_first() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();

    let a = fixture.write_file("a.txt", "first document").await;
    let b = fixture.write_file("b.txt", "second document").await;
    scan::scan_file(pool, &a).await.unwrap();
    scan::scan_file(pool, &b).await.unwrap();

    let first_wave = documents::claim_pending(pool, 1).await.unwrap();
    assert_eq!(first_wave.len(), 1);
    assert_eq!(first_wave[0].status(), DocumentStatus::Processing);

    // The other document is still pending, and a second claim of width 1
    // picks it up without re-claiming the first.
    let second_wave = documents::claim_pending(pool, 1).await.unwrap();
    assert_eq!(second_wave.len(), 1);
    assert_ne!(second_wave[0].id, first_wave[0].id);

    let third_wave = documents::claim_pending(pool, 10).await.unwrap();
    assert!(third_wave.is_empty(), "nothing left pending to claim");
}

#[tokio::test]
async fn full_pipeline_run_reaches_complete_with_chunks_and_embeddings() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();
    let path = fixture
        .write_file("doc.txt", "The quick brown fox jumps over the lazy dog.\n\nA second paragraph follows.")
        .await;
    scan::scan_file(pool, &path).await.unwrap();

    let ocr = support::FakeOcrClient::new();
    let embedding = support::FakeEmbeddingClient;
    let clients = PipelineClients { ocr: &ocr, embedding: &embedding, vision: None };

    let result = batch::process_pending(pool, &fixture.images_dir(), &fixture.config, &options(), &clients)
        .await
        .unwrap();

    assert_eq!(result.processed, 1);
    assert_eq!(result.failed, 0);
    assert!(result.reports[0].succeeded);
    assert!(result.reports[0].post_processing_errors.is_empty());

    let document_id = &result.reports[0].document_id;
    let doc = documents::get_by_id(pool, document_id).await.unwrap().unwrap();
    assert_eq!(doc.status(), DocumentStatus::Complete);

    let doc_chunks = chunks::list_by_document(pool, document_id).await.unwrap();
    assert!(!doc_chunks.is_empty());
    for chunk in &doc_chunks {
        assert_eq!(chunk.embedding_status, "complete");
        assert!(embeddings::get_by_chunk(pool, &chunk.id).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn cascade_delete_removes_every_derived_row() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();
    let path = fixture.write_file("doc.txt", "Cascade delete should remove every derived artifact.").await;
    scan::scan_file(pool, &path).await.unwrap();

    let ocr = support::FakeOcrClient::new();
    let embedding = support::FakeEmbeddingClient;
    let clients = PipelineClients { ocr: &ocr, embedding: &embedding, vision: None };
    let result = batch::process_pending(pool, &fixture.images_dir(), &fixture.config, &options(), &clients)
        .await
        .unwrap();
    let document_id = result.reports[0].document_id.clone();

    let doc_chunks = chunks::list_by_document(pool, &document_id).await.unwrap();
    assert!(!doc_chunks.is_empty());
    let vector_ids: Vec<String> = {
        let mut ids = Vec::new();
        for chunk in &doc_chunks {
            if let Some(e) = embeddings::get_by_chunk(pool, &chunk.id).await.unwrap() {
                ids.push(e.vector_id);
            }
        }
        ids
    };
    assert!(!vector_ids.is_empty());

    documents::delete_cascade(pool, &document_id).await.unwrap();

    assert!(documents::get_by_id(pool, &document_id).await.unwrap().is_none());
    assert!(chunks::list_by_document(pool, &document_id).await.unwrap().is_empty());
    for vector_id in &vector_ids {
        assert!(provgraph::storage::vector::get(pool, vector_id).await.unwrap().is_none());
    }
    let (fts_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks_fts WHERE document_id = ?")
        .bind(&document_id)
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(fts_count, 0);
}

#[tokio::test]
async fn fail_then_retry_then_process_pending_completes_with_no_orphans() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();
    let path = fixture.write_file("doc.txt", "This document will fail once before succeeding.").await;
    scan::scan_file(pool, &path).await.unwrap();

    let ocr = support::FakeOcrClient::new();
    ocr.set_fail(true);
    let embedding = support::FakeEmbeddingClient;
    let clients = PipelineClients { ocr: &ocr, embedding: &embedding, vision: None };

    let first = batch::process_pending(pool, &fixture.images_dir(), &fixture.config, &options(), &clients)
        .await
        .unwrap();
    assert_eq!(first.failed, 1);
    let document_id = first.reports[0].document_id.clone();
    let doc = documents::get_by_id(pool, &document_id).await.unwrap().unwrap();
    assert_eq!(doc.status(), DocumentStatus::Failed);
    // Cleanup already ran: no chunks survive the failed attempt.
    assert!(chunks::list_by_document(pool, &document_id).await.unwrap().is_empty());

    claim::retry_failed(pool, &document_id).await.unwrap();
    let doc = documents::get_by_id(pool, &document_id).await.unwrap().unwrap();
    assert_eq!(doc.status(), DocumentStatus::Pending);

    ocr.set_fail(false);
    let second = batch::process_pending(pool, &fixture.images_dir(), &fixture.config, &options(), &clients)
        .await
        .unwrap();
    assert_eq!(second.processed, 1);
    assert_eq!(second.failed, 0);

    let doc = documents::get_by_id(pool, &document_id).await.unwrap().unwrap();
    assert_eq!(doc.status(), DocumentStatus::Complete);
    assert!(!chunks::list_by_document(pool, &document_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn retrying_a_document_that_is_not_failed_is_a_no_op() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();
    let path = fixture.write_file("doc.txt", "Never fails.").await;
    scan::scan_file(pool, &path).await.unwrap();

    let ocr = support::FakeOcrClient::new();
    let embedding = support::FakeEmbeddingClient;
    let clients = PipelineClients { ocr: &ocr, embedding: &embedding, vision: None };
    let result = batch::process_pending(pool, &fixture.images_dir(), &fixture.config, &options(), &clients)
        .await
        .unwrap();
    let document_id = result.reports[0].document_id.clone();

    claim::retry_failed(pool, &document_id).await.unwrap();
    let doc = documents::get_by_id(pool, &document_id).await.unwrap().unwrap();
    assert_eq!(doc.status(), DocumentStatus::Complete);
}
