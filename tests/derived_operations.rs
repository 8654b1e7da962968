//! Clustering and comparison (spec §4.6): grouping by embedding-centroid
//! similarity, and an idempotent, order-independent pairwise diff.

mod support;

use provgraph::derived::{clustering, comparison};
use provgraph::external::OcrMode;
use provgraph::ingestion::pipeline::{PipelineClients, PipelineOptions};
use provgraph::ingestion::{batch, scan};
use provgraph::storage::clusters;

fn options() -> PipelineOptions {
    PipelineOptions { ocr_mode: OcrMode::Balanced, extraction_schema: None }
}

async fn ingest(fixture: &support::Fixture, name: &str, text: &str) -> String {
    let pool = fixture.storage.writer();
    let path = fixture.write_file(name, text).await;
    scan::scan_file(pool, &path).await.unwrap();
    let ocr = support::FakeOcrClient::new();
    let embedding = support::FakeEmbeddingClient;
    let clients = PipelineClients { ocr: &ocr, embedding: &embedding, vision: None };
    let result = batch::process_pending(pool, &fixture.images_dir(), &fixture.config, &options(), &clients)
        .await
        .unwrap();
    assert_eq!(result.failed, 0, "ingestion of {name} must succeed");
    result.reports.into_iter().find(|r| r.succeeded).unwrap().document_id
}

#[tokio::test]
async fn similar_documents_cluster_together_and_the_odd_one_out_is_noise() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();

    let shared_text = "quarterly revenue grew steadily across every region this quarter";
    let doc_a = ingest(&fixture, "a.txt", shared_text).await;
    let doc_b = ingest(&fixture, "b.txt", shared_text).await;
    let doc_c = ingest(
        &fixture,
        "c.txt",
        "volcanic ash plumes disrupted regional air travel for several days",
    )
    .await;

    let outcomes = clustering::run(pool, "agglomerative").await.unwrap();
    assert!(!outcomes.is_empty());

    let matching_group = outcomes
        .iter()
        .find(|o| o.member_document_ids.contains(&doc_a) && o.member_document_ids.contains(&doc_b));
    assert!(matching_group.is_some(), "doc_a and doc_b should land in the same cluster");
    let matching_group = matching_group.unwrap();
    assert!(!matching_group.is_noise);
    assert!(!matching_group.member_document_ids.contains(&doc_c));

    let rows = clusters::list(pool).await.unwrap();
    assert!(!rows.is_empty());
    for row in &rows {
        assert_eq!(row.algorithm, "agglomerative");
    }
}

#[tokio::test]
async fn fewer_than_two_embedded_documents_yields_no_clusters() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();
    ingest(&fixture, "only.txt", "a single lonely document with no peers").await;

    let outcomes = clustering::run(pool, "agglomerative").await.unwrap();
    assert!(outcomes.is_empty());
}

#[tokio::test]
async fn comparison_is_symmetric_and_idempotent() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();
    let doc_a = ingest(&fixture, "a.txt", "line one\nline two\nline three").await;
    let doc_b = ingest(&fixture, "b.txt", "line one\nline two changed\nline three").await;

    let forward = comparison::compare(pool, &doc_a, &doc_b).await.unwrap();
    let backward = comparison::compare(pool, &doc_b, &doc_a).await.unwrap();
    assert_eq!(forward.id, backward.id, "comparing in either order reuses the same row");
    assert_eq!(forward.content_hash, backward.content_hash);

    let rows = provgraph::storage::comparisons::list(pool).await.unwrap();
    assert_eq!(rows.len(), 1, "a second compare() call must not insert a duplicate row");
}
