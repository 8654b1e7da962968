//! Hybrid retrieval (spec §4.4): vector similarity, BM25 full text, their
//! reciprocal-rank fusion, and image search in keyword and semantic modes.

mod support;

use provgraph::external::{EmbeddingClient, OcrMode, TaskType};
use provgraph::ingestion::{batch, scan};
use provgraph::ingestion::pipeline::{PipelineClients, PipelineOptions};
use provgraph::provenance::{NewProvenance, ProvenanceService, ProvenanceType};
use provgraph::retrieval::bm25_search::FieldWeights;
use provgraph::retrieval::image_search::{self, KeywordFilter};
use provgraph::retrieval::vector_search::VectorFilter;
use provgraph::retrieval::{bm25_search, hybrid, vector_search, Source};
use provgraph::storage::embeddings::{self, NewEmbedding};
use provgraph::storage::images::{self, NewImage};
use provgraph::storage::vector;
use serde_json::json;

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
async fn vector_and_bm25_both_favor_the_topically_matching_document() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();

    let fruit_doc = ingest(
        &fixture,
        "fruit.txt",
        "apple orchard harvest apple banana fruit apple orchard basket apple",
    )
    .await;
    let rocket_doc = ingest(
        &fixture,
        "rocket.txt",
        "rocket engine telemetry thruster orbital velocity propulsion rocket fuel",
    )
    .await;

    let embedder = support::FakeEmbeddingClient;
    let vector_hits = vector_search::search(pool, &embedder, "apple orchard fruit", 5, &VectorFilter::default())
        .await
        .unwrap();
    assert!(!vector_hits.is_empty());
    assert_eq!(vector_hits[0].document_id, fruit_doc);

    let bm25_hits = bm25_search::search(pool, "apple orchard fruit", 5, FieldWeights::default())
        .await
        .unwrap();
    assert!(!bm25_hits.is_empty());
    assert_eq!(bm25_hits[0].document_id, fruit_doc);

    let fused = hybrid::search(pool, &embedder, "apple orchard fruit", 5, &VectorFilter::default(), FieldWeights::default())
        .await
        .unwrap();
    assert!(!fused.is_empty());
    assert_eq!(fused[0].document_id, fruit_doc);
    assert_ne!(fused[0].document_id, rocket_doc);
}

#[tokio::test]
async fn vector_filter_narrows_to_requested_documents() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();
    let fruit_doc = ingest(&fixture, "fruit.txt", "apple banana orchard fruit harvest").await;
    let _rocket_doc = ingest(&fixture, "rocket.txt", "rocket engine telemetry thruster orbital").await;

    let embedder = support::FakeEmbeddingClient;
    let filter = VectorFilter { document_ids: Some(vec![fruit_doc.clone()]), min_similarity: None };
    let hits = vector_search::search(pool, &embedder, "rocket engine", 10, &filter).await.unwrap();
    for hit in &hits {
        assert_eq!(hit.document_id, fruit_doc);
    }
}

#[tokio::test]
async fn image_keyword_search_filters_on_structured_metadata() {
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
    let image_provenance = provenance
        .create(
            pool,
            NewProvenance {
            r#type: ProvenanceType::Image,
            source_type: "IMAGE_EXTRACTION".to_string(),
            parent_id: Some(root.id.clone()),
            content_hash: "sha256:img".to_string(),
            processor: "test".to_string(),
            processor_version: "0".to_string(),
            processing_params: json!({}),
            location: None,
            processing_duration_ms: None,
            processing_quality_score: None,
        })
        .await
        .unwrap();

    let image_id = "img-1".to_string();
    images::insert(
        pool,
        &NewImage {
            id: image_id.clone(),
            provenance_id: image_provenance.id.clone(),
            document_id: root.id.clone(),
            file_path: "images/img-1.png".to_string(),
            content_hash: "sha256:imgbytes".to_string(),
            page_number: Some(2),
            block_type: Some("figure".to_string()),
            is_header_footer: false,
            context_text: Some("a diagram of the cooling system".to_string()),
        },
    )
    .await
    .unwrap();
    images::set_vlm_status(pool, &image_id, images::VlmStatus::Complete).await.unwrap();
    provgraph::storage::fts::index_vlm(pool, "vlm-1", &image_id, &root.id, "a diagram of the cooling system")
        .await
        .unwrap();

    let by_page = image_search::search_keyword(
        pool,
        &KeywordFilter { document_id: None, block_type: None, page_number: Some(2), description_like: None },
        10,
        0,
    )
    .await
    .unwrap();
    assert_eq!(by_page.len(), 1);
    assert_eq!(by_page[0].id, image_id);

    let wrong_page = image_search::search_keyword(
        pool,
        &KeywordFilter { document_id: None, block_type: None, page_number: Some(99), description_like: None },
        10,
        0,
    )
    .await
    .unwrap();
    assert!(wrong_page.is_empty());

    let by_description = image_search::search_keyword(
        pool,
        &KeywordFilter { document_id: None, block_type: None, page_number: None, description_like: Some("cooling".to_string()) },
        10,
        0,
    )
    .await
    .unwrap();
    assert_eq!(by_description.len(), 1);
}

#[tokio::test]
async fn image_semantic_search_is_restricted_to_the_image_subset() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();
    let provenance = ProvenanceService::new(pool);
    let embedder = support::FakeEmbeddingClient;

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
    let image_provenance = provenance
        .create(
            pool,
            NewProvenance {
            r#type: ProvenanceType::Image,
            source_type: "IMAGE_EXTRACTION".to_string(),
            parent_id: Some(root.id.clone()),
            content_hash: "sha256:img".to_string(),
            processor: "test".to_string(),
            processor_version: "0".to_string(),
            processing_params: json!({}),
            location: None,
            processing_duration_ms: None,
            processing_quality_score: None,
        })
        .await
        .unwrap();

    let image_id = "img-1".to_string();
    images::insert(
        pool,
        &NewImage {
            id: image_id.clone(),
            provenance_id: image_provenance.id.clone(),
            document_id: root.id.clone(),
            file_path: "images/img-1.png".to_string(),
            content_hash: "sha256:imgbytes".to_string(),
            page_number: Some(1),
            block_type: Some("figure".to_string()),
            is_header_footer: false,
            context_text: None,
        },
    )
    .await
    .unwrap();

    let description = "a turbine blade close up schematic";
    let mut embedded = embedder.embed_batch(&[description.to_string()], TaskType::Document).await.unwrap();
    let mut image_vector = embedded.pop().unwrap();
    vector::l2_normalize(&mut image_vector);
    let vector_id = "vec-img-1".to_string();
    vector::insert(pool, &vector_id, &image_vector).await.unwrap();
    embeddings::insert(
        pool,
        &NewEmbedding {
            id: "emb-img-1".to_string(),
            provenance_id: image_provenance.id.clone(),
            chunk_id: None,
            image_id: Some(image_id.clone()),
            extraction_id: None,
            original_text: description.to_string(),
            model: embedder.model_name().to_string(),
            model_version: embedder.model_version().to_string(),
            task_type: "document".to_string(),
            inference_mode: "fake".to_string(),
            vector_id,
        },
    )
    .await
    .unwrap();

    let hits = image_search::search_semantic(pool, &embedder, "turbine blade schematic", 5, 0).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(matches!(hits[0].source, Source::Image(ref id) if *id == image_id));
}
