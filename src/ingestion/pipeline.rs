//! The per-document pipeline (spec §4.3 steps 1-12): the hardest stateful
//! component. Drives one claimed document from `processing` through derived
//! artifacts to `complete`, or to `failed` with cleanup, in strict order
//! (spec §5 "Ordering guarantees").
//!
//! Steps 1-3 and 6 are fatal: any error there aborts the document, triggers
//! [`cleanup::cleanup_document`], and marks it `failed`. Steps 4, 5, 7, and 8
//! degrade to a warning recorded in [`PipelineReport::post_processing_errors`]
//! and never stop the document from completing, mirroring the
//! degradable-vs-fatal stage split in a staged pipeline executor.

use crate::error::IngestionError;
use crate::external::{EmbeddingClient, OcrClient, OcrMode, TaskType, VisionClient};
use crate::hash::content_hash;
use crate::ingestion::chunker::{chunk_text, ChunkerConfig};
use crate::ingestion::cleanup;
use crate::provenance::{NewProvenance, ProvenanceService, ProvenanceType};
use crate::session::config::Config;
use crate::storage::documents::DocumentRow;
use crate::storage::{chunks, documents, embeddings, extractions, fts, images, ocr_results, vector};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

pub struct PipelineClients<'a> {
    pub ocr: &'a dyn OcrClient,
    pub embedding: &'a dyn EmbeddingClient,
    pub vision: Option<&'a dyn VisionClient>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub ocr_mode: OcrMode,
    pub extraction_schema: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub document_id: String,
    pub succeeded: bool,
    pub post_processing_errors: Vec<String>,
    pub error: Option<String>,
}

/// Runs the full pipeline for one already-claimed document. Never returns
/// `Err`: fatal failures are caught here, converted into cleanup + `failed`,
/// and folded into the returned report so a batch can keep going.
#[instrument(skip(pool, images_dir, clients, config), fields(document_id = %document.id))]
pub async fn run(
    pool: &SqlitePool,
    images_dir: &Path,
    document: &DocumentRow,
    config: &Config,
    options: &PipelineOptions,
    clients: &PipelineClients<'_>,
) -> PipelineReport {
    match run_inner(pool, images_dir, document, config, options, clients).await {
        Ok(report) => report,
        Err(err) => {
            tracing::error!(document_id = %document.id, %err, "pipeline failed, cleaning up");
            let message = err.to_string();
            if let Err(cleanup_err) = cleanup::cleanup_document(pool, &document.id).await {
                tracing::error!(document_id = %document.id, %cleanup_err, "cleanup after pipeline failure also failed");
            }
            if let Err(mark_err) = documents::mark_failed(pool, &document.id, &message).await {
                tracing::error!(document_id = %document.id, %mark_err, "failed to mark document failed");
            }
            PipelineReport {
                document_id: document.id.clone(),
                succeeded: false,
                post_processing_errors: Vec::new(),
                error: Some(message),
            }
        }
    }
}

async fn run_inner(
    pool: &SqlitePool,
    images_dir: &Path,
    document: &DocumentRow,
    config: &Config,
    options: &PipelineOptions,
    clients: &PipelineClients<'_>,
) -> Result<PipelineReport, IngestionError> {
    let provenance = ProvenanceService::new(pool);
    let mut timings: HashMap<&'static str, i64> = HashMap::new();
    let mut post_processing_errors = Vec::new();

    // Step 1: OCR.
    let step_start = Instant::now();
    let ocr_result = clients
        .ocr
        .run(Path::new(&document.file_path), options.ocr_mode)
        .await
        .map_err(IngestionError::OcrFailed)?;
    timings.insert("ocr_ms", step_start.elapsed().as_millis() as i64);

    let ocr_provenance_id = {
        let params = json!({ "mode": format!("{:?}", options.ocr_mode).to_lowercase() });
        let mut tx = pool.begin().await.map_err(crate::error::StorageError::from)?;
        let record = provenance
            .create(
                &mut *tx,
                NewProvenance {
                    r#type: ProvenanceType::OcrResult,
                    source_type: "OCR".to_string(),
                    parent_id: Some(document.provenance_id.clone()),
                    content_hash: content_hash(ocr_result.text.as_bytes()),
                    processor: "provgraph-ocr".to_string(),
                    processor_version: env!("CARGO_PKG_VERSION").to_string(),
                    processing_params: params,
                    location: None,
                    processing_duration_ms: Some(timings["ocr_ms"]),
                    processing_quality_score: None,
                },
            )
            .await?;
        let ocr_row_id = Uuid::new_v4().to_string();
        ocr_results::insert(
            &mut *tx,
            &ocr_row_id,
            &record.id,
            &document.id,
            &ocr_result.text,
            &ocr_result.page_offsets,
            ocr_result
                .block_tree
                .as_ref()
                .map(|blocks| json!(blocks.iter().map(block_to_json).collect::<Vec<_>>()))
                .as_ref(),
            &json!({}),
        )
        .await?;
        tx.commit().await.map_err(crate::error::StorageError::from)?;
        record.id
    };

    // Step 2: images, extracted from OCR output (never double-extracted: if
    // OCR returned none, no file-level extractor runs, since the OCR client
    // here is the sole source of image blobs).
    let step_start = Instant::now();
    let doc_images_dir = images_dir.join(&document.id);
    if !ocr_result.images.is_empty() {
        tokio::fs::create_dir_all(&doc_images_dir).await?;
    }
    for (index, image) in ocr_result.images.iter().enumerate() {
        let file_name = if image.suggested_filename.is_empty() {
            format!("image-{index}.bin")
        } else {
            image.suggested_filename.clone()
        };
        let dest = doc_images_dir.join(&file_name);
        tokio::fs::write(&dest, &image.bytes).await?;
        let hash = content_hash(&image.bytes);
        let is_header_footer = image
            .block_type
            .as_deref()
            .map(|t| t == "header" || t == "footer")
            .unwrap_or(false);
        let context_text = context_window(&ocr_result.text, &ocr_result.page_offsets, image.page_number);

        let mut tx = pool.begin().await.map_err(crate::error::StorageError::from)?;
        let record = provenance
            .create(
                &mut *tx,
                NewProvenance {
                    r#type: ProvenanceType::Image,
                    source_type: "IMAGE_EXTRACTION".to_string(),
                    parent_id: Some(ocr_provenance_id.clone()),
                    content_hash: hash.clone(),
                    processor: "provgraph-images".to_string(),
                    processor_version: env!("CARGO_PKG_VERSION").to_string(),
                    processing_params: json!({ "index": index }),
                    location: Some(crate::provenance::Location {
                        page_number: image.page_number,
                        char_start: None,
                        char_end: None,
                        chunk_index: None,
                        bbox: None,
                    }),
                    processing_duration_ms: None,
                    processing_quality_score: None,
                },
            )
            .await?;
        let image_row_id = Uuid::new_v4().to_string();
        images::insert(
            &mut *tx,
            &images::NewImage {
                id: image_row_id,
                provenance_id: record.id.clone(),
                document_id: document.id.clone(),
                file_path: dest.display().to_string(),
                content_hash: hash,
                page_number: image.page_number,
                block_type: image.block_type.clone(),
                is_header_footer,
                context_text,
            },
        )
        .await?;
        tx.commit().await.map_err(crate::error::StorageError::from)?;
    }
    timings.insert("images_ms", step_start.elapsed().as_millis() as i64);

    // Step 3: chunking.
    let step_start = Instant::now();
    let chunker_config = ChunkerConfig {
        chunk_size: config.chunk_size as usize,
        chunk_overlap_percent: config.chunk_overlap_percent,
        max_chunk_size: config.max_chunk_size as usize,
    };
    let chunk_specs = chunk_text(
        &ocr_result.text,
        &ocr_result.page_offsets,
        ocr_result.block_tree.as_deref(),
        &chunker_config,
    );

    for (index, spec) in chunk_specs.iter().enumerate() {
        let mut tx = pool.begin().await.map_err(crate::error::StorageError::from)?;
        let record = provenance
            .create(
                &mut *tx,
                NewProvenance {
                    r#type: ProvenanceType::Chunk,
                    source_type: "CHUNKING".to_string(),
                    parent_id: Some(ocr_provenance_id.clone()),
                    content_hash: content_hash(spec.content.as_bytes()),
                    processor: "provgraph-chunker".to_string(),
                    processor_version: env!("CARGO_PKG_VERSION").to_string(),
                    processing_params: json!({
                        "chunk_size": config.chunk_size,
                        "chunk_overlap_percent": config.chunk_overlap_percent,
                        "max_chunk_size": config.max_chunk_size,
                    }),
                    location: Some(crate::provenance::Location {
                        page_number: spec.page_number,
                        char_start: Some(spec.char_start),
                        char_end: Some(spec.char_end),
                        chunk_index: Some(index as i64),
                        bbox: None,
                    }),
                    processing_duration_ms: None,
                    processing_quality_score: None,
                },
            )
            .await?;
        let chunk_id = Uuid::new_v4().to_string();
        chunks::insert(
            &mut *tx,
            &chunks::NewChunk {
                id: chunk_id.clone(),
                provenance_id: record.id.clone(),
                document_id: document.id.clone(),
                chunk_index: index as i64,
                content: spec.content.clone(),
                char_start: spec.char_start,
                char_end: spec.char_end,
                page_number: spec.page_number,
                page_range_start: spec.page_number,
                page_range_end: spec.page_number,
                heading_context: spec.heading_context.clone(),
                section_path: spec.section_path.clone(),
                content_type_tags: spec.content_type_tags.clone(),
                is_atomic: spec.is_atomic,
                overlap_previous: spec.overlap_previous,
                overlap_next: spec.overlap_next,
            },
        )
        .await?;
        fts::index_chunk(&mut *tx, &chunk_id, &document.id, &spec.content).await?;
        tx.commit().await.map_err(crate::error::StorageError::from)?;
    }
    timings.insert("chunking_ms", step_start.elapsed().as_millis() as i64);

    // Step 4: header/footer tagging. A post-processing warning, never fatal.
    let step_start = Instant::now();
    if let Err(err) = tag_repeated_headers_and_footers(pool, &document.id).await {
        post_processing_errors.push(format!("header/footer tagging: {err}"));
    }
    timings.insert("header_footer_ms", step_start.elapsed().as_millis() as i64);

    // Step 5: metadata enrichment (structural fingerprint). Also a warning.
    let step_start = Instant::now();
    let fingerprint = match chunks::stats_for_document(pool, &document.id).await {
        Ok(stats) => Some(stats),
        Err(err) => {
            post_processing_errors.push(format!("metadata enrichment: {err}"));
            None
        }
    };
    timings.insert("enrichment_ms", step_start.elapsed().as_millis() as i64);

    // Step 6: embeddings. Fatal.
    let step_start = Instant::now();
    let chunk_rows = chunks::list_by_document(pool, &document.id).await?;
    for batch in chunk_rows.chunks(config.embedding_batch_size.max(1) as usize) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let vectors = clients
            .embedding
            .embed_batch(&texts, TaskType::Document)
            .await
            .map_err(IngestionError::EmbeddingFailed)?;
        for (chunk, mut vec) in batch.iter().zip(vectors.into_iter()) {
            vector::l2_normalize(&mut vec);
            let vector_id = Uuid::new_v4().to_string();
            let mut tx = pool.begin().await.map_err(crate::error::StorageError::from)?;
            let record = provenance
                .create(
                    &mut *tx,
                    NewProvenance {
                        r#type: ProvenanceType::Embedding,
                        source_type: "EMBEDDING".to_string(),
                        parent_id: Some(chunk.provenance_id.clone()),
                        content_hash: content_hash(&vec.iter().flat_map(|f| f.to_le_bytes()).collect::<Vec<u8>>()),
                        processor: clients.embedding.model_name().to_string(),
                        processor_version: clients.embedding.model_version().to_string(),
                        processing_params: json!({ "task_type": "document" }),
                        location: None,
                        processing_duration_ms: None,
                        processing_quality_score: None,
                    },
                )
                .await?;
            vector::insert(&mut *tx, &vector_id, &vec).await?;
            embeddings::insert(
                &mut *tx,
                &embeddings::NewEmbedding {
                    id: Uuid::new_v4().to_string(),
                    provenance_id: record.id,
                    chunk_id: Some(chunk.id.clone()),
                    image_id: None,
                    extraction_id: None,
                    original_text: chunk.content.clone(),
                    model: clients.embedding.model_name().to_string(),
                    model_version: clients.embedding.model_version().to_string(),
                    task_type: "document".to_string(),
                    inference_mode: config.embedding_device.clone(),
                    vector_id,
                },
            )
            .await?;
            tx.commit().await.map_err(crate::error::StorageError::from)?;
            chunks::set_embedding_status(pool, &chunk.id, "complete").await?;
        }
    }
    timings.insert("embeddings_ms", step_start.elapsed().as_millis() as i64);

    // Step 7: vision-model descriptions. Per-image failures are non-fatal.
    let step_start = Instant::now();
    if let Some(vision) = clients.vision {
        let pending_images = images::list_pending_vlm(pool, &document.id).await?;
        for image in pending_images {
            match run_vlm_for_image(pool, &provenance, vision, clients.embedding, config, &image).await {
                Ok(()) => {}
                Err(err) => {
                    tracing::warn!(image_id = %image.id, %err, "vlm description failed for image, continuing");
                    images::set_vlm_status(pool, &image.id, images::VlmStatus::Failed).await?;
                }
            }
        }
    }
    timings.insert("vlm_ms", step_start.elapsed().as_millis() as i64);

    // Step 8: structured extraction. Non-fatal if it fails to persist.
    let step_start = Instant::now();
    if let (Some(extraction), Some(schema)) = (&ocr_result.extraction, &options.extraction_schema) {
        if let Err(err) = store_extraction(pool, &provenance, &document.id, &ocr_provenance_id, schema, extraction).await {
            post_processing_errors.push(format!("structured extraction: {err}"));
        }
    }
    timings.insert("extraction_ms", step_start.elapsed().as_millis() as i64);

    // Step 9: document metadata.
    let page_count = if ocr_result.page_offsets.is_empty() {
        None
    } else {
        Some(ocr_result.page_offsets.len() as i64)
    };
    documents::set_metadata(
        pool,
        &document.id,
        page_count,
        ocr_result.metadata.title.as_deref(),
        ocr_result.metadata.author.as_deref(),
        ocr_result.metadata.subject.as_deref(),
        Some(Utc::now()),
    )
    .await?;

    // Step 10: timings.
    let timings_value: Value = json!(timings);
    ocr_results::merge_extras(pool, &document.id, "timings_ms", &timings_value).await?;
    if let Some(stats) = fingerprint {
        let fingerprint_value = json!({
            "chunk_count": stats.chunk_count,
            "atomic_count": stats.atomic_count,
            "average_chunk_size": stats.average_chunk_size,
            "content_type_distribution": stats.content_type_distribution,
        });
        ocr_results::merge_extras(pool, &document.id, "structural_fingerprint", &fingerprint_value).await?;
    }

    // Step 11: chain-hash backfill.
    provenance.backfill().await?;

    // Step 12: complete.
    documents::mark_complete(pool, &document.id).await?;

    Ok(PipelineReport {
        document_id: document.id.clone(),
        succeeded: true,
        post_processing_errors,
        error: None,
    })
}

fn block_to_json(block: &crate::external::OcrBlock) -> Value {
    json!({
        "block_type": block.block_type,
        "page_number": block.page_number,
        "char_start": block.char_start,
        "char_end": block.char_end,
        "bbox": block.bbox,
    })
}

/// A window of text around `page_number` from the OCR page offsets, used as
/// VLM context (spec §4.3 step 2).
fn context_window(text: &str, page_offsets: &[i64], page_number: Option<i64>) -> Option<String> {
    let page_number = page_number?;
    let index = (page_number - 1).max(0) as usize;
    let start = *page_offsets.get(index)? as usize;
    let end = page_offsets
        .get(index + 1)
        .map(|&o| o as usize)
        .unwrap_or(text.len())
        .min(text.len());
    if start >= end || start > text.len() {
        return None;
    }
    Some(text[start..end].chars().take(500).collect())
}

/// Detects lines that repeat near-identically across a majority of pages and
/// tags the chunks that contain them with the `repeated_header_footer`
/// system tag (spec §4.3 step 4).
async fn tag_repeated_headers_and_footers(pool: &SqlitePool, document_id: &str) -> Result<(), crate::error::StorageError> {
    let rows = chunks::list_by_document(pool, document_id).await?;
    if rows.len() < 3 {
        return Ok(());
    }
    let mut line_counts: HashMap<&str, u32> = HashMap::new();
    for row in &rows {
        for line in row.content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            *line_counts.entry(line).or_insert(0) += 1;
        }
    }
    let threshold = (rows.len() as u32 / 2).max(2);
    let repeated: Vec<&str> = line_counts
        .into_iter()
        .filter(|(_, count)| *count >= threshold)
        .map(|(line, _)| line)
        .collect();
    if repeated.is_empty() {
        return Ok(());
    }
    for row in &rows {
        if repeated.iter().any(|line| row.content.contains(line)) {
            chunks::add_system_tag(pool, &row.id, "repeated_header_footer").await?;
        }
    }
    Ok(())
}

async fn run_vlm_for_image(
    pool: &SqlitePool,
    provenance: &ProvenanceService<'_>,
    vision: &dyn VisionClient,
    embedding: &dyn EmbeddingClient,
    config: &Config,
    image: &images::ImageRow,
) -> Result<(), IngestionError> {
    let bytes = tokio::fs::read(&image.file_path).await?;
    let result = vision
        .describe(&bytes, image.context_text.as_deref())
        .await
        .map_err(IngestionError::VlmFailed)?;

    let mut tx = pool.begin().await.map_err(crate::error::StorageError::from)?;
    let vlm_record = provenance
        .create(
            &mut *tx,
            NewProvenance {
                r#type: ProvenanceType::VlmDescription,
                source_type: "VLM".to_string(),
                parent_id: Some(image.provenance_id.clone()),
                content_hash: content_hash(result.description.as_bytes()),
                processor: "provgraph-vlm".to_string(),
                processor_version: env!("CARGO_PKG_VERSION").to_string(),
                processing_params: json!({}),
                location: None,
                processing_duration_ms: None,
                processing_quality_score: None,
            },
        )
        .await?;
    images::insert_vlm_description(
        &mut *tx,
        &Uuid::new_v4().to_string(),
        &vlm_record.id,
        &image.id,
        &result.description,
        &serde_json::to_string(&result.analysis).unwrap_or_else(|_| "{}".to_string()),
    )
    .await?;
    fts::index_vlm(&mut *tx, &Uuid::new_v4().to_string(), &image.id, &image.document_id, &result.description).await?;
    tx.commit().await.map_err(crate::error::StorageError::from)?;
    images::set_vlm_status(pool, &image.id, images::VlmStatus::Complete).await?;

    let mut vectors = embedding
        .embed_batch(&[result.description.clone()], TaskType::Document)
        .await
        .map_err(IngestionError::EmbeddingFailed)?;
    let mut vec = vectors.pop().ok_or_else(|| IngestionError::EmbeddingFailed("embedding service returned no vector".to_string()))?;
    vector::l2_normalize(&mut vec);
    let vector_id = Uuid::new_v4().to_string();
    let mut tx = pool.begin().await.map_err(crate::error::StorageError::from)?;
    let embedding_record = provenance
        .create(
            &mut *tx,
            NewProvenance {
                r#type: ProvenanceType::Embedding,
                source_type: "EMBEDDING".to_string(),
                parent_id: Some(vlm_record.id),
                content_hash: content_hash(&vec.iter().flat_map(|f| f.to_le_bytes()).collect::<Vec<u8>>()),
                processor: embedding.model_name().to_string(),
                processor_version: embedding.model_version().to_string(),
                processing_params: json!({ "task_type": "document", "source": "vlm_description" }),
                location: None,
                processing_duration_ms: None,
                processing_quality_score: None,
            },
        )
        .await?;
    vector::insert(&mut *tx, &vector_id, &vec).await?;
    embeddings::insert(
        &mut *tx,
        &embeddings::NewEmbedding {
            id: Uuid::new_v4().to_string(),
            provenance_id: embedding_record.id,
            chunk_id: None,
            image_id: Some(image.id.clone()),
            extraction_id: None,
            original_text: result.description,
            model: embedding.model_name().to_string(),
            model_version: embedding.model_version().to_string(),
            task_type: "document".to_string(),
            inference_mode: config.embedding_device.clone(),
            vector_id,
        },
    )
    .await?;
    tx.commit().await.map_err(crate::error::StorageError::from)?;
    Ok(())
}

async fn store_extraction(
    pool: &SqlitePool,
    provenance: &ProvenanceService<'_>,
    document_id: &str,
    ocr_provenance_id: &str,
    schema: &str,
    payload: &Value,
) -> Result<(), IngestionError> {
    let payload_str = serde_json::to_string(payload).map_err(crate::error::StorageError::from)?;
    let mut tx = pool.begin().await.map_err(crate::error::StorageError::from)?;
    let record = provenance
        .create(
            &mut *tx,
            NewProvenance {
                r#type: ProvenanceType::Extraction,
                source_type: "EXTRACTION".to_string(),
                parent_id: Some(ocr_provenance_id.to_string()),
                content_hash: content_hash(payload_str.as_bytes()),
                processor: "provgraph-extraction".to_string(),
                processor_version: env!("CARGO_PKG_VERSION").to_string(),
                processing_params: json!({ "schema_name": schema }),
                location: None,
                processing_duration_ms: None,
                processing_quality_score: None,
            },
        )
        .await?;
    let extraction_id = Uuid::new_v4().to_string();
    extractions::insert(&mut *tx, &extraction_id, &record.id, document_id, schema, &payload_str).await?;
    fts::index_extraction(&mut *tx, &extraction_id, document_id, &payload_str).await?;
    tx.commit().await.map_err(crate::error::StorageError::from)?;
    Ok(())
}
