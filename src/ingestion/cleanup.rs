//! Partial-failure cleanup (spec §4.3 "Failure and cleanup"): when a fatal
//! step aborts a document mid-pipeline, every derived row it produced is
//! removed so a retry starts from a clean slate, while the document's own
//! row and its root DOCUMENT provenance record survive for the caller to
//! mark `failed`.

use crate::error::StorageError;
use sqlx::SqlitePool;
use tracing::instrument;

/// Deletes every derived artifact for `document_id`: `provenance` rows
/// below the root (cascading ocr_results, chunks, images, vlm_descriptions,
/// extractions, embeddings), their `vectors` rows, and their FTS index
/// rows. The root DOCUMENT provenance row and the `documents` row itself
/// are left untouched.
#[instrument(skip(pool))]
pub async fn cleanup_document(pool: &SqlitePool, document_id: &str) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;

    let Some((root_provenance_id,)) = sqlx::query_as::<_, (String,)>(
        "SELECT provenance_id FROM documents WHERE id = ?",
    )
    .bind(document_id)
    .fetch_optional(&mut *tx)
    .await?
    else {
        return Ok(());
    };

    let vector_ids: Vec<(String,)> = sqlx::query_as(
        "SELECT e.vector_id FROM embeddings e \
         JOIN chunks c ON e.chunk_id = c.id WHERE c.document_id = ? \
         UNION \
         SELECT e.vector_id FROM embeddings e \
         JOIN images im ON e.image_id = im.id WHERE im.document_id = ? \
         UNION \
         SELECT e.vector_id FROM embeddings e \
         JOIN extractions x ON e.extraction_id = x.id WHERE x.document_id = ?",
    )
    .bind(document_id)
    .bind(document_id)
    .bind(document_id)
    .fetch_all(&mut *tx)
    .await?;
    for (vector_id,) in &vector_ids {
        sqlx::query("DELETE FROM vectors WHERE vector_id = ?")
            .bind(vector_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM vlm_fts WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM extractions_fts WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

    // Deletes every derived provenance row under this document's root;
    // ON DELETE CASCADE on provenance_id takes ocr_results, chunks,
    // images, vlm_descriptions, extractions and embeddings with it. The
    // root itself (id = root_provenance_id) is excluded.
    sqlx::query("DELETE FROM provenance WHERE root_document_id = ? AND id != ?")
        .bind(&root_provenance_id)
        .bind(&root_provenance_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
