//! The atomic claim phase (spec §4.3): the only way a document enters
//! `processing`.

use crate::error::{IngestionError, StorageError};
use crate::storage::documents::{self, claim_pending, DocumentRow};
use sqlx::SqlitePool;
use tracing::instrument;

#[instrument(skip(pool))]
pub async fn claim(pool: &SqlitePool, max_concurrent: u32) -> Result<Vec<DocumentRow>, StorageError> {
    claim_pending(pool, max_concurrent).await
}

/// Returns a `failed` document to `pending` so the next `process_pending`
/// call picks it up again (spec §8 "Retry cycle": `fail -> retry_failed ->
/// process_pending` returns it to `complete` with no orphan rows left over,
/// since [`crate::ingestion::cleanup::cleanup_document`] already ran when it
/// failed).
#[instrument(skip(pool))]
pub async fn retry_failed(pool: &SqlitePool, document_id: &str) -> Result<(), IngestionError> {
    let document = documents::get_by_id(pool, document_id)
        .await?
        .ok_or_else(|| IngestionError::DocumentNotFound(document_id.to_string()))?;
    if document.status() != documents::DocumentStatus::Failed {
        return Ok(());
    }
    documents::mark_pending(pool, document_id).await?;
    Ok(())
}
