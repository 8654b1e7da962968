//! The embedded storage layer (spec §4.2): an embedded, single-writer,
//! WAL-journaled relational store with a vector index and an inverted
//! full-text index loaded at open.

pub mod chunks;
pub mod clusters;
pub mod comparisons;
pub mod config_store;
pub mod documents;
pub mod embeddings;
pub mod extractions;
pub mod fts;
pub mod images;
pub mod ocr_results;
pub mod open;
pub mod provenance_rows;
pub mod vector;

use crate::error::StorageError;
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

/// A handle to one open database: the writer pool (capped at one
/// connection) and the reader pool (concurrent under WAL). Every other
/// component receives `&Storage` rather than touching `sqlx` directly.
#[derive(Debug, Clone)]
pub struct Storage {
    writer: SqlitePool,
    reader: SqlitePool,
}

impl Storage {
    #[instrument(skip(path))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with_threshold(path, open::DEFAULT_STUCK_PROCESSING_THRESHOLD).await
    }

    pub async fn open_with_threshold(
        path: impl AsRef<Path>,
        stuck_processing_threshold: Duration,
    ) -> Result<Self, StorageError> {
        let pools = open::open(path, stuck_processing_threshold).await?;
        Ok(Self {
            writer: pools.writer,
            reader: pools.reader,
        })
    }

    /// The single-writer pool. All mutations go through here (spec §4.2
    /// Single-writer discipline).
    pub fn writer(&self) -> &SqlitePool {
        &self.writer
    }

    /// The concurrent reader pool.
    pub fn reader(&self) -> &SqlitePool {
        &self.reader
    }

    /// Flushes and closes both pools, checkpointing WAL (spec §5 Process
    /// exit). Failure to close is logged but never propagated as fatal.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        if let Err(err) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.writer)
            .await
        {
            tracing::warn!(%err, "wal checkpoint failed on close");
        }
        self.writer.close().await;
        self.reader.close().await;
    }
}
