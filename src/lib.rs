//! # provgraph
//!
//! A provenance-tracked document ingestion and retrieval core: every derived
//! artifact (OCR output, chunk, embedding, VLM description, extraction) is
//! linked into a tamper-evident hash chain, ingestion runs as a resumable
//! pending/processing/complete state machine, and retrieval fuses vector
//! similarity with BM25 full-text search over an embedded SQLite store.
//!
//! ## Module guide
//!
//! - [`provenance`] — the DAG and its hash-chain integrity machinery
//! - [`storage`] — the embedded SQLite schema and per-table accessors
//! - [`ingestion`] — scan, claim, chunk, and run documents through the
//!   pipeline, in bounded-parallel batches
//! - [`retrieval`] — vector, BM25, hybrid, and image search
//! - [`session`] — process-wide database selection, config, and concurrency
//!   guards
//! - [`derived`] — clustering and document comparison over already-complete
//!   documents
//! - [`external`] — the OCR/embedding/vision client contracts the pipeline
//!   depends on but does not implement
//! - [`error`] — the error taxonomy shared across every component
//! - [`hash`] — canonical JSON encoding and SHA-256 content hashing

pub mod derived;
pub mod error;
pub mod external;
pub mod hash;
pub mod ingestion;
pub mod provenance;
pub mod retrieval;
pub mod session;
pub mod storage;

use std::sync::OnceLock;
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs an `EnvFilter`-driven `tracing` subscriber writing to stderr,
/// exactly once per process. stdout is reserved for the tool transport's
/// own framing (spec.md §6), so tracing must never write there.
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("info,provgraph=info"))
            .unwrap();
        let fmt_layer = fmt::layer().with_writer(std::io::stderr);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .with(ErrorLayer::default())
            .init();
    });
}
