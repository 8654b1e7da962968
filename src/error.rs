//! The error taxonomy shared by every component of the core.
//!
//! Each component returns its own narrow error enum internally; at the tool
//! boundary everything converts into [`ProvgraphError`], whose [`category`]
//! is the stable string tag callers key their retry/handling logic on.

use thiserror::Error;

#[cfg(feature = "diagnostics")]
use miette::Diagnostic;

/// Component-level error for the provenance DAG and chain-hash machinery.
#[derive(Debug, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum ProvenanceError {
    #[error("parent provenance {0} does not exist")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(
            code(provgraph::provenance::orphan_parent),
            help("the record referenced as parent_id was never inserted, or was deleted")
        )
    )]
    OrphanParent(String),

    #[error("stored parent_ids for {id} do not match the actual chain")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(
            code(provgraph::provenance::chain_inconsistent),
            help("re-run verify_chain; this never auto-repairs")
        )
    )]
    ChainInconsistent { id: String },

    #[error("record {0} has no parent_id but is not a DOCUMENT")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(code(provgraph::provenance::root_type_invalid))
    )]
    RootTypeInvalid(String),

    #[error("provenance record {0} not found")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(provgraph::provenance::not_found)))]
    NotFound(String),

    #[error(transparent)]
    #[cfg_attr(feature = "diagnostics", diagnostic(transparent))]
    Storage(#[from] StorageError),
}

/// Component-level error for the storage layer.
#[derive(Debug, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum StorageError {
    #[error(transparent)]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(provgraph::storage::sqlx)))]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(provgraph::storage::migrate)))]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("failed to (de)serialize stored JSON: {0}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(provgraph::storage::serde)))]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(provgraph::storage::other)))]
    Other(String),
}

/// Component-level error for the session/state façade.
#[derive(Debug, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum SessionError {
    #[error("no database is currently selected")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(help("call select_database or create_database first"))
    )]
    DatabaseNotSelected,

    #[error("database {0} does not exist")]
    DatabaseNotFound(String),

    #[error("database {0} already exists")]
    DatabaseAlreadyExists(String),

    #[error("database reference is stale: generation changed mid-operation")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(help("the database was switched while this operation was in flight"))
    )]
    StaleDatabaseReference,

    #[error("switch refused: {active_operations} operation(s) still active")]
    SwitchBlocked { active_operations: u64 },

    #[error("invalid database name {0:?}: must match [A-Za-z0-9_-]+")]
    InvalidDatabaseName(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Component-level error for the ingestion orchestrator.
#[derive(Debug, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum IngestionError {
    #[error("document {0} not found")]
    DocumentNotFound(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("path is not a directory: {0}")]
    PathNotDirectory(String),

    #[error("OCR failed: {0}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(provgraph::ingestion::ocr_failed)))]
    OcrFailed(String),

    #[error("embedding failed: {0}")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(code(provgraph::ingestion::embedding_failed))
    )]
    EmbeddingFailed(String),

    #[error("vision model failed: {0}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(provgraph::ingestion::vlm_failed)))]
    VlmFailed(String),

    #[error(transparent)]
    Provenance(#[from] ProvenanceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Component-level error for the retrieval engine.
#[derive(Debug, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Top-level error normalized at the tool boundary, per the `{success,
/// error: {category, message, details}}` propagation contract.
#[derive(Debug, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum ProvgraphError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Provenance(#[from] ProvenanceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProvgraphError {
    /// The stable category tag used in the structured error payload and as
    /// a `tracing` field on the emitted error event.
    pub fn category(&self) -> &'static str {
        match self {
            ProvgraphError::Validation(_) => "VALIDATION_ERROR",
            ProvgraphError::Session(e) => match e {
                SessionError::DatabaseNotSelected => "DATABASE_NOT_SELECTED",
                SessionError::DatabaseNotFound(_) => "DATABASE_NOT_FOUND",
                SessionError::DatabaseAlreadyExists(_) => "DATABASE_ALREADY_EXISTS",
                SessionError::StaleDatabaseReference => "STALE_DATABASE_REFERENCE",
                SessionError::SwitchBlocked { .. } => "SWITCH_BLOCKED",
                SessionError::InvalidDatabaseName(_) => "VALIDATION_ERROR",
                SessionError::Storage(_) => "INTERNAL_ERROR",
            },
            ProvgraphError::Provenance(e) => match e {
                ProvenanceError::OrphanParent(_) => "ORPHAN_PARENT",
                ProvenanceError::ChainInconsistent { .. } => "CHAIN_INCONSISTENT",
                ProvenanceError::RootTypeInvalid(_) => "ROOT_TYPE_INVALID",
                ProvenanceError::NotFound(_) => "DOCUMENT_NOT_FOUND",
                ProvenanceError::Storage(_) => "INTERNAL_ERROR",
            },
            ProvgraphError::Storage(_) => "INTERNAL_ERROR",
            ProvgraphError::Ingestion(e) => match e {
                IngestionError::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
                IngestionError::PathNotFound(_) => "PATH_NOT_FOUND",
                IngestionError::PathNotDirectory(_) => "PATH_NOT_DIRECTORY",
                IngestionError::OcrFailed(_) => "OCR_FAILED",
                IngestionError::EmbeddingFailed(_) => "EMBEDDING_FAILED",
                IngestionError::VlmFailed(_) => "VLM_FAILED",
                IngestionError::Provenance(e) => match e {
                    ProvenanceError::OrphanParent(_) => "ORPHAN_PARENT",
                    ProvenanceError::ChainInconsistent { .. } => "CHAIN_INCONSISTENT",
                    ProvenanceError::RootTypeInvalid(_) => "ROOT_TYPE_INVALID",
                    ProvenanceError::NotFound(_) => "DOCUMENT_NOT_FOUND",
                    ProvenanceError::Storage(_) => "INTERNAL_ERROR",
                },
                IngestionError::Storage(_) => "INTERNAL_ERROR",
                IngestionError::Io(_) => "INTERNAL_ERROR",
            },
            ProvgraphError::Retrieval(e) => match e {
                RetrievalError::EmbeddingFailed(_) => "EMBEDDING_FAILED",
                RetrievalError::Storage(_) => "INTERNAL_ERROR",
            },
            ProvgraphError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T, E = ProvgraphError> = std::result::Result<T, E>;
