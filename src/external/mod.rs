//! Contracts for the external collaborators named out of scope by the
//! specification: the OCR service, the embedding model, and the vision
//! model. Only the interfaces the ingestion pipeline requires are described
//! here (spec §1 "Out of scope").

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Default per-call timeout for lightweight external calls (spec §5
/// Cancellation & timeouts).
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrMode {
    Fast,
    Balanced,
    Accurate,
}

/// One typed block from an OCR block tree: headers/footers/figures/tables.
#[derive(Debug, Clone)]
pub struct OcrBlock {
    pub block_type: String,
    pub page_number: Option<i64>,
    pub char_start: i64,
    pub char_end: i64,
    pub bbox: Option<[f64; 4]>,
}

/// A pre-extracted image blob OCR returned inline, before it is written to
/// the images directory.
#[derive(Debug, Clone)]
pub struct OcrImage {
    pub bytes: Vec<u8>,
    pub suggested_filename: String,
    pub page_number: Option<i64>,
    pub block_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OcrResult {
    pub text: String,
    /// Byte offset into `text` where each page begins.
    pub page_offsets: Vec<i64>,
    pub block_tree: Option<Vec<OcrBlock>>,
    pub images: Vec<OcrImage>,
    pub extraction: Option<Value>,
    pub metadata: DocumentMetadata,
}

#[async_trait]
pub trait OcrClient: Send + Sync {
    async fn run(
        &self,
        file_path: &std::path::Path,
        mode: OcrMode,
    ) -> Result<OcrResult, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Document,
    Query,
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embeds a batch of texts, returning one vector per input in the same
    /// order. Vectors need not be normalized; the storage layer
    /// normalizes before writing (spec §4.3 step 6).
    async fn embed_batch(
        &self,
        texts: &[String],
        task_type: TaskType,
    ) -> Result<Vec<Vec<f32>>, String>;

    fn model_name(&self) -> &str;
    fn model_version(&self) -> &str;
    fn dimension(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct VlmResult {
    pub description: String,
    pub analysis: Value,
}

#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn describe(&self, image_bytes: &[u8], context_text: Option<&str>) -> Result<VlmResult, String>;
}
