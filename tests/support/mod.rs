//! Shared fixtures for integration tests: fake OCR/embedding/vision clients
//! and a temp-directory-backed storage handle, mirroring the fake-collaborator
//! pattern the unit suites use for external dependencies.

use async_trait::async_trait;
use provgraph::external::{
    DocumentMetadata, EmbeddingClient, OcrBlock, OcrClient, OcrMode, OcrResult, TaskType,
    VisionClient, VlmResult,
};
use provgraph::session::Config;
use provgraph::storage::vector::VECTOR_DIMENSION;
use provgraph::storage::Storage;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

/// Reads the file verbatim as "OCR text". Can be flipped to fail on demand
/// so tests can drive a document through a real fatal-failure/retry cycle.
pub struct FakeOcrClient {
    should_fail: AtomicBool,
    block_tree: Option<Vec<OcrBlock>>,
}

impl FakeOcrClient {
    pub fn new() -> Self {
        Self { should_fail: AtomicBool::new(false), block_tree: None }
    }

    pub fn with_block_tree(block_tree: Vec<OcrBlock>) -> Self {
        Self { should_fail: AtomicBool::new(false), block_tree: Some(block_tree) }
    }

    pub fn set_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl OcrClient for FakeOcrClient {
    async fn run(&self, file_path: &Path, _mode: OcrMode) -> Result<OcrResult, String> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err("simulated OCR failure".to_string());
        }
        let text = tokio::fs::read_to_string(file_path)
            .await
            .map_err(|e| e.to_string())?;
        Ok(OcrResult {
            text,
            page_offsets: vec![0],
            block_tree: self.block_tree.clone(),
            images: Vec::new(),
            extraction: None,
            metadata: DocumentMetadata::default(),
        })
    }
}

fn word_bucket(word: &str) -> usize {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    word.hash(&mut hasher);
    (hasher.finish() % VECTOR_DIMENSION as u64) as usize
}

/// A deterministic bag-of-words embedding: lexically overlapping texts land
/// close together under cosine similarity, with no model weights involved.
/// Vectors are intentionally left un-normalized, matching the real contract
/// (the storage layer normalizes on the way in).
pub struct FakeEmbeddingClient;

#[async_trait]
impl EmbeddingClient for FakeEmbeddingClient {
    async fn embed_batch(&self, texts: &[String], _task_type: TaskType) -> Result<Vec<Vec<f32>>, String> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; VECTOR_DIMENSION];
                for word in text.split_whitespace() {
                    let cleaned: String = word.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase();
                    if cleaned.is_empty() {
                        continue;
                    }
                    v[word_bucket(&cleaned)] += 1.0;
                }
                v
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "fake-embed"
    }

    fn model_version(&self) -> &str {
        "test"
    }

    fn dimension(&self) -> usize {
        VECTOR_DIMENSION
    }
}

pub struct FakeVisionClient;

#[async_trait]
impl VisionClient for FakeVisionClient {
    async fn describe(&self, image_bytes: &[u8], context_text: Option<&str>) -> Result<VlmResult, String> {
        Ok(VlmResult {
            description: format!(
                "a {}-byte image near: {}",
                image_bytes.len(),
                context_text.unwrap_or("(no context)")
            ),
            analysis: serde_json::json!({ "byte_len": image_bytes.len() }),
        })
    }
}

/// A fresh database under a temp directory plus a scratch images directory,
/// with a default config tuned small enough that short fixture texts still
/// produce at least one chunk.
pub struct Fixture {
    pub dir: TempDir,
    pub storage: Storage,
    pub config: Config,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::open(dir.path().join("test.db")).await.expect("open storage");
        Self { dir, storage, config: Config::default() }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.dir.path().join("images")
    }

    pub async fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        tokio::fs::write(&path, contents).await.expect("write fixture file");
        path
    }
}
