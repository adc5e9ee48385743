//! Deterministic collaborators for unit tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::completion::TextCompletion;
use crate::embedding::EmbeddingProvider;
use crate::error::{CompletionError, EmbeddingError, StoreError};
use crate::models::{IndexedPoint, NamedVector, PayloadFilter, ScoredPoint, VectorSpec};
use crate::store::{SurrealVectorStore, VectorStore};

pub const TEST_DIMENSION: usize = 8;

/// Byte-histogram embedder: identical content gives identical vectors.
#[derive(Default)]
pub struct HashEmbedder {
    batches: Mutex<Vec<usize>>,
    fail_on: Option<String>,
}

impl HashEmbedder {
    /// Fails any batch containing a path with `needle` in it.
    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_on: Some(needle.to_string()),
            ..Self::default()
        }
    }

    pub fn image_batches(&self) -> Vec<usize> {
        self.batches.lock().clone()
    }

    fn histogram(bytes: &[u8]) -> Vec<f32> {
        let mut vector = vec![0.0; TEST_DIMENSION];
        for byte in bytes {
            vector[*byte as usize % TEST_DIMENSION] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    async fn embed_images(&self, paths: &[PathBuf]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.batches.lock().push(paths.len());
        paths
            .iter()
            .map(|path| {
                if let Some(needle) = &self.fail_on {
                    if path.to_string_lossy().contains(needle.as_str()) {
                        return Err(EmbeddingError::Model(format!("refused {}", path.display())));
                    }
                }
                std::fs::read(path)
                    .map(|bytes| Self::histogram(&bytes))
                    .map_err(|e| EmbeddingError::Model(e.to_string()))
            })
            .collect()
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(Self::histogram(text.as_bytes()))
    }
}

/// Completion provider with a fixed reply that counts its calls. A delay longer
/// than the caller's timeout fails with [`CompletionError::Timeout`].
pub struct ScriptedCompletion {
    reply: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedCompletion {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            ..Self::replying("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().clone()
    }
}

#[async_trait]
impl TextCompletion for ScriptedCompletion {
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::timeout(timeout, tokio::time::sleep(delay))
                .await
                .map_err(|_| CompletionError::Timeout(timeout.as_secs()))?;
        }
        self.reply.clone().ok_or(CompletionError::Api {
            status: 500,
            message: "scripted failure".to_string(),
        })
    }
}

/// Delegates to a real store and counts upsert calls.
pub struct RecordingStore<S> {
    inner: Arc<S>,
    upserts: AtomicUsize,
}

impl<S> RecordingStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            upserts: AtomicUsize::new(0),
        }
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: VectorStore> VectorStore for RecordingStore<S> {
    async fn ensure_collection(
        &self,
        collection: &str,
        spec: &VectorSpec,
    ) -> Result<(), StoreError> {
        self.inner.ensure_collection(collection, spec).await
    }

    async fn upsert(&self, collection: &str, points: Vec<IndexedPoint>) -> Result<(), StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(collection, points).await
    }

    async fn search(
        &self,
        collection: &str,
        query: &NamedVector,
        top_k: usize,
        filter: &PayloadFilter,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        self.inner.search(collection, query, top_k, filter).await
    }

    async fn delete(&self, collection: &str, filter: &PayloadFilter) -> Result<(), StoreError> {
        self.inner.delete(collection, filter).await
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        self.inner.count(collection).await
    }
}

pub async fn temp_store() -> (Arc<SurrealVectorStore>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = SurrealVectorStore::open(&temp_dir.path().join("test_db"))
        .await
        .expect("Failed to open store");
    (Arc::new(store), temp_dir)
}

/// Writes `files` (relative path, content) under `root`, creating parents.
pub fn write_tree(root: &std::path::Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let full_path = root.join(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full_path, content).unwrap();
    }
}
