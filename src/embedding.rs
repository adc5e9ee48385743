use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};
use tracing::info;

use crate::error::EmbeddingError;

/// Turns image files and text into vectors of one shared space.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// One vector per path, in input order.
    async fn embed_images(&self, paths: &[PathBuf]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

const CLIP_DIMENSION: usize = 512;

/// CLIP ViT-B/32 through fastembed: the vision tower for files, the text tower for queries.
pub struct ClipEmbedder {
    text_model: Arc<TextEmbedding>,
    image_model: Arc<ImageEmbedding>,
}

impl ClipEmbedder {
    pub fn new() -> anyhow::Result<Self> {
        info!("Loading CLIP text and image models");
        let text_model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::ClipVitB32).with_show_download_progress(true),
        )?;
        let image_model = ImageEmbedding::try_new(
            ImageInitOptions::new(ImageEmbeddingModel::ClipVitB32)
                .with_show_download_progress(true),
        )?;
        Ok(Self {
            text_model: Arc::new(text_model),
            image_model: Arc::new(image_model),
        })
    }
}

/// Runs ONNX inference on tokio's blocking pool.
async fn run_blocking<T, F>(job: F) -> Result<T, EmbeddingError>
where
    F: FnOnce() -> Result<T, EmbeddingError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| EmbeddingError::Task(e.to_string()))?
}

#[async_trait]
impl EmbeddingProvider for ClipEmbedder {
    fn dimension(&self) -> usize {
        CLIP_DIMENSION
    }

    async fn embed_images(&self, paths: &[PathBuf]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.image_model);
        let batch = paths.to_vec();
        let embeddings = run_blocking(move || {
            model
                .embed(batch, None)
                .map_err(|e| EmbeddingError::Model(e.to_string()))
        })
        .await?;
        if embeddings.len() != paths.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: paths.len(),
                actual: embeddings.len(),
            });
        }
        Ok(embeddings)
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model = Arc::clone(&self.text_model);
        let input = vec![text.to_string()];
        run_blocking(move || {
            model
                .embed(input, None)
                .map_err(|e| EmbeddingError::Model(e.to_string()))
        })
        .await?
        .into_iter()
        .next()
        .ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }
}
