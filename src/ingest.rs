use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::embedding::EmbeddingProvider;
use crate::error::{CollaboratorError, EmbeddingError, Result, RetrievalError, StoreError};
use crate::models::{CollectionTarget, IndexedPoint, IngestReport, MediaAsset, PayloadFilter};
use crate::store::VectorStore;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Embeds image files and writes them into the target collection.
pub struct IngestionPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    target: CollectionTarget,
}

impl IngestionPipeline {
    /// Makes sure the collection exists with the embedder's dimension.
    pub async fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        target: CollectionTarget,
    ) -> Result<Self, StoreError> {
        store
            .ensure_collection(&target.collection, &target.spec(embedder.dimension()))
            .await?;
        info!(collection = %target.collection, "IngestionPipeline initialized");
        Ok(Self {
            embedder,
            store,
            target,
        })
    }

    /// Indexes one image as a new asset, even if the same path was indexed before.
    pub async fn index_image(&self, image_path: &Path, category: Option<&str>) -> Result<MediaAsset> {
        info!(image = %image_path.display(), category, "Indexing single image");

        let result = self.embed_and_store_one(image_path, category).await;
        match &result {
            Ok(asset) => info!(id = %asset.id, "Single image indexed successfully"),
            Err(e) => error!(image = %image_path.display(), error = %e, "Single image indexing failed"),
        }
        result
    }

    async fn embed_and_store_one(&self, image_path: &Path, category: Option<&str>) -> Result<MediaAsset> {
        let vector = self
            .embedder
            .embed_images(&[image_path.to_path_buf()])
            .await
            .map_err(|e| RetrievalError::indexing(image_path, e))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RetrievalError::indexing(
                    image_path,
                    EmbeddingError::CountMismatch {
                        expected: 1,
                        actual: 0,
                    },
                )
            })?;

        let asset = MediaAsset::from_path(image_path, category.map(str::to_string));
        let point = IndexedPoint::new(&asset, &self.target.vector_name, vector);
        self.store
            .upsert(&self.target.collection, vec![point])
            .await
            .map_err(|e| RetrievalError::indexing(image_path, e))?;
        Ok(asset)
    }

    /// Walks `root_folder` and indexes every image, one embedding batch and one
    /// upsert per directory. Each image is tagged with the name of the directory
    /// that directly contains it. Directories indexed before a failure stay indexed.
    pub async fn index_folder(&self, root_folder: &Path) -> Result<IngestReport> {
        info!(folder = %root_folder.display(), "Starting folder indexing");

        let mut report = IngestReport::default();
        let directories = WalkDir::new(root_folder)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.file_type().is_dir());

        for entry in directories {
            let entry = entry.map_err(|e| {
                error!(folder = %root_folder.display(), error = %e, "Folder indexing failed");
                RetrievalError::indexing(root_folder, e)
            })?;
            let indexed = self.index_directory(entry.path()).await.inspect_err(|e| {
                error!(folder = %root_folder.display(), error = %e, "Folder indexing failed");
            })?;
            if indexed > 0 {
                report.directories += 1;
                report.indexed += indexed;
            }
        }

        info!(
            folder = %root_folder.display(),
            directories = report.directories,
            indexed = report.indexed,
            "Folder indexing complete"
        );
        Ok(report)
    }

    async fn index_directory(&self, dir: &Path) -> Result<usize> {
        let category = dir.file_name().map(|name| name.to_string_lossy().to_string());
        if category.is_none() {
            warn!(folder = %dir.display(), "Directory has no name, indexing without category");
        }

        let image_paths = direct_images(dir).map_err(|e| RetrievalError::indexing(dir, e))?;
        if image_paths.is_empty() {
            return Ok(0);
        }

        info!(
            folder = %dir.display(),
            total_images = image_paths.len(),
            category = category.as_deref(),
            "Embedding batch"
        );
        let vectors = self
            .embedder
            .embed_images(&image_paths)
            .await
            .map_err(|e| RetrievalError::indexing(dir, e))?;
        if vectors.len() != image_paths.len() {
            return Err(RetrievalError::indexing(
                dir,
                EmbeddingError::CountMismatch {
                    expected: image_paths.len(),
                    actual: vectors.len(),
                },
            ));
        }

        let points: Vec<IndexedPoint> = image_paths
            .iter()
            .zip(vectors)
            .map(|(path, vector)| {
                let asset = MediaAsset::from_path(path, category.clone());
                IndexedPoint::new(&asset, &self.target.vector_name, vector)
            })
            .collect();
        let indexed = points.len();

        self.store
            .upsert(&self.target.collection, points)
            .await
            .map_err(|e| RetrievalError::indexing(dir, e))?;

        info!(folder = %dir.display(), indexed, "Folder indexed successfully");
        Ok(indexed)
    }

    /// Deletes every point in the collection. Irreversible.
    pub async fn clear_collection(&self) -> Result<()> {
        warn!(collection = %self.target.collection, "Clearing collection");
        self.store
            .delete(&self.target.collection, &PayloadFilter::all())
            .await
            .map_err(|e| {
                error!(error = %e, "Collection clear failed");
                RetrievalError::ClearFailure {
                    collection: self.target.collection.clone(),
                    source: e.into(),
                }
            })?;
        info!("Collection cleared successfully");
        Ok(())
    }

    pub async fn indexed_count(&self) -> Result<usize, StoreError> {
        self.store.count(&self.target.collection).await
    }
}

/// Image files directly inside `dir`, sorted by name.
fn direct_images(dir: &Path) -> Result<Vec<PathBuf>, CollaboratorError> {
    let mut images = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !is_image(entry.path()) {
            continue;
        }
        // metadata through the link, so symlinked images count
        if entry.path().is_file() {
            images.push(entry.into_path());
        } else if entry.path_is_symlink() {
            warn!(path = %entry.path().display(), "Skipping dangling image link");
        }
    }
    Ok(images)
}
