use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::embedding::EmbeddingProvider;
use crate::error::{CollaboratorError, EmbeddingError, Result, RetrievalError, StoreError};
use crate::models::{
    CollectionTarget, CopyFailure, NamedVector, PayloadFilter, SavedResults, SearchResults,
};
use crate::store::VectorStore;

/// Turns a caption or a query image into ranked hits from the collection.
pub struct SearchOrchestrator {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    target: CollectionTarget,
    results_root: PathBuf,
}

impl SearchOrchestrator {
    pub async fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        target: CollectionTarget,
        results_root: PathBuf,
    ) -> Result<Self, StoreError> {
        store
            .ensure_collection(&target.collection, &target.spec(embedder.dimension()))
            .await?;
        info!(collection = %target.collection, "SearchOrchestrator initialized");
        Ok(Self {
            embedder,
            store,
            target,
            results_root,
        })
    }

    /// `translated_query` should already be caption-style; see [`crate::translator`].
    pub async fn search_by_text(
        &self,
        translated_query: &str,
        top_k: usize,
        category: Option<&str>,
    ) -> Result<SearchResults> {
        const OPERATION: &str = "text search";
        if translated_query.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery(
                "search text must not be empty".to_string(),
            ));
        }
        check_top_k(top_k)?;
        info!(query = translated_query, top_k, category, "Running text search");

        let vector = self
            .embedder
            .embed_text(translated_query)
            .await
            .map_err(|e| search_failure(OPERATION, translated_query, e))?;
        self.query_store(OPERATION, translated_query, vector, top_k, category)
            .await
    }

    /// Searches with a query image already written to local storage.
    pub async fn search_by_image(
        &self,
        staged_image: &Path,
        top_k: usize,
        category: Option<&str>,
    ) -> Result<SearchResults> {
        const OPERATION: &str = "image search";
        check_top_k(top_k)?;
        let label = staged_image.display().to_string();
        info!(image = %label, top_k, category, "Running image search");

        let vector = self
            .embedder
            .embed_images(&[staged_image.to_path_buf()])
            .await
            .map_err(|e| search_failure(OPERATION, &label, e))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                search_failure(
                    OPERATION,
                    &label,
                    EmbeddingError::CountMismatch {
                        expected: 1,
                        actual: 0,
                    },
                )
            })?;
        self.query_store(OPERATION, &label, vector, top_k, category)
            .await
    }

    async fn query_store(
        &self,
        operation: &'static str,
        label: &str,
        values: Vec<f32>,
        top_k: usize,
        category: Option<&str>,
    ) -> Result<SearchResults> {
        let query = NamedVector {
            name: self.target.vector_name.clone(),
            values,
        };
        let points = self
            .store
            .search(
                &self.target.collection,
                &query,
                top_k,
                &PayloadFilter::category(category),
            )
            .await
            .map_err(|e| search_failure(operation, label, e))?;

        info!(operation, total_results = points.len(), "Search completed");
        Ok(SearchResults { points })
    }

    /// Copies every hit into a fresh folder under the results root. A hit whose
    /// file cannot be copied is reported in `failures`; the rest still get copied.
    pub async fn save_results(&self, results: &SearchResults) -> Result<SavedResults> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let suffix = Uuid::new_v4().simple().to_string();
        let folder = self
            .results_root
            .join(format!("results_{}_{}", stamp, &suffix[..8]));

        tokio::fs::create_dir_all(&folder).await.map_err(|e| {
            error!(folder = %folder.display(), error = %e, "Failed to create results folder");
            RetrievalError::PersistFailure {
                path: folder.clone(),
                source: e,
            }
        })?;

        let mut copied = 0;
        let mut failures = Vec::new();
        for (rank, point) in results.points.iter().enumerate() {
            // rank prefix keeps same-named files from different folders apart
            let destination = folder.join(format!("{:02}_{}", rank + 1, point.payload.filename));
            match tokio::fs::copy(&point.payload.path, &destination).await {
                Ok(_) => copied += 1,
                Err(e) => {
                    warn!(source = %point.payload.path, error = %e, "Could not copy search result");
                    failures.push(CopyFailure {
                        source: point.payload.path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            folder = %folder.display(),
            copied,
            failed = failures.len(),
            "Search results saved locally"
        );
        Ok(SavedResults {
            folder,
            copied,
            failures,
        })
    }
}

fn check_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(RetrievalError::InvalidQuery(
            "k must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn search_failure(
    operation: &'static str,
    query: &str,
    source: impl Into<CollaboratorError>,
) -> RetrievalError {
    let source = source.into();
    error!(operation, query, error = %source, "Search failed");
    RetrievalError::SearchFailure {
        operation,
        query: query.to_string(),
        source,
    }
}
