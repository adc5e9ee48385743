use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::completion::TextCompletion;
use crate::config::Settings;
use crate::embedding::EmbeddingProvider;
use crate::ingest::IngestionPipeline;
use crate::models::CollectionTarget;
use crate::search::SearchOrchestrator;
use crate::store::VectorStore;
use crate::translator::{QueryTranslator, TranslationCache};

/// Long-lived services shared by every request.
pub struct AppState {
    pub translator: QueryTranslator,
    pub ingest: IngestionPipeline,
    pub search: SearchOrchestrator,
    pub images_root: PathBuf,
    pub query_image_root: PathBuf,
}

impl AppState {
    /// Wires the core components around already constructed collaborators.
    pub async fn build(
        settings: &Settings,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        completion: Arc<dyn TextCompletion>,
    ) -> anyhow::Result<Arc<Self>> {
        let target = CollectionTarget::new(&settings.collection, &settings.vector_name);

        let cache = Arc::new(TranslationCache::new(settings.translator.cache_capacity));
        let translator = QueryTranslator::new(
            completion,
            cache,
            &settings.translator,
            Duration::from_secs(settings.completion.timeout_secs),
        );
        let ingest = IngestionPipeline::new(embedder.clone(), store.clone(), target.clone()).await?;
        let search =
            SearchOrchestrator::new(embedder, store, target, settings.results_root.clone()).await?;

        info!("Services initialized successfully");
        Ok(Arc::new(AppState {
            translator,
            ingest,
            search,
            images_root: settings.images_root.clone(),
            query_image_root: settings.query_image_root.clone(),
        }))
    }
}
