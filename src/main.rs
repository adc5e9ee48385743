use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use image_retrieval::completion::OpenAiCompletion;
use image_retrieval::config::Settings;
use image_retrieval::embedding::ClipEmbedder;
use image_retrieval::models::SearchResults;
use image_retrieval::server::{self, AppState};
use image_retrieval::store::SurrealVectorStore;

#[derive(Parser, Debug)]
#[command(version, about = "Semantic image search over CLIP embeddings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Listen address, overrides `server.bind`
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Index every image under a folder (defaults to `images_root`)
    Ingest { folder: Option<PathBuf> },
    /// Show how a query would be rewritten before embedding
    Translate { query: String },
    /// Search with a free-text query
    SearchText {
        query: String,
        #[arg(short, default_value_t = 5)]
        k: usize,
        #[arg(long)]
        category: Option<String>,
        /// Copy matched files into a new folder under `results_root`
        #[arg(long)]
        save: bool,
    },
    /// Search with a query image
    SearchImage {
        image: PathBuf,
        #[arg(short, default_value_t = 5)]
        k: usize,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        save: bool,
    },
    /// Delete every indexed image
    Clear,
}

/// Constructs the expensive collaborators once and wires the core around them.
async fn compose(settings: &Settings) -> Result<Arc<AppState>> {
    if let Some(parent) = settings.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(SurrealVectorStore::open(&settings.db_path).await?);
    let embedder = Arc::new(ClipEmbedder::new()?);
    let completion = Arc::new(OpenAiCompletion::new(settings.completion.clone())?);
    AppState::build(settings, embedder, store, completion).await
}

async fn print_results(state: &AppState, results: &SearchResults, save: bool) -> Result<()> {
    if results.is_empty() {
        println!("No results found!");
        return Ok(());
    }

    println!("\nSearch Results:");
    println!("---------------");
    for (i, hit) in results.points.iter().enumerate() {
        println!("{}. File: {}", i + 1, hit.payload.filename);
        println!("   Path: {}", hit.payload.path);
        if let Some(category) = &hit.payload.category {
            println!("   Category: {}", category);
        }
        println!("   Score: {:.4}", hit.score);
    }

    if save {
        let saved = state.search.save_results(results).await?;
        println!("\nSaved {} file(s) to {}", saved.copied, saved.folder.display());
        for failure in &saved.failures {
            println!("   Could not copy {}: {}", failure.source, failure.reason);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load()?;
    let state = compose(&settings).await?;

    match cli.command {
        Command::Serve { bind } => {
            let addr = bind.unwrap_or(settings.server.bind);
            let app = server::create_app(state, settings.server.upload_limit_bytes);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!(%addr, "Listening");
            axum::serve(listener, app).await?;
        }
        Command::Ingest { folder } => {
            let folder = folder.unwrap_or_else(|| settings.images_root.clone());
            let report = state.ingest.index_folder(&folder).await?;
            println!(
                "Indexed {} image(s) from {} folder(s); collection now holds {}",
                report.indexed,
                report.directories,
                state.ingest.indexed_count().await?
            );
        }
        Command::Translate { query } => {
            println!("{}", state.translator.translate(&query).await?);
        }
        Command::SearchText {
            query,
            k,
            category,
            save,
        } => {
            let translated = state.translator.translate(&query).await?;
            println!("Searching for '{}'...", translated);
            let results = state
                .search
                .search_by_text(&translated, k, category.as_deref())
                .await?;
            print_results(&state, &results, save).await?;
        }
        Command::SearchImage {
            image,
            k,
            category,
            save,
        } => {
            let results = state
                .search
                .search_by_image(&image, k, category.as_deref())
                .await?;
            print_results(&state, &results, save).await?;
        }
        Command::Clear => {
            state.ingest.clear_collection().await?;
            println!("Collection '{}' cleared", settings.collection);
        }
    }

    Ok(())
}
