use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by an [`crate::embedding::EmbeddingProvider`].
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model error: {0}")]
    Model(String),
    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("Embedding task failed: {0}")]
    Task(String),
}

/// Failures raised by a [`crate::store::VectorStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    #[error("Collection name {0:?} is reserved")]
    ReservedName(String),
    #[error("Collection {collection} already exists with a different vector spec")]
    SpecMismatch { collection: String },
    #[error("Unknown vector slot {name:?} in collection {collection}")]
    UnknownVector { collection: String, name: String },
    #[error("Vector has dimension {actual}, collection expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Failures raised by a [`crate::completion::TextCompletion`] provider.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Completion API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Completion timed out after {0}s")]
    Timeout(u64),
    #[error("Completion response had no content")]
    EmptyResponse,
}

/// Either collaborator a core operation may fail on.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WalkDir error: {0}")]
    WalkDir(#[from] walkdir::Error),
}

/// Errors surfaced by the retrieval core to its callers.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Failed to translate query {query:?}: {source}")]
    TranslationFailure {
        query: String,
        #[source]
        source: CollaboratorError,
    },
    #[error("Failed to index {}: {source}", path.display())]
    IndexingFailure {
        path: PathBuf,
        #[source]
        source: CollaboratorError,
    },
    #[error("Failed to clear collection {collection}: {source}")]
    ClearFailure {
        collection: String,
        #[source]
        source: CollaboratorError,
    },
    #[error("{operation} failed for {query:?}: {source}")]
    SearchFailure {
        operation: &'static str,
        query: String,
        #[source]
        source: CollaboratorError,
    },
    #[error("Failed to create results folder {}: {source}", path.display())]
    PersistFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RetrievalError {
    /// Short variant name, used as the `type` field of API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidQuery(_) => "InvalidQuery",
            Self::TranslationFailure { .. } => "TranslationFailure",
            Self::IndexingFailure { .. } => "IndexingFailure",
            Self::ClearFailure { .. } => "ClearFailure",
            Self::SearchFailure { .. } => "SearchFailure",
            Self::PersistFailure { .. } => "PersistFailure",
        }
    }

    pub(crate) fn indexing(path: impl Into<PathBuf>, source: impl Into<CollaboratorError>) -> Self {
        Self::IndexingFailure {
            path: path.into(),
            source: source.into(),
        }
    }
}

pub type Result<T, E = RetrievalError> = std::result::Result<T, E>;
