//! Semantic image retrieval: folder ingestion into a vector collection,
//! LLM rewriting of chat-style queries with a bounded cache, and text or
//! image similarity search over CLIP embeddings.

pub mod completion;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod models;
pub mod search;
pub mod server;
pub mod store;
pub mod translator;

#[cfg(test)]
mod testing;

pub use error::{RetrievalError, Result};
