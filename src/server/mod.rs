mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

pub use self::error::AppError;
pub use self::state::AppState;

/// Routes of the retrieval API, sharing one [`AppState`].
pub fn create_app(state: Arc<AppState>, upload_limit_bytes: usize) -> Router {
    Router::new()
        .route("/ingest", post(api::ingest_handler))
        .route("/translate", get(api::translate_handler))
        .route("/search-text", get(api::search_text_handler))
        .route("/search-image", post(api::search_image_handler))
        .route("/collection", delete(api::clear_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(upload_limit_bytes))
        .with_state(state)
}
