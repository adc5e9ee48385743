use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::RetrievalError;

/// API error; rendered as `{"error": ..., "type": ...}`.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Retrieval(RetrievalError),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, kind) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, "BadRequest"),
            AppError::Retrieval(e) => {
                let status = match e {
                    RetrievalError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string(), e.kind())
            }
            AppError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "Internal"),
        };
        (status, Json(json!({ "error": message, "type": kind }))).into_response()
    }
}

impl From<RetrievalError> for AppError {
    fn from(err: RetrievalError) -> Self {
        Self::Retrieval(err)
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::BadRequest(err.body_text())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.into())
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
