use serde::{Deserialize, Serialize};

use crate::models::{CopyFailure, ScoredPoint};

pub const DEFAULT_K: usize = 5;

fn default_k() -> usize {
    DEFAULT_K
}

#[derive(Debug, Deserialize)]
pub struct IngestParams {
    pub folder_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TranslateParams {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchTextParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    pub category: Option<String>,
    #[serde(default)]
    pub save_results: bool,
}

/// Multipart fields of `POST /search-image`.
#[derive(Debug, Default)]
pub struct SearchImageForm {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub contents: Option<Vec<u8>>,
    pub k: Option<usize>,
    pub category: Option<String>,
    pub save_results: bool,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub message: String,
    pub directories: usize,
    pub indexed: usize,
}

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub input: String,
    pub translated: String,
}

#[derive(Debug, Serialize)]
pub struct SearchTextResponse {
    pub query: String,
    pub translated: String,
    pub k: usize,
    pub saved_folder: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub copy_failures: Vec<CopyFailure>,
    pub results: Vec<ScoredPoint>,
}

#[derive(Debug, Serialize)]
pub struct SearchImageResponse {
    pub query_image: String,
    pub k: usize,
    pub saved_folder: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub copy_failures: Vec<CopyFailure>,
    pub results: Vec<ScoredPoint>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Query-string form of the `POST /search-image` options.
#[derive(Debug, Deserialize, Default)]
pub struct SearchImageParams {
    pub k: Option<usize>,
    pub category: Option<String>,
    #[serde(default)]
    pub save_results: bool,
}
