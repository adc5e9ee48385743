use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::Json;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::{AppError, Result};
use super::state::AppState;
use super::types::*;
use crate::models::{CopyFailure, SearchResults};

/// Blank categories mean "no filter".
fn category_filter(category: &Option<String>) -> Option<&str> {
    category.as_deref().map(str::trim).filter(|c| !c.is_empty())
}

async fn persist(
    state: &AppState,
    results: &SearchResults,
    save: bool,
) -> Result<(Option<String>, Vec<CopyFailure>)> {
    if !save || results.is_empty() {
        return Ok((None, Vec::new()));
    }
    let saved = state.search.save_results(results).await?;
    Ok((Some(saved.folder.display().to_string()), saved.failures))
}

pub async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IngestParams>,
) -> Result<Json<IngestResponse>> {
    let folder = params
        .folder_path
        .map(PathBuf::from)
        .unwrap_or_else(|| state.images_root.clone());
    if !folder.is_dir() {
        return Err(AppError::BadRequest(format!(
            "Invalid folder: {}",
            folder.display()
        )));
    }

    let report = state.ingest.index_folder(&folder).await?;
    Ok(Json(IngestResponse {
        message: format!("Ingested images from {}", folder.display()),
        directories: report.directories,
        indexed: report.indexed,
    }))
}

pub async fn translate_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TranslateParams>,
) -> Result<Json<TranslateResponse>> {
    info!(query = %params.q, "Translate request received");
    let translated = state.translator.translate(&params.q).await?;
    Ok(Json(TranslateResponse {
        input: params.q,
        translated,
    }))
}

pub async fn search_text_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchTextParams>,
) -> Result<Json<SearchTextResponse>> {
    let category = category_filter(&params.category);
    info!(query = %params.q, top_k = params.k, category, "Text search request received");

    let translated = state.translator.translate(&params.q).await?;
    let results = state
        .search
        .search_by_text(&translated, params.k, category)
        .await?;
    let (saved_folder, copy_failures) = persist(&state, &results, params.save_results).await?;

    Ok(Json(SearchTextResponse {
        query: params.q,
        translated,
        k: params.k,
        saved_folder,
        copy_failures,
        results: results.points,
    }))
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(AppError::BadRequest(format!("invalid boolean: {}", other))),
    }
}

/// Reads the upload and any form fields; form fields override query parameters.
async fn read_search_image_form(
    params: SearchImageParams,
    multipart: &mut Multipart,
) -> Result<SearchImageForm> {
    let mut form = SearchImageForm {
        k: params.k,
        category: params.category,
        save_results: params.save_results,
        ..SearchImageForm::default()
    };
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(str::to_string);
                form.content_type = field.content_type().map(str::to_string);
                form.contents = Some(field.bytes().await?.to_vec());
            }
            "k" => {
                let text = field.text().await?;
                let k = text
                    .trim()
                    .parse()
                    .map_err(|_| AppError::BadRequest(format!("invalid k: {}", text)))?;
                form.k = Some(k);
            }
            "category" => form.category = Some(field.text().await?),
            "save_results" => form.save_results = parse_flag(&field.text().await?)?,
            _ => {}
        }
    }
    Ok(form)
}

/// Final path component of the client's file name, or a fallback.
fn staged_file_name(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).file_name())
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "query".to_string())
}

pub async fn search_image_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchImageParams>,
    mut multipart: Multipart,
) -> Result<Json<SearchImageResponse>> {
    let form = read_search_image_form(params, &mut multipart).await?;
    let contents = form
        .contents
        .ok_or_else(|| AppError::BadRequest("Missing file field".to_string()))?;

    let file_name = staged_file_name(form.file_name.as_deref());
    info!(filename = %file_name, "Image search request received");
    let content_type = form
        .content_type
        .or_else(|| mime_guess::from_path(&file_name).first().map(|m| m.to_string()));
    if !content_type.is_some_and(|ct| ct.starts_with("image/")) {
        return Err(AppError::BadRequest("Only image files allowed".to_string()));
    }

    tokio::fs::create_dir_all(&state.query_image_root).await?;
    let prefix = Uuid::new_v4().simple().to_string();
    let query_path = state
        .query_image_root
        .join(format!("{}_{}", &prefix[..8], file_name));
    tokio::fs::write(&query_path, &contents).await?;
    info!(path = %query_path.display(), "Uploaded query image saved");

    let k = form.k.unwrap_or(DEFAULT_K);
    let searched = state
        .search
        .search_by_image(&query_path, k, category_filter(&form.category))
        .await;
    // staged uploads live only as long as their search
    if let Err(e) = tokio::fs::remove_file(&query_path).await {
        warn!(path = %query_path.display(), error = %e, "Failed to remove staged query image");
    }
    let results = searched?;
    let (saved_folder, copy_failures) = persist(&state, &results, form.save_results).await?;

    Ok(Json(SearchImageResponse {
        query_image: file_name,
        k,
        saved_folder,
        copy_failures,
        results: results.points,
    }))
}

pub async fn clear_handler(State(state): State<Arc<AppState>>) -> Result<Json<MessageResponse>> {
    state.ingest.clear_collection().await?;
    Ok(Json(MessageResponse {
        message: "Collection cleared".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_category_is_no_filter() {
        assert_eq!(category_filter(&None), None);
        assert_eq!(category_filter(&Some("  ".to_string())), None);
        assert_eq!(category_filter(&Some("cats".to_string())), Some("cats"));
    }

    #[test]
    fn staged_name_strips_directories() {
        assert_eq!(staged_file_name(Some("../../etc/cat.png")), "cat.png");
        assert_eq!(staged_file_name(Some("dog.jpg")), "dog.jpg");
        assert_eq!(staged_file_name(None), "query");
        assert_eq!(staged_file_name(Some("..")), "query");
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag("True").unwrap());
        assert!(!parse_flag("0").unwrap());
        assert!(parse_flag("maybe").is_err());
    }
}
