use axum::extract::{Path, Query, State};
use axum::Json;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::error::{Result, ServiceError};
use crate::models::{BatchIndexRequest, IndexRequest, SearchRequest};

pub async fn setup_indices(State(state): State<AppState>) -> Result<Json<Value>> {
    let result = state.crud.setup_indices().await?;
    Ok(Json(result))
}

pub async fn index_apartment(
    State(state): State<AppState>,
    Json(request): Json<IndexRequest>,
) -> Result<Json<Value>> {
    validate_index_request(&request)?;
    let summary = state.indexer.process(request).await?;
    Ok(Json(serde_json::to_value(summary).unwrap_or_default()))
}

pub async fn index_apartments_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchIndexRequest>,
) -> Result<Json<Value>> {
    tracing::info!(target: "api", count = request.apartments.len(), "batch indexing");

    let tasks = request.apartments.iter().map(|apt| async {
        if let Err(e) = validate_index_request(apt) {
            return Err(e);
        }
        state.indexer.process(apt.clone()).await
    });
    let results = join_all(tasks).await;

    let mut successes = Vec::new();
    let mut errors = Vec::new();
    for (apt, result) in request.apartments.iter().zip(results) {
        match result {
            Ok(summary) => successes.push(serde_json::to_value(summary).unwrap_or_default()),
            Err(e) => errors.push(json!({
                "apartment_id": apt.apartment_id,
                "error": e.to_string(),
            })),
        }
    }

    Ok(Json(json!({
        "status": "complete",
        "total": request.apartments.len(),
        "successful": successes.len(),
        "failed": errors.len(),
        "results": successes,
        "errors": errors,
    })))
}

pub async fn search_apartments(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Value>> {
    let results = state
        .search
        .search(
            &request.query,
            request.top_k,
            request.user_location,
            request.verify_claims,
            request.double_check_matches,
        )
        .await?;
    Ok(Json(json!({ "results": results })))
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub has_images: bool,
}

pub async fn list_apartments(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    if query.page < 1 {
        return Err(ServiceError::InvalidInput("page must be >= 1".into()));
    }
    if query.page_size < 1 || query.page_size > 100 {
        return Err(ServiceError::InvalidInput("page_size must be between 1 and 100".into()));
    }
    let result = state.crud.list_apartments(query.page, query.page_size, query.has_images).await?;
    Ok(Json(result))
}

pub async fn get_apartment(
    State(state): State<AppState>,
    Path(apartment_id): Path<String>,
) -> Result<Json<Value>> {
    let result = state.crud.get_apartment(&apartment_id).await?;
    Ok(Json(result))
}

pub async fn delete_apartment(
    State(state): State<AppState>,
    Path(apartment_id): Path<String>,
) -> Result<Json<Value>> {
    let result = state.crud.delete_apartment(&apartment_id).await?;
    Ok(Json(result))
}

fn validate_index_request(request: &IndexRequest) -> Result<()> {
    let has_document = request.document.as_deref().map(|d| !d.trim().is_empty()).unwrap_or(false);
    let has_images = request.image_urls.as_deref().map(|urls| !urls.is_empty()).unwrap_or(false);
    if !has_document && !has_images {
        return Err(ServiceError::InvalidInput(
            "at least one of 'document' or 'image_urls' must be provided".into(),
        ));
    }
    Ok(())
}
