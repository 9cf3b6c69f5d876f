pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::indexer::IndexerPipeline;
use crate::search::SearchPipeline;
use crate::services::crud::CrudService;

#[derive(Clone)]
pub struct AppState {
    pub indexer: Arc<IndexerPipeline>,
    pub search: Arc<SearchPipeline>,
    pub crud: Arc<CrudService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/setup", post(handlers::setup_indices))
        .route("/api/index", post(handlers::index_apartment))
        .route("/api/index/batch", post(handlers::index_apartments_batch))
        .route("/api/search", post(handlers::search_apartments))
        .route("/api/apartments", get(handlers::list_apartments))
        .route(
            "/api/apartments/{apartment_id}",
            get(handlers::get_apartment).delete(handlers::delete_apartment),
        )
        .with_state(state)
}
