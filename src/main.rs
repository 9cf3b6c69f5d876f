use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Request;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing_subscriber::{fmt, EnvFilter};

use listing_search_service::api::{self, AppState};
use listing_search_service::config::Config;
use listing_search_service::es::client::EsClient;
use listing_search_service::es::DocumentStore;
use listing_search_service::indexer::IndexerPipeline;
use listing_search_service::search::filters::SearchFilters;
use listing_search_service::search::scorers::ResultScorer;
use listing_search_service::search::searchers::{ApartmentSearcher, NeighborhoodSearcher, RoomSearcher};
use listing_search_service::search::SearchPipeline;
use listing_search_service::services::gemini::GeminiClient;
use listing_search_service::services::grounding::GeminiMapsModel;
use listing_search_service::services::{
    CrudService, DeduplicationService, Embedder, EnrichmentService, ExpansionService, GeminiEmbedder, GeminiVision,
    GeocodingService, GoogleGeocoder, GroundingService, LlmService, QuantifierService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::from_default_env().add_directive("info".parse().unwrap());
    fmt()
        .with_env_filter(filter)
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(true)
        .init();

    let cfg = Config::from_env();
    tracing::info!(
        elasticsearch_url = %cfg.elasticsearch_url,
        gemini_model = %cfg.gemini_model,
        embedding_model = %cfg.embedding_model,
        embedding_dimensions = cfg.embedding_dimensions,
        grounding_enabled = cfg.enable_grounding,
        "loaded config"
    );

    let store: Arc<dyn DocumentStore> =
        Arc::new(EsClient::new(cfg.elasticsearch_url.clone(), cfg.embedding_dimensions));

    let model = Arc::new(GeminiClient::new(
        cfg.google_api_key.clone(),
        cfg.gemini_model.clone(),
        cfg.llm_timeout_ms,
    ));
    let fast_model = Arc::new(GeminiClient::new(
        cfg.google_api_key.clone(),
        cfg.gemini_fast_model.clone(),
        cfg.llm_timeout_ms,
    ));
    let grounding_model = GeminiClient::new(
        cfg.google_api_key.clone(),
        cfg.grounding_model.clone(),
        cfg.llm_timeout_ms,
    );

    let embedder: Arc<dyn Embedder> = Arc::new(GeminiEmbedder::new(
        cfg.google_api_key.clone(),
        cfg.embedding_model.clone(),
        cfg.embedding_dimensions,
        cfg.llm_timeout_ms,
    ));

    let llm = Arc::new(LlmService::new(model.clone(), fast_model.clone(), cfg.compatibility_batch_size));
    let vision = Arc::new(GeminiVision::new(
        GeminiClient::new(cfg.google_api_key.clone(), cfg.gemini_model.clone(), cfg.llm_timeout_ms),
        cfg.vision_max_requests_per_minute,
    ));
    let geocoding = Arc::new(GeocodingService::new(Arc::new(GoogleGeocoder::new(
        cfg.google_maps_api_key.clone(),
    ))));
    let grounding = Arc::new(GroundingService::new(
        Arc::new(GeminiMapsModel::new(grounding_model)),
        model.clone(),
        cfg.enable_grounding,
        cfg.grounding_cache_ttl_days,
        cfg.max_groundings_per_listing,
    ));
    let expansion = Arc::new(ExpansionService::new(fast_model.clone(), cfg.expansion_max_concurrency));
    let quantifiers = Arc::new(QuantifierService::new(model.clone(), cfg.quantifier_max_concurrency));
    let dedup = Arc::new(DeduplicationService::new(embedder.clone(), cfg.dedup_similarity_threshold));
    let enrichment = Arc::new(EnrichmentService::new(model.clone(), grounding.clone()));

    let indexer = Arc::new(IndexerPipeline::new(
        store.clone(),
        llm.clone(),
        embedder.clone(),
        vision,
        geocoding,
        grounding,
        expansion,
        quantifiers.clone(),
        dedup,
        enrichment,
    ));

    let search = Arc::new(SearchPipeline::new(
        llm.clone(),
        embedder.clone(),
        quantifiers,
        RoomSearcher::new(store.clone()),
        ApartmentSearcher::new(store.clone()),
        NeighborhoodSearcher::new(store.clone()),
        SearchFilters::new(store.clone(), cfg.anti_claim_threshold),
        ResultScorer::new(store.clone()),
    ));

    let crud = Arc::new(CrudService::new(store.clone()));

    let state = AppState { indexer, search, crud };
    let app = api::router(state).layer(CorsLayer::permissive()).layer(
        TraceLayer::new_for_http()
            .on_request(DefaultOnRequest::new().level(tracing::Level::INFO))
            .on_response(DefaultOnResponse::new().level(tracing::Level::INFO))
            .make_span_with(|req: &Request<_>| {
                let id = uuid::Uuid::new_v4();
                tracing::info_span!(
                    "http.request",
                    req.id = %id,
                    http.method = %req.method(),
                    http.path = %req.uri().path(),
                )
            }),
    );

    let addr: SocketAddr = cfg.bind_addr.parse()?;
    tracing::info!("listing-search-service listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
