#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use listing_search_service::error::{Result, ServiceError};
use listing_search_service::es::DocumentStore;
use listing_search_service::models::GeoPoint;
use listing_search_service::services::embeddings::{Embedder, EmbeddingTask};
use listing_search_service::services::gemini::GenerativeModel;
use listing_search_service::services::geocoding::Geocoder;
use listing_search_service::services::grounding::{GroundedResponse, MapsGroundedModel};
use listing_search_service::services::vision::VisionModel;

/// Deterministic embedder: explicit vectors per text, otherwise a
/// pseudo-random unit vector derived from the text bytes.
pub struct FakeEmbedder {
    pub dimensions: usize,
    pub overrides: HashMap<String, Vec<f32>>,
}

impl FakeEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, overrides: HashMap::new() }
    }

    pub fn with_vectors(dimensions: usize, overrides: Vec<(&str, Vec<f32>)>) -> Self {
        Self {
            dimensions,
            overrides: overrides.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    fn derive_vector(&self, text: &str) -> Vec<f32> {
        let mut state: u64 = 0xcbf29ce484222325;
        for b in text.bytes() {
            state ^= b as u64;
            state = state.wrapping_mul(0x100000001b3);
        }
        let mut vector = Vec::with_capacity(self.dimensions);
        for _ in 0..self.dimensions {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            vector.push(((state >> 33) as f32 / (u32::MAX >> 1) as f32) - 1.0);
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| self.overrides.get(t).cloned().unwrap_or_else(|| self.derive_vector(t)))
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Routes prompts to canned responses by substring match; deterministic
/// under concurrent callers, unlike a popped queue.
pub struct FakeModel {
    pub rules: Vec<(String, Value)>,
    pub default_text: String,
}

impl FakeModel {
    pub fn new(rules: Vec<(&str, Value)>) -> Self {
        Self {
            rules: rules.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            default_text: "generated text".into(),
        }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new(), default_text: "generated text".into() }
    }
}

#[async_trait]
impl GenerativeModel for FakeModel {
    async fn generate_json(&self, prompt: &str, _temperature: f32) -> Result<Value> {
        for (needle, response) in &self.rules {
            if prompt.contains(needle.as_str()) {
                return Ok(response.clone());
            }
        }
        Ok(json!({}))
    }

    async fn generate_text(&self, _prompt: &str, _temperature: f32) -> Result<String> {
        Ok(self.default_text.clone())
    }
}

/// A model that always fails, for exercising best-effort seams.
pub struct FailingModel;

#[async_trait]
impl GenerativeModel for FailingModel {
    async fn generate_json(&self, _prompt: &str, _temperature: f32) -> Result<Value> {
        Err(ServiceError::Upstream("model unavailable".into()))
    }

    async fn generate_text(&self, _prompt: &str, _temperature: f32) -> Result<String> {
        Err(ServiceError::Upstream("model unavailable".into()))
    }
}

pub struct FakeVision {
    pub description: String,
}

#[async_trait]
impl VisionModel for FakeVision {
    async fn describe_image(&self, _image_url: &str, _image_index: usize) -> Result<String> {
        Ok(self.description.clone())
    }
}

pub struct FakeGeocoder {
    pub point: Option<GeoPoint>,
    pub calls: Mutex<usize>,
}

impl FakeGeocoder {
    pub fn new(point: Option<GeoPoint>) -> Self {
        Self { point, calls: Mutex::new(0) }
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn geocode(&self, _address: &str) -> Result<Option<GeoPoint>> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.point)
    }
}

pub struct FakeMapsModel {
    pub response: GroundedResponse,
}

#[async_trait]
impl MapsGroundedModel for FakeMapsModel {
    async fn generate_grounded(
        &self,
        _prompt: &str,
        _location: Option<GeoPoint>,
        _enable_widget: bool,
    ) -> Result<GroundedResponse> {
        Ok(self.response.clone())
    }
}

/// In-memory [`DocumentStore`]: records writes, answers knn bodies with a
/// per-index canned response, collapse queries with a metadata response,
/// and everything else from a queue.
#[derive(Default)]
pub struct FakeStore {
    pub docs: Mutex<BTreeMap<(String, String), Value>>,
    pub knn_responses: Mutex<HashMap<String, Value>>,
    pub metadata_response: Mutex<Option<Value>>,
    pub query_responses: Mutex<VecDeque<Value>>,
    pub refreshed: Mutex<Vec<String>>,
    pub updates: Mutex<Vec<(String, String, Value)>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_knn_response(&self, index: &str, response: Value) {
        self.knn_responses.lock().unwrap().insert(index.to_string(), response);
    }

    pub fn set_metadata_response(&self, response: Value) {
        *self.metadata_response.lock().unwrap() = Some(response);
    }

    pub fn push_query_response(&self, response: Value) {
        self.query_responses.lock().unwrap().push_back(response);
    }

    pub fn docs_in_index(&self, index: &str) -> Vec<(String, Value)> {
        self.docs
            .lock()
            .unwrap()
            .iter()
            .filter(|((idx, _), _)| idx == index)
            .map(|((_, id), doc)| (id.clone(), doc.clone()))
            .collect()
    }

    pub fn empty_hits() -> Value {
        json!({ "hits": { "hits": [] } })
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn create_indices(&self) -> Result<()> {
        Ok(())
    }

    async fn index_doc(&self, index: &str, id: &str, doc: &Value) -> Result<()> {
        self.docs.lock().unwrap().insert((index.to_string(), id.to_string()), doc.clone());
        Ok(())
    }

    async fn update_doc(&self, index: &str, id: &str, patch: &Value) -> Result<()> {
        self.updates.lock().unwrap().push((index.to_string(), id.to_string(), patch.clone()));
        let mut docs = self.docs.lock().unwrap();
        if let Some(doc) = docs.get_mut(&(index.to_string(), id.to_string())) {
            if let (Some(doc_obj), Some(patch_obj)) = (doc.as_object_mut(), patch.as_object()) {
                for (k, v) in patch_obj {
                    doc_obj.insert(k.clone(), v.clone());
                }
            }
        }
        Ok(())
    }

    async fn get_doc(&self, index: &str, id: &str) -> Result<Option<Value>> {
        Ok(self.docs.lock().unwrap().get(&(index.to_string(), id.to_string())).cloned())
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Value> {
        if body.get("knn").is_some() {
            return Ok(self
                .knn_responses
                .lock()
                .unwrap()
                .get(index)
                .cloned()
                .unwrap_or_else(Self::empty_hits));
        }
        if body.get("collapse").is_some() {
            return Ok(self.metadata_response.lock().unwrap().clone().unwrap_or_else(Self::empty_hits));
        }
        Ok(self.query_responses.lock().unwrap().pop_front().unwrap_or_else(Self::empty_hits))
    }

    async fn delete_by_query(&self, index: &str, body: &Value) -> Result<u64> {
        let target = body
            .pointer("/query/term/apartment_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let mut docs = self.docs.lock().unwrap();
        let before = docs.len();
        docs.retain(|(idx, _), doc| {
            if idx != index {
                return true;
            }
            match &target {
                Some(apartment_id) => {
                    doc.get("apartment_id").and_then(|v| v.as_str()) != Some(apartment_id.as_str())
                }
                None => false,
            }
        });
        Ok((before - docs.len()) as u64)
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        self.refreshed.lock().unwrap().push(index.to_string());
        Ok(())
    }
}

/// Wire a full [`AppState`] (indexer + search + crud) over fakes, the same
/// way main.rs wires the real providers.
pub fn build_app_state(
    store: std::sync::Arc<FakeStore>,
    model: std::sync::Arc<FakeModel>,
    embedder: std::sync::Arc<FakeEmbedder>,
    geocoder: std::sync::Arc<FakeGeocoder>,
    maps: std::sync::Arc<FakeMapsModel>,
) -> listing_search_service::api::AppState {
    use listing_search_service::api::AppState;
    use listing_search_service::indexer::IndexerPipeline;
    use listing_search_service::search::filters::SearchFilters;
    use listing_search_service::search::scorers::ResultScorer;
    use listing_search_service::search::searchers::{ApartmentSearcher, NeighborhoodSearcher, RoomSearcher};
    use listing_search_service::search::SearchPipeline;
    use listing_search_service::services::{
        CrudService, DeduplicationService, EnrichmentService, ExpansionService, GeocodingService, GroundingService,
        LlmService, QuantifierService,
    };
    use std::sync::Arc;

    let store: Arc<dyn DocumentStore> = store;
    let model: Arc<dyn GenerativeModel> = model;
    let embedder: Arc<dyn Embedder> = embedder;

    let llm = Arc::new(LlmService::new(model.clone(), model.clone(), 50));
    let vision = Arc::new(FakeVision { description: "modern kitchen with gas stove".into() });
    let geocoding = Arc::new(GeocodingService::new(geocoder));
    let grounding = Arc::new(GroundingService::new(maps, model.clone(), true, 30, 3));
    let expansion = Arc::new(ExpansionService::new(model.clone(), 8));
    let quantifiers = Arc::new(QuantifierService::new(model.clone(), 8));
    let dedup = Arc::new(DeduplicationService::new(embedder.clone(), 0.98));
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
        llm,
        embedder,
        quantifiers,
        RoomSearcher::new(store.clone()),
        ApartmentSearcher::new(store.clone()),
        NeighborhoodSearcher::new(store.clone()),
        SearchFilters::new(store.clone(), 0.90),
        ResultScorer::new(store.clone()),
    ));
    let crud = Arc::new(CrudService::new(store));

    AppState { indexer, search, crud }
}

/// Hit shape the searchers parse, for building knn responses in tests.
pub fn knn_hit(score: f64, source: Value) -> Value {
    json!({ "_score": score, "_source": source })
}

pub fn knn_response(hits: Vec<Value>) -> Value {
    json!({ "hits": { "hits": hits } })
}
