use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub google_api_key: String,
    pub google_maps_api_key: String,
    pub elasticsearch_url: String,
    pub gemini_model: String,
    // Cheaper model used for query-time extraction and compatibility checks
    pub gemini_fast_model: String,
    pub embedding_model: String,
    // Must match the dense_vector dims in the store mappings
    pub embedding_dimensions: usize,
    pub enable_grounding: bool,
    pub grounding_cache_ttl_days: i64,
    pub max_groundings_per_listing: usize,
    pub grounding_model: String,
    // Free parameters of the scoring regime, deliberately configuration
    pub dedup_similarity_threshold: f64,
    pub anti_claim_threshold: f64,
    pub expansion_max_concurrency: usize,
    pub quantifier_max_concurrency: usize,
    pub compatibility_batch_size: usize,
    pub vision_max_requests_per_minute: usize,
    pub llm_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8090".to_string());
        let google_api_key = env::var("GOOGLE_API_KEY").unwrap_or_default();
        let google_maps_api_key = env::var("GOOGLE_MAPS_API_KEY").unwrap_or_default();
        let elasticsearch_url = env::var("ELASTICSEARCH_URL").unwrap_or_else(|_| "http://localhost:9200".to_string());
        let gemini_model = env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-pro".to_string());
        let gemini_fast_model = env::var("GEMINI_FAST_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());
        let embedding_model = env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "gemini-embedding-001".to_string());
        let embedding_dimensions = env::var("EMBEDDING_DIMENSIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(3072);
        let enable_grounding = env::var("ENABLE_GROUNDING").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(true);
        let grounding_cache_ttl_days = env::var("GROUNDING_CACHE_TTL_DAYS").ok().and_then(|v| v.parse().ok()).unwrap_or(30);
        let max_groundings_per_listing = env::var("MAX_GROUNDINGS_PER_LISTING").ok().and_then(|v| v.parse().ok()).unwrap_or(3);
        let grounding_model = env::var("GROUNDING_MODEL").unwrap_or_else(|_| "gemini-2.0-flash-exp".to_string());
        let dedup_similarity_threshold = env::var("DEDUP_SIMILARITY_THRESHOLD").ok().and_then(|v| v.parse().ok()).unwrap_or(0.98);
        let anti_claim_threshold = env::var("ANTI_CLAIM_THRESHOLD").ok().and_then(|v| v.parse().ok()).unwrap_or(0.90);
        let expansion_max_concurrency = env::var("EXPANSION_MAX_CONCURRENCY").ok().and_then(|v| v.parse().ok()).unwrap_or(50);
        let quantifier_max_concurrency = env::var("QUANTIFIER_MAX_CONCURRENCY").ok().and_then(|v| v.parse().ok()).unwrap_or(30);
        let compatibility_batch_size = env::var("COMPATIBILITY_BATCH_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(50);
        let vision_max_requests_per_minute = env::var("VISION_MAX_RPM").ok().and_then(|v| v.parse().ok()).unwrap_or(150);
        let llm_timeout_ms = env::var("LLM_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(60_000);
        Self {
            bind_addr,
            google_api_key,
            google_maps_api_key,
            elasticsearch_url,
            gemini_model,
            gemini_fast_model,
            embedding_model,
            embedding_dimensions,
            enable_grounding,
            grounding_cache_ttl_days,
            max_groundings_per_listing,
            grounding_model,
            dedup_similarity_threshold,
            anti_claim_threshold,
            expansion_max_concurrency,
            quantifier_max_concurrency,
            compatibility_batch_size,
            vision_max_requests_per_minute,
            llm_timeout_ms,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".into(),
            google_api_key: String::new(),
            google_maps_api_key: String::new(),
            elasticsearch_url: "http://localhost:9200".into(),
            gemini_model: "gemini-2.5-pro".into(),
            gemini_fast_model: "gemini-2.5-flash".into(),
            embedding_model: "gemini-embedding-001".into(),
            embedding_dimensions: 3072,
            enable_grounding: true,
            grounding_cache_ttl_days: 30,
            max_groundings_per_listing: 3,
            grounding_model: "gemini-2.0-flash-exp".into(),
            dedup_similarity_threshold: 0.98,
            anti_claim_threshold: 0.90,
            expansion_max_concurrency: 50,
            quantifier_max_concurrency: 30,
            compatibility_batch_size: 50,
            vision_max_requests_per_minute: 150,
            llm_timeout_ms: 60_000,
        }
    }
}
