pub mod chunker;
pub mod crud;
pub mod dedup;
pub mod embeddings;
pub mod enrichment;
pub mod expansion;
pub mod gemini;
pub mod geocoding;
pub mod grounding;
pub mod llm;
pub mod quantifiers;
pub mod vision;

pub use chunker::DocumentChunker;
pub use crud::CrudService;
pub use dedup::DeduplicationService;
pub use embeddings::{Embedder, EmbeddingTask, GeminiEmbedder};
pub use enrichment::EnrichmentService;
pub use expansion::ExpansionService;
pub use gemini::{GeminiClient, GenerativeModel};
pub use geocoding::{Geocoder, GeocodingService, GoogleGeocoder};
pub use grounding::{GroundedResponse, GroundedSource, GroundingService, MapsGroundedModel};
pub use llm::LlmService;
pub use quantifiers::QuantifierService;
pub use vision::{GeminiVision, VisionModel};
