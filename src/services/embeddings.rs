use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Result, ServiceError};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    RetrievalDocument,
    RetrievalQuery,
}

impl EmbeddingTask {
    fn as_api_str(&self) -> &'static str {
        match self {
            EmbeddingTask::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            EmbeddingTask::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

/// Embedding provider. Length and dimensionality mismatches are fatal for
/// the whole batch, never silently padded.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>>;
    fn dimensions(&self) -> usize;
}

#[derive(Clone)]
pub struct GeminiEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    http: reqwest::Client,
}

impl GeminiEmbedder {
    pub fn new(api_key: String, model: String, dimensions: usize, timeout_ms: u64) -> Self {
        Self::with_base_url(GEMINI_API_BASE.to_string(), api_key, model, dimensions, timeout_ms)
    }

    pub fn with_base_url(base_url: String, api_key: String, model: String, dimensions: usize, timeout_ms: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .expect("failed to build http client");
        Self { base_url, api_key, model, dimensions, http }
    }

    fn extract_embeddings(response: &Value) -> Option<Vec<Vec<f32>>> {
        let items = response.get("embeddings")?.as_array()?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let values = item.get("values")?.as_array()?;
            out.push(values.iter().filter_map(|v| v.as_f64()).map(|f| f as f32).collect());
        }
        Some(out)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<Value> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": text }] },
                    "taskType": task.as_api_str(),
                    "outputDimensionality": self.dimensions,
                })
            })
            .collect();

        let url = format!(
            "{}/models/{}:batchEmbedContents?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        );
        let resp = self.http.post(&url).json(&json!({ "requests": requests })).send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            tracing::error!(target: "embeddings", { http.status = %status, count = texts.len() }, "embedding request failed");
            return Err(ServiceError::Upstream(format!("embedding failed ({}): {}", status, body)));
        }
        let json: Value = serde_json::from_str(&body)
            .map_err(|e| ServiceError::Upstream(format!("invalid JSON from embedder: {}", e)))?;
        let embeddings = Self::extract_embeddings(&json)
            .ok_or_else(|| ServiceError::Upstream("unexpected embedding response shape".into()))?;

        if embeddings.len() != texts.len() {
            return Err(ServiceError::EmbeddingMismatch(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        for (i, embedding) in embeddings.iter().enumerate() {
            if embedding.len() != self.dimensions {
                return Err(ServiceError::EmbeddingMismatch(format!(
                    "embedding {} has dim {}, expected {}",
                    i,
                    embedding.len(),
                    self.dimensions
                )));
            }
        }

        tracing::debug!(target: "embeddings", count = embeddings.len(), dims = self.dimensions, "generated embeddings");
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
