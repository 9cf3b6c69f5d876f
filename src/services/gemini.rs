use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Result, ServiceError};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Text-generation surface the domain services depend on. JSON mode returns
/// the parsed object so callers never re-parse model output themselves.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate_json(&self, prompt: &str, temperature: f32) -> Result<Value>;
    async fn generate_text(&self, prompt: &str, temperature: f32) -> Result<String>;
}

#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    model: String,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, timeout_ms: u64) -> Self {
        Self::with_base_url(GEMINI_API_BASE.to_string(), api_key, model, timeout_ms)
    }

    pub fn with_base_url(base_url: String, api_key: String, model: String, timeout_ms: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .expect("failed to build http client");
        Self { base_url, api_key, model, http }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, body: Value) -> Result<Value> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        );
        let resp = self.http.post(&url).json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            tracing::error!(target: "llm.generate", { http.status = %status, model = %self.model, body.preview = %text.chars().take(300).collect::<String>() }, "generation request failed");
            return Err(ServiceError::Upstream(format!("generation failed ({}): {}", status, text)));
        }
        serde_json::from_str(&text)
            .map_err(|e| ServiceError::Upstream(format!("invalid JSON from model ({}): {}", status, e)))
    }

    /// Send a fully caller-built request body (multimodal parts, tools) and
    /// return the candidate text.
    pub async fn generate_with_parts(&self, body: Value) -> Result<String> {
        let response = self.generate(body).await?;
        Self::extract_text(&response)
            .map(|t| t.trim().to_string())
            .ok_or_else(|| ServiceError::Upstream("empty model response".into()))
    }

    /// Send a caller-built request body and return the raw response JSON.
    pub async fn generate_raw(&self, body: Value) -> Result<Value> {
        self.generate(body).await
    }

    /// First candidate text, concatenating multi-part responses.
    pub fn extract_text(response: &Value) -> Option<String> {
        let parts = response
            .get("candidates")?
            .as_array()?
            .first()?
            .get("content")?
            .get("parts")?
            .as_array()?;
        let mut out = String::new();
        for part in parts {
            if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
                out.push_str(t);
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate_json(&self, prompt: &str, temperature: f32) -> Result<Value> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": temperature,
                "responseMimeType": "application/json"
            }
        });
        let response = self.generate(body).await?;
        let text = Self::extract_text(&response)
            .ok_or_else(|| ServiceError::Upstream("empty model response".into()))?;
        serde_json::from_str(text.trim())
            .map_err(|e| ServiceError::Upstream(format!("model returned invalid JSON: {}", e)))
    }

    async fn generate_text(&self, prompt: &str, temperature: f32) -> Result<String> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": temperature }
        });
        let response = self.generate(body).await?;
        Self::extract_text(&response)
            .map(|t| t.trim().to_string())
            .ok_or_else(|| ServiceError::Upstream("empty model response".into()))
    }
}
