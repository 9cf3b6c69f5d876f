use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::Level;

use crate::error::{Result, ServiceError};
use crate::es::{mappings, DocumentStore, APARTMENTS_INDEX, NEIGHBORHOODS_INDEX, ROOMS_INDEX};

/// Thin Elasticsearch REST client. Holds no connection state beyond the
/// pooled reqwest client, so it is cheap to clone into pipeline handles.
#[derive(Clone)]
pub struct EsClient {
    base_url: String,
    embedding_dimensions: usize,
    http: Client,
}

impl EsClient {
    pub fn new(base_url: String, embedding_dimensions: usize) -> Self {
        Self { base_url, embedding_dimensions, http: Client::new() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn truncate_body(body: &str) -> (String, bool) {
        const LIMIT: usize = 2_000;
        if body.len() > LIMIT {
            (format!("{}…<truncated {} chars>", &body[..LIMIT], body.len() - LIMIT), true)
        } else {
            (body.to_string(), false)
        }
    }

    fn parse_error_body(body: &str) -> (Option<String>, Vec<String>) {
        let mut error_type = None;
        let mut reasons: Vec<String> = Vec::new();
        if let Ok(json) = serde_json::from_str::<Value>(body) {
            if let Some(err) = json.get("error") {
                if let Some(t) = err.get("type").and_then(|t| t.as_str()) {
                    error_type = Some(t.to_string());
                }
                if let Some(r) = err.get("reason").and_then(|r| r.as_str()) {
                    reasons.push(r.to_string());
                }
                if let Some(causes) = err.get("root_cause").and_then(|c| c.as_array()) {
                    for cause in causes {
                        if let Some(r) = cause.get("reason").and_then(|r| r.as_str()) {
                            let r = r.to_string();
                            if !reasons.contains(&r) {
                                reasons.push(r);
                            }
                        }
                    }
                }
            }
        }
        (error_type, reasons)
    }

    async fn create_index(&self, index: &str, mapping: Value) -> Result<()> {
        let url = self.url(index);
        let resp = self.http.put(&url).json(&mapping).send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status.is_success() {
            tracing::info!(target: "es.setup", index, "created index");
            return Ok(());
        }
        let (error_type, reasons) = Self::parse_error_body(&body);
        if error_type.as_deref() == Some("resource_already_exists_exception") {
            tracing::info!(target: "es.setup", index, "index already exists");
            return Ok(());
        }
        let (preview, truncated) = Self::truncate_body(&body);
        tracing::event!(
            Level::ERROR,
            target = "es.setup",
            http.status = %status,
            index,
            error.reasons = ?reasons,
            body.truncated = truncated,
            body.preview = preview,
            "index creation failed"
        );
        Err(ServiceError::Store(format!(
            "create index {} failed ({}): {}",
            index,
            status,
            reasons.first().cloned().unwrap_or(body)
        )))
    }

    async fn check_write_response(&self, op: &str, index: &str, resp: reqwest::Response) -> Result<Value> {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let (_, reasons) = Self::parse_error_body(&body);
            let (preview, truncated) = Self::truncate_body(&body);
            tracing::event!(
                Level::ERROR,
                target = "es.write",
                http.status = %status,
                index,
                op,
                error.reasons = ?reasons,
                body.truncated = truncated,
                body.preview = preview,
                "store write failed"
            );
            return Err(ServiceError::Store(format!(
                "{} on {} failed ({}): {}",
                op,
                index,
                status,
                reasons.first().cloned().unwrap_or(preview)
            )));
        }
        serde_json::from_str(&body)
            .map_err(|e| ServiceError::Store(format!("invalid JSON from store ({}): {}", status, e)))
    }
}

#[async_trait]
impl DocumentStore for EsClient {
    async fn create_indices(&self) -> Result<()> {
        self.create_index(ROOMS_INDEX, mappings::rooms_mapping(self.embedding_dimensions)).await?;
        self.create_index(APARTMENTS_INDEX, mappings::apartments_mapping(self.embedding_dimensions)).await?;
        self.create_index(NEIGHBORHOODS_INDEX, mappings::neighborhoods_mapping(self.embedding_dimensions)).await?;
        Ok(())
    }

    async fn index_doc(&self, index: &str, id: &str, doc: &Value) -> Result<()> {
        let url = self.url(&format!("{}/_doc/{}", index, urlencoding::encode(id)));
        let resp = self.http.put(&url).json(doc).send().await?;
        self.check_write_response("index", index, resp).await?;
        Ok(())
    }

    async fn update_doc(&self, index: &str, id: &str, patch: &Value) -> Result<()> {
        let url = self.url(&format!("{}/_update/{}", index, urlencoding::encode(id)));
        let body = serde_json::json!({ "doc": patch });
        let resp = self.http.post(&url).json(&body).send().await?;
        self.check_write_response("update", index, resp).await?;
        Ok(())
    }

    async fn get_doc(&self, index: &str, id: &str) -> Result<Option<Value>> {
        let url = self.url(&format!("{}/_doc/{}", index, urlencoding::encode(id)));
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ServiceError::Store(format!("get {}/{} failed ({})", index, id, status)));
        }
        let json: Value = serde_json::from_str(&body)
            .map_err(|e| ServiceError::Store(format!("invalid JSON from store: {}", e)))?;
        Ok(json.get("_source").cloned())
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Value> {
        let url = self.url(&format!("{}/_search", index));
        let resp = self.http.post(&url).json(body).send().await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let (_, reasons) = Self::parse_error_body(&text);
            let (preview, truncated) = Self::truncate_body(&text);
            tracing::event!(
                Level::ERROR,
                target = "es.search",
                http.status = %status,
                index,
                error.reasons = ?reasons,
                body.truncated = truncated,
                body.preview = preview,
                req.keys = ?body.as_object().map(|o| o.keys().cloned().collect::<Vec<_>>()),
                "search failed"
            );
            return Err(ServiceError::Store(format!(
                "search on {} failed ({}): {}",
                index,
                status,
                reasons.first().cloned().unwrap_or(preview)
            )));
        }
        serde_json::from_str(&text)
            .map_err(|e| ServiceError::Store(format!("invalid JSON from store ({}): {}", status, e)))
    }

    async fn delete_by_query(&self, index: &str, body: &Value) -> Result<u64> {
        let url = self.url(&format!("{}/_delete_by_query", index));
        let resp = self.http.post(&url).json(body).send().await?;
        let json = self.check_write_response("delete_by_query", index, resp).await?;
        Ok(json.get("deleted").and_then(|d| d.as_u64()).unwrap_or(0))
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        let url = self.url(&format!("{}/_refresh", index));
        let resp = self.http.post(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::Store(format!("refresh {} failed ({})", index, status)));
        }
        Ok(())
    }
}
