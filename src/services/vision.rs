use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use serde_json::json;
use tokio::sync::Mutex;

use crate::error::{Result, ServiceError};
use crate::services::gemini::GeminiClient;

/// Produces a searchable natural-language description of a listing photo.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn describe_image(&self, image_url: &str, image_index: usize) -> Result<String>;
}

/// Sliding-window admission control: at most `max_requests` calls in any
/// `window` period. Callers block inside the limiter until admitted.
struct RateLimiter {
    window: Duration,
    max_requests: usize,
    requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self { window, max_requests, requests: Mutex::new(VecDeque::new()) }
    }

    async fn acquire(&self) {
        let mut requests = self.requests.lock().await;
        let mut now = Instant::now();
        while let Some(oldest) = requests.front() {
            if now.duration_since(*oldest) >= self.window {
                requests.pop_front();
            } else {
                break;
            }
        }
        if requests.len() >= self.max_requests {
            if let Some(oldest) = requests.front() {
                let wait = self.window.saturating_sub(now.duration_since(*oldest));
                if !wait.is_zero() {
                    tracing::info!(target: "vision", wait_ms = wait.as_millis() as u64, "rate limit reached, waiting for admission");
                    tokio::time::sleep(wait).await;
                }
            }
            now = Instant::now();
            while let Some(oldest) = requests.front() {
                if now.duration_since(*oldest) >= self.window {
                    requests.pop_front();
                } else {
                    break;
                }
            }
        }
        requests.push_back(now);
    }
}

pub struct GeminiVision {
    model: GeminiClient,
    http: reqwest::Client,
    limiter: RateLimiter,
}

impl GeminiVision {
    pub fn new(model: GeminiClient, max_requests_per_minute: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build http client");
        Self { model, http, limiter: RateLimiter::new(max_requests_per_minute, Duration::from_secs(60)) }
    }

    async fn fetch_image_data(&self, image_url: &str) -> Result<Vec<u8>> {
        let resp = self.http.get(image_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::Upstream(format!("image fetch failed ({}): {}", status, image_url)));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    fn infer_mime_type(image_url: &str) -> &'static str {
        let lower = image_url.to_ascii_lowercase();
        if lower.ends_with(".png") {
            "image/png"
        } else if lower.ends_with(".webp") {
            "image/webp"
        } else if lower.ends_with(".gif") {
            "image/gif"
        } else {
            "image/jpeg"
        }
    }

    fn description_prompt() -> &'static str {
        "Describe this apartment/room image in detail for property search indexing.\n\n\
         Extract and describe:\n\
         1. Room type and layout (kitchen, bedroom, bathroom, living room, etc.)\n\
         2. Physical features (hardwood floors, exposed brick, high ceilings, crown molding, etc.)\n\
         3. Appliances and fixtures (stainless steel appliances, marble countertops, walk-in shower, etc.)\n\
         4. Style and condition (modern, renovated, vintage, pristine, worn, etc.)\n\
         5. Amenities (washer/dryer, dishwasher, closet space, balcony, etc.)\n\
         6. Architectural details (windows, lighting, built-ins, etc.)\n\
         7. Size perception (spacious, compact, open-concept, etc.)\n\n\
         Write as a natural apartment listing description. Focus on searchable features. \
         Omit subjective marketing language."
    }
}

#[async_trait]
impl VisionModel for GeminiVision {
    async fn describe_image(&self, image_url: &str, image_index: usize) -> Result<String> {
        self.limiter.acquire().await;

        let image_data = self.fetch_image_data(image_url).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image_data);

        let body = json!({
            "contents": [{
                "parts": [
                    { "text": Self::description_prompt() },
                    { "inline_data": { "mime_type": Self::infer_mime_type(image_url), "data": encoded } }
                ]
            }],
            "generationConfig": { "temperature": 0.2 }
        });

        let description = self.model.generate_with_parts(body).await?;
        tracing::debug!(target: "vision", image_index, chars = description.len(), "described image");
        Ok(description)
    }
}
