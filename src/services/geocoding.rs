use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{Result, ServiceError};
use crate::models::GeoPoint;

const GEOCODE_API_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const GEOCODE_CACHE_TTL: Duration = Duration::from_secs(90 * 24 * 60 * 60);

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>>;
}

pub struct GoogleGeocoder {
    api_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl GoogleGeocoder {
    pub fn new(api_key: String) -> Self {
        Self::with_api_url(GEOCODE_API_URL.to_string(), api_key)
    }

    pub fn with_api_url(api_url: String, api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build http client");
        Self { api_url, api_key, http }
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>> {
        let resp = self
            .http
            .get(&self.api_url)
            .query(&[("address", address), ("key", &self.api_key)])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::Upstream(format!("geocoding failed ({})", status)));
        }
        let data: Value = resp
            .json()
            .await
            .map_err(|e| ServiceError::Upstream(format!("invalid geocoding response: {}", e)))?;

        let api_status = data.get("status").and_then(|s| s.as_str()).unwrap_or("");
        if api_status != "OK" {
            tracing::warn!(target: "geocoding", status = api_status, "geocoding API returned non-OK status");
            return Ok(None);
        }

        let location = data
            .get("results")
            .and_then(|r| r.as_array())
            .and_then(|r| r.first())
            .and_then(|r| r.get("geometry"))
            .and_then(|g| g.get("location"));
        let point = location.and_then(|l| {
            Some(GeoPoint {
                lat: l.get("lat")?.as_f64()?,
                lng: l.get("lng")?.as_f64()?,
            })
        });
        Ok(point)
    }
}

/// Caching facade over a [`Geocoder`]. One entry per lowercased trimmed
/// address, 90-day TTL. Geocoding failures are best-effort and return None.
pub struct GeocodingService {
    inner: Arc<dyn Geocoder>,
    cache: Mutex<HashMap<String, (GeoPoint, Instant)>>,
}

impl GeocodingService {
    pub fn new(inner: Arc<dyn Geocoder>) -> Self {
        Self { inner, cache: Mutex::new(HashMap::new()) }
    }

    pub async fn geocode_address(&self, address: &str) -> Option<GeoPoint> {
        if address.trim().is_empty() {
            tracing::warn!(target: "geocoding", "empty address provided for geocoding");
            return None;
        }

        let cache_key = address.trim().to_lowercase();
        {
            let mut cache = self.cache.lock().await;
            if let Some((point, stored_at)) = cache.get(&cache_key).copied() {
                if stored_at.elapsed() < GEOCODE_CACHE_TTL {
                    tracing::debug!(target: "geocoding", "cache hit");
                    return Some(point);
                }
                cache.remove(&cache_key);
            }
        }

        match self.inner.geocode(address).await {
            Ok(Some(point)) => {
                self.cache.lock().await.insert(cache_key, (point, Instant::now()));
                tracing::info!(target: "geocoding", address, lat = point.lat, lng = point.lng, "geocoded address");
                Some(point)
            }
            Ok(None) => {
                tracing::warn!(target: "geocoding", address, "address did not geocode");
                None
            }
            Err(e) => {
                tracing::error!(target: "geocoding", address, error = %e, "geocoding error");
                None
            }
        }
    }
}
