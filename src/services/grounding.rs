use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{
    Claim, ClaimKind, ClaimType, Domain, GeoPoint, GroundingMetadata, Quantifier, QuantifierOp, QuantifierType,
};
use crate::services::gemini::{GeminiClient, GenerativeModel};

#[derive(Debug, Clone)]
pub struct GroundedSource {
    pub title: String,
    pub uri: String,
    pub place_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GroundedResponse {
    pub text: String,
    pub sources: Vec<GroundedSource>,
    pub widget_token: Option<String>,
}

/// A generative model with the map-provider tool enabled; responses carry
/// place sources and an optional map widget token.
#[async_trait]
pub trait MapsGroundedModel: Send + Sync {
    async fn generate_grounded(
        &self,
        prompt: &str,
        location: Option<GeoPoint>,
        enable_widget: bool,
    ) -> Result<GroundedResponse>;
}

pub struct GeminiMapsModel {
    client: GeminiClient,
}

impl GeminiMapsModel {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MapsGroundedModel for GeminiMapsModel {
    async fn generate_grounded(
        &self,
        prompt: &str,
        location: Option<GeoPoint>,
        enable_widget: bool,
    ) -> Result<GroundedResponse> {
        let mut body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "tools": [{ "google_maps": { "enable_widget": enable_widget } }],
            "generationConfig": { "temperature": 0.1 }
        });
        if let Some(point) = location {
            body["toolConfig"] = json!({
                "retrievalConfig": {
                    "latLng": { "latitude": point.lat, "longitude": point.lng }
                }
            });
        }

        let response = self.client.generate_raw(body).await?;
        let text = GeminiClient::extract_text(&response).unwrap_or_default();

        let mut sources = Vec::new();
        let mut widget_token = None;
        if let Some(metadata) = response
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("groundingMetadata"))
        {
            if let Some(chunks) = metadata.get("groundingChunks").and_then(|c| c.as_array()) {
                for chunk in chunks {
                    if let Some(maps) = chunk.get("maps") {
                        sources.push(GroundedSource {
                            title: maps.get("title").and_then(|t| t.as_str()).unwrap_or_default().to_string(),
                            uri: maps.get("uri").and_then(|u| u.as_str()).unwrap_or_default().to_string(),
                            place_id: maps.get("placeId").and_then(|p| p.as_str()).map(|p| p.to_string()),
                        });
                    }
                }
            }
            widget_token = metadata
                .get("googleMapsWidgetContextToken")
                .and_then(|t| t.as_str())
                .map(|t| t.to_string());
        }

        Ok(GroundedResponse { text, sources, widget_token })
    }
}

pub struct GroundingResult {
    pub verified_claims: Vec<Claim>,
    pub widget_tokens: Vec<String>,
    pub grounded_sources: Vec<GroundedSource>,
}

/// Verifies place-shaped claims against the map provider and synthesizes
/// `verified`-kind claims with distance metadata. Results are cached
/// in-process with a TTL that depends on how volatile the claim type is.
pub struct GroundingService {
    maps: Arc<dyn MapsGroundedModel>,
    extractor: Arc<dyn GenerativeModel>,
    enabled: bool,
    default_ttl_days: i64,
    max_groundings_per_listing: usize,
    cache: Mutex<HashMap<String, (Vec<Claim>, Instant)>>,
}

impl GroundingService {
    pub fn new(
        maps: Arc<dyn MapsGroundedModel>,
        extractor: Arc<dyn GenerativeModel>,
        enabled: bool,
        default_ttl_days: i64,
        max_groundings_per_listing: usize,
    ) -> Self {
        Self {
            maps,
            extractor,
            enabled,
            default_ttl_days,
            max_groundings_per_listing,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Only specific named places outside the room domain are worth a map
    /// lookup; generic categories never ground.
    pub fn should_ground_claim(&self, claim: &Claim) -> bool {
        if !self.enabled {
            return false;
        }
        if claim.domain == Domain::Room {
            return false;
        }
        if !claim.is_specific {
            return false;
        }
        matches!(
            claim.claim_type,
            ClaimType::Location | ClaimType::Transport | ClaimType::Amenities
        )
    }

    pub fn should_ground_search_claim(&self, claim: &Claim, user_location: Option<&GeoPoint>) -> bool {
        user_location.is_some() && self.should_ground_claim(claim)
    }

    fn cache_key(claim: &Claim, location: Option<&GeoPoint>) -> String {
        let location_key = match location {
            Some(p) => format!("{:.2}_{:.2}", p.lat, p.lng),
            None => "no_location".to_string(),
        };
        let claim_pattern: String = claim
            .claim
            .to_lowercase()
            .chars()
            .take(50)
            .map(|c| if c == ' ' { '_' } else { c })
            .collect();
        format!("{}:{}:{}", location_key, claim.claim_type.as_str(), claim_pattern)
    }

    fn cache_ttl(&self, claim: &Claim) -> Duration {
        let days = match claim.claim_type {
            ClaimType::Transport | ClaimType::Location => 90,
            ClaimType::Neighborhood => 14,
            _ => self.default_ttl_days,
        };
        Duration::from_secs((days.max(0) as u64) * 24 * 60 * 60)
    }

    pub async fn ground_claims_batch(&self, claims: &[Claim], location: Option<GeoPoint>) -> GroundingResult {
        if claims.is_empty() {
            return GroundingResult { verified_claims: Vec::new(), widget_tokens: Vec::new(), grounded_sources: Vec::new() };
        }

        tracing::info!(target: "grounding", count = claims.len(), ?location, "grounding claims");

        let mut verified_claims_all = Vec::new();
        let mut claims_to_ground = Vec::new();

        {
            let mut cache = self.cache.lock().await;
            for claim in claims.iter().take(self.max_groundings_per_listing) {
                let key = Self::cache_key(claim, location.as_ref());
                let ttl = self.cache_ttl(claim);
                let cached = match cache.get(&key) {
                    Some((cached, stored_at)) if stored_at.elapsed() < ttl => Some(cached.clone()),
                    _ => None,
                };
                match cached {
                    Some(cached) => {
                        tracing::info!(target: "grounding", key = %key, "cache hit");
                        verified_claims_all.extend(cached);
                    }
                    None => {
                        cache.remove(&key);
                        claims_to_ground.push((claim.clone(), key));
                    }
                }
            }
        }

        if claims_to_ground.is_empty() {
            tracing::info!(target: "grounding", "all claims served from cache");
            return GroundingResult { verified_claims: verified_claims_all, widget_tokens: Vec::new(), grounded_sources: Vec::new() };
        }

        let tasks = claims_to_ground.iter().map(|(claim, _)| self.ground_single_claim(claim, location));
        let results = join_all(tasks).await;

        let mut widget_tokens = Vec::new();
        let mut grounded_sources = Vec::new();

        for ((claim, key), result) in claims_to_ground.into_iter().zip(results) {
            match result {
                Ok((verified, sources, widget)) => {
                    if !verified.is_empty() {
                        self.cache.lock().await.insert(key, (verified.clone(), Instant::now()));
                        verified_claims_all.extend(verified);
                    }
                    grounded_sources.extend(sources);
                    if let Some(token) = widget {
                        widget_tokens.push(token);
                    }
                }
                Err(e) => {
                    tracing::error!(target: "grounding", claim = %claim.claim, error = %e, "grounding failed for claim");
                }
            }
        }

        tracing::info!(
            target: "grounding",
            verified = verified_claims_all.len(),
            sources = grounded_sources.len(),
            "grounding complete"
        );
        GroundingResult { verified_claims: verified_claims_all, widget_tokens, grounded_sources }
    }

    async fn ground_single_claim(
        &self,
        claim: &Claim,
        location: Option<GeoPoint>,
    ) -> Result<(Vec<Claim>, Vec<GroundedSource>, Option<String>)> {
        let prompt = grounding_prompt(claim, location.as_ref());
        let response = self.maps.generate_grounded(&prompt, location, false).await?;

        if response.sources.is_empty() {
            tracing::warn!(target: "grounding", claim = %claim.claim, "no grounded sources found");
            return Ok((Vec::new(), Vec::new(), response.widget_token));
        }

        let verifications = self.extract_structured_data(&response, claim).await;
        let mut verified_claims = Vec::new();

        for data in verifications {
            let mut metadata = GroundingMetadata {
                verified: true,
                source: "google_maps".into(),
                confidence: 0.95,
                place_name: data.get("place_name").and_then(|v| v.as_str()).map(|s| s.to_string()),
                place_id: response.sources.first().and_then(|s| s.place_id.clone()),
                place_uri: response.sources.first().map(|s| s.uri.clone()),
                verified_at: Some(chrono::Utc::now().to_rfc3339()),
                ..Default::default()
            };
            if let Some(coords) = data.get("coordinates") {
                metadata.coordinates = (|| {
                    Some(GeoPoint {
                        lat: coords.get("lat")?.as_f64()?,
                        lng: coords.get("lng")?.as_f64()?,
                    })
                })();
            }
            metadata.exact_distance_meters = data.get("distance_meters").and_then(|v| v.as_i64());
            metadata.walking_time_minutes = data.get("walking_minutes").and_then(|v| v.as_f64());
            metadata.recommended_radius_meters = data.get("recommended_radius_meters").and_then(|v| v.as_i64());

            let mut verified = Claim {
                claim: data
                    .get("verified_claim_text")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("{} (verified)", claim.claim)),
                claim_type: claim.claim_type,
                domain: claim.domain,
                room_type: claim.room_type.clone(),
                is_specific: true,
                has_quantifiers: claim.has_quantifiers || metadata.exact_distance_meters.is_some(),
                quantifiers: Vec::new(),
                kind: ClaimKind::Verified,
                from_claim: Some(claim.claim.clone()),
                weight: claim.weight * 1.15,
                negation: claim.negation,
                grounding_metadata: None,
                source: None,
            };

            if let Some(distance) = metadata.exact_distance_meters {
                if claim.quantifiers.is_empty() {
                    verified.quantifiers = vec![Quantifier {
                        qtype: QuantifierType::Distance,
                        noun: data
                            .get("noun")
                            .and_then(|v| v.as_str())
                            .unwrap_or("location")
                            .to_string(),
                        vmin: distance as f64,
                        vmax: distance as f64,
                        op: QuantifierOp::Approx,
                        unit: Some("meters".into()),
                    }];
                }
            }
            verified.grounding_metadata = Some(metadata);

            tracing::info!(
                target: "grounding",
                claim = %verified.claim,
                place = ?verified.grounding_metadata.as_ref().and_then(|m| m.place_name.clone()),
                distance = ?verified.grounding_metadata.as_ref().and_then(|m| m.exact_distance_meters),
                "created verified claim"
            );
            verified_claims.push(verified);
        }

        Ok((verified_claims, response.sources, response.widget_token))
    }

    /// Second-pass structured extraction. The map response is free text; a
    /// dedicated JSON-mode call pulls out places, distances, and radii so no
    /// coordinate or distance is ever parsed heuristically.
    async fn extract_structured_data(&self, response: &GroundedResponse, claim: &Claim) -> Vec<Value> {
        let place_names: Vec<&str> = response.sources.iter().map(|s| s.title.as_str()).filter(|t| !t.is_empty()).collect();
        let prompt = structured_extraction_prompt(&claim.claim, &place_names, &response.text);

        match self.extractor.generate_json(&prompt, 0.0).await {
            Ok(parsed) => {
                let verifications = match &parsed {
                    Value::Array(items) => items.clone(),
                    Value::Object(_) => parsed
                        .get("verifications")
                        .and_then(|v| v.as_array())
                        .cloned()
                        .unwrap_or_default(),
                    _ => Vec::new(),
                };
                verifications
            }
            Err(e) => {
                tracing::error!(target: "grounding", claim = %claim.claim, error = %e, "structured extraction failed");
                Vec::new()
            }
        }
    }

    /// Search radius from grounding metadata. Priority: recommended radius,
    /// then exact distance plus a 30% buffer (min 100 m), then 500 m.
    pub fn infer_radius(&self, claim: &Claim) -> i64 {
        if let Some(metadata) = &claim.grounding_metadata {
            if let Some(radius) = metadata.recommended_radius_meters {
                return radius;
            }
            if let Some(distance) = metadata.exact_distance_meters {
                let buffer = ((distance as f64 * 0.3) as i64).max(100);
                return distance + buffer;
            }
        }
        500
    }

    /// Maps-grounded location description for the enrichment phase.
    pub async fn generate_location_description(
        &self,
        location: GeoPoint,
        address: &str,
    ) -> Result<(String, Option<String>)> {
        let prompt = location_description_prompt(address, &location);
        let response = self.maps.generate_grounded(&prompt, Some(location), true).await?;
        tracing::info!(target: "grounding", chars = response.text.len(), "generated location description");
        Ok((response.text, response.widget_token))
    }
}

fn grounding_prompt(claim: &Claim, location: Option<&GeoPoint>) -> String {
    let location_str = location
        .map(|p| format!(" near {}, {}", p.lat, p.lng))
        .unwrap_or_default();
    let base_instruction = "DO NOT write any explanatory text. DO NOT ask questions. Immediately use the Google Maps tool without any preamble. For ambiguous locations: (1) cities over states, (2) more populous areas, (3) well-known landmarks.";

    match claim.claim_type {
        ClaimType::Location => format!(
            "{}\n\nIf ambiguous (e.g., \"Washington\"), choose most likely city/neighborhood for apartments.\nUse Maps tool for: \"{}\"{}",
            base_instruction, claim.claim, location_str
        ),
        _ => format!("{}\n\nUse Maps tool for: \"{}\"{}", base_instruction, claim.claim, location_str),
    }
}

fn structured_extraction_prompt(claim: &str, place_names: &[&str], response_text: &str) -> String {
    let places = if place_names.is_empty() { "None".to_string() } else { place_names.join(", ") };
    format!(
        r#"Extract precise structured data from this Google Maps grounding response.

Original claim: "{claim}"
Places found: {places}

Grounding response:
{response_text}

Extract and return ONLY JSON with verified information:
{{
  "verifications": [
    {{
      "verified_claim_text": "exact distance to specific place",
      "place_name": "exact place name from response",
      "distance_meters": numeric_value_or_null,
      "walking_minutes": numeric_value_or_null,
      "coordinates": {{"lat": number, "lng": number}} or null,
      "noun": "what the distance is to (subway, park, etc)",
      "recommended_radius_meters": number
    }}
  ]
}}

Rules:
- Only include data explicitly mentioned in the response
- Convert all distances to meters
- Extract coordinates if mentioned
- For recommended_radius_meters, consider the place type:
  * Specific station/stop: 500-800m (walkable)
  * Small landmark/plaza: 800-1200m
  * Large park/area: 1500-3000m
  * Neighborhood: 3000-8000m
  * Borough/district: 10000-20000m
- If multiple places, create one entry for the closest/best one
- Return empty array if nothing can be extracted"#
    )
}

fn location_description_prompt(address: &str, location: &GeoPoint) -> String {
    format!(
        r#"Use Google Maps to write a location description. Return ONLY the description text, no preamble.

Address: {address}
Coordinates: {lat}, {lng}

Requirements:
- Use Google Maps to find nearby attractions, dining, transit, parks
- Luxury hospitality tone (sophisticated, inviting)
- 3-4 sentences, 100-150 words
- Include specific place names with walking times
- Emphasize convenience and lifestyle

CRITICAL: Use the Google Maps tool first, then write the description using real places found. Return ONLY the location description:"#,
        address = address,
        lat = location.lat,
        lng = location.lng
    )
}
