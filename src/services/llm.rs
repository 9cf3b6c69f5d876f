use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;

use crate::error::{Result, ServiceError};
use crate::models::{AvailabilityRange, Claim, Compatibility, StructuredFilters, StructuredProperty};
use crate::services::gemini::GenerativeModel;

/// Facade over the generative models for everything that is a prompt in,
/// typed value out: claim extraction, structured property and filter
/// extraction, and claim-pair compatibility judgments.
pub struct LlmService {
    model: Arc<dyn GenerativeModel>,
    fast_model: Arc<dyn GenerativeModel>,
    compatibility_batch_size: usize,
}

impl LlmService {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        fast_model: Arc<dyn GenerativeModel>,
        compatibility_batch_size: usize,
    ) -> Self {
        Self { model, fast_model, compatibility_batch_size }
    }

    pub async fn aggregate_claims(&self, text: &str, address: Option<&str>, use_fast_model: bool) -> Result<Vec<Claim>> {
        let text_with_address = match address {
            Some(addr) => format!("Address: {}\n\n{}", addr, text),
            None => text.to_string(),
        };
        let prompt = claim_extraction_prompt(&text_with_address);
        let model = if use_fast_model { &self.fast_model } else { &self.model };

        let parsed = model.generate_json(&prompt, 0.1).await?;
        let claims_data = parsed
            .get("claims")
            .and_then(|c| c.as_array())
            .cloned()
            .unwrap_or_default();

        let mut claims = Vec::with_capacity(claims_data.len());
        for claim_value in claims_data {
            match serde_json::from_value::<Claim>(claim_value.clone()) {
                Ok(claim) => claims.push(claim),
                Err(e) => {
                    tracing::warn!(target: "llm.claims", error = %e, raw = %claim_value, "skipping malformed claim")
                }
            }
        }

        tracing::info!(target: "llm.claims", count = claims.len(), fast = use_fast_model, "extracted claims");
        Ok(claims)
    }

    pub async fn extract_structured_properties(&self, text: &str) -> Result<StructuredProperty> {
        let prompt = property_extraction_prompt(text);
        let parsed = self.fast_model.generate_json(&prompt, 0.0).await?;

        let rent_price = parsed.get("rent_price").and_then(|p| p.as_f64());
        let availability_dates = parsed
            .get("availability_dates")
            .and_then(|d| d.as_array())
            .map(|ranges| {
                ranges
                    .iter()
                    .filter_map(|r| {
                        Some(AvailabilityRange {
                            start: r.get("start")?.as_str()?.to_string(),
                            end: r.get("end").and_then(|e| e.as_str()).map(|e| e.to_string()),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(StructuredProperty { rent_price, availability_dates })
    }

    pub async fn extract_structured_filters(&self, query: &str) -> Result<StructuredFilters> {
        let prompt = filter_extraction_prompt(query);
        let parsed = self.fast_model.generate_json(&prompt, 0.0).await?;
        let filters: StructuredFilters = serde_json::from_value(parsed)
            .map_err(|e| ServiceError::Upstream(format!("malformed structured filters: {}", e)))?;
        if !filters.is_empty() {
            tracing::info!(target: "llm.filters", ?filters, "extracted structured filters");
        }
        Ok(filters)
    }

    /// Judge every (query claim, matched claim) pair in parallel batches.
    /// A failed batch degrades to `compatible` for its pairs rather than
    /// failing the search.
    pub async fn validate_claim_compatibility_batch(
        &self,
        pairs: &[(String, String)],
    ) -> HashMap<(String, String), Compatibility> {
        if pairs.is_empty() {
            return HashMap::new();
        }

        let batches: Vec<&[(String, String)]> = pairs.chunks(self.compatibility_batch_size).collect();
        let tasks = batches.iter().map(|batch| self.validate_batch(batch));
        let batch_results = join_all(tasks).await;

        let mut results = HashMap::new();
        for batch_result in batch_results {
            results.extend(batch_result);
        }
        tracing::info!(target: "llm.compat", pairs = pairs.len(), batches = batches.len(), "validated claim pairs");
        results
    }

    async fn validate_batch(&self, pairs: &[(String, String)]) -> HashMap<(String, String), Compatibility> {
        let prompt = compatibility_prompt(pairs);

        match self.fast_model.generate_json(&prompt, 0.0).await {
            Ok(parsed) => {
                let statuses = parsed
                    .get("results")
                    .and_then(|r| r.as_array())
                    .cloned()
                    .unwrap_or_default();
                let mut out = HashMap::new();
                for (idx, status) in statuses.iter().enumerate() {
                    if idx >= pairs.len() {
                        break;
                    }
                    let compatibility = parse_compatibility(status);
                    out.insert(pairs[idx].clone(), compatibility);
                }
                // Pairs the model did not answer default to compatible
                for pair in pairs.iter().skip(statuses.len()) {
                    out.insert(pair.clone(), Compatibility::Compatible);
                }
                out
            }
            Err(e) => {
                tracing::error!(target: "llm.compat", error = %e, pairs = pairs.len(), "compatibility batch failed, defaulting to compatible");
                pairs.iter().map(|p| (p.clone(), Compatibility::Compatible)).collect()
            }
        }
    }
}

fn parse_compatibility(value: &Value) -> Compatibility {
    match value.as_str() {
        Some("incompatible") => Compatibility::Incompatible,
        Some("partial") => Compatibility::Partial,
        _ => Compatibility::Compatible,
    }
}

fn claim_extraction_prompt(text: &str) -> String {
    format!(
        r#"You are an expert at extracting structured claims from apartment listings and search queries.

Extract atomic facts and automatically identify:
1. The CLAIM TYPE (from the taxonomy below)
2. The DOMAIN (neighborhood, apartment, or room)
3. For room domain: the ROOM_TYPE (kitchen, bedroom, bathroom, living_room, etc.)

<claim_types>
LOCATION: geographic locations, addresses, area names ("located in Williamsburg", "near Central Park") - domain: neighborhood (primary), apartment (secondary)
FEATURES: physical characteristics, architectural details ("exposed brick", "high ceilings", "hardwood floors") - domain: all (context-dependent)
AMENITIES: services, facilities, convenience features ("doorman", "washer/dryer in unit", "roof deck") - domain: all (context-dependent)
SIZE: dimensions, space descriptions, room counts ("2 bedroom", "studio apartment", "12m² kitchen") - domain: apartment, room - has quantifiers almost always (includes "studio" which equals 1 bedroom)
CONDITION: maintenance state, renovation status, age ("newly renovated", "pre-war building") - domain: apartment (primary), room (secondary)
PRICING: rent, fees, deposits ("rent $3,200/month", "no broker fee") - domain: apartment only - has quantifiers always
ACCESSIBILITY: physical access, mobility features ("elevator building", "ground floor") - domain: apartment (primary), room (secondary)
POLICIES: rules, restrictions, allowances ("pets allowed", "no smoking") - domain: apartment only
UTILITIES: included services, heating/cooling ("utilities included", "central AC") - domain: apartment (primary), room (secondary)
TRANSPORT: commute access, public transit, parking ("5 min walk to L train", "near subway") - domain: neighborhood (primary), apartment (secondary) - has quantifiers often
NEIGHBORHOOD: vibe, character, lifestyle ("quiet area", "trendy neighborhood", "family-friendly") - domain: neighborhood only
RESTRICTIONS: lease terms, requirements, limitations ("12 month minimum lease", "guarantor required") - domain: apartment only - has quantifiers often
</claim_types>

<domain_rules>
- If claim is about area character, location, or commute -> "neighborhood"
- If claim is about building, unit features, policies, pricing -> "apartment"
- If claim explicitly mentions a room type AND describes that specific room -> "room"

CRITICAL: kitchen appliances and fixtures are ROOM-level claims:
- "gas stove", "electric stove", "dishwasher", "oven" -> room, room_type: kitchen
- "bathtub", "shower", "toilet" -> room, room_type: bathroom
- "closet", "wardrobe" -> room, room_type: bedroom or closet

AMBIGUOUS CASES:
- "5 min to subway" -> neighborhood (transport)
- "parking spot" -> apartment (amenities)
- "spacious kitchen 12m²" -> room (size) with room_type: kitchen
- "2 bedroom" -> apartment (size)
- "exposed brick" without context -> apartment (features)
- "exposed brick in living room" -> room (features) with room_type: living_room
- "washer/dryer in unit" -> apartment (amenities)
</domain_rules>

<output_format>
Return ONLY valid JSON:
{{
  "claims": [
    {{"claim": "exposed brick walls", "claim_type": "features", "domain": "apartment", "is_specific": false, "has_quantifiers": false, "negation": false}},
    {{"claim": "kitchen area 12m²", "claim_type": "size", "domain": "room", "room_type": "kitchen", "is_specific": false, "has_quantifiers": true, "negation": false}},
    {{"claim": "located in Williamsburg", "claim_type": "location", "domain": "neighborhood", "is_specific": true, "has_quantifiers": false, "negation": false}},
    {{"claim": "no pets allowed", "claim_type": "policies", "domain": "apartment", "is_specific": false, "has_quantifiers": false, "negation": true}}
  ]
}}

RULES:
- Write claims concisely, one fact per claim
- Use lowercase except for proper nouns (Williamsburg, Brooklyn)
- Set has_quantifiers=true if claim contains numbers, measurements, time periods
- Set is_specific=true if claim contains named entities (specific neighborhoods, streets)
- Set negation=true if claim expresses prohibition or absence (no pets, non-smoking, etc.)
- Always assign domain field (neighborhood/apartment/room)
- For room domain, always include room_type field
</output_format>

Extract claims from: {}"#,
        text
    )
}

fn property_extraction_prompt(text: &str) -> String {
    format!(
        r#"Extract structured property information from apartment listing text.

Extract the following if present:
1. rent_price: monthly rent amount in USD (number only, no currency symbol)
2. availability_dates: all mentioned availability periods as date ranges

Return JSON:
{{
  "rent_price": 2500.0,
  "availability_dates": [{{"start": "2024-01-01", "end": "2024-01-31"}}]
}}

Rules:
- rent_price: monthly rent only. Parse "$2,500/month" -> 2500.0
- availability_dates: extract ALL mentioned periods, format YYYY-MM-DD
- If end date not specified, set to null
- Parse "available now" as the current date
- Parse "starting June 2024" as {{"start": "2024-06-01", "end": null}}
- If nothing found, return {{"rent_price": null, "availability_dates": []}}

Extract from: {}"#,
        text
    )
}

fn filter_extraction_prompt(query: &str) -> String {
    let current_date = chrono::Utc::now().format("%Y-%m-%d");
    format!(
        r#"Extract structured search filters from user query.

Current date: {current_date}

Extract the following if present:
1. rent_price: price constraints (min, max, or exact)
2. availability_dates: date range the user is looking for

Return JSON:
{{
  "rent_price": {{"min": 1500, "max": 2000}},
  "availability_dates": {{"start": "2024-03-01", "end": "2024-03-31"}}
}}

Rules for rent_price:
- "under $2000" -> {{"max": 2000}}
- "at least $1500" -> {{"min": 1500}}
- "between $1500 and $2000" -> {{"min": 1500, "max": 2000}}
- "around $1800" -> {{"min": 1600, "max": 2000}} (±10% range)

Rules for availability_dates:
- "available in November" -> the full month in the next occurrence of November
- "available starting June" -> {{"start": "YYYY-06-01", "end": null}}
- "available now" -> {{"start": "{current_date}", "end": null}}

If nothing found, return {{}}.

Extract from: {query}"#
    )
}

fn compatibility_prompt(pairs: &[(String, String)]) -> String {
    let pairs_text: Vec<String> = pairs
        .iter()
        .enumerate()
        .map(|(i, (query, matched))| format!("{}. Query: \"{}\" | Match: \"{}\"", i + 1, query, matched))
        .collect();

    format!(
        r#"You are validating if query claims are compatible with matched apartment claims.

Return "compatible" if the claims match or are semantically equivalent.
Return "incompatible" if they are mutually exclusive or contradictory.
Return "partial" if they are related but not fully compatible.

Examples:
- Query: "electric stove" | Match: "gas stove" -> incompatible (mutually exclusive)
- Query: "near subway" | Match: "close to L train" -> compatible (same meaning)
- Query: "2 bedroom" | Match: "1 bedroom" -> incompatible (different quantities)
- Query: "pets allowed" | Match: "no pets allowed" -> incompatible (contradictory)
- Query: "furnished" | Match: "partially furnished" -> partial (not exact match)
- Query: "parking included" | Match: "street parking available" -> partial (different types)

Validate these {} pairs:

{}

Return a JSON array with "compatible", "incompatible", or "partial" for each pair in order:
{{"results": ["compatible", "incompatible", ...]}}"#,
        pairs.len(),
        pairs_text.join("\n")
    )
}
