use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::models::{Claim, Quantifier, QuantifierOp, QuantifierType};
use crate::services::gemini::GenerativeModel;

/// Enriches claims flagged `has_quantifiers` with typed numeric predicates
/// and templatizes the claim text (counts stay literal, they are matched
/// for equality).
pub struct QuantifierService {
    model: Arc<dyn GenerativeModel>,
    semaphore: Arc<Semaphore>,
}

impl QuantifierService {
    pub fn new(model: Arc<dyn GenerativeModel>, max_concurrency: usize) -> Self {
        Self { model, semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))) }
    }

    /// Extraction errors keep the claim text unchanged with an empty
    /// quantifier list; they never fail the pipeline.
    pub async fn extract_quantifiers(&self, claims: Vec<Claim>) -> Vec<Claim> {
        let (quantified, unquantified): (Vec<Claim>, Vec<Claim>) =
            claims.into_iter().partition(|c| c.has_quantifiers);

        if quantified.is_empty() {
            return unquantified;
        }

        tracing::info!(target: "quantifiers", count = quantified.len(), "extracting quantifiers");

        let tasks = quantified.iter().map(|claim| self.extract_claim_quantifiers(claim));
        let results = join_all(tasks).await;

        let mut extracted = Vec::with_capacity(quantified.len());
        let mut errors = 0;
        for (mut claim, result) in quantified.into_iter().zip(results) {
            match result {
                Ok((quantified_text, quantifiers)) => {
                    if !quantifiers.is_empty() {
                        claim.quantifiers = quantifiers;
                        claim.claim = quantified_text;
                    }
                }
                Err(e) => {
                    tracing::error!(target: "quantifiers", claim = %claim.claim, error = %e, "quantifier extraction failed");
                    errors += 1;
                }
            }
            extracted.push(claim);
        }

        tracing::info!(target: "quantifiers", processed = extracted.len(), errors, "quantifier extraction complete");
        extracted.into_iter().chain(unquantified).collect()
    }

    async fn extract_claim_quantifiers(&self, claim: &Claim) -> crate::error::Result<(String, Vec<Quantifier>)> {
        let prompt = quantifier_prompt(&claim.claim);
        let _permit = self.semaphore.acquire().await.expect("semaphore closed");

        let parsed = self.model.generate_json(&prompt, 0.0).await?;
        Ok(parse_quantifier_payload(&parsed, &claim.claim))
    }
}

/// Parse the model's quantifier payload. Individual malformed quantifiers
/// are skipped; `vmax: null` means an unbounded upper limit.
pub fn parse_quantifier_payload(parsed: &Value, original_claim: &str) -> (String, Vec<Quantifier>) {
    let quantified_claim = parsed
        .get("quantified_claim")
        .and_then(|c| c.as_str())
        .unwrap_or(original_claim)
        .to_string();

    let mut quantifiers = Vec::new();
    if let Some(items) = parsed.get("quantifiers").and_then(|q| q.as_array()) {
        for item in items {
            match parse_quantifier(item) {
                Some(q) => quantifiers.push(q),
                None => {
                    tracing::warn!(target: "quantifiers", raw = %item, "failed to parse quantifier");
                }
            }
        }
    }
    (quantified_claim, quantifiers)
}

fn parse_quantifier(item: &Value) -> Option<Quantifier> {
    let qtype: QuantifierType = serde_json::from_value(item.get("qtype")?.clone()).ok()?;
    let op: QuantifierOp = serde_json::from_value(item.get("op")?.clone()).ok()?;
    let noun = item.get("noun")?.as_str()?.to_string();
    let vmin = item.get("vmin")?.as_f64()?;
    let vmax = match item.get("vmax") {
        None | Some(Value::Null) => f64::INFINITY,
        Some(v) if v.as_str() == Some("infinity") => f64::INFINITY,
        Some(v) => v.as_f64()?,
    };
    let unit = item.get("unit").and_then(|u| u.as_str()).map(|u| u.to_string());
    Some(Quantifier { qtype, noun, vmin, vmax, op, unit })
}

fn quantifier_prompt(claim: &str) -> String {
    format!(
        r#"Extract numeric quantifiers from this claim: "{claim}"

Return JSON with this structure:
{{
  "quantified_claim": "kitchen area VAR_1",
  "quantifiers": [
    {{
      "qtype": "area|money|count|distance|duration",
      "noun": "kitchen|rent|bedroom|subway|lease",
      "vmin": 12.0,
      "vmax": 12.0,
      "op": "EQUALS|GT|GTE|LT|LTE|APPROX|RANGE",
      "unit": "sqm|meters|usd|years"
    }}
  ]
}}

Examples:
- "kitchen area 12m²" -> {{"quantified_claim": "kitchen area VAR_1", "quantifiers": [{{"qtype": "area", "noun": "kitchen", "vmin": 12.0, "vmax": 12.0, "op": "APPROX", "unit": "sqm"}}]}}
- "rent under $3500" -> {{"quantified_claim": "rent under VAR_1", "quantifiers": [{{"qtype": "money", "noun": "rent", "vmin": 0, "vmax": 3500, "op": "LTE", "unit": "usd"}}]}}
- "5 min walk to subway" -> {{"quantified_claim": "VAR_1 walk to subway", "quantifiers": [{{"qtype": "distance", "noun": "subway", "vmin": 400, "vmax": 600, "op": "APPROX", "unit": "meters"}}]}}
- "2 bedroom apartment" -> {{"quantified_claim": "2 bedroom apartment", "quantifiers": [{{"qtype": "count", "noun": "bedroom", "vmin": 2, "vmax": 2, "op": "EQUALS"}}]}}
- "1+ bedroom" -> {{"quantified_claim": "1+ bedroom", "quantifiers": [{{"qtype": "count", "noun": "bedroom", "vmin": 1, "vmax": null, "op": "GTE"}}]}}
- "at least 2 bedrooms" -> {{"quantified_claim": "at least 2 bedrooms", "quantifiers": [{{"qtype": "count", "noun": "bedroom", "vmin": 2, "vmax": null, "op": "GTE"}}]}}
- "studio apartment" -> {{"quantified_claim": "studio apartment", "quantifiers": [{{"qtype": "count", "noun": "bedroom", "vmin": 1, "vmax": 1, "op": "EQUALS"}}]}}
- "3 bathroom" -> {{"quantified_claim": "3 bathroom", "quantifiers": [{{"qtype": "count", "noun": "bathroom", "vmin": 3, "vmax": 3, "op": "EQUALS"}}]}}

IMPORTANT RULES:
- For COUNT types (bedroom, bathroom), DO NOT replace numbers with VAR_N - keep the exact number in quantified_claim
- STUDIO APARTMENTS count as 1 bedroom (studio = 1 bedroom)
- For AREA, MONEY, DISTANCE types, replace numbers with VAR_1, VAR_2, etc.
- Convert all units to standard: m² for area, meters for distance, USD for money
- Walking time: 1 min ≈ 80 meters
- For "under X", use LTE. For "over X" or "at least X" or "X+", use GTE with vmax=null
- When vmax should be infinity, use null in JSON

Return ONLY the JSON, no explanation."#
    )
}
