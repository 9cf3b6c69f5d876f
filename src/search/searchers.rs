use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::Result;
use crate::models::{ClaimKind, ClaimMatch, EmbeddedClaim, GeoPoint, MatchMap, StructuredFilters};
use crate::es::{quantifiers_from_stored, DocumentStore, APARTMENTS_INDEX, NEIGHBORHOODS_INDEX, ROOMS_INDEX};
use crate::search::filters::structured_filter_clauses;

/// Geo constraint for the apartment search, usually derived from a grounded
/// claim's recommended radius.
#[derive(Debug, Clone)]
pub struct GeoFilter {
    pub coords: GeoPoint,
    pub radius_meters: i64,
}

pub struct RoomSearcher {
    store: Arc<dyn DocumentStore>,
}

impl RoomSearcher {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn search(&self, claims: &[EmbeddedClaim]) -> Result<MatchMap> {
        let mut all_matches = MatchMap::new();

        for claim in claims {
            let mut knn = json!({
                "field": "claim_vector",
                "query_vector": claim.embedding,
                "k": 100,
                "num_candidates": 500,
            });
            if let Some(room_type) = &claim.claim.room_type {
                knn["filter"] = json!({ "term": { "room_type": room_type } });
            }
            let body = json!({
                "knn": knn,
                "_source": ["room_id", "apartment_id", "claim", "kind", "room_type", "quantifiers", "negation"],
                "size": 100,
            });

            let response = self.store.search(ROOMS_INDEX, &body).await?;
            collect_matches(&mut all_matches, &response, claim, "apartment_id");
        }

        Ok(all_matches)
    }
}

pub struct ApartmentSearcher {
    store: Arc<dyn DocumentStore>,
}

impl ApartmentSearcher {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn search(
        &self,
        claims: &[EmbeddedClaim],
        geo_filters: &[GeoFilter],
        structured_filters: &StructuredFilters,
    ) -> Result<MatchMap> {
        let mut all_matches = MatchMap::new();

        for claim in claims {
            let mut knn = json!({
                "field": "claim_vector",
                "query_vector": claim.embedding,
                "k": 200,
                "num_candidates": 500,
            });
            if let Some(filter) = build_filter_clause(geo_filters, structured_filters) {
                knn["filter"] = filter;
            }
            let body = json!({
                "knn": knn,
                "_source": ["apartment_id", "neighborhood_id", "claim", "kind", "quantifiers", "negation"],
                "size": 200,
            });

            let response = self.store.search(APARTMENTS_INDEX, &body).await?;
            collect_matches(&mut all_matches, &response, claim, "apartment_id");
        }

        Ok(all_matches)
    }
}

pub struct NeighborhoodSearcher {
    store: Arc<dyn DocumentStore>,
}

impl NeighborhoodSearcher {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn search(&self, claims: &[EmbeddedClaim]) -> Result<MatchMap> {
        let mut all_matches = MatchMap::new();

        for claim in claims {
            let body = json!({
                "knn": {
                    "field": "claim_vector",
                    "query_vector": claim.embedding,
                    "k": 50,
                    "num_candidates": 200,
                    "filter": { "term": { "claim_type": claim.claim.claim_type.as_str() } },
                },
                "_source": ["neighborhood_id", "claim", "kind", "negation"],
                "size": 50,
            });

            let response = self.store.search(NEIGHBORHOODS_INDEX, &body).await?;
            collect_matches(&mut all_matches, &response, claim, "neighborhood_id");
        }

        Ok(all_matches)
    }
}

/// Optional knn filter combining geo proximity (should, at least one) with
/// structured predicates (must).
pub fn build_filter_clause(geo_filters: &[GeoFilter], structured_filters: &StructuredFilters) -> Option<Value> {
    let must_clauses = structured_filter_clauses(structured_filters);
    let should_clauses: Vec<Value> = geo_filters
        .iter()
        .map(|f| {
            json!({
                "geo_distance": {
                    "distance": format!("{}m", f.radius_meters),
                    "apartment_location": { "lat": f.coords.lat, "lon": f.coords.lng }
                }
            })
        })
        .collect();

    if must_clauses.is_empty() && should_clauses.is_empty() {
        return None;
    }

    if !should_clauses.is_empty() {
        return Some(json!({
            "bool": {
                "must": must_clauses,
                "should": should_clauses,
                "minimum_should_match": 1,
            }
        }));
    }

    if must_clauses.len() == 1 {
        return Some(must_clauses.into_iter().next().unwrap());
    }

    Some(json!({ "bool": { "must": must_clauses } }))
}

fn collect_matches(all_matches: &mut MatchMap, response: &Value, claim: &EmbeddedClaim, id_field: &str) {
    let Some(hits) = response.pointer("/hits/hits").and_then(|h| h.as_array()) else {
        return;
    };

    for hit in hits {
        let Some(source) = hit.get("_source") else {
            continue;
        };
        let Some(candidate_id) = source.get(id_field).and_then(|v| v.as_str()) else {
            continue;
        };

        let kind: ClaimKind = source
            .get("kind")
            .and_then(|k| serde_json::from_value(k.clone()).ok())
            .unwrap_or(ClaimKind::Base);

        all_matches.entry(candidate_id.to_string()).or_default().push(ClaimMatch {
            search_claim: claim.claim.claim.clone(),
            search_claim_obj: claim.claim.clone(),
            matched_claim: source.get("claim").and_then(|c| c.as_str()).unwrap_or_default().to_string(),
            score: hit.get("_score").and_then(|s| s.as_f64()).unwrap_or(0.0),
            kind,
            claim_type: claim.claim.claim_type,
            quantifiers: quantifiers_from_stored(source.get("quantifiers")),
            matched_negation: source.get("negation").and_then(|n| n.as_bool()).unwrap_or(false),
        });
    }
}
