use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::Result;
use crate::models::{
    AvailabilityRange, Claim, ClaimKind, ClaimMatch, ClaimType, Compatibility, Domain, ImageMetadata,
    MatchMap, MatchedClaimDetail, SearchResult,
};
use crate::es::{DocumentStore, APARTMENTS_INDEX};
use crate::search::constants::{claim_type_threshold, domain_weight, SPECIFIC_LOCATION_THRESHOLD};
use crate::search::validators::validate_quantifiers;

pub type CompatibilityCache = HashMap<(String, String), Compatibility>;

/// Final scoring: validate individual matches, keep the best survivor per
/// query claim, fold into weighted per-domain scores, order by coverage.
pub struct ResultScorer {
    store: Arc<dyn DocumentStore>,
}

impl ResultScorer {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn fetch_apartment_metadata(&self, apartment_ids: &BTreeSet<String>) -> BTreeMap<String, Value> {
        let mut metadata = BTreeMap::new();
        if apartment_ids.is_empty() {
            return metadata;
        }

        let body = json!({
            "query": { "terms": { "apartment_id": apartment_ids } },
            "size": apartment_ids.len(),
            "_source": [
                "apartment_id", "neighborhood_id", "title", "address",
                "image_urls", "image_metadata", "rent_price", "availability_dates"
            ],
            "collapse": { "field": "apartment_id" }
        });

        match self.store.search(APARTMENTS_INDEX, &body).await {
            Ok(response) => {
                if let Some(hits) = response.pointer("/hits/hits").and_then(|h| h.as_array()) {
                    for hit in hits {
                        if let Some(source) = hit.get("_source") {
                            if let Some(id) = source.get("apartment_id").and_then(|v| v.as_str()) {
                                metadata.insert(id.to_string(), source.clone());
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(target: "search.scorer", error = %e, "failed to fetch apartment metadata");
            }
        }
        metadata
    }

    /// Best raw match per query claim across all surviving candidates, used
    /// to decide which claim pairs are worth an LLM compatibility judgment.
    pub fn get_best_matches_globally(
        &self,
        apartments: &BTreeSet<String>,
        room_matches: &MatchMap,
        apartment_matches: &MatchMap,
        neighborhood_matches: &MatchMap,
    ) -> BTreeMap<String, ClaimMatch> {
        let mut best: BTreeMap<String, ClaimMatch> = BTreeMap::new();
        let empty = Vec::new();

        let mut consider = |m: &ClaimMatch| {
            let better = match best.get(&m.search_claim) {
                Some(existing) => m.score > existing.score,
                None => true,
            };
            if better {
                best.insert(m.search_claim.clone(), m.clone());
            }
        };

        for apartment_id in apartments {
            for m in room_matches
                .get(apartment_id)
                .unwrap_or(&empty)
                .iter()
                .chain(apartment_matches.get(apartment_id).unwrap_or(&empty).iter())
            {
                consider(m);
            }
        }
        for matches in neighborhood_matches.values() {
            for m in matches {
                consider(m);
            }
        }

        best
    }

    /// Returns the validated score, or None when the match is rejected.
    pub fn apply_match_validation(
        &self,
        m: &ClaimMatch,
        compatibility_cache: &CompatibilityCache,
        double_check_matches: bool,
    ) -> Option<f64> {
        let mut threshold = claim_type_threshold(m.claim_type);
        if m.search_claim_obj.is_specific && m.search_claim_obj.claim_type == ClaimType::Location {
            threshold = SPECIFIC_LOCATION_THRESHOLD;
        }

        if !double_check_matches && m.score < threshold {
            return None;
        }

        let mut score = m.score;
        let quantifiers_valid = validate_quantifiers(&m.search_claim_obj, &m.quantifiers);

        if !quantifiers_valid {
            score *= 0.1;
        } else if m.kind == ClaimKind::Anti && m.score >= 0.85 {
            score *= 0.01;
        } else if m.kind == ClaimKind::Anti {
            score *= 0.05;
        } else if m.search_claim_obj.negation != m.matched_negation {
            score *= 0.1;
        }

        let pair = (m.search_claim.clone(), m.matched_claim.clone());
        match compatibility_cache.get(&pair).copied().unwrap_or(Compatibility::Compatible) {
            Compatibility::Incompatible => {
                tracing::info!(
                    target: "search.scorer",
                    query_claim = %m.search_claim,
                    matched_claim = %m.matched_claim,
                    "skipping incompatible match"
                );
                None
            }
            Compatibility::Partial => Some(score * 0.5),
            Compatibility::Compatible => Some(score),
        }
    }

    /// Surviving match with the highest validated score per query claim.
    pub fn get_validated_best_matches(
        &self,
        all_matches: &[ClaimMatch],
        compatibility_cache: &CompatibilityCache,
        double_check_matches: bool,
    ) -> BTreeMap<String, (ClaimMatch, f64)> {
        let mut validated_best: BTreeMap<String, (ClaimMatch, f64)> = BTreeMap::new();

        for m in all_matches {
            let Some(score) = self.apply_match_validation(m, compatibility_cache, double_check_matches) else {
                continue;
            };
            if score <= 0.0 {
                continue;
            }
            let better = match validated_best.get(&m.search_claim) {
                Some((_, existing)) => score > *existing,
                None => true,
            };
            if better {
                validated_best.insert(m.search_claim.clone(), (m.clone(), score));
            }
        }

        validated_best
    }

    // Sum of validated scores over the TOTAL query claim count, not the
    // per-domain count. Intentional: rewards coverage across the query.
    fn score_from_validated_matches(
        &self,
        validated: &BTreeMap<String, (ClaimMatch, f64)>,
        total_search_claims: usize,
    ) -> f64 {
        if total_search_claims == 0 || validated.is_empty() {
            return 0.0;
        }
        let total: f64 = validated.values().map(|(_, score)| score).sum();
        total / total_search_claims as f64
    }

    fn normalize_domain_weights(
        &self,
        has_room: bool,
        has_apartment: bool,
        has_neighborhood: bool,
    ) -> BTreeMap<Domain, f64> {
        let mut active: BTreeMap<Domain, f64> = BTreeMap::new();
        if has_room {
            active.insert(Domain::Room, domain_weight(Domain::Room));
        }
        if has_apartment {
            active.insert(Domain::Apartment, domain_weight(Domain::Apartment));
        }
        if has_neighborhood {
            active.insert(Domain::Neighborhood, domain_weight(Domain::Neighborhood));
        }

        let sum: f64 = active.values().sum();
        if sum > 0.0 {
            for weight in active.values_mut() {
                *weight /= sum;
            }
        }
        active
    }

    pub async fn rank_results(
        &self,
        filtered_apartments: &BTreeSet<String>,
        room_matches: &MatchMap,
        apartment_matches: &MatchMap,
        neighborhood_matches: &MatchMap,
        search_claims: &[Claim],
        compatibility_cache: &CompatibilityCache,
        double_check_matches: bool,
    ) -> Result<Vec<SearchResult>> {
        let room_claims = search_claims.iter().filter(|c| c.domain == Domain::Room).count();
        let apt_claims = search_claims.iter().filter(|c| c.domain == Domain::Apartment).count();
        let neighborhood_claims = search_claims.iter().filter(|c| c.domain == Domain::Neighborhood).count();
        let total_claims = search_claims.len();

        let weights = self.normalize_domain_weights(room_claims > 0, apt_claims > 0, neighborhood_claims > 0);
        tracing::info!(
            target: "search.scorer",
            room = weights.get(&Domain::Room).copied().unwrap_or(0.0),
            apartment = weights.get(&Domain::Apartment).copied().unwrap_or(0.0),
            neighborhood = weights.get(&Domain::Neighborhood).copied().unwrap_or(0.0),
            "normalized domain weights"
        );

        let metadata = self.fetch_apartment_metadata(filtered_apartments).await;
        let empty = Vec::new();
        let mut ranked = Vec::with_capacity(filtered_apartments.len());

        for apartment_id in filtered_apartments {
            let apt_meta = metadata.get(apartment_id);

            let neighborhood_for_apt = apt_meta
                .and_then(|m| m.get("neighborhood_id"))
                .and_then(|n| n.as_str())
                .and_then(|n| neighborhood_matches.get(n))
                .unwrap_or(&empty);

            let validated_room = self.get_validated_best_matches(
                room_matches.get(apartment_id).unwrap_or(&empty),
                compatibility_cache,
                double_check_matches,
            );
            let validated_apt = self.get_validated_best_matches(
                apartment_matches.get(apartment_id).unwrap_or(&empty),
                compatibility_cache,
                double_check_matches,
            );
            let validated_neighborhood =
                self.get_validated_best_matches(neighborhood_for_apt, compatibility_cache, double_check_matches);

            let room_score = self.score_from_validated_matches(&validated_room, total_claims);
            let apt_score = self.score_from_validated_matches(&validated_apt, total_claims);
            let neighborhood_score = self.score_from_validated_matches(&validated_neighborhood, total_claims);

            let final_score = weights.get(&Domain::Room).copied().unwrap_or(0.0) * room_score
                + weights.get(&Domain::Apartment).copied().unwrap_or(0.0) * apt_score
                + weights.get(&Domain::Neighborhood).copied().unwrap_or(0.0) * neighborhood_score;

            let mut all_validated: BTreeMap<String, (ClaimMatch, f64)> = validated_room;
            all_validated.extend(validated_apt);
            all_validated.extend(validated_neighborhood);

            let matched_claims: Vec<MatchedClaimDetail> = all_validated
                .values()
                .map(|(m, score)| MatchedClaimDetail {
                    query_claim: m.search_claim.clone(),
                    matched_claim: m.matched_claim.clone(),
                    similarity: *score,
                    domain: m.search_claim_obj.domain,
                    kind: m.kind,
                    room_type: m.search_claim_obj.room_type.clone(),
                    query_quantifiers: m.search_claim_obj.quantifiers.clone(),
                    matched_quantifiers: m.quantifiers.clone(),
                })
                .collect();

            let coverage_count = matched_claims.len();
            let coverage_ratio = if total_claims > 0 {
                coverage_count as f64 / total_claims as f64
            } else {
                0.0
            };

            let mut domain_scores = BTreeMap::new();
            domain_scores.insert(Domain::Room.as_str().to_string(), room_score);
            domain_scores.insert(Domain::Apartment.as_str().to_string(), apt_score);
            domain_scores.insert(Domain::Neighborhood.as_str().to_string(), neighborhood_score);

            ranked.push(SearchResult {
                apartment_id: apartment_id.clone(),
                title: meta_string(apt_meta, "title"),
                address: meta_string(apt_meta, "address"),
                final_score,
                coverage_count,
                coverage_ratio,
                matched_claims,
                domain_scores,
                image_urls: meta_vec(apt_meta, "image_urls"),
                image_metadata: meta_parsed::<Vec<ImageMetadata>>(apt_meta, "image_metadata").unwrap_or_default(),
                rent_price: apt_meta.and_then(|m| m.get("rent_price")).and_then(|v| v.as_f64()),
                availability_dates: meta_parsed::<Vec<AvailabilityRange>>(apt_meta, "availability_dates")
                    .unwrap_or_default(),
            });
        }

        let before = ranked.len();
        let mut filtered: Vec<SearchResult> = if double_check_matches {
            ranked.into_iter().filter(|r| r.coverage_count > 0).collect()
        } else {
            ranked
                .into_iter()
                .filter(|r| r.final_score > 0.05 && r.coverage_count > 0)
                .collect()
        };
        if filtered.len() < before {
            tracing::info!(
                target: "search.scorer",
                removed = before - filtered.len(),
                double_check = double_check_matches,
                "filtered low-signal results"
            );
        }

        // Stable sort: ties keep candidate-id order
        filtered.sort_by(|a, b| {
            b.coverage_count
                .cmp(&a.coverage_count)
                .then_with(|| b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal))
        });

        Ok(filtered)
    }
}

fn meta_string(meta: Option<&Value>, field: &str) -> Option<String> {
    meta.and_then(|m| m.get(field)).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn meta_vec(meta: Option<&Value>, field: &str) -> Vec<String> {
    meta.and_then(|m| m.get(field))
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).map(|s| s.to_string()).collect())
        .unwrap_or_default()
}

fn meta_parsed<T: serde::de::DeserializeOwned>(meta: Option<&Value>, field: &str) -> Option<T> {
    meta.and_then(|m| m.get(field)).and_then(|v| serde_json::from_value(v.clone()).ok())
}
