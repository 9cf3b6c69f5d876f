use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::Result;
use crate::models::{Claim, ClaimKind, MatchMap, StructuredFilters};
use crate::es::{DocumentStore, APARTMENTS_INDEX};
use crate::search::validators::validate_quantifiers;

/// Candidate narrowing between retrieval and scoring: hierarchy
/// intersection, structured predicates, quantifier gates, anti-claim gates.
pub struct SearchFilters {
    store: Arc<dyn DocumentStore>,
    anti_claim_threshold: f64,
}

impl SearchFilters {
    pub fn new(store: Arc<dyn DocumentStore>, anti_claim_threshold: f64) -> Self {
        Self { store, anti_claim_threshold }
    }

    /// Intersect candidates across domains: an apartment must satisfy every
    /// domain the query touched. Neighborhood hits resolve to apartments via
    /// a terms query; structured filters apply there and stand alone when no
    /// domain matched at all.
    pub async fn filter_by_hierarchy(
        &self,
        room_matches: &MatchMap,
        apartment_matches: &MatchMap,
        neighborhood_matches: &MatchMap,
        search_claims: &[Claim],
        structured_filters: &StructuredFilters,
    ) -> Result<BTreeSet<String>> {
        let mut valid_apartments: Option<BTreeSet<String>> = None;

        if !apartment_matches.is_empty() {
            valid_apartments = Some(apartment_matches.keys().cloned().collect());
        }

        if !room_matches.is_empty() {
            let room_ids: BTreeSet<String> = room_matches.keys().cloned().collect();
            valid_apartments = Some(match valid_apartments {
                Some(existing) => existing.intersection(&room_ids).cloned().collect(),
                None => room_ids,
            });
        }

        if !neighborhood_matches.is_empty() {
            let neighborhood_ids: Vec<&String> = neighborhood_matches.keys().collect();
            let mut query = json!({ "terms": { "neighborhood_id": neighborhood_ids } });
            let structured = structured_filter_clauses(structured_filters);
            if !structured.is_empty() {
                let mut must = vec![query];
                must.extend(structured);
                query = json!({ "bool": { "must": must } });
            }
            let body = json!({
                "query": query,
                "_source": ["apartment_id"],
                "size": 1000,
            });
            let response = self.store.search(APARTMENTS_INDEX, &body).await?;
            let neighborhood_apartment_ids = apartment_ids_from_hits(&response);

            valid_apartments = Some(match valid_apartments {
                Some(existing) => existing.intersection(&neighborhood_apartment_ids).cloned().collect(),
                None => neighborhood_apartment_ids,
            });
        }

        if valid_apartments.is_none() && !structured_filters.is_empty() {
            valid_apartments = Some(self.apply_structured_filters_globally(structured_filters).await?);
        }

        let mut valid = valid_apartments.unwrap_or_default();
        if !valid.is_empty() && !search_claims.is_empty() {
            valid = self.filter_by_quantifiers(valid, apartment_matches, room_matches, search_claims);
        }

        Ok(valid)
    }

    /// Drop an apartment on the first quantifier predicate its matched
    /// claims fail for any quantified query claim.
    fn filter_by_quantifiers(
        &self,
        apartments: BTreeSet<String>,
        apartment_matches: &MatchMap,
        room_matches: &MatchMap,
        search_claims: &[Claim],
    ) -> BTreeSet<String> {
        let quantified_claims: Vec<&Claim> = search_claims.iter().filter(|c| !c.quantifiers.is_empty()).collect();
        if quantified_claims.is_empty() {
            return apartments;
        }

        let before = apartments.len();
        let filtered: BTreeSet<String> = apartments
            .into_iter()
            .filter(|apt_id| {
                for search_claim in &quantified_claims {
                    let empty = Vec::new();
                    let matches = apartment_matches
                        .get(apt_id)
                        .unwrap_or(&empty)
                        .iter()
                        .chain(room_matches.get(apt_id).unwrap_or(&empty).iter());
                    for m in matches {
                        if m.search_claim == search_claim.claim
                            && !validate_quantifiers(search_claim, &m.quantifiers)
                        {
                            tracing::info!(
                                target: "search.filters",
                                apartment = %apt_id,
                                query_claim = %search_claim.claim,
                                matched_claim = %m.matched_claim,
                                "excluding apartment on quantifier mismatch"
                            );
                            return false;
                        }
                    }
                }
                true
            })
            .collect();

        tracing::info!(
            target: "search.filters",
            before,
            after = filtered.len(),
            "quantifier filtering complete"
        );
        filtered
    }

    /// An apartment whose content strongly matches the opposite of what the
    /// query asked for is removed entirely: the best anti match must clear
    /// the threshold and beat the best positive match for the same query
    /// claim.
    pub fn filter_by_anti_claims(
        &self,
        apartments: BTreeSet<String>,
        room_matches: &MatchMap,
        apartment_matches: &MatchMap,
        neighborhood_matches: &MatchMap,
    ) -> BTreeSet<String> {
        let mut excluded: BTreeSet<String> = BTreeSet::new();

        for apartment_id in &apartments {
            let empty = Vec::new();
            let mut all_matches: Vec<&crate::models::ClaimMatch> = Vec::new();
            all_matches.extend(room_matches.get(apartment_id).unwrap_or(&empty).iter());
            all_matches.extend(apartment_matches.get(apartment_id).unwrap_or(&empty).iter());
            for matches in neighborhood_matches.values() {
                all_matches.extend(matches.iter());
            }

            let mut by_search_claim: std::collections::BTreeMap<&str, (Vec<f64>, Vec<f64>)> = Default::default();
            for m in &all_matches {
                let entry = by_search_claim.entry(m.search_claim.as_str()).or_default();
                if m.kind == ClaimKind::Anti {
                    entry.0.push(m.score);
                } else {
                    entry.1.push(m.score);
                }
            }

            for (search_claim, (anti_scores, positive_scores)) in by_search_claim {
                let Some(best_anti) = anti_scores.iter().cloned().fold(None, f64_max) else {
                    continue;
                };
                if best_anti < self.anti_claim_threshold {
                    continue;
                }
                let best_positive = positive_scores.iter().cloned().fold(None, f64_max).unwrap_or(0.0);
                if best_anti > best_positive {
                    tracing::info!(
                        target: "search.filters",
                        apartment = %apartment_id,
                        query_claim = %search_claim,
                        anti_score = best_anti,
                        positive_score = best_positive,
                        "excluding apartment, anti-claim dominates"
                    );
                    excluded.insert(apartment_id.clone());
                    break;
                }
            }
        }

        apartments.difference(&excluded).cloned().collect()
    }

    async fn apply_structured_filters_globally(&self, structured_filters: &StructuredFilters) -> Result<BTreeSet<String>> {
        let must_clauses = structured_filter_clauses(structured_filters);
        if must_clauses.is_empty() {
            return Ok(BTreeSet::new());
        }

        let body = json!({
            "query": { "bool": { "must": must_clauses } },
            "_source": ["apartment_id"],
            "size": 10000,
        });
        let response = self.store.search(APARTMENTS_INDEX, &body).await?;
        Ok(apartment_ids_from_hits(&response))
    }
}

fn f64_max(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(match acc {
        Some(a) if a >= v => a,
        _ => v,
    })
}

fn apartment_ids_from_hits(response: &Value) -> BTreeSet<String> {
    response
        .pointer("/hits/hits")
        .and_then(|h| h.as_array())
        .map(|hits| {
            hits.iter()
                .filter_map(|h| h.pointer("/_source/apartment_id").and_then(|v| v.as_str()))
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Must-clauses for the structured predicates: a rent range plus a nested
/// availability-window overlap query.
pub fn structured_filter_clauses(filters: &StructuredFilters) -> Vec<Value> {
    let mut must_clauses = Vec::new();

    if let Some(rent) = &filters.rent_price {
        let mut range = serde_json::Map::new();
        if let Some(min) = rent.min {
            range.insert("gte".into(), json!(min));
        }
        if let Some(max) = rent.max {
            range.insert("lte".into(), json!(max));
        }
        if !range.is_empty() {
            must_clauses.push(json!({ "range": { "rent_price": range } }));
        }
    }

    if let Some(dates) = &filters.availability_dates {
        match (&dates.start, &dates.end) {
            (Some(start), Some(end)) => {
                must_clauses.push(json!({
                    "nested": {
                        "path": "availability_dates",
                        "query": {
                            "bool": {
                                "must": [
                                    { "range": { "availability_dates.start": { "lte": end } } },
                                    { "range": { "availability_dates.end": { "gte": start } } }
                                ]
                            }
                        }
                    }
                }));
            }
            (Some(start), None) => {
                must_clauses.push(json!({
                    "nested": {
                        "path": "availability_dates",
                        "query": { "range": { "availability_dates.end": { "gte": start } } }
                    }
                }));
            }
            _ => {}
        }
    }

    must_clauses
}
