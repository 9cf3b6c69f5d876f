use std::sync::Arc;

use crate::error::Result;
use crate::models::{
    Claim, ClaimType, EmbeddedClaim, GeoPoint, MatchMap, SearchResult, StructuredFilters,
};
use crate::search::filters::SearchFilters;
use crate::search::scorers::{CompatibilityCache, ResultScorer};
use crate::search::searchers::{ApartmentSearcher, GeoFilter, NeighborhoodSearcher, RoomSearcher};
use crate::services::embeddings::{Embedder, EmbeddingTask};
use crate::services::llm::LlmService;
use crate::services::quantifiers::QuantifierService;

const AVAILABILITY_KEYWORDS: &[&str] = &["available", "availability", "lease start", "move-in date", "move in"];

/// Query-side pipeline: parse, filter, retrieve per domain, gate, validate,
/// score. Read-only against the store and re-entrant per request.
pub struct SearchPipeline {
    llm: Arc<LlmService>,
    embedder: Arc<dyn Embedder>,
    quantifiers: Arc<QuantifierService>,
    room_searcher: RoomSearcher,
    apartment_searcher: ApartmentSearcher,
    neighborhood_searcher: NeighborhoodSearcher,
    filters: SearchFilters,
    scorer: ResultScorer,
}

impl SearchPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<LlmService>,
        embedder: Arc<dyn Embedder>,
        quantifiers: Arc<QuantifierService>,
        room_searcher: RoomSearcher,
        apartment_searcher: ApartmentSearcher,
        neighborhood_searcher: NeighborhoodSearcher,
        filters: SearchFilters,
        scorer: ResultScorer,
    ) -> Self {
        Self {
            llm,
            embedder,
            quantifiers,
            room_searcher,
            apartment_searcher,
            neighborhood_searcher,
            filters,
            scorer,
        }
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        _user_location: Option<GeoPoint>,
        verify_claims: bool,
        double_check_matches: bool,
    ) -> Result<Vec<SearchResult>> {
        tracing::info!(target: "search", query, verify_claims, double_check_matches, "starting search");

        let (claims_result, filters_result) = tokio::join!(
            self.llm.aggregate_claims(query, None, true),
            self.llm.extract_structured_filters(query),
        );
        let search_claims = claims_result?;
        // Filter extraction is best-effort: a failure means vector search only
        let structured_filters = filters_result.unwrap_or_else(|e| {
            tracing::warn!(target: "search", error = %e, "structured filter extraction failed");
            StructuredFilters::default()
        });

        let search_claims = filter_redundant_claims(search_claims, &structured_filters);
        let search_claims = self.quantifiers.extract_quantifiers(search_claims).await;
        let embedded_claims = self.embed_claims(search_claims).await?;

        let geo_filters: Vec<GeoFilter> = Vec::new();

        let (valid_apartments, room_matches, apartment_matches, neighborhood_matches) = self
            .execute_domain_searches(&embedded_claims, &geo_filters, &structured_filters)
            .await?;

        let search_claims: Vec<Claim> = embedded_claims.into_iter().map(|c| c.claim).collect();

        let filtered_apartments = self.filters.filter_by_anti_claims(
            valid_apartments,
            &room_matches,
            &apartment_matches,
            &neighborhood_matches,
        );

        let compatibility_cache: CompatibilityCache = if verify_claims {
            let best_matches = self.scorer.get_best_matches_globally(
                &filtered_apartments,
                &room_matches,
                &apartment_matches,
                &neighborhood_matches,
            );
            let pairs: Vec<(String, String)> = best_matches
                .values()
                .map(|m| (m.search_claim.clone(), m.matched_claim.clone()))
                .collect();
            self.llm.validate_claim_compatibility_batch(&pairs).await
        } else {
            tracing::info!(target: "search", "claim verification skipped");
            CompatibilityCache::new()
        };

        let ranked = self
            .scorer
            .rank_results(
                &filtered_apartments,
                &room_matches,
                &apartment_matches,
                &neighborhood_matches,
                &search_claims,
                &compatibility_cache,
                double_check_matches,
            )
            .await?;

        tracing::info!(
            target: "search",
            results = ranked.len(),
            top_score = ranked.first().map(|r| r.final_score).unwrap_or(0.0),
            "search complete"
        );
        Ok(ranked.into_iter().take(top_k).collect())
    }

    async fn embed_claims(&self, claims: Vec<Claim>) -> Result<Vec<EmbeddedClaim>> {
        let texts: Vec<String> = claims.iter().map(|c| c.claim.clone()).collect();
        let embeddings = self.embedder.embed(&texts, EmbeddingTask::RetrievalQuery).await?;
        Ok(claims
            .into_iter()
            .zip(embeddings)
            .map(|(claim, embedding)| EmbeddedClaim { claim, embedding, quantified_claim: None })
            .collect())
    }

    async fn execute_domain_searches(
        &self,
        claims: &[EmbeddedClaim],
        geo_filters: &[GeoFilter],
        structured_filters: &StructuredFilters,
    ) -> Result<(std::collections::BTreeSet<String>, MatchMap, MatchMap, MatchMap)> {
        let room_claims: Vec<EmbeddedClaim> =
            claims.iter().filter(|c| c.claim.domain == crate::models::Domain::Room).cloned().collect();
        let apartment_claims: Vec<EmbeddedClaim> =
            claims.iter().filter(|c| c.claim.domain == crate::models::Domain::Apartment).cloned().collect();
        let neighborhood_claims: Vec<EmbeddedClaim> =
            claims.iter().filter(|c| c.claim.domain == crate::models::Domain::Neighborhood).cloned().collect();

        let (room_matches, apartment_matches, neighborhood_matches) = tokio::join!(
            async {
                if room_claims.is_empty() {
                    Ok(MatchMap::new())
                } else {
                    self.room_searcher.search(&room_claims).await
                }
            },
            async {
                if apartment_claims.is_empty() {
                    Ok(MatchMap::new())
                } else {
                    self.apartment_searcher.search(&apartment_claims, geo_filters, structured_filters).await
                }
            },
            async {
                if neighborhood_claims.is_empty() {
                    Ok(MatchMap::new())
                } else {
                    self.neighborhood_searcher.search(&neighborhood_claims).await
                }
            },
        );
        let room_matches = room_matches?;
        let apartment_matches = apartment_matches?;
        let neighborhood_matches = neighborhood_matches?;

        tracing::info!(
            target: "search",
            rooms = room_matches.len(),
            apartments = apartment_matches.len(),
            neighborhoods = neighborhood_matches.len(),
            "domain searches complete"
        );

        let search_claims: Vec<Claim> = claims.iter().map(|c| c.claim.clone()).collect();
        let valid_apartments = self
            .filters
            .filter_by_hierarchy(
                &room_matches,
                &apartment_matches,
                &neighborhood_matches,
                &search_claims,
                structured_filters,
            )
            .await?;

        tracing::info!(target: "search", valid = valid_apartments.len(), "hierarchy filtering complete");
        Ok((valid_apartments, room_matches, apartment_matches, neighborhood_matches))
    }
}

/// Drop query claims a structured filter already covers: pricing claims
/// under a rent filter, availability-shaped restriction claims under a date
/// filter. Without this the same constraint would both gate and score.
pub fn filter_redundant_claims(claims: Vec<Claim>, filters: &StructuredFilters) -> Vec<Claim> {
    claims
        .into_iter()
        .filter(|claim| {
            if claim.claim_type == ClaimType::Pricing && filters.rent_price.is_some() {
                tracing::info!(target: "search", claim = %claim.claim, "skipping redundant pricing claim");
                return false;
            }
            if claim.claim_type == ClaimType::Restrictions && filters.availability_dates.is_some() {
                let lower = claim.claim.to_lowercase();
                if AVAILABILITY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                    tracing::info!(target: "search", claim = %claim.claim, "skipping redundant availability claim");
                    return false;
                }
            }
            true
        })
        .collect()
}
