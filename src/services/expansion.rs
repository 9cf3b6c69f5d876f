use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::models::{Claim, ClaimKind, ClaimType};
use crate::services::gemini::GenerativeModel;

/// Per-type expansion strategy. Anti-claims are only generated where a
/// clear semantic opposite exists that users would actually search for.
struct ExpansionStrategy {
    derive: &'static str,
    generate_anti: bool,
    example_base: &'static str,
    example_derived: &'static [&'static str],
    example_anti: &'static [&'static str],
}

pub struct ExpansionService {
    model: Arc<dyn GenerativeModel>,
    semaphore: Arc<Semaphore>,
}

impl ExpansionService {
    pub fn new(model: Arc<dyn GenerativeModel>, max_concurrency: usize) -> Self {
        Self { model, semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))) }
    }

    /// Expand base claims with derived variants (synonyms, generalizations)
    /// and anti variants (semantic opposites). Per-claim failures are logged
    /// and swallowed; the returned list always contains the originals.
    pub async fn expand_claims(&self, claims: Vec<Claim>) -> Vec<Claim> {
        let base_claims: Vec<Claim> = claims.iter().filter(|c| c.kind == ClaimKind::Base).cloned().collect();
        if base_claims.is_empty() {
            return claims;
        }

        tracing::info!(target: "expansion", base = base_claims.len(), "expanding base claims");

        let tasks = base_claims.iter().map(|claim| self.expand_single_claim(claim));
        let results = join_all(tasks).await;

        let mut all_claims = claims;
        let mut total_derived = 0;
        let mut total_anti = 0;
        let mut errors = 0;

        for (claim, result) in base_claims.iter().zip(results) {
            match result {
                Ok(expanded) => {
                    total_derived += expanded.iter().filter(|c| c.kind == ClaimKind::Derived).count();
                    total_anti += expanded.iter().filter(|c| c.kind == ClaimKind::Anti).count();
                    all_claims.extend(expanded);
                }
                Err(e) => {
                    tracing::error!(target: "expansion", claim = %claim.claim, error = %e, "expansion failed for claim");
                    errors += 1;
                }
            }
        }

        tracing::info!(
            target: "expansion",
            total = all_claims.len(),
            derived = total_derived,
            anti = total_anti,
            errors,
            "expansion complete"
        );
        all_claims
    }

    async fn expand_single_claim(&self, claim: &Claim) -> crate::error::Result<Vec<Claim>> {
        let Some(strategy) = expansion_strategy(claim.claim_type) else {
            return Ok(Vec::new());
        };

        let prompt = build_expansion_prompt(claim, strategy);
        let _permit = self.semaphore.acquire().await.expect("semaphore closed");

        let parsed = self.model.generate_json(&prompt, 0.2).await?;

        let mut expanded = Vec::new();
        if let Some(derived) = parsed.get("derived_claims").and_then(|d| d.as_array()) {
            for text in derived.iter().filter_map(|t| t.as_str()) {
                expanded.push(Claim {
                    claim: text.to_string(),
                    claim_type: claim.claim_type,
                    domain: claim.domain,
                    room_type: claim.room_type.clone(),
                    is_specific: false,
                    has_quantifiers: false,
                    quantifiers: Vec::new(),
                    kind: ClaimKind::Derived,
                    from_claim: Some(claim.claim.clone()),
                    weight: claim.weight * 0.9,
                    negation: claim.negation,
                    grounding_metadata: None,
                    source: None,
                });
            }
        }
        if strategy.generate_anti {
            if let Some(anti) = parsed.get("anti_claims").and_then(|a| a.as_array()) {
                for text in anti.iter().filter_map(|t| t.as_str()) {
                    expanded.push(Claim {
                        claim: text.to_string(),
                        claim_type: claim.claim_type,
                        domain: claim.domain,
                        room_type: claim.room_type.clone(),
                        is_specific: false,
                        has_quantifiers: false,
                        quantifiers: Vec::new(),
                        kind: ClaimKind::Anti,
                        from_claim: Some(claim.claim.clone()),
                        weight: claim.weight * 0.5,
                        negation: !claim.negation,
                        grounding_metadata: None,
                        source: None,
                    });
                }
            }
        }

        tracing::debug!(target: "expansion", claim = %claim.claim, expanded = expanded.len(), "expanded claim");
        Ok(expanded)
    }
}

fn expansion_strategy(claim_type: ClaimType) -> Option<&'static ExpansionStrategy> {
    match claim_type {
        ClaimType::Restrictions => Some(&ExpansionStrategy {
            derive: "similar lease terms, formality variations, time period synonyms",
            generate_anti: true,
            example_base: "12-month minimum lease",
            example_derived: &["annual lease required", "one-year commitment", "12-month term minimum", "year-long lease"],
            example_anti: &["month-to-month available", "flexible lease terms", "short-term lease allowed"],
        }),
        ClaimType::Policies => Some(&ExpansionStrategy {
            derive: "similar policy phrasings, equivalent allowances, permission synonyms",
            generate_anti: true,
            example_base: "pets allowed",
            example_derived: &["pet-friendly", "dogs and cats welcome", "animals permitted", "cats and dogs okay"],
            example_anti: &["no pets allowed", "pet-free building", "animals prohibited"],
        }),
        ClaimType::Neighborhood => Some(&ExpansionStrategy {
            derive: "vibe synonyms, character equivalents, atmosphere descriptions",
            generate_anti: true,
            example_base: "quiet neighborhood",
            example_derived: &["peaceful area", "tranquil location", "low noise level", "serene environment", "residential feel"],
            example_anti: &["noisy area", "busy neighborhood", "nightlife district"],
        }),
        ClaimType::Size => Some(&ExpansionStrategy {
            derive: "size synonyms, room count variations, measurement equivalents",
            generate_anti: false,
            example_base: "2 bedroom",
            example_derived: &["two bedroom", "2BR", "2 bed", "two bed apartment"],
            example_anti: &[],
        }),
        ClaimType::Location => Some(&ExpansionStrategy {
            derive: "geographic hierarchy (neighborhood, borough, city), area synonyms",
            generate_anti: false,
            example_base: "located in Williamsburg",
            example_derived: &["Williamsburg Brooklyn", "North Brooklyn", "Williamsburg neighborhood", "in Williamsburg area"],
            example_anti: &[],
        }),
        ClaimType::Features => Some(&ExpansionStrategy {
            derive: "feature synonyms, similar characteristics, related attributes",
            generate_anti: false,
            example_base: "high ceilings",
            example_derived: &["tall ceilings", "soaring ceilings", "lofty spaces", "elevated ceilings", "12+ foot ceilings"],
            example_anti: &[],
        }),
        ClaimType::Amenities => Some(&ExpansionStrategy {
            derive: "amenity synonyms, service equivalents, facility variations",
            generate_anti: false,
            example_base: "doorman building",
            example_derived: &["concierge service", "full-service building", "attended lobby", "24/7 staff", "front desk"],
            example_anti: &[],
        }),
        ClaimType::Condition => Some(&ExpansionStrategy {
            derive: "condition synonyms, renovation equivalents, age indicators",
            generate_anti: false,
            example_base: "newly renovated",
            example_derived: &["recently updated", "modern finishes", "contemporary renovation", "freshly remodeled", "gut renovated"],
            example_anti: &[],
        }),
        ClaimType::Transport => Some(&ExpansionStrategy {
            derive: "transit synonyms, access equivalents, commute variations",
            generate_anti: false,
            example_base: "near subway",
            example_derived: &["close to metro", "walking distance to train", "convenient transit access", "steps from subway"],
            example_anti: &[],
        }),
        ClaimType::Utilities => Some(&ExpansionStrategy {
            derive: "utility inclusion synonyms, service coverage variations",
            generate_anti: false,
            example_base: "utilities included",
            example_derived: &["all utilities covered", "heat and water included", "no utility bills", "utilities paid"],
            example_anti: &[],
        }),
        ClaimType::Accessibility => Some(&ExpansionStrategy {
            derive: "accessibility synonyms, mobility equivalents, access descriptions",
            generate_anti: false,
            example_base: "elevator building",
            example_derived: &["lift access", "no stairs required", "elevator to all floors", "accessible building"],
            example_anti: &[],
        }),
        ClaimType::Pricing => Some(&ExpansionStrategy {
            derive: "price range variations, cost descriptors",
            generate_anti: false,
            example_base: "affordable rent",
            example_derived: &["reasonably priced", "budget-friendly", "good value", "competitive pricing"],
            example_anti: &[],
        }),
    }
}

fn build_expansion_prompt(claim: &Claim, strategy: &ExpansionStrategy) -> String {
    let (task_desc, anti_rules) = if strategy.generate_anti {
        (
            "1. DERIVED CLAIMS: synonyms, paraphrases, and generalizations\n2. ANTI CLAIMS: semantic opposites ONLY when there is a clear, meaningful opposition",
            "2. Anti claims should ONLY be generated when:\n   - There is a clear semantic opposition (e.g., \"pets allowed\" vs \"no pets\")\n   - Users would search for the opposite (e.g., \"month-to-month\" vs \"12-month\")\n   - Generate 2-3 anti claims ONLY if truly meaningful",
        )
    } else {
        (
            "1. DERIVED CLAIMS: synonyms, paraphrases, and generalizations\n2. NO ANTI CLAIMS for this claim type (return empty array)",
            "2. DO NOT generate anti claims - return empty array []",
        )
    };

    format!(
        r#"You are an expert at generating semantic variations for apartment search claims.

Given a base claim, generate:
{task_desc}

<task>
Base Claim: "{claim}"
Claim Type: {claim_type}
Domain: {domain}

Expansion Strategy:
- Derive: {derive}

Example for this claim type:
Base: "{example_base}"
Derived: {example_derived:?}
Anti: {example_anti:?}
</task>

<rules>
1. Derived claims should:
   - Preserve the core meaning
   - Use different phrasing or synonyms
   - Include generalizations when appropriate
   - Generate 4-6 high-quality derived claims

{anti_rules}

3. Keep claims concise and lowercase (except proper nouns)
4. Focus on actual semantic meaning users would search for
5. Quality over quantity
</rules>

<output_format>
Return ONLY valid JSON:
{{
  "derived_claims": ["synonym 1", "synonym 2", "generalization", "variation 4"],
  "anti_claims": []
}}
</output_format>

Generate expansions for the base claim above."#,
        task_desc = task_desc,
        claim = claim.claim,
        claim_type = claim.claim_type.as_str(),
        domain = claim.domain.as_str(),
        derive = strategy.derive,
        example_base = strategy.example_base,
        example_derived = strategy.example_derived,
        example_anti = strategy.example_anti,
        anti_rules = anti_rules,
    )
}
