use std::sync::Arc;

use crate::error::Result;
use crate::models::{Claim, ClaimSource, SourceType};
use crate::services::embeddings::{Embedder, EmbeddingTask};

/// Vector-similarity deduplication over freshly extracted claims. Pairwise
/// O(n²) compares are fine here: a listing yields tens, not thousands.
pub struct DeduplicationService {
    embedder: Arc<dyn Embedder>,
    similarity_threshold: f64,
}

impl DeduplicationService {
    pub fn new(embedder: Arc<dyn Embedder>, similarity_threshold: f64) -> Self {
        Self { embedder, similarity_threshold }
    }

    /// Order-stable: the first occurrence survives, later duplicates are
    /// dropped and their sources merged into the survivor.
    pub async fn deduplicate_claims(&self, claims: Vec<Claim>) -> Result<Vec<Claim>> {
        if claims.len() <= 1 {
            return Ok(claims);
        }

        let texts: Vec<String> = claims.iter().map(|c| c.claim.clone()).collect();
        let embeddings = self.embedder.embed(&texts, EmbeddingTask::RetrievalDocument).await?;

        let mut unique: Vec<Claim> = Vec::new();
        let mut dropped = vec![false; claims.len()];

        for i in 0..claims.len() {
            if dropped[i] {
                continue;
            }

            let mut merged_sources: Vec<ClaimSource> = claims[i].source.clone().into_iter().collect();
            let mut duplicates_found = false;

            for j in (i + 1)..claims.len() {
                if dropped[j] {
                    continue;
                }
                let similarity = cosine_similarity(&embeddings[i], &embeddings[j]);
                if similarity >= self.similarity_threshold {
                    tracing::info!(
                        target: "dedup",
                        similarity = format!("{:.3}", similarity),
                        kept = %claims[i].claim,
                        dropped = %claims[j].claim,
                        "duplicate claim detected"
                    );
                    if let Some(source) = claims[j].source.clone() {
                        if !merged_sources.contains(&source) {
                            merged_sources.push(source);
                        }
                    }
                    dropped[j] = true;
                    duplicates_found = true;
                }
            }

            let mut claim = claims[i].clone();
            if duplicates_found && merged_sources.len() > 1 {
                claim.source = Some(merge_sources(merged_sources));
            }
            unique.push(claim);
        }

        tracing::info!(
            target: "dedup",
            total = claims.len(),
            unique = unique.len(),
            removed = claims.len() - unique.len(),
            "deduplication complete"
        );
        Ok(unique)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// Text provenance outranks image provenance; otherwise first image wins.
fn merge_sources(sources: Vec<ClaimSource>) -> ClaimSource {
    if let Some(text) = sources.iter().find(|s| s.source_type == SourceType::Text) {
        return text.clone();
    }
    sources
        .into_iter()
        .find(|s| s.source_type == SourceType::Image)
        .unwrap_or_else(ClaimSource::text)
}
