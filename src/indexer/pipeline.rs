use std::sync::Arc;

use futures::future::join_all;
use serde_json::{json, Value};

use crate::error::Result;
use crate::models::{
    ApartmentDocument, AvailabilityRange, Claim, ClaimSource, Domain, DomainBreakdown, EmbeddedClaim, GeoPoint,
    GroundingMetadata, IndexRequest, IndexSummary, StructuredProperty,
};
use crate::es::{
    geo_to_stored, quantifiers_to_stored, DocumentStore, APARTMENTS_INDEX, NEIGHBORHOODS_INDEX, ROOMS_INDEX,
};
use crate::services::chunker::DocumentChunker;
use crate::services::dedup::DeduplicationService;
use crate::services::embeddings::{Embedder, EmbeddingTask};
use crate::services::enrichment::EnrichmentService;
use crate::services::expansion::ExpansionService;
use crate::services::geocoding::GeocodingService;
use crate::services::grounding::GroundingService;
use crate::services::llm::LlmService;
use crate::services::quantifiers::QuantifierService;
use crate::services::vision::VisionModel;

const CHUNKING_THRESHOLD: usize = 1000;

/// Listing-side pipeline: extract claims from every source, dedupe, ground,
/// expand, quantify, embed, and persist across the three domain indices,
/// then patch enrichment summaries onto the canonical document.
pub struct IndexerPipeline {
    store: Arc<dyn DocumentStore>,
    llm: Arc<LlmService>,
    embedder: Arc<dyn Embedder>,
    vision: Arc<dyn VisionModel>,
    geocoding: Arc<GeocodingService>,
    grounding: Arc<GroundingService>,
    expansion: Arc<ExpansionService>,
    quantifiers: Arc<QuantifierService>,
    dedup: Arc<DeduplicationService>,
    enrichment: Arc<EnrichmentService>,
    chunker: DocumentChunker,
}

impl IndexerPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        llm: Arc<LlmService>,
        embedder: Arc<dyn Embedder>,
        vision: Arc<dyn VisionModel>,
        geocoding: Arc<GeocodingService>,
        grounding: Arc<GroundingService>,
        expansion: Arc<ExpansionService>,
        quantifiers: Arc<QuantifierService>,
        dedup: Arc<DeduplicationService>,
        enrichment: Arc<EnrichmentService>,
    ) -> Self {
        Self {
            store,
            llm,
            embedder,
            vision,
            geocoding,
            grounding,
            expansion,
            quantifiers,
            dedup,
            enrichment,
            chunker: DocumentChunker::default(),
        }
    }

    pub async fn process(&self, request: IndexRequest) -> Result<IndexSummary> {
        let apartment_id = request.apartment_id.clone();
        tracing::info!(target: "indexer", apartment_id = %apartment_id, "starting indexing pipeline");

        let document = request.document.clone().unwrap_or_default();
        let (all_claims, image_descriptions) = self
            .extract_claims_from_all_sources(
                &document,
                request.address.as_deref(),
                request.image_urls.as_deref().unwrap_or_default(),
                request.precomputed_image_descriptions.as_deref(),
            )
            .await;

        if all_claims.is_empty() {
            tracing::warn!(target: "indexer", apartment_id = %apartment_id, "no claims extracted from any source");
            return Ok(IndexSummary::empty(&apartment_id));
        }

        let unique_claims = self.dedup.deduplicate_claims(all_claims).await?;
        tracing::info!(target: "indexer", unique = unique_claims.len(), "deduplication complete");
        if unique_claims.is_empty() {
            return Ok(IndexSummary::empty(&apartment_id));
        }

        let (structured_properties, location) = tokio::join!(
            self.resolve_structured_properties(&document, request.rent_price, request.availability_dates.clone()),
            self.geocode_address(request.address.as_deref()),
        );

        let claims_with_verified = self.ground_claims(unique_claims, location).await;
        let expanded_claims = self.expansion.expand_claims(claims_with_verified).await;
        tracing::info!(target: "indexer", total = expanded_claims.len(), "expansion complete");

        let claims_with_quantifiers = self.quantifiers.extract_quantifiers(expanded_claims).await;
        let embedded_claims = self.embed_claims(claims_with_quantifiers).await?;

        let apartment_doc = ApartmentDocument {
            apartment_id: apartment_id.clone(),
            title: request.title.clone(),
            neighborhood_id: request.neighborhood_id.clone(),
            address: request.address.clone(),
            location,
            raw_description: document.clone(),
            image_urls: request.image_urls.clone().unwrap_or_default(),
            image_metadata: request.image_metadata.clone().unwrap_or_default(),
            claims: embedded_claims,
            rent_price: structured_properties.rent_price,
            availability_dates: structured_properties.availability_dates,
            property_summary: None,
            location_summary: None,
            location_widget_token: None,
        };

        self.write_claims(&apartment_doc).await?;
        tracing::info!(target: "indexer", apartment_id = %apartment_id, "claims written to store");

        self.enrich_apartment(&apartment_doc, &document, &image_descriptions).await;

        Ok(build_summary(&apartment_id, &apartment_doc.claims))
    }

    async fn extract_claims_from_all_sources(
        &self,
        document: &str,
        address: Option<&str>,
        image_urls: &[String],
        precomputed_descriptions: Option<&[String]>,
    ) -> (Vec<Claim>, Vec<String>) {
        let text_task = async {
            if document.trim().is_empty() {
                return Vec::new();
            }
            self.extract_text_claims(document, address).await
        };

        let image_task = async {
            match precomputed_descriptions {
                Some(descriptions) => {
                    tracing::info!(target: "indexer", count = descriptions.len(), "using precomputed image descriptions");
                    let tasks = image_urls
                        .iter()
                        .zip(descriptions.iter())
                        .enumerate()
                        .map(|(idx, (url, description))| {
                            self.extract_claims_from_description(description.clone(), Some(url.clone()), idx, address)
                        });
                    join_all(tasks).await
                }
                None => {
                    let tasks = image_urls
                        .iter()
                        .enumerate()
                        .map(|(idx, url)| self.extract_image_claims(url.clone(), idx, address));
                    join_all(tasks).await
                }
            }
        };

        let (text_claims, image_results) = tokio::join!(text_task, image_task);

        let mut all_claims = text_claims;
        let mut image_descriptions = Vec::new();
        for (claims, description) in image_results {
            all_claims.extend(claims);
            if !description.is_empty() {
                image_descriptions.push(description);
            }
        }

        tracing::info!(
            target: "indexer",
            claims = all_claims.len(),
            descriptions = image_descriptions.len(),
            "claim extraction complete"
        );
        (all_claims, image_descriptions)
    }

    async fn extract_text_claims(&self, document: &str, address: Option<&str>) -> Vec<Claim> {
        let mut claims = if document.len() > CHUNKING_THRESHOLD {
            let chunks = self.chunker.chunk(document);
            tracing::info!(target: "indexer", chunks = chunks.len(), chars = document.len(), "chunked long document");

            let tasks = chunks.iter().map(|chunk| self.llm.aggregate_claims(chunk, address, false));
            let results = join_all(tasks).await;

            let mut claims = Vec::new();
            for (idx, result) in results.into_iter().enumerate() {
                match result {
                    Ok(chunk_claims) => claims.extend(chunk_claims),
                    Err(e) => {
                        tracing::error!(target: "indexer", chunk = idx, error = %e, "chunk extraction failed")
                    }
                }
            }
            claims
        } else {
            match self.llm.aggregate_claims(document, address, false).await {
                Ok(claims) => claims,
                Err(e) => {
                    tracing::error!(target: "indexer", error = %e, "text claim extraction failed");
                    Vec::new()
                }
            }
        };

        for claim in &mut claims {
            claim.source = Some(ClaimSource::text());
        }
        claims
    }

    async fn extract_image_claims(
        &self,
        image_url: String,
        image_index: usize,
        address: Option<&str>,
    ) -> (Vec<Claim>, String) {
        let description = match self.vision.describe_image(&image_url, image_index).await {
            Ok(description) if !description.is_empty() => description,
            Ok(_) => {
                tracing::warn!(target: "indexer", image_index, "empty description for image");
                return (Vec::new(), String::new());
            }
            Err(e) => {
                tracing::error!(target: "indexer", image_index, error = %e, "vision description failed");
                return (Vec::new(), String::new());
            }
        };
        self.extract_claims_from_description(description, Some(image_url), image_index, address).await
    }

    async fn extract_claims_from_description(
        &self,
        description: String,
        image_url: Option<String>,
        image_index: usize,
        address: Option<&str>,
    ) -> (Vec<Claim>, String) {
        if description.is_empty() {
            tracing::warn!(target: "indexer", image_index, "empty image description");
            return (Vec::new(), String::new());
        }
        match self.llm.aggregate_claims(&description, address, false).await {
            Ok(mut claims) => {
                for claim in &mut claims {
                    claim.source = Some(ClaimSource::image(image_url.clone(), image_index));
                }
                tracing::info!(target: "indexer", image_index, claims = claims.len(), "extracted claims from image");
                (claims, description)
            }
            Err(e) => {
                tracing::error!(target: "indexer", image_index, error = %e, "image claim extraction failed");
                (Vec::new(), String::new())
            }
        }
    }

    /// Caller-provided structured fields win per field; the LLM extractor
    /// only fills what the request omitted.
    async fn resolve_structured_properties(
        &self,
        document: &str,
        rent_price: Option<f64>,
        availability_dates: Option<Vec<AvailabilityRange>>,
    ) -> StructuredProperty {
        if let (Some(rent), Some(dates)) = (rent_price, availability_dates.clone()) {
            return StructuredProperty { rent_price: Some(rent), availability_dates: dates };
        }

        let extracted = match self.llm.extract_structured_properties(document).await {
            Ok(extracted) => extracted,
            Err(e) => {
                tracing::error!(target: "indexer", error = %e, "structured property extraction failed");
                StructuredProperty::default()
            }
        };

        StructuredProperty {
            rent_price: rent_price.or(extracted.rent_price),
            availability_dates: availability_dates.unwrap_or(extracted.availability_dates),
        }
    }

    async fn geocode_address(&self, address: Option<&str>) -> Option<GeoPoint> {
        let address = address?;
        self.geocoding.geocode_address(address).await
    }

    async fn ground_claims(&self, mut claims: Vec<Claim>, location: Option<GeoPoint>) -> Vec<Claim> {
        let Some(location) = location else {
            return claims;
        };

        let groundable: Vec<Claim> = claims.iter().filter(|c| self.grounding.should_ground_claim(c)).cloned().collect();
        if groundable.is_empty() {
            return claims;
        }

        tracing::info!(target: "indexer", groundable = groundable.len(), "grounding claims");
        let result = self.grounding.ground_claims_batch(&groundable, Some(location)).await;
        tracing::info!(target: "indexer", verified = result.verified_claims.len(), "grounding added verified claims");
        claims.extend(result.verified_claims);
        claims
    }

    async fn embed_claims(&self, claims: Vec<Claim>) -> Result<Vec<EmbeddedClaim>> {
        let texts: Vec<String> = claims.iter().map(|c| c.claim.clone()).collect();
        let embeddings = self.embedder.embed(&texts, EmbeddingTask::RetrievalDocument).await?;
        tracing::info!(target: "indexer", count = embeddings.len(), "embedded claims");
        Ok(claims
            .into_iter()
            .zip(embeddings)
            .map(|(claim, embedding)| EmbeddedClaim { claim, embedding, quantified_claim: None })
            .collect())
    }

    // Writes are ordered rooms -> apartments -> neighborhoods, then a
    // refresh of all three, so the enrichment update always observes the
    // canonical apartment document.
    async fn write_claims(&self, doc: &ApartmentDocument) -> Result<()> {
        let room_claims: Vec<&EmbeddedClaim> = doc.claims.iter().filter(|c| c.claim.domain == Domain::Room).collect();
        let apartment_claims: Vec<&EmbeddedClaim> =
            doc.claims.iter().filter(|c| c.claim.domain == Domain::Apartment).collect();
        let neighborhood_claims: Vec<&EmbeddedClaim> =
            doc.claims.iter().filter(|c| c.claim.domain == Domain::Neighborhood).collect();

        for (idx, claim) in room_claims.iter().enumerate() {
            let doc_id = format!("{}_room_{}", doc.apartment_id, idx);
            let body = room_claim_doc(doc, claim, &doc_id);
            self.store.index_doc(ROOMS_INDEX, &doc_id, &body).await?;
        }

        for (idx, claim) in apartment_claims.iter().enumerate() {
            let doc_id = format!("{}_claim_{}", doc.apartment_id, idx);
            let body = apartment_claim_doc(doc, claim);
            self.store.index_doc(APARTMENTS_INDEX, &doc_id, &body).await?;
        }

        for (idx, claim) in neighborhood_claims.iter().enumerate() {
            let neighborhood_id = doc.neighborhood_id.as_deref().unwrap_or("unknown");
            let doc_id = format!("{}_claim_{}", neighborhood_id, idx);
            let body = neighborhood_claim_doc(doc, claim, neighborhood_id);
            self.store.index_doc(NEIGHBORHOODS_INDEX, &doc_id, &body).await?;
        }

        self.store.refresh(ROOMS_INDEX).await?;
        self.store.refresh(APARTMENTS_INDEX).await?;
        self.store.refresh(NEIGHBORHOODS_INDEX).await?;
        Ok(())
    }

    async fn enrich_apartment(&self, doc: &ApartmentDocument, description: &str, image_descriptions: &[String]) {
        let title_task = async {
            if doc.title.is_none() {
                Some(self.enrichment.generate_title(description, doc.address.as_deref()).await)
            } else {
                None
            }
        };
        let summary_task = self.enrichment.generate_property_summary(description, image_descriptions);
        let location_task = async {
            match (doc.location, doc.address.as_deref()) {
                (Some(location), Some(address)) => {
                    Some(self.enrichment.generate_location_summary(location, address).await)
                }
                _ => None,
            }
        };

        let (generated_title, property_summary, location_result) =
            tokio::join!(title_task, summary_task, location_task);

        let title = doc.title.clone().or(generated_title.filter(|t| !t.is_empty()));
        let (location_summary, widget_token) = match location_result {
            Some((summary, token)) => (Some(summary).filter(|s| !s.is_empty()), token),
            None => (None, None),
        };
        let property_summary = Some(property_summary).filter(|s| !s.is_empty());

        self.update_summaries(doc, title, property_summary, location_summary, widget_token).await;
    }

    async fn update_summaries(
        &self,
        doc: &ApartmentDocument,
        title: Option<String>,
        property_summary: Option<String>,
        location_summary: Option<String>,
        widget_token: Option<String>,
    ) {
        let has_apartment_claims = doc.claims.iter().any(|c| c.claim.domain == Domain::Apartment);
        if !has_apartment_claims {
            tracing::warn!(
                target: "indexer",
                apartment_id = %doc.apartment_id,
                "no apartment claims, skipping summary update"
            );
            return;
        }

        let mut patch = serde_json::Map::new();
        if let Some(title) = title {
            patch.insert("title".into(), json!(title));
        }
        if let Some(summary) = property_summary {
            patch.insert("property_summary".into(), json!(summary));
        }
        if let Some(summary) = location_summary {
            patch.insert("location_summary".into(), json!(summary));
        }
        if let Some(token) = widget_token {
            patch.insert("location_widget_token".into(), json!(token));
        }
        if patch.is_empty() {
            return;
        }

        let doc_id = format!("{}_claim_0", doc.apartment_id);
        if let Err(e) = self.store.update_doc(APARTMENTS_INDEX, &doc_id, &Value::Object(patch)).await {
            tracing::error!(target: "indexer", apartment_id = %doc.apartment_id, error = %e, "summary update failed");
        } else {
            tracing::info!(target: "indexer", apartment_id = %doc.apartment_id, "summaries updated");
        }
    }
}

fn build_summary(apartment_id: &str, claims: &[EmbeddedClaim]) -> IndexSummary {
    IndexSummary {
        status: "success".into(),
        apartment_id: apartment_id.to_string(),
        total_features: claims.len(),
        domain_breakdown: DomainBreakdown {
            neighborhood: claims.iter().filter(|c| c.claim.domain == Domain::Neighborhood).count(),
            apartment: claims.iter().filter(|c| c.claim.domain == Domain::Apartment).count(),
            room: claims.iter().filter(|c| c.claim.domain == Domain::Room).count(),
        },
    }
}

fn room_claim_doc(doc: &ApartmentDocument, claim: &EmbeddedClaim, room_id: &str) -> Value {
    let mut body = json!({
        "room_id": room_id,
        "apartment_id": doc.apartment_id,
        "room_type": claim.claim.room_type,
        "claim": claim.claim.claim,
        "claim_type": claim.claim.claim_type,
        "kind": claim.claim.kind,
        "from_claim": claim.claim.from_claim,
        "is_specific": claim.claim.is_specific,
        "negation": claim.claim.negation,
        "claim_vector": claim.embedding,
        "quantifiers": quantifiers_to_stored(&claim.claim.quantifiers),
    });
    if let Some(source) = &claim.claim.source {
        body["source"] = json!(source);
    }
    body
}

fn apartment_claim_doc(doc: &ApartmentDocument, claim: &EmbeddedClaim) -> Value {
    let mut body = json!({
        "apartment_id": doc.apartment_id,
        "title": doc.title,
        "neighborhood_id": doc.neighborhood_id,
        "address": doc.address,
        "claim": claim.claim.claim,
        "claim_type": claim.claim.claim_type,
        "kind": claim.claim.kind,
        "from_claim": claim.claim.from_claim,
        "is_specific": claim.claim.is_specific,
        "negation": claim.claim.negation,
        "claim_vector": claim.embedding,
        "quantifiers": quantifiers_to_stored(&claim.claim.quantifiers),
        "image_urls": doc.image_urls,
        "image_metadata": doc.image_metadata,
    });
    if let Some(source) = &claim.claim.source {
        body["source"] = json!(source);
    }
    if let Some(location) = &doc.location {
        body["apartment_location"] = geo_to_stored(location);
    }
    if let Some(metadata) = &claim.claim.grounding_metadata {
        body["grounding_metadata"] = grounding_metadata_doc(metadata);
    }
    if let Some(rent_price) = doc.rent_price {
        body["rent_price"] = json!(rent_price);
    }
    if !doc.availability_dates.is_empty() {
        body["availability_dates"] = json!(doc.availability_dates);
    }
    body
}

fn neighborhood_claim_doc(doc: &ApartmentDocument, claim: &EmbeddedClaim, neighborhood_id: &str) -> Value {
    let mut body = json!({
        "neighborhood_id": neighborhood_id,
        "apartment_id": doc.apartment_id,
        "claim": claim.claim.claim,
        "claim_type": claim.claim.claim_type,
        "kind": claim.claim.kind,
        "from_claim": claim.claim.from_claim,
        "negation": claim.claim.negation,
        "claim_vector": claim.embedding,
    });
    if let Some(source) = &claim.claim.source {
        body["source"] = json!(source);
    }
    body
}

// Only the fields the store mapping knows about; coordinates flip to the
// store's {lat, lon} convention.
fn grounding_metadata_doc(metadata: &GroundingMetadata) -> Value {
    let mut body = json!({
        "verified": metadata.verified,
        "source": metadata.source,
        "confidence": metadata.confidence,
    });
    if let Some(coordinates) = &metadata.coordinates {
        body["coordinates"] = geo_to_stored(coordinates);
    }
    if let Some(place_id) = &metadata.place_id {
        body["place_id"] = json!(place_id);
    }
    if let Some(distance) = metadata.exact_distance_meters {
        body["exact_distance_meters"] = json!(distance);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Claim, ClaimType};

    fn embedded(text: &str, domain: Domain) -> EmbeddedClaim {
        EmbeddedClaim {
            claim: Claim::new(text, ClaimType::Features, domain),
            embedding: vec![0.0; 4],
            quantified_claim: None,
        }
    }

    #[test]
    fn summary_breakdown_counts_by_domain() {
        let claims = vec![
            embedded("a", Domain::Apartment),
            embedded("b", Domain::Apartment),
            embedded("c", Domain::Room),
            embedded("d", Domain::Neighborhood),
        ];
        let summary = build_summary("apt-1", &claims);
        assert_eq!(summary.total_features, 4);
        assert_eq!(summary.domain_breakdown.apartment, 2);
        assert_eq!(summary.domain_breakdown.room, 1);
        assert_eq!(summary.domain_breakdown.neighborhood, 1);
        assert_eq!(
            summary.domain_breakdown.apartment + summary.domain_breakdown.room + summary.domain_breakdown.neighborhood,
            summary.total_features
        );
    }
}
