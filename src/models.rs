use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// Stores reject IEEE infinities, so unbounded quantifier limits cross the
// store boundary as this sentinel and are restored on read.
pub const INFINITE_BOUND_SENTINEL: f64 = 999_999_999.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Location,
    Features,
    Amenities,
    Size,
    Condition,
    Pricing,
    Accessibility,
    Policies,
    Utilities,
    Transport,
    Neighborhood,
    Restrictions,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::Location => "location",
            ClaimType::Features => "features",
            ClaimType::Amenities => "amenities",
            ClaimType::Size => "size",
            ClaimType::Condition => "condition",
            ClaimType::Pricing => "pricing",
            ClaimType::Accessibility => "accessibility",
            ClaimType::Policies => "policies",
            ClaimType::Utilities => "utilities",
            ClaimType::Transport => "transport",
            ClaimType::Neighborhood => "neighborhood",
            ClaimType::Restrictions => "restrictions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Neighborhood,
    Apartment,
    Room,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Neighborhood => "neighborhood",
            Domain::Apartment => "apartment",
            Domain::Room => "room",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimKind {
    Base,
    Derived,
    Anti,
    Verified,
}

impl ClaimKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimKind::Base => "base",
            ClaimKind::Derived => "derived",
            ClaimKind::Anti => "anti",
            ClaimKind::Verified => "verified",
        }
    }
}

impl Default for ClaimKind {
    fn default() -> Self {
        ClaimKind::Base
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuantifierOp {
    Equals,
    Gt,
    Gte,
    Lt,
    Lte,
    Approx,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantifierType {
    Money,
    Area,
    Count,
    Distance,
    Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantifier {
    pub qtype: QuantifierType,
    pub noun: String,
    pub vmin: f64,
    pub vmax: f64,
    pub op: QuantifierOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSource {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Text,
    Image,
}

impl ClaimSource {
    pub fn text() -> Self {
        Self { source_type: SourceType::Text, image_url: None, image_index: None }
    }

    pub fn image(url: Option<String>, index: usize) -> Self {
        Self { source_type: SourceType::Image, image_url: url, image_index: Some(index) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroundingMetadata {
    pub verified: bool,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_distance_meters: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub walking_time_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_radius_meters: Option<i64>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supporting_evidence: Option<String>,
}

fn default_weight() -> f64 {
    0.75
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub claim: String,
    pub claim_type: ClaimType,
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
    #[serde(default)]
    pub is_specific: bool,
    #[serde(default)]
    pub has_quantifiers: bool,
    #[serde(default)]
    pub quantifiers: Vec<Quantifier>,
    #[serde(default)]
    pub kind: ClaimKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_claim: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub negation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_metadata: Option<GroundingMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ClaimSource>,
}

impl Claim {
    pub fn new(text: impl Into<String>, claim_type: ClaimType, domain: Domain) -> Self {
        Self {
            claim: text.into(),
            claim_type,
            domain,
            room_type: None,
            is_specific: false,
            has_quantifiers: false,
            quantifiers: Vec::new(),
            kind: ClaimKind::Base,
            from_claim: None,
            weight: default_weight(),
            negation: false,
            grounding_metadata: None,
            source: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedClaim {
    #[serde(flatten)]
    pub claim: Claim,
    pub embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantified_claim: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRange {
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredProperty {
    #[serde(default)]
    pub rent_price: Option<f64>,
    #[serde(default)]
    pub availability_dates: Vec<AvailabilityRange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceFilter {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailabilityFilter {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rent_price: Option<PriceFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_dates: Option<AvailabilityFilter>,
}

impl StructuredFilters {
    pub fn is_empty(&self) -> bool {
        self.rent_price.is_none() && self.availability_dates.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub url: String,
    #[serde(rename = "type")]
    pub image_type: String,
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApartmentDocument {
    pub apartment_id: String,
    pub title: Option<String>,
    pub neighborhood_id: Option<String>,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
    pub raw_description: String,
    pub image_urls: Vec<String>,
    pub image_metadata: Vec<ImageMetadata>,
    pub claims: Vec<EmbeddedClaim>,
    pub rent_price: Option<f64>,
    pub availability_dates: Vec<AvailabilityRange>,
    pub property_summary: Option<String>,
    pub location_summary: Option<String>,
    pub location_widget_token: Option<String>,
}

/// A single ANN hit for one query claim, tagged with the claim it answered.
#[derive(Debug, Clone)]
pub struct ClaimMatch {
    pub search_claim: String,
    pub search_claim_obj: Claim,
    pub matched_claim: String,
    pub score: f64,
    pub kind: ClaimKind,
    pub claim_type: ClaimType,
    pub quantifiers: Vec<Quantifier>,
    pub matched_negation: bool,
}

/// Per-candidate match lists keyed by apartment or neighborhood id. BTreeMap
/// keeps iteration deterministic so ranking ties stay stable.
pub type MatchMap = BTreeMap<String, Vec<ClaimMatch>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compatibility {
    Compatible,
    Incompatible,
    Partial,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchedClaimDetail {
    pub query_claim: String,
    pub matched_claim: String,
    pub similarity: f64,
    pub domain: Domain,
    pub kind: ClaimKind,
    pub room_type: Option<String>,
    pub query_quantifiers: Vec<Quantifier>,
    pub matched_quantifiers: Vec<Quantifier>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub apartment_id: String,
    pub title: Option<String>,
    pub address: Option<String>,
    pub final_score: f64,
    pub coverage_count: usize,
    pub coverage_ratio: f64,
    pub matched_claims: Vec<MatchedClaimDetail>,
    pub domain_scores: BTreeMap<String, f64>,
    pub image_urls: Vec<String>,
    pub image_metadata: Vec<ImageMetadata>,
    pub rent_price: Option<f64>,
    pub availability_dates: Vec<AvailabilityRange>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DomainBreakdown {
    pub neighborhood: usize,
    pub apartment: usize,
    pub room: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub status: String,
    pub apartment_id: String,
    pub total_features: usize,
    pub domain_breakdown: DomainBreakdown,
}

impl IndexSummary {
    pub fn empty(apartment_id: &str) -> Self {
        Self {
            status: "success".into(),
            apartment_id: apartment_id.to_string(),
            total_features: 0,
            domain_breakdown: DomainBreakdown::default(),
        }
    }
}

// HTTP bodies

#[derive(Debug, Clone, Deserialize)]
pub struct IndexRequest {
    pub apartment_id: String,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub neighborhood_id: Option<String>,
    #[serde(default)]
    pub image_urls: Option<Vec<String>>,
    #[serde(default)]
    pub image_metadata: Option<Vec<ImageMetadata>>,
    #[serde(default)]
    pub rent_price: Option<f64>,
    #[serde(default)]
    pub availability_dates: Option<Vec<AvailabilityRange>>,
    #[serde(default)]
    pub precomputed_image_descriptions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchIndexRequest {
    pub apartments: Vec<IndexRequest>,
}

fn default_top_k() -> usize {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub user_location: Option<GeoPoint>,
    #[serde(default = "default_true")]
    pub verify_claims: bool,
    #[serde(default)]
    pub double_check_matches: bool,
}
