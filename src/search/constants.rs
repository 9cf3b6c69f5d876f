use crate::models::{ClaimType, Domain};

/// Vector-similarity acceptance threshold per claim type. A match below the
/// threshold for its type is rejected outright at scoring time.
pub fn claim_type_threshold(claim_type: ClaimType) -> f64 {
    match claim_type {
        ClaimType::Location => 0.92,
        ClaimType::Size => 0.80,
        ClaimType::Features => 0.75,
        ClaimType::Pricing => 0.85,
        ClaimType::Amenities => 0.70,
        ClaimType::Condition => 0.75,
        ClaimType::Accessibility => 0.75,
        ClaimType::Policies => 0.80,
        ClaimType::Utilities => 0.75,
        ClaimType::Transport => 0.75,
        ClaimType::Neighborhood => 0.73,
        ClaimType::Restrictions => 0.80,
    }
}

// Specific named locations are held to a stricter bar than the per-type one.
pub const SPECIFIC_LOCATION_THRESHOLD: f64 = 0.90;

pub fn domain_weight(domain: Domain) -> f64 {
    match domain {
        Domain::Room => 0.35,
        Domain::Apartment => 0.40,
        Domain::Neighborhood => 0.25,
    }
}
