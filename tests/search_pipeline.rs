mod common;

use std::sync::Arc;

use serde_json::json;

use listing_search_service::api::AppState;
use listing_search_service::services::grounding::GroundedResponse;

use common::{build_app_state, knn_hit, knn_response, FakeEmbedder, FakeGeocoder, FakeMapsModel, FakeModel, FakeStore};

fn empty_maps() -> Arc<FakeMapsModel> {
    Arc::new(FakeMapsModel {
        response: GroundedResponse { text: String::new(), sources: vec![], widget_token: None },
    })
}

fn state_with(store: Arc<FakeStore>, model: Arc<FakeModel>) -> AppState {
    build_app_state(
        store,
        model,
        Arc::new(FakeEmbedder::new(8)),
        Arc::new(FakeGeocoder::new(None)),
        empty_maps(),
    )
}

fn metadata_hit(apartment_id: &str, title: &str) -> serde_json::Value {
    knn_hit(
        1.0,
        json!({
            "apartment_id": apartment_id,
            "title": title,
            "address": "250 Bedford Ave",
            "neighborhood_id": "williamsburg",
            "image_urls": [],
            "rent_price": 4200.0
        }),
    )
}

#[tokio::test]
async fn search_returns_covered_apartment() {
    let store = Arc::new(FakeStore::new());
    store.set_knn_response(
        "apartments",
        knn_response(vec![knn_hit(
            0.9,
            json!({
                "apartment_id": "a1",
                "claim": "pets allowed",
                "kind": "base",
                "negation": false,
                "quantifiers": []
            }),
        )]),
    );
    store.set_metadata_response(knn_response(vec![metadata_hit("a1", "Spacious 2BR")]));

    let model = Arc::new(FakeModel::new(vec![
        (
            "Extract claims from:",
            json!({
                "claims": [
                    { "claim": "pet friendly", "claim_type": "policies", "domain": "apartment", "is_specific": false, "has_quantifiers": false, "negation": false }
                ]
            }),
        ),
        ("validating if query claims are compatible", json!({ "results": ["compatible"] })),
    ]));

    let state = state_with(store, model);
    let results = state.search.search("pet friendly apartment", 10, None, true, false).await.unwrap();

    assert_eq!(results.len(), 1);
    let r = &results[0];
    assert_eq!(r.apartment_id, "a1");
    assert_eq!(r.coverage_count, 1);
    assert_eq!(r.title.as_deref(), Some("Spacious 2BR"));
    assert!(r.final_score > 0.5, "single covered claim in one domain scores its similarity: {}", r.final_score);
    assert_eq!(r.matched_claims[0].matched_claim, "pets allowed");
}

#[tokio::test]
async fn dominant_anti_match_drops_apartment() {
    let store = Arc::new(FakeStore::new());
    // Query "no pets allowed" retrieves the anti variant of "pets allowed"
    // at 0.95 and a weak positive at 0.70
    store.set_knn_response(
        "apartments",
        knn_response(vec![
            knn_hit(
                0.95,
                json!({ "apartment_id": "a1", "claim": "no pets allowed", "kind": "anti", "negation": true, "quantifiers": [] }),
            ),
            knn_hit(
                0.70,
                json!({ "apartment_id": "a1", "claim": "pets allowed", "kind": "base", "negation": false, "quantifiers": [] }),
            ),
        ]),
    );
    store.set_metadata_response(knn_response(vec![metadata_hit("a1", "Spacious 2BR")]));

    let model = Arc::new(FakeModel::new(vec![(
        "Extract claims from:",
        json!({
            "claims": [
                { "claim": "no pets allowed", "claim_type": "policies", "domain": "apartment", "is_specific": false, "has_quantifiers": false, "negation": true }
            ]
        }),
    )]));

    let state = state_with(store, model);
    let results = state.search.search("no pets allowed", 10, None, false, false).await.unwrap();
    assert!(results.is_empty(), "anti-dominated apartment must be dropped");
}

#[tokio::test]
async fn anti_match_below_threshold_does_not_drop() {
    let store = Arc::new(FakeStore::new());
    store.set_knn_response(
        "apartments",
        knn_response(vec![
            knn_hit(
                0.89,
                json!({ "apartment_id": "a1", "claim": "no pets allowed", "kind": "anti", "negation": true, "quantifiers": [] }),
            ),
            knn_hit(
                0.85,
                json!({ "apartment_id": "a1", "claim": "pet-free building", "kind": "base", "negation": true, "quantifiers": [] }),
            ),
        ]),
    );
    store.set_metadata_response(knn_response(vec![metadata_hit("a1", "Spacious 2BR")]));

    let model = Arc::new(FakeModel::new(vec![(
        "Extract claims from:",
        json!({
            "claims": [
                { "claim": "no pets allowed", "claim_type": "policies", "domain": "apartment", "is_specific": false, "has_quantifiers": false, "negation": true }
            ]
        }),
    )]));

    let state = state_with(store, model);
    let results = state.search.search("no pets allowed", 10, None, false, false).await.unwrap();
    assert_eq!(results.len(), 1, "0.89 anti score must never drop a listing");
    assert_eq!(results[0].matched_claims[0].matched_claim, "pet-free building");
}

#[tokio::test]
async fn incompatible_match_is_rejected_and_coverage_filters_apartment() {
    let store = Arc::new(FakeStore::new());
    store.set_knn_response(
        "rooms",
        knn_response(vec![knn_hit(
            0.92,
            json!({
                "apartment_id": "a2",
                "room_id": "a2_room_0",
                "claim": "gas stove",
                "kind": "base",
                "room_type": "kitchen",
                "negation": false,
                "quantifiers": []
            }),
        )]),
    );
    store.set_metadata_response(knn_response(vec![metadata_hit("a2", "Kitchen Unit")]));

    let model = Arc::new(FakeModel::new(vec![
        (
            "Extract claims from:",
            json!({
                "claims": [
                    { "claim": "electric stove", "claim_type": "amenities", "domain": "room", "room_type": "kitchen", "is_specific": false, "has_quantifiers": false, "negation": false }
                ]
            }),
        ),
        ("validating if query claims are compatible", json!({ "results": ["incompatible"] })),
    ]));

    let state = state_with(store, model);
    let results = state.search.search("electric stove", 10, None, true, false).await.unwrap();
    assert!(results.is_empty(), "sole incompatible match leaves zero coverage");
}

#[tokio::test]
async fn redundant_pricing_claim_uses_structured_path_only() {
    let store = Arc::new(FakeStore::new());
    // Structured-only resolution hits the apartments index with a bool query
    store.push_query_response(knn_response(vec![knn_hit(1.0, json!({ "apartment_id": "a9" }))]));

    let model = Arc::new(FakeModel::new(vec![
        (
            "Extract claims from:",
            json!({
                "claims": [
                    { "claim": "rent under $5000", "claim_type": "pricing", "domain": "apartment", "is_specific": false, "has_quantifiers": true, "negation": false }
                ]
            }),
        ),
        ("Extract structured search filters", json!({ "rent_price": { "max": 5000.0 } })),
    ]));

    let state = state_with(store.clone(), model);
    let results = state.search.search("under $5000", 10, None, false, false).await.unwrap();

    // The only claim was redundant with the price filter: no vector query
    // ran, candidates resolved by filter alone, and zero coverage filters
    // them from the final list.
    assert!(results.is_empty());
    assert!(store.knn_responses.lock().unwrap().is_empty());
    assert!(store.query_responses.lock().unwrap().is_empty(), "structured-only query consumed");
}

#[tokio::test]
async fn quantifier_gate_drops_mismatched_bedroom_count() {
    let store = Arc::new(FakeStore::new());
    store.set_knn_response(
        "apartments",
        knn_response(vec![
            knn_hit(
                0.95,
                json!({
                    "apartment_id": "a1",
                    "claim": "2 bedroom apartment",
                    "kind": "base",
                    "negation": false,
                    "quantifiers": [ { "qtype": "count", "noun": "bedroom", "vmin": 2.0, "vmax": 2.0, "op": "EQUALS" } ]
                }),
            ),
            knn_hit(
                0.94,
                json!({
                    "apartment_id": "a2",
                    "claim": "1 bedroom apartment",
                    "kind": "base",
                    "negation": false,
                    "quantifiers": [ { "qtype": "count", "noun": "bedroom", "vmin": 1.0, "vmax": 1.0, "op": "EQUALS" } ]
                }),
            ),
        ]),
    );
    store.set_metadata_response(knn_response(vec![metadata_hit("a1", "Two Bed")]));

    let model = Arc::new(FakeModel::new(vec![
        (
            "Extract claims from:",
            json!({
                "claims": [
                    { "claim": "2 bedroom", "claim_type": "size", "domain": "apartment", "is_specific": false, "has_quantifiers": true, "negation": false }
                ]
            }),
        ),
        (
            "claim: \"2 bedroom\"",
            json!({
                "quantified_claim": "2 bedroom",
                "quantifiers": [ { "qtype": "count", "noun": "bedroom", "vmin": 2.0, "vmax": 2.0, "op": "EQUALS" } ]
            }),
        ),
    ]));

    let state = state_with(store, model);
    let results = state.search.search("2 bedroom", 10, None, false, false).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].apartment_id, "a1");
}
