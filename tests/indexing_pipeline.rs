mod common;

use std::sync::Arc;

use serde_json::json;

use listing_search_service::models::{GeoPoint, IndexRequest};
use listing_search_service::services::grounding::{GroundedResponse, GroundedSource};

use common::{build_app_state, FakeEmbedder, FakeGeocoder, FakeMapsModel, FakeModel, FakeStore};

const LISTING_TEXT: &str =
    "Spacious 2 bedroom in Williamsburg, 12 month minimum lease, $4200/month, pets allowed, gas stove";

fn index_request(apartment_id: &str) -> IndexRequest {
    IndexRequest {
        apartment_id: apartment_id.to_string(),
        document: Some(LISTING_TEXT.to_string()),
        title: Some("Spacious Williamsburg 2BR".to_string()),
        address: None,
        neighborhood_id: Some("williamsburg".to_string()),
        image_urls: None,
        image_metadata: None,
        rent_price: Some(4200.0),
        availability_dates: Some(vec![]),
        precomputed_image_descriptions: None,
    }
}

fn listing_model() -> Arc<FakeModel> {
    Arc::new(FakeModel::new(vec![
        (
            "Extract claims from:",
            json!({
                "claims": [
                    { "claim": "spacious 2 bedroom", "claim_type": "size", "domain": "apartment", "is_specific": false, "has_quantifiers": true, "negation": false },
                    { "claim": "located in Williamsburg", "claim_type": "location", "domain": "neighborhood", "is_specific": true, "has_quantifiers": false, "negation": false },
                    { "claim": "pets allowed", "claim_type": "policies", "domain": "apartment", "is_specific": false, "has_quantifiers": false, "negation": false },
                    { "claim": "12 month minimum lease", "claim_type": "restrictions", "domain": "apartment", "is_specific": false, "has_quantifiers": true, "negation": false },
                    { "claim": "rent $4200/month", "claim_type": "pricing", "domain": "apartment", "is_specific": false, "has_quantifiers": true, "negation": false },
                    { "claim": "gas stove", "claim_type": "amenities", "domain": "room", "room_type": "kitchen", "is_specific": false, "has_quantifiers": false, "negation": false }
                ]
            }),
        ),
        (
            "Base Claim: \"pets allowed\"",
            json!({ "derived_claims": ["pet-friendly"], "anti_claims": ["no pets allowed"] }),
        ),
        (
            "claim: \"spacious 2 bedroom\"",
            json!({
                "quantified_claim": "spacious 2 bedroom",
                "quantifiers": [ { "qtype": "count", "noun": "bedroom", "vmin": 2.0, "vmax": 2.0, "op": "EQUALS" } ]
            }),
        ),
        (
            "claim: \"12 month minimum lease\"",
            json!({
                "quantified_claim": "12 month minimum lease",
                "quantifiers": [ { "qtype": "duration", "noun": "lease", "vmin": 12.0, "vmax": null, "op": "GTE", "unit": "months" } ]
            }),
        ),
        (
            "claim: \"rent $4200/month\"",
            json!({
                "quantified_claim": "rent VAR_1/month",
                "quantifiers": [ { "qtype": "money", "noun": "rent", "vmin": 4200.0, "vmax": 4200.0, "op": "EQUALS", "unit": "usd" } ]
            }),
        ),
    ]))
}

fn empty_maps() -> Arc<FakeMapsModel> {
    Arc::new(FakeMapsModel {
        response: GroundedResponse { text: String::new(), sources: vec![], widget_token: None },
    })
}

#[tokio::test]
async fn indexing_partitions_claims_by_domain_with_deterministic_ids() {
    let store = Arc::new(FakeStore::new());
    let state = build_app_state(
        store.clone(),
        listing_model(),
        Arc::new(FakeEmbedder::new(8)),
        Arc::new(FakeGeocoder::new(None)),
        empty_maps(),
    );

    let summary = state.indexer.process(index_request("a1")).await.unwrap();

    assert_eq!(summary.status, "success");
    // 6 base + 1 derived + 1 anti
    assert_eq!(summary.total_features, 8);
    assert!(summary.domain_breakdown.apartment >= 3);
    assert_eq!(
        summary.domain_breakdown.apartment + summary.domain_breakdown.neighborhood + summary.domain_breakdown.room,
        summary.total_features
    );

    let apartments = store.docs_in_index("apartments");
    let rooms = store.docs_in_index("rooms");
    let neighborhoods = store.docs_in_index("neighborhoods");

    assert_eq!(apartments.len(), summary.domain_breakdown.apartment);
    assert_eq!(rooms.len(), summary.domain_breakdown.room);
    assert_eq!(neighborhoods.len(), summary.domain_breakdown.neighborhood);

    // Deterministic doc-id schemes
    assert!(apartments.iter().any(|(id, _)| id == "a1_claim_0"));
    assert!(rooms.iter().any(|(id, _)| id == "a1_room_0"));
    assert!(neighborhoods.iter().any(|(id, _)| id == "williamsburg_claim_0"));

    // Room docs always carry their room type
    for (_, doc) in &rooms {
        assert_eq!(doc.get("room_type"), Some(&json!("kitchen")));
    }

    // All three indices refreshed after the writes
    let refreshed = store.refreshed.lock().unwrap().clone();
    assert!(refreshed.contains(&"rooms".to_string()));
    assert!(refreshed.contains(&"apartments".to_string()));
    assert!(refreshed.contains(&"neighborhoods".to_string()));
}

#[tokio::test]
async fn expansion_produces_anti_claim_with_flipped_negation() {
    let store = Arc::new(FakeStore::new());
    let state = build_app_state(
        store.clone(),
        listing_model(),
        Arc::new(FakeEmbedder::new(8)),
        Arc::new(FakeGeocoder::new(None)),
        empty_maps(),
    );
    state.indexer.process(index_request("a1")).await.unwrap();

    let apartments = store.docs_in_index("apartments");
    let anti = apartments
        .iter()
        .find(|(_, doc)| doc.get("kind") == Some(&json!("anti")))
        .map(|(_, doc)| doc.clone())
        .expect("anti claim indexed");

    assert_eq!(anti.get("claim"), Some(&json!("no pets allowed")));
    assert_eq!(anti.get("negation"), Some(&json!(true)));
    assert_eq!(anti.get("from_claim"), Some(&json!("pets allowed")));

    let derived = apartments
        .iter()
        .find(|(_, doc)| doc.get("kind") == Some(&json!("derived")))
        .map(|(_, doc)| doc.clone())
        .expect("derived claim indexed");
    assert_eq!(derived.get("negation"), Some(&json!(false)));
}

#[tokio::test]
async fn quantifiers_store_with_sentinel_for_infinite_bounds() {
    let store = Arc::new(FakeStore::new());
    let state = build_app_state(
        store.clone(),
        listing_model(),
        Arc::new(FakeEmbedder::new(8)),
        Arc::new(FakeGeocoder::new(None)),
        empty_maps(),
    );
    state.indexer.process(index_request("a1")).await.unwrap();

    let apartments = store.docs_in_index("apartments");
    let lease = apartments
        .iter()
        .find(|(_, doc)| doc.get("claim") == Some(&json!("12 month minimum lease")))
        .map(|(_, doc)| doc.clone())
        .expect("lease claim indexed");
    let q = &lease["quantifiers"][0];
    assert_eq!(q["vmin"], json!(12.0));
    assert_eq!(q["vmax"], json!(999_999_999.0));
    assert_eq!(q["op"], json!("GTE"));

    let pricing = apartments
        .iter()
        .find(|(_, doc)| doc.get("claim") == Some(&json!("rent VAR_1/month")))
        .map(|(_, doc)| doc.clone())
        .expect("templatized pricing claim indexed");
    let q = &pricing["quantifiers"][0];
    assert_eq!(q["vmin"], json!(4200.0));
    assert_eq!(q["unit"], json!("usd"));
}

#[tokio::test]
async fn enrichment_patches_canonical_claim_document() {
    let store = Arc::new(FakeStore::new());
    let state = build_app_state(
        store.clone(),
        listing_model(),
        Arc::new(FakeEmbedder::new(8)),
        Arc::new(FakeGeocoder::new(None)),
        empty_maps(),
    );
    state.indexer.process(index_request("a1")).await.unwrap();

    let updates = store.updates.lock().unwrap().clone();
    assert_eq!(updates.len(), 1);
    let (index, id, patch) = &updates[0];
    assert_eq!(index, "apartments");
    assert_eq!(id, "a1_claim_0");
    assert_eq!(patch.get("property_summary"), Some(&json!("generated text")));
}

#[tokio::test]
async fn empty_extraction_returns_empty_success() {
    let store = Arc::new(FakeStore::new());
    // Model with no rules extracts zero claims from everything
    let state = build_app_state(
        store.clone(),
        Arc::new(FakeModel::empty()),
        Arc::new(FakeEmbedder::new(8)),
        Arc::new(FakeGeocoder::new(None)),
        empty_maps(),
    );

    let summary = state.indexer.process(index_request("a2")).await.unwrap();
    assert_eq!(summary.status, "success");
    assert_eq!(summary.total_features, 0);
    assert!(store.docs_in_index("apartments").is_empty());
    assert!(store.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn geocoded_listing_grounds_specific_claims_and_stores_location() {
    let store = Arc::new(FakeStore::new());
    let maps = Arc::new(FakeMapsModel {
        response: GroundedResponse {
            text: "The Bedford Avenue station is about 400 meters away, a five minute walk.".into(),
            sources: vec![GroundedSource {
                title: "Bedford Avenue Station".into(),
                uri: "https://maps.example/bedford".into(),
                place_id: Some("place-123".into()),
            }],
            widget_token: Some("widget-token".into()),
        },
    });

    let model = Arc::new(FakeModel::new(vec![
        (
            "Extract claims from:",
            json!({
                "claims": [
                    { "claim": "close to the Bedford Avenue subway station", "claim_type": "transport", "domain": "apartment", "is_specific": true, "has_quantifiers": false, "negation": false },
                    { "claim": "pets allowed", "claim_type": "policies", "domain": "apartment", "is_specific": false, "has_quantifiers": false, "negation": false }
                ]
            }),
        ),
        (
            "Extract precise structured data",
            json!({
                "verifications": [{
                    "verified_claim_text": "400 meters to Bedford Avenue Station",
                    "place_name": "Bedford Avenue Station",
                    "distance_meters": 400,
                    "walking_minutes": 5,
                    "coordinates": { "lat": 40.7149, "lng": -73.9566 },
                    "noun": "subway",
                    "recommended_radius_meters": 600
                }]
            }),
        ),
    ]));

    let mut request = index_request("a3");
    request.address = Some("250 Bedford Ave, Brooklyn, NY".into());

    let state = build_app_state(
        store.clone(),
        model,
        Arc::new(FakeEmbedder::new(8)),
        Arc::new(FakeGeocoder::new(Some(GeoPoint { lat: 40.7149, lng: -73.9566 }))),
        maps,
    );
    state.indexer.process(request).await.unwrap();

    let apartments = store.docs_in_index("apartments");
    let verified = apartments
        .iter()
        .find(|(_, doc)| doc.get("kind") == Some(&json!("verified")))
        .map(|(_, doc)| doc.clone())
        .expect("verified claim indexed");

    assert_eq!(
        verified.pointer("/grounding_metadata/exact_distance_meters"),
        Some(&json!(400))
    );
    assert_eq!(verified.pointer("/grounding_metadata/place_id"), Some(&json!("place-123")));
    // Synthesized distance quantifier
    assert_eq!(verified["quantifiers"][0]["qtype"], json!("distance"));
    assert_eq!(verified["quantifiers"][0]["op"], json!("APPROX"));
    assert_eq!(verified["quantifiers"][0]["vmin"], json!(400.0));

    // Location persisted with the store's {lat, lon} keys
    for (_, doc) in &apartments {
        assert_eq!(doc.pointer("/apartment_location/lat"), Some(&json!(40.7149)));
        assert_eq!(doc.pointer("/apartment_location/lon"), Some(&json!(-73.9566)));
        assert!(doc.pointer("/apartment_location/lng").is_none());
    }
}
