use listing_search_service::es::{
    geo_from_stored, geo_to_stored, mappings, quantifiers_from_stored, quantifiers_to_stored,
};
use listing_search_service::models::{
    AvailabilityFilter, GeoPoint, PriceFilter, Quantifier, QuantifierOp, QuantifierType, StructuredFilters,
};
use listing_search_service::search::filters::structured_filter_clauses;
use listing_search_service::search::searchers::{build_filter_clause, GeoFilter};
use serde_json::json;

#[test]
fn infinite_quantifier_bound_round_trips_through_sentinel() {
    let quantifiers = vec![Quantifier {
        qtype: QuantifierType::Count,
        noun: "bedroom".into(),
        vmin: 2.0,
        vmax: f64::INFINITY,
        op: QuantifierOp::Gte,
        unit: None,
    }];

    let stored = quantifiers_to_stored(&quantifiers);
    // The store never sees an IEEE infinity
    assert_eq!(stored[0]["vmax"], json!(999_999_999.0));
    assert_eq!(stored[0]["vmin"], json!(2.0));

    let restored = quantifiers_from_stored(Some(&stored));
    assert_eq!(restored.len(), 1);
    assert!(restored[0].vmax.is_infinite());
    assert_eq!(restored[0].vmin, 2.0);
}

#[test]
fn finite_quantifiers_round_trip_unchanged() {
    let quantifiers = vec![Quantifier {
        qtype: QuantifierType::Money,
        noun: "rent".into(),
        vmin: 4200.0,
        vmax: 4200.0,
        op: QuantifierOp::Equals,
        unit: Some("usd".into()),
    }];
    let restored = quantifiers_from_stored(Some(&quantifiers_to_stored(&quantifiers)));
    assert_eq!(restored, quantifiers);
}

#[test]
fn geo_points_store_as_lat_lon() {
    let point = GeoPoint { lat: 40.7149, lng: -73.9566 };
    let stored = geo_to_stored(&point);
    assert_eq!(stored, json!({ "lat": 40.7149, "lon": -73.9566 }));

    let read = geo_from_stored(&stored).unwrap();
    assert_eq!(read.lat, point.lat);
    assert_eq!(read.lng, point.lng);
}

#[test]
fn mappings_carry_configured_vector_dimensions() {
    for mapping in [
        mappings::rooms_mapping(3072),
        mappings::apartments_mapping(3072),
        mappings::neighborhoods_mapping(3072),
    ] {
        let vector = mapping.pointer("/mappings/properties/claim_vector").unwrap();
        assert_eq!(vector["dims"], json!(3072));
        assert_eq!(vector["similarity"], json!("cosine"));
    }
    let hnsw = mappings::rooms_mapping(8);
    assert_eq!(hnsw.pointer("/mappings/properties/claim_vector/index_options/m"), Some(&json!(16)));
    assert_eq!(
        hnsw.pointer("/mappings/properties/claim_vector/index_options/ef_construction"),
        Some(&json!(200))
    );
}

#[test]
fn apartments_mapping_has_structured_fields() {
    let mapping = mappings::apartments_mapping(8);
    assert_eq!(mapping.pointer("/mappings/properties/apartment_location/type"), Some(&json!("geo_point")));
    assert_eq!(mapping.pointer("/mappings/properties/rent_price/type"), Some(&json!("float")));
    assert_eq!(mapping.pointer("/mappings/properties/availability_dates/type"), Some(&json!("nested")));
    assert_eq!(mapping.pointer("/mappings/properties/quantifiers/type"), Some(&json!("nested")));
}

#[test]
fn rent_filter_builds_range_clause() {
    let filters = StructuredFilters {
        rent_price: Some(PriceFilter { min: Some(1600.0), max: Some(2000.0) }),
        availability_dates: None,
    };
    let clauses = structured_filter_clauses(&filters);
    assert_eq!(clauses.len(), 1);
    assert_eq!(clauses[0], json!({ "range": { "rent_price": { "gte": 1600.0, "lte": 2000.0 } } }));
}

#[test]
fn availability_filter_builds_nested_overlap_query() {
    let filters = StructuredFilters {
        rent_price: None,
        availability_dates: Some(AvailabilityFilter {
            start: Some("2025-11-01".into()),
            end: Some("2025-11-30".into()),
        }),
    };
    let clauses = structured_filter_clauses(&filters);
    assert_eq!(clauses.len(), 1);
    assert_eq!(clauses[0]["nested"]["path"], json!("availability_dates"));
    let musts = clauses[0].pointer("/nested/query/bool/must").unwrap().as_array().unwrap();
    assert_eq!(musts[0], json!({ "range": { "availability_dates.start": { "lte": "2025-11-30" } } }));
    assert_eq!(musts[1], json!({ "range": { "availability_dates.end": { "gte": "2025-11-01" } } }));
}

#[test]
fn open_ended_availability_uses_end_bound_only() {
    let filters = StructuredFilters {
        rent_price: None,
        availability_dates: Some(AvailabilityFilter { start: Some("2025-11-01".into()), end: None }),
    };
    let clauses = structured_filter_clauses(&filters);
    assert_eq!(
        clauses[0].pointer("/nested/query/range/availability_dates.end"),
        Some(&json!({ "gte": "2025-11-01" }))
    );
}

#[test]
fn single_structured_clause_is_unwrapped() {
    let filters = StructuredFilters {
        rent_price: Some(PriceFilter { min: None, max: Some(5000.0) }),
        availability_dates: None,
    };
    let clause = build_filter_clause(&[], &filters).unwrap();
    // One must-clause comes through bare, not wrapped in a bool
    assert!(clause.get("range").is_some(), "got: {}", clause);
}

#[test]
fn geo_filters_become_should_clauses_with_minimum_match() {
    let filters = StructuredFilters::default();
    let geo = vec![GeoFilter { coords: GeoPoint { lat: 40.7, lng: -73.95 }, radius_meters: 800 }];
    let clause = build_filter_clause(&geo, &filters).unwrap();
    assert_eq!(clause.pointer("/bool/minimum_should_match"), Some(&json!(1)));
    assert_eq!(
        clause.pointer("/bool/should/0/geo_distance/distance"),
        Some(&json!("800m"))
    );
    assert_eq!(
        clause.pointer("/bool/should/0/geo_distance/apartment_location"),
        Some(&json!({ "lat": 40.7, "lon": -73.95 }))
    );
}

#[test]
fn no_filters_builds_no_clause() {
    assert!(build_filter_clause(&[], &StructuredFilters::default()).is_none());
}
