use serde_json::{json, Value};

fn claim_vector(dims: usize) -> Value {
    json!({
        "type": "dense_vector",
        "dims": dims,
        "index": true,
        "similarity": "cosine",
        "index_options": { "type": "hnsw", "m": 16, "ef_construction": 200 }
    })
}

fn quantifiers_field() -> Value {
    json!({
        "type": "nested",
        "properties": {
            "qtype": { "type": "keyword" },
            "noun": { "type": "keyword" },
            "vmin": { "type": "float" },
            "vmax": { "type": "float" },
            "op": { "type": "keyword" },
            "unit": { "type": "keyword" }
        }
    })
}

fn source_field() -> Value {
    json!({
        "type": "object",
        "properties": {
            "type": { "type": "keyword" },
            "image_url": { "type": "keyword" },
            "image_index": { "type": "integer" }
        }
    })
}

pub fn rooms_mapping(dims: usize) -> Value {
    json!({
        "mappings": {
            "properties": {
                "room_id": { "type": "keyword" },
                "apartment_id": { "type": "keyword" },
                "room_type": { "type": "keyword" },
                "claim": { "type": "text" },
                "claim_type": { "type": "keyword" },
                "kind": { "type": "keyword" },
                "from_claim": { "type": "text" },
                "is_specific": { "type": "boolean" },
                "negation": { "type": "boolean" },
                "claim_vector": claim_vector(dims),
                "quantifiers": quantifiers_field(),
                "source": source_field()
            }
        }
    })
}

pub fn apartments_mapping(dims: usize) -> Value {
    json!({
        "mappings": {
            "properties": {
                "apartment_id": { "type": "keyword" },
                "title": { "type": "text" },
                "neighborhood_id": { "type": "keyword" },
                "address": { "type": "text" },
                "apartment_location": { "type": "geo_point" },
                "claim": { "type": "text" },
                "claim_type": { "type": "keyword" },
                "kind": { "type": "keyword" },
                "from_claim": { "type": "text" },
                "is_specific": { "type": "boolean" },
                "negation": { "type": "boolean" },
                "claim_vector": claim_vector(dims),
                "quantifiers": quantifiers_field(),
                "grounding_metadata": {
                    "type": "object",
                    "properties": {
                        "verified": { "type": "boolean" },
                        "source": { "type": "keyword" },
                        "coordinates": { "type": "geo_point" },
                        "place_id": { "type": "keyword" },
                        "exact_distance_meters": { "type": "integer" },
                        "confidence": { "type": "float" }
                    }
                },
                "source": source_field(),
                "image_urls": { "type": "keyword" },
                "image_metadata": {
                    "type": "nested",
                    "properties": {
                        "url": { "type": "keyword" },
                        "type": { "type": "keyword" },
                        "index": { "type": "integer" },
                        "prompt": { "type": "text" },
                        "camera": { "type": "keyword" }
                    }
                },
                "rent_price": { "type": "float" },
                "availability_dates": {
                    "type": "nested",
                    "properties": {
                        "start": { "type": "date", "format": "yyyy-MM-dd" },
                        "end": { "type": "date", "format": "yyyy-MM-dd" }
                    }
                },
                "property_summary": { "type": "text" },
                "location_summary": { "type": "text" },
                "location_widget_token": { "type": "keyword" }
            }
        }
    })
}

pub fn neighborhoods_mapping(dims: usize) -> Value {
    json!({
        "mappings": {
            "properties": {
                "neighborhood_id": { "type": "keyword" },
                "neighborhood_name": { "type": "text" },
                "neighborhood_boundary": { "type": "geo_shape" },
                "center_point": { "type": "geo_point" },
                "apartment_id": { "type": "keyword" },
                "claim": { "type": "text" },
                "claim_type": { "type": "keyword" },
                "kind": { "type": "keyword" },
                "from_claim": { "type": "text" },
                "negation": { "type": "boolean" },
                "claim_vector": claim_vector(dims),
                "source": source_field()
            }
        }
    })
}
