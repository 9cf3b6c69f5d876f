use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{Result, ServiceError};
use crate::es::{quantifiers_from_stored, DocumentStore, APARTMENTS_INDEX, NEIGHBORHOODS_INDEX, ROOMS_INDEX};

/// Listing-level reads and deletes over the three claim indices.
pub struct CrudService {
    store: Arc<dyn DocumentStore>,
}

impl CrudService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn setup_indices(&self) -> Result<Value> {
        self.store.create_indices().await?;
        Ok(json!({
            "status": "success",
            "message": "indices created",
            "indices": {
                "rooms": ROOMS_INDEX,
                "apartments": APARTMENTS_INDEX,
                "neighborhoods": NEIGHBORHOODS_INDEX
            }
        }))
    }

    /// One row per apartment via a terms aggregation collapsed to the latest
    /// document, with a per-apartment claim count. Pagination happens over
    /// the aggregated rows.
    pub async fn list_apartments(&self, page: usize, page_size: usize, has_images: bool) -> Result<Value> {
        let query = if has_images {
            json!({
                "bool": {
                    "must": [
                        { "exists": { "field": "image_urls" } },
                        { "script": { "script": "doc['image_urls'].size() > 0" } }
                    ]
                }
            })
        } else {
            json!({ "match_all": {} })
        };

        let body = json!({
            "query": query,
            "size": 0,
            "aggs": {
                "unique_apartments": {
                    "terms": { "field": "apartment_id", "size": 10000, "order": { "_key": "asc" } },
                    "aggs": {
                        "latest_doc": {
                            "top_hits": {
                                "size": 1,
                                "_source": [
                                    "apartment_id", "title", "address", "neighborhood_id",
                                    "apartment_location", "image_urls", "image_metadata",
                                    "property_summary", "location_summary", "location_widget_token",
                                    "rent_price", "availability_dates"
                                ]
                            }
                        },
                        "claim_count": { "value_count": { "field": "apartment_id" } }
                    }
                }
            }
        });

        let response = self.store.search(APARTMENTS_INDEX, &body).await?;
        let buckets = response
            .pointer("/aggregations/unique_apartments/buckets")
            .and_then(|b| b.as_array())
            .cloned()
            .unwrap_or_default();

        let mut apartments = Vec::with_capacity(buckets.len());
        for bucket in &buckets {
            let Some(doc) = bucket.pointer("/latest_doc/hits/hits/0/_source") else {
                continue;
            };
            apartments.push(json!({
                "apartment_id": doc.get("apartment_id"),
                "title": doc.get("title"),
                "address": doc.get("address"),
                "neighborhood_id": doc.get("neighborhood_id"),
                "location": doc.get("apartment_location"),
                "image_urls": doc.get("image_urls").cloned().unwrap_or_else(|| json!([])),
                "image_metadata": doc.get("image_metadata").cloned().unwrap_or_else(|| json!([])),
                "claim_count": bucket.pointer("/claim_count/value"),
                "rent_price": doc.get("rent_price"),
                "availability_dates": doc.get("availability_dates").cloned().unwrap_or_else(|| json!([])),
                "property_summary": doc.get("property_summary"),
                "location_summary": doc.get("location_summary"),
                "location_widget_token": doc.get("location_widget_token")
            }));
        }

        let total = apartments.len();
        let offset = (page - 1) * page_size;
        let page_items: Vec<Value> = apartments.into_iter().skip(offset).take(page_size).collect();

        Ok(json!({
            "apartments": page_items,
            "pagination": {
                "page": page,
                "page_size": page_size,
                "total": total,
                "total_pages": total.div_ceil(page_size)
            }
        }))
    }

    pub async fn get_apartment(&self, apartment_id: &str) -> Result<Value> {
        let apartment_hits = self
            .search_claims(APARTMENTS_INDEX, apartment_id, 100)
            .await?;
        if apartment_hits.is_empty() {
            return Err(ServiceError::NotFound(format!("apartment {} not found", apartment_id)));
        }

        // Summary fields live on the canonical first claim document
        let summary_doc = self
            .store
            .get_doc(APARTMENTS_INDEX, &format!("{}_claim_0", apartment_id))
            .await
            .unwrap_or(None);
        let summary_field = |field: &str| -> Value {
            summary_doc
                .as_ref()
                .and_then(|d| d.get(field))
                .cloned()
                .unwrap_or(Value::Null)
        };

        let mut claims: Vec<Value> = Vec::new();
        let mut location = Value::Null;
        let mut address = Value::Null;
        let mut neighborhood_id = Value::Null;
        let mut image_urls = json!([]);
        let mut image_metadata = json!([]);
        let mut rent_price = Value::Null;
        let mut availability_dates = json!([]);

        for source in &apartment_hits {
            claims.push(claim_view(source, "apartment"));
            if location.is_null() {
                location = source.get("apartment_location").cloned().unwrap_or(Value::Null);
            }
            if address.is_null() {
                address = source.get("address").cloned().unwrap_or(Value::Null);
            }
            if neighborhood_id.is_null() {
                neighborhood_id = source.get("neighborhood_id").cloned().unwrap_or(Value::Null);
            }
            if image_urls.as_array().map(|a| a.is_empty()).unwrap_or(true) {
                if let Some(urls) = source.get("image_urls") {
                    image_urls = urls.clone();
                }
            }
            if image_metadata.as_array().map(|a| a.is_empty()).unwrap_or(true) {
                if let Some(meta) = source.get("image_metadata") {
                    image_metadata = meta.clone();
                }
            }
            if rent_price.is_null() {
                rent_price = source.get("rent_price").cloned().unwrap_or(Value::Null);
            }
            if availability_dates.as_array().map(|a| a.is_empty()).unwrap_or(true) {
                if let Some(dates) = source.get("availability_dates") {
                    availability_dates = dates.clone();
                }
            }
        }

        for source in self.search_claims(NEIGHBORHOODS_INDEX, apartment_id, 100).await? {
            claims.push(claim_view(&source, "neighborhood"));
        }
        for source in self.search_claims(ROOMS_INDEX, apartment_id, 200).await? {
            claims.push(claim_view(&source, "room"));
        }

        let kind_count = |kinds: &[&str]| -> usize {
            claims
                .iter()
                .filter(|c| c.get("kind").and_then(|k| k.as_str()).map(|k| kinds.contains(&k)).unwrap_or(false))
                .count()
        };

        Ok(json!({
            "apartment_id": apartment_id,
            "title": summary_field("title"),
            "address": address,
            "neighborhood_id": neighborhood_id,
            "location": location,
            "image_urls": image_urls,
            "image_metadata": image_metadata,
            "rent_price": rent_price,
            "availability_dates": availability_dates,
            "property_summary": summary_field("property_summary"),
            "location_summary": summary_field("location_summary"),
            "location_widget_token": summary_field("location_widget_token"),
            "total_claims": claims.len(),
            "summary": {
                "base_claims": kind_count(&["base"]),
                "verified_claims": kind_count(&["verified"]),
                "derived_claims": kind_count(&["derived", "anti"])
            },
            "claims": claims,
        }))
    }

    pub async fn delete_apartment(&self, apartment_id: &str) -> Result<Value> {
        let query = json!({ "query": { "term": { "apartment_id": apartment_id } } });

        let apartments = self.store.delete_by_query(APARTMENTS_INDEX, &query).await?;
        let neighborhoods = self.store.delete_by_query(NEIGHBORHOODS_INDEX, &query).await?;
        let rooms = self.store.delete_by_query(ROOMS_INDEX, &query).await?;

        self.store.refresh(APARTMENTS_INDEX).await?;
        self.store.refresh(NEIGHBORHOODS_INDEX).await?;
        self.store.refresh(ROOMS_INDEX).await?;

        Ok(json!({
            "status": "success",
            "apartment_id": apartment_id,
            "deleted_counts": {
                "apartments": apartments,
                "neighborhoods": neighborhoods,
                "rooms": rooms
            },
            "total_deleted": apartments + neighborhoods + rooms
        }))
    }

    async fn search_claims(&self, index: &str, apartment_id: &str, size: usize) -> Result<Vec<Value>> {
        let body = json!({
            "query": { "term": { "apartment_id": apartment_id } },
            "size": size
        });
        let response = self.store.search(index, &body).await?;
        Ok(response
            .pointer("/hits/hits")
            .and_then(|h| h.as_array())
            .map(|hits| hits.iter().filter_map(|h| h.get("_source").cloned()).collect())
            .unwrap_or_default())
    }
}

fn claim_view(source: &Value, domain: &str) -> Value {
    let quantifiers = quantifiers_from_stored(source.get("quantifiers"));
    json!({
        "claim": source.get("claim"),
        "claim_type": source.get("claim_type"),
        "kind": source.get("kind").cloned().unwrap_or_else(|| json!("base")),
        "domain": domain,
        "room_type": source.get("room_type"),
        "is_specific": source.get("is_specific").cloned().unwrap_or(json!(false)),
        "has_quantifiers": !quantifiers.is_empty(),
        "from_claim": source.get("from_claim"),
        "negation": source.get("negation").cloned().unwrap_or(json!(false)),
        "source": source.get("source").cloned().unwrap_or_else(|| json!({ "type": "text" })),
        "grounding_metadata": source.get("grounding_metadata"),
        "quantifiers": quantifiers,
    })
}
