pub mod client;
pub mod mappings;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::models::{GeoPoint, Quantifier, INFINITE_BOUND_SENTINEL};

pub const ROOMS_INDEX: &str = "rooms";
pub const APARTMENTS_INDEX: &str = "apartments";
pub const NEIGHBORHOODS_INDEX: &str = "neighborhoods";

/// The document-store surface the pipelines run against. Kept JSON-shaped so
/// tests can swap in an in-memory fake without re-modeling the query DSL.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_indices(&self) -> Result<()>;
    async fn index_doc(&self, index: &str, id: &str, doc: &Value) -> Result<()>;
    async fn update_doc(&self, index: &str, id: &str, patch: &Value) -> Result<()>;
    async fn get_doc(&self, index: &str, id: &str) -> Result<Option<Value>>;
    async fn search(&self, index: &str, body: &Value) -> Result<Value>;
    async fn delete_by_query(&self, index: &str, body: &Value) -> Result<u64>;
    async fn refresh(&self, index: &str) -> Result<()>;
}

/// Serialize quantifiers for storage, replacing infinite bounds with the
/// sentinel the store accepts.
pub fn quantifiers_to_stored(quantifiers: &[Quantifier]) -> Value {
    let items: Vec<Value> = quantifiers
        .iter()
        .map(|q| {
            let vmin = if q.vmin.is_infinite() { INFINITE_BOUND_SENTINEL } else { q.vmin };
            let vmax = if q.vmax.is_infinite() { INFINITE_BOUND_SENTINEL } else { q.vmax };
            json!({
                "qtype": q.qtype,
                "noun": q.noun,
                "vmin": vmin,
                "vmax": vmax,
                "op": q.op,
                "unit": q.unit,
            })
        })
        .collect();
    Value::Array(items)
}

/// Read quantifiers back from a stored document, restoring the sentinel to
/// infinity so downstream comparisons behave.
pub fn quantifiers_from_stored(value: Option<&Value>) -> Vec<Quantifier> {
    let Some(arr) = value.and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|item| serde_json::from_value::<Quantifier>(item.clone()).ok())
        .map(|mut q| {
            if q.vmin >= INFINITE_BOUND_SENTINEL {
                q.vmin = f64::INFINITY;
            }
            if q.vmax >= INFINITE_BOUND_SENTINEL {
                q.vmax = f64::INFINITY;
            }
            q
        })
        .collect()
}

/// The store's geo_point convention is `{lat, lon}`; the application uses
/// `{lat, lng}`. Translation happens only at this boundary.
pub fn geo_to_stored(point: &GeoPoint) -> Value {
    json!({ "lat": point.lat, "lon": point.lng })
}

pub fn geo_from_stored(value: &Value) -> Option<GeoPoint> {
    let lat = value.get("lat")?.as_f64()?;
    let lng = value.get("lon").or_else(|| value.get("lng"))?.as_f64()?;
    Some(GeoPoint { lat, lng })
}
