use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use listing_search_service::es::client::EsClient;
use listing_search_service::es::DocumentStore;

async fn spawn_fake_es(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{}", addr)
}

#[tokio::test]
async fn search_returns_parsed_hits() {
    let app = Router::new().route(
        "/apartments/_search",
        post(|| async {
            Json(json!({ "hits": { "hits": [ { "_score": 0.9, "_source": { "apartment_id": "a1" } } ] } }))
        }),
    );
    let base = spawn_fake_es(app).await;

    let client = EsClient::new(base, 8);
    let result = client.search("apartments", &json!({ "query": { "match_all": {} } })).await.unwrap();
    assert_eq!(result.pointer("/hits/hits/0/_source/apartment_id"), Some(&json!("a1")));
}

#[tokio::test]
async fn search_error_surfaces_reason() {
    let app = Router::new().route(
        "/apartments/_search",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": {
                        "type": "parsing_exception",
                        "reason": "unknown field [bogus]",
                        "root_cause": [{ "type": "parsing_exception", "reason": "unknown field [bogus]" }]
                    },
                    "status": 400
                })),
            )
        }),
    );
    let base = spawn_fake_es(app).await;

    let client = EsClient::new(base, 8);
    let err = client.search("apartments", &json!({ "bogus": 1 })).await.err().unwrap();
    assert!(err.to_string().contains("unknown field [bogus]"), "got: {}", err);
}

#[tokio::test]
async fn get_doc_maps_404_to_none() {
    let app = Router::new().route(
        "/apartments/_doc/{id}",
        get(|Path(id): Path<String>| async move {
            if id == "a1_claim_0" {
                (StatusCode::OK, Json(json!({ "_source": { "title": "Loft" } })))
            } else {
                (StatusCode::NOT_FOUND, Json(json!({ "found": false })))
            }
        }),
    );
    let base = spawn_fake_es(app).await;

    let client = EsClient::new(base, 8);
    let found = client.get_doc("apartments", "a1_claim_0").await.unwrap();
    assert_eq!(found.unwrap().get("title"), Some(&json!("Loft")));

    let missing = client.get_doc("apartments", "nope").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn delete_by_query_returns_deleted_count() {
    let app = Router::new().route(
        "/rooms/_delete_by_query",
        post(|| async { Json(json!({ "deleted": 7, "took": 3 })) }),
    );
    let base = spawn_fake_es(app).await;

    let client = EsClient::new(base, 8);
    let deleted = client.delete_by_query("rooms", &json!({ "query": { "term": { "apartment_id": "a1" } } })).await.unwrap();
    assert_eq!(deleted, 7);
}

#[tokio::test]
async fn create_indices_tolerates_existing_index() {
    let app = Router::new()
        .route(
            "/rooms",
            put(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": { "type": "resource_already_exists_exception", "reason": "index [rooms] already exists" },
                        "status": 400
                    })),
                )
            }),
        )
        .route("/apartments", put(|| async { Json(json!({ "acknowledged": true })) }))
        .route("/neighborhoods", put(|| async { Json(json!({ "acknowledged": true })) }));
    let base = spawn_fake_es(app).await;

    let client = EsClient::new(base, 8);
    client.create_indices().await.unwrap();
}

#[tokio::test]
async fn index_doc_put_body_reaches_store() {
    let app = Router::new().route(
        "/rooms/_doc/{id}",
        put(|Path(id): Path<String>, Json(body): Json<Value>| async move {
            assert_eq!(id, "a1_room_0");
            assert_eq!(body.get("room_type"), Some(&json!("kitchen")));
            Json(json!({ "result": "created" }))
        }),
    );
    let base = spawn_fake_es(app).await;

    let client = EsClient::new(base, 8);
    client
        .index_doc("rooms", "a1_room_0", &json!({ "room_type": "kitchen" }))
        .await
        .unwrap();
}
