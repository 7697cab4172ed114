//! HTTP adapters against in-process axum stubs

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use mcp_db_gateway::adapter::Adapter;
use mcp_db_gateway::backends::http::{Credentials, HttpDriver, HttpSettings, require_env};
use mcp_db_gateway::backends::{couchdb, elasticsearch, neo4j, qdrant};
use mcp_db_gateway::error::ErrorKind;
use mcp_db_gateway::gateway::Gateway;
use mcp_db_gateway::registry::Registry;

/// Requests seen by a stub, in arrival order
type Seen = Arc<Mutex<Vec<Value>>>;

async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn gateway(adapter: Adapter) -> Gateway {
    let registry = Registry::register(vec![adapter]).unwrap();
    Gateway::with_timeouts(
        Arc::new(registry),
        Duration::from_secs(10),
        Duration::from_secs(2),
    )
}

fn settings(base: &str) -> HttpSettings {
    HttpSettings::new(base).unwrap()
}

async fn root() -> Json<Value> {
    Json(json!({"version": {"number": "test"}}))
}

// ---------------------------------------------------------------------------
// Elasticsearch
// ---------------------------------------------------------------------------

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "ApiKey s3cr3t")
}

async fn es_root(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "missing api key").into_response();
    }
    root().await.into_response()
}

async fn es_search(
    State(seen): State<Seen>,
    Path(index): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "missing api key").into_response();
    }
    seen.lock().push(json!({"index": index, "body": body}));
    Json(json!({
        "took": 2,
        "hits": {
            "total": {"value": 1, "relation": "eq"},
            "hits": [{"_index": index, "_id": "d1", "_score": 1.0, "_source": {"title": "hello"}}]
        }
    }))
    .into_response()
}

async fn es_missing_index() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": {"type": "index_not_found_exception"}, "status": 404})),
    )
        .into_response()
}

fn es_stub(seen: Seen) -> Router {
    Router::new()
        .route("/", get(es_root))
        .route("/{index}/_search", post(es_search))
        .route("/{index}/_doc/{id}", get(es_missing_index))
        .with_state(seen)
}

#[tokio::test]
async fn elasticsearch_search_sends_query_and_summarizes() {
    let seen = Seen::default();
    let base = spawn(es_stub(Arc::clone(&seen))).await;
    let creds = Credentials::authorization("ApiKey", "s3cr3t").unwrap();
    let adapter = elasticsearch::adapter(HttpDriver::with_settings(
        settings(&base).with_credentials(creds),
    ))
    .unwrap();
    let gateway = gateway(adapter);

    let envelope = gateway
        .call(
            "es_search",
            json!({"index": "articles", "query": {"match": {"title": "hello"}}, "size": 5}),
        )
        .await;
    let result = envelope.payload().unwrap();
    assert_eq!(result["total"], 1);
    assert_eq!(result["hits"][0]["id"], "d1");
    assert_eq!(result["hits"][0]["source"], json!({"title": "hello"}));

    let requests = seen.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["index"], "articles");
    assert_eq!(requests[0]["body"]["query"], json!({"match": {"title": "hello"}}));
    assert_eq!(requests[0]["body"]["size"], 5);
}

#[tokio::test]
async fn elasticsearch_backend_error_keeps_raw_message() {
    let base = spawn(es_stub(Seen::default())).await;
    let creds = Credentials::authorization("ApiKey", "s3cr3t").unwrap();
    let adapter = elasticsearch::adapter(HttpDriver::with_settings(
        settings(&base).with_credentials(creds),
    ))
    .unwrap();
    let gateway = gateway(adapter);

    let envelope = gateway.call("es_get", json!({"index": "nope", "id": "1"})).await;
    let failure = envelope.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::BackendExecution);
    assert!(failure.message.contains("404"));
    assert!(failure.message.contains("index_not_found_exception"));
    assert_eq!(failure.adapter.as_deref(), Some("elasticsearch"));
}

#[tokio::test]
async fn elasticsearch_rejected_credentials_are_connectivity() {
    let base = spawn(es_stub(Seen::default())).await;
    let creds = Credentials::authorization("ApiKey", "wrong").unwrap();
    let adapter = elasticsearch::adapter(HttpDriver::with_settings(
        settings(&base).with_credentials(creds),
    ))
    .unwrap();
    assert!(!adapter.is_connected().await);

    let gateway = gateway(adapter);
    let envelope = gateway.call("es_list_indices", json!({})).await;
    assert_eq!(envelope.failure().unwrap().kind, ErrorKind::Connectivity);
}

#[tokio::test]
async fn elasticsearch_delete_requires_id() {
    let adapter =
        elasticsearch::adapter(HttpDriver::with_settings(settings("http://127.0.0.1:1"))).unwrap();
    let gateway = gateway(adapter);
    let envelope = gateway.call("es_delete", json!({"index": "articles"})).await;
    let failure = envelope.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Validation);
    assert!(failure.message.contains("'id'"));
}

// ---------------------------------------------------------------------------
// CouchDB
// ---------------------------------------------------------------------------

async fn couch_all_dbs() -> Json<Value> {
    Json(json!(["_users", "orders"]))
}

async fn couch_find(
    State(seen): State<Seen>,
    Path(db): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    seen.lock().push(json!({"db": db, "body": body}));
    Json(json!({"docs": [{"_id": "o1", "total": 12}], "bookmark": "x"}))
}

async fn couch_up() -> Json<Value> {
    Json(json!({"status": "ok", "seeds": {}}))
}

fn couch_stub(seen: Seen) -> Router {
    Router::new()
        .route("/_up", get(couch_up))
        .route("/_all_dbs", get(couch_all_dbs))
        .route("/{db}/_find", post(couch_find))
        .with_state(seen)
}

#[tokio::test]
async fn couchdb_lists_and_finds() {
    let seen = Seen::default();
    let base = spawn(couch_stub(Arc::clone(&seen))).await;
    let adapter = couchdb::adapter(HttpDriver::with_settings(settings(&base))).unwrap();
    let gateway = gateway(adapter);

    let listed = gateway.call("couchdb_list_databases", json!({})).await;
    assert_eq!(listed.payload().unwrap()["count"], 2);

    let found = gateway
        .call(
            "couchdb_find",
            json!({"database": "orders", "selector": {"status": "open"}, "limit": 3}),
        )
        .await;
    let result = found.payload().unwrap();
    assert_eq!(result["count"], 1);
    assert_eq!(result["docs"][0]["_id"], "o1");

    let requests = seen.lock().clone();
    assert_eq!(requests[0]["db"], "orders");
    assert_eq!(requests[0]["body"]["selector"], json!({"status": "open"}));
    assert_eq!(requests[0]["body"]["limit"], 3);
}

// ---------------------------------------------------------------------------
// Qdrant
// ---------------------------------------------------------------------------

async fn qdrant_collections() -> Json<Value> {
    Json(json!({"result": {"collections": [{"name": "docs"}]}, "status": "ok", "time": 0.0}))
}

async fn qdrant_search(
    State(seen): State<Seen>,
    Path(collection): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    seen.lock().push(json!({"collection": collection, "body": body}));
    Json(json!({
        "result": [{"id": 7, "score": 0.93, "payload": {"title": "near"}}],
        "status": "ok",
        "time": 0.0
    }))
}

async fn qdrant_delete(
    State(seen): State<Seen>,
    Path(collection): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    seen.lock().push(json!({"collection": collection, "query": query, "body": body}));
    Json(json!({"result": {"operation_id": 1, "status": "completed"}, "status": "ok"}))
}

fn qdrant_stub(seen: Seen) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/collections", get(qdrant_collections))
        .route("/collections/{collection}/points/search", post(qdrant_search))
        .route("/collections/{collection}/points/delete", post(qdrant_delete))
        .with_state(seen)
}

#[tokio::test]
async fn qdrant_search_and_delete() {
    let seen = Seen::default();
    let base = spawn(qdrant_stub(Arc::clone(&seen))).await;
    let adapter = qdrant::adapter(HttpDriver::with_settings(settings(&base))).unwrap();
    let gateway = gateway(adapter);

    let collections = gateway.call("qdrant_list_collections", json!({})).await;
    assert_eq!(
        collections.payload().unwrap()["collections"],
        json!([{"name": "docs"}])
    );

    let search = gateway
        .call(
            "qdrant_search",
            json!({"collection": "docs", "vector": [0.1, 0.2, 0.3], "limit": 1, "score_threshold": 0.5}),
        )
        .await;
    assert_eq!(search.payload().unwrap()["points"][0]["id"], 7);

    let refused = gateway
        .call("qdrant_delete", json!({"collection": "docs", "filter": {}}))
        .await;
    assert_eq!(refused.failure().unwrap().kind, ErrorKind::Validation);

    let deleted = gateway
        .call("qdrant_delete", json!({"collection": "docs", "ids": [7]}))
        .await;
    assert_eq!(deleted.payload().unwrap()["status"], "completed");

    let requests = seen.lock().clone();
    assert_eq!(requests.len(), 2, "refused delete must not reach the backend");
    assert_eq!(requests[0]["body"]["vector"], json!([0.1, 0.2, 0.3]));
    assert_eq!(requests[0]["body"]["limit"], 1);
    assert_eq!(requests[0]["body"]["with_payload"], true);
    assert_eq!(requests[0]["body"]["score_threshold"], 0.5);
    assert_eq!(requests[1]["query"]["wait"], "true");
    assert_eq!(requests[1]["body"], json!({"points": [7]}));
}

// ---------------------------------------------------------------------------
// Neo4j
// ---------------------------------------------------------------------------

async fn neo4j_commit(
    State(seen): State<Seen>,
    Path(database): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    seen.lock().push(json!({"database": database, "body": body.clone()}));
    let statement = body["statements"][0]["statement"].as_str().unwrap_or_default();
    let response = if statement.contains("db.labels") {
        json!({
            "results": [{"columns": ["label"], "data": [{"row": ["Person"]}, {"row": ["Movie"]}]}],
            "errors": []
        })
    } else if statement.starts_with("BROKEN") {
        json!({
            "results": [],
            "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "Invalid input 'B'"}]
        })
    } else {
        let name = body["statements"][0]["parameters"]["name"].clone();
        json!({
            "results": [{"columns": ["name"], "data": [{"row": [name]}]}],
            "errors": []
        })
    };
    Json(response)
}

fn neo4j_stub(seen: Seen) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/db/{database}/tx/commit", post(neo4j_commit))
        .with_state(seen)
}

#[tokio::test]
async fn neo4j_passes_parameters_separately() {
    let seen = Seen::default();
    let base = spawn(neo4j_stub(Arc::clone(&seen))).await;
    let adapter = neo4j::adapter(
        HttpDriver::with_settings(settings(&base)),
        Some("movies".to_string()),
    )
    .unwrap();
    let gateway = gateway(adapter);

    let envelope = gateway
        .call(
            "neo4j_query",
            json!({"cypher": "MATCH (p:Person {name: $name}) RETURN p.name AS name", "parameters": {"name": "Keanu"}}),
        )
        .await;
    assert_eq!(envelope.payload().unwrap()["rows"], json!([{"name": "Keanu"}]));

    let labels = gateway.call("neo4j_list_labels", json!({})).await;
    assert_eq!(labels.payload().unwrap()["names"], json!(["Person", "Movie"]));

    let requests = seen.lock().clone();
    assert_eq!(requests[0]["database"], "movies");
    let statement = &requests[0]["body"]["statements"][0];
    assert!(!statement["statement"].as_str().unwrap().contains("Keanu"));
    assert_eq!(statement["parameters"]["name"], "Keanu");
}

#[tokio::test]
async fn neo4j_statement_errors_are_backend_failures() {
    let base = spawn(neo4j_stub(Seen::default())).await;
    let adapter = neo4j::adapter(HttpDriver::with_settings(settings(&base)), None).unwrap();
    let gateway = gateway(adapter);

    let envelope = gateway.call("neo4j_query", json!({"cypher": "BROKEN QUERY"})).await;
    let failure = envelope.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::BackendExecution);
    assert!(failure.message.contains("SyntaxError"));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

fn unset_settings() -> mcp_db_gateway::Result<HttpSettings> {
    HttpSettings::new(&require_env("DB_GATEWAY_TEST_NEVER_SET_URL")?)
}

#[tokio::test]
async fn missing_settings_are_configuration_failures() {
    let adapter = couchdb::adapter(HttpDriver::from_env(unset_settings)).unwrap();
    let gateway = gateway(adapter);
    let envelope = gateway.call("couchdb_list_databases", json!({})).await;
    let failure = envelope.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Configuration);
    assert!(failure.message.contains("DB_GATEWAY_TEST_NEVER_SET_URL"));
}

#[tokio::test]
async fn unreachable_backend_is_disconnected_not_an_error() {
    let adapter =
        qdrant::adapter(HttpDriver::with_settings(settings("http://127.0.0.1:1"))).unwrap();
    assert!(!adapter.is_connected().await);
    adapter.disconnect().await.unwrap();

    let gateway = gateway(adapter);
    let status = gateway.call("db_status", json!({})).await;
    assert_eq!(status.payload().unwrap()["disconnected"], json!(["qdrant"]));
}

#[tokio::test]
async fn reachable_backend_connects_once() {
    let base = spawn(couch_stub(Seen::default())).await;
    let adapter = couchdb::adapter(HttpDriver::with_settings(settings(&base))).unwrap();
    adapter.connect().await.unwrap();
    adapter.connect().await.unwrap();
    assert!(adapter.is_connected().await);
    adapter.disconnect().await.unwrap();
    adapter.disconnect().await.unwrap();
}

#[tokio::test]
async fn couchdb_liveness_uses_the_up_endpoint() {
    // Root answers, but CouchDB's health endpoint is missing
    let base = spawn(Router::new().route("/", get(root))).await;
    let adapter = couchdb::adapter(HttpDriver::with_settings(settings(&base))).unwrap();
    let err = adapter.connect().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendExecution);
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn silent_backend_fails_connect_within_request_timeout() {
    // Accepts TCP connections and never writes a byte
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let settings = settings(&format!("http://{addr}")).with_request_timeout(Duration::from_millis(200));
    let adapter = qdrant::adapter(HttpDriver::with_settings(settings)).unwrap();
    let err = tokio::time::timeout(Duration::from_secs(3), adapter.connect())
        .await
        .expect("the request timeout bounds the liveness check")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(!adapter.is_connected().await);
}
