//! SQLite adapter against an on-disk database

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use mcp_db_gateway::backends::sqlite::{self, SqliteDriver};
use mcp_db_gateway::error::ErrorKind;
use mcp_db_gateway::gateway::{Envelope, Gateway};
use mcp_db_gateway::registry::Registry;

fn gateway(dir: &TempDir) -> Gateway {
    let adapter = sqlite::adapter(SqliteDriver::with_path(dir.path().join("test.db"))).unwrap();
    let registry = Registry::register(vec![adapter]).unwrap();
    Gateway::with_timeouts(
        Arc::new(registry),
        Duration::from_secs(10),
        Duration::from_secs(2),
    )
}

async fn seed(gateway: &Gateway) {
    let create = gateway
        .call(
            "sqlite_execute",
            json!({"sql": "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL, avatar BLOB)"}),
        )
        .await;
    assert!(create.is_success(), "{create:?}");

    for (name, score) in [("ada", 9.5), ("alan", 8.0), ("grace", 9.9)] {
        let insert = gateway
            .call(
                "sqlite_execute",
                json!({"sql": "INSERT INTO users (name, score) VALUES (?, ?)", "params": [name, score]}),
            )
            .await;
        assert_eq!(insert.payload().unwrap()["rows_affected"], 1);
    }
}

fn failure_kind(envelope: &Envelope) -> ErrorKind {
    envelope.failure().map(|f| f.kind).unwrap()
}

#[tokio::test]
async fn query_returns_rows_with_bound_params() {
    let dir = TempDir::new().unwrap();
    let gateway = gateway(&dir);
    seed(&gateway).await;

    let envelope = gateway
        .call(
            "sqlite_query",
            json!({"sql": "SELECT name, score FROM users WHERE score > ? ORDER BY name", "params": [9.0]}),
        )
        .await;
    let result = envelope.payload().unwrap();
    assert_eq!(result["columns"], json!(["name", "score"]));
    assert_eq!(result["row_count"], 2);
    assert_eq!(result["truncated"], false);
    assert_eq!(
        result["rows"],
        json!([{"name": "ada", "score": 9.5}, {"name": "grace", "score": 9.9}])
    );
}

#[tokio::test]
async fn query_limit_truncates() {
    let dir = TempDir::new().unwrap();
    let gateway = gateway(&dir);
    seed(&gateway).await;

    let envelope = gateway
        .call("sqlite_query", json!({"sql": "SELECT id FROM users", "limit": 2}))
        .await;
    let result = envelope.payload().unwrap();
    assert_eq!(result["row_count"], 2);
    assert_eq!(result["truncated"], true);
}

#[tokio::test]
async fn query_refuses_writes() {
    let dir = TempDir::new().unwrap();
    let gateway = gateway(&dir);
    seed(&gateway).await;

    let envelope = gateway
        .call("sqlite_query", json!({"sql": "DELETE FROM users"}))
        .await;
    assert_eq!(failure_kind(&envelope), ErrorKind::Validation);
    assert!(envelope.failure().unwrap().message.contains("sqlite_execute"));

    let count = gateway
        .call("sqlite_query", json!({"sql": "SELECT COUNT(*) AS n FROM users"}))
        .await;
    assert_eq!(count.payload().unwrap()["rows"][0]["n"], 3);
}

#[tokio::test]
async fn interpolation_attempt_stays_a_value() {
    let dir = TempDir::new().unwrap();
    let gateway = gateway(&dir);
    seed(&gateway).await;

    let envelope = gateway
        .call(
            "sqlite_query",
            json!({"sql": "SELECT id FROM users WHERE name = ?", "params": ["x' OR '1'='1"]}),
        )
        .await;
    assert_eq!(envelope.payload().unwrap()["row_count"], 0);
}

#[tokio::test]
async fn backend_errors_are_attributed() {
    let dir = TempDir::new().unwrap();
    let gateway = gateway(&dir);
    seed(&gateway).await;

    let envelope = gateway
        .call("sqlite_query", json!({"sql": "SELECT * FROM missing_table"}))
        .await;
    let failure = envelope.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::BackendExecution);
    assert!(failure.message.contains("missing_table"));
    assert_eq!(failure.operation.as_deref(), Some("sqlite_query"));
    assert_eq!(failure.adapter.as_deref(), Some("sqlite"));

    let envelope = gateway
        .call(
            "sqlite_execute",
            json!({"sql": "INSERT INTO users (name) VALUES (?)", "params": [null]}),
        )
        .await;
    assert_eq!(failure_kind(&envelope), ErrorKind::BackendExecution);
}

#[tokio::test]
async fn list_and_describe_tables() {
    let dir = TempDir::new().unwrap();
    let gateway = gateway(&dir);
    seed(&gateway).await;

    let tables = gateway.call("sqlite_list_tables", json!({})).await;
    assert_eq!(
        tables.payload().unwrap()["tables"],
        json!([{"name": "users", "type": "table"}])
    );

    let described = gateway
        .call("sqlite_describe_table", json!({"table": "users"}))
        .await;
    let columns = &described.payload().unwrap()["columns"];
    assert_eq!(columns[0]["name"], "id");
    assert_eq!(columns[0]["primary_key"], true);
    assert_eq!(columns[1]["name"], "name");
    assert_eq!(columns[1]["nullable"], false);
    assert_eq!(columns[2]["type"], "REAL");

    let missing = gateway
        .call("sqlite_describe_table", json!({"table": "nope"}))
        .await;
    assert_eq!(failure_kind(&missing), ErrorKind::BackendExecution);
}

#[tokio::test]
async fn missing_sql_is_validation() {
    let dir = TempDir::new().unwrap();
    let gateway = gateway(&dir);
    let envelope = gateway.call("sqlite_execute", json!({})).await;
    assert_eq!(failure_kind(&envelope), ErrorKind::Validation);
}

#[tokio::test]
async fn unopenable_path_reports_disconnected() {
    let dir = TempDir::new().unwrap();
    let adapter =
        sqlite::adapter(SqliteDriver::with_path(dir.path().join("no/such/dir/test.db"))).unwrap();
    assert!(!adapter.is_connected().await);

    let registry = Registry::register(vec![adapter]).unwrap();
    let gateway = Gateway::with_timeouts(
        Arc::new(registry),
        Duration::from_secs(5),
        Duration::from_secs(2),
    );
    let status = gateway.call("db_status", json!({})).await;
    assert_eq!(status.payload().unwrap()["disconnected"], json!(["sqlite"]));
}

#[tokio::test]
async fn lifecycle_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let adapter = sqlite::adapter(SqliteDriver::with_path(dir.path().join("test.db"))).unwrap();
    adapter.disconnect().await.unwrap();
    adapter.connect().await.unwrap();
    adapter.connect().await.unwrap();
    assert!(adapter.is_connected().await);
    adapter.disconnect().await.unwrap();
    adapter.disconnect().await.unwrap();
}
