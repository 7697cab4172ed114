//! Graph store (Neo4j HTTP transactional endpoint)
//!
//! Every operation is a single auto-commit request to
//! `POST /db/{database}/tx/commit`. Cypher parameters are always passed in
//! the `parameters` object, never spliced into the statement.

use std::sync::Arc;

use serde_json::{Map, Value, json};

use super::http::{Credentials, HttpConnection, HttpDriver, HttpSettings, env_var, require_env};
use crate::adapter::{Adapter, Args, Connection, OperationDescriptor, ParamDescriptor, ParamKind};
use crate::{Error, Result};

/// Adapter name
pub const NAME: &str = "neo4j";

/// Database used when neither an explicit name nor `NEO4J_DATABASE` is set
pub const DEFAULT_DATABASE: &str = "neo4j";

/// Settings from `NEO4J_URL`, `NEO4J_USER` and `NEO4J_PASSWORD`
pub fn settings_from_env() -> Result<HttpSettings> {
    Ok(HttpSettings::new(&require_env("NEO4J_URL")?)?.with_credentials(Credentials::basic(
        env_var("NEO4J_USER"),
        env_var("NEO4J_PASSWORD"),
    )))
}

/// Build the adapter. `database` overrides `NEO4J_DATABASE`.
pub fn adapter(driver: HttpDriver, database: Option<String>) -> Result<Adapter> {
    let conn = Connection::new(NAME, driver);
    let database: Option<Arc<str>> = database.map(Into::into);

    let query_db = database.clone();
    let labels_db = database.clone();
    let types_db = database;

    Adapter::builder(NAME, "Neo4j graph database via Cypher (NEO4J_URL)", conn.clone())
        .operation(
            OperationDescriptor::builder("neo4j_query", "Run a Cypher statement")
                .param("cypher", ParamDescriptor::required(ParamKind::String, "Cypher statement; reference parameters as $name"))
                .param("parameters", ParamDescriptor::optional(ParamKind::Object, "Statement parameters"))
                .bind(&conn, move |conn, args| query(conn, args, query_db.clone())),
        )
        .operation(
            OperationDescriptor::builder("neo4j_list_labels", "List node labels")
                .read_only()
                .bind(&conn, move |conn, _args| {
                    procedure(conn, "CALL db.labels()", "label", labels_db.clone())
                }),
        )
        .operation(
            OperationDescriptor::builder("neo4j_list_relationship_types", "List relationship types")
                .read_only()
                .bind(&conn, move |conn, _args| {
                    procedure(conn, "CALL db.relationshipTypes()", "relationshipType", types_db.clone())
                }),
        )
        .build()
}

fn resolve_database(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| env_var("NEO4J_DATABASE"))
        .unwrap_or_else(|| DEFAULT_DATABASE.to_string())
}

async fn query(conn: HttpConnection, args: Args, database: Option<Arc<str>>) -> Result<Value> {
    let cypher = args.required_str("cypher")?;
    if cypher.trim().is_empty() {
        return Err(Error::Validation("'cypher' must not be empty".to_string()));
    }
    let parameters = args.optional_object("parameters")?.unwrap_or_default();

    let result = commit(&conn, database.as_deref(), cypher, parameters).await?;
    let rows = rows_as_objects(&result);
    Ok(json!({
        "columns": result.get("columns").cloned().unwrap_or_else(|| json!([])),
        "row_count": rows.len(),
        "rows": rows,
    }))
}

async fn procedure(
    conn: HttpConnection,
    cypher: &'static str,
    column: &'static str,
    database: Option<Arc<str>>,
) -> Result<Value> {
    let result = commit(&conn, database.as_deref(), cypher, Map::new()).await?;
    let names: Vec<Value> = rows_as_objects(&result)
        .into_iter()
        .filter_map(|mut row| row.as_object_mut().and_then(|r| r.remove(column)))
        .collect();
    Ok(json!({ "count": names.len(), "names": names }))
}

/// Run one statement and return its single result block
async fn commit(
    conn: &HttpConnection,
    database: Option<&str>,
    cypher: &str,
    parameters: Map<String, Value>,
) -> Result<Value> {
    let database = resolve_database(database);
    let body = json!({
        "statements": [{ "statement": cypher, "parameters": parameters }]
    });
    let response = conn
        .handle()
        .await?
        .post(&["db", database.as_str(), "tx", "commit"], &body)
        .await?;
    check_errors(&response)?;
    Ok(response["results"]
        .get(0)
        .cloned()
        .unwrap_or_else(|| json!({ "columns": [], "data": [] })))
}

/// Neo4j reports statement failures with HTTP 200 and an `errors` array
fn check_errors(response: &Value) -> Result<()> {
    let Some(first) = response["errors"].as_array().and_then(|e| e.first()) else {
        return Ok(());
    };
    let code = first["code"].as_str().unwrap_or("Neo.Unknown");
    let message = first["message"].as_str().unwrap_or("statement failed");
    if code.contains(".Security.") {
        Err(Error::Connectivity(format!("{code}: {message}")))
    } else {
        Err(Error::Backend(format!("{code}: {message}")))
    }
}

/// `{"columns": [a, b], "data": [{"row": [1, 2]}]}` to `[{"a": 1, "b": 2}]`
fn rows_as_objects(result: &Value) -> Vec<Value> {
    let columns: Vec<&str> = result["columns"]
        .as_array()
        .map(|c| c.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    result["data"]
        .as_array()
        .map(|data| {
            data.iter()
                .map(|entry| {
                    let row = entry["row"].as_array().map(Vec::as_slice).unwrap_or_default();
                    let record: Map<String, Value> = columns
                        .iter()
                        .zip(row)
                        .map(|(name, value)| ((*name).to_string(), value.clone()))
                        .collect();
                    Value::Object(record)
                })
                .collect()
        })
        .unwrap_or_default()
}
