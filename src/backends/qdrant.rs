//! Vector store (Qdrant REST API)

use serde_json::{Map, Value, json};

use super::http::{Credentials, HttpConnection, HttpDriver, HttpSettings, env_var, require_env};
use crate::adapter::{Adapter, Args, Connection, OperationDescriptor, ParamDescriptor, ParamKind};
use crate::{Error, Result};

/// Adapter name
pub const NAME: &str = "qdrant";

/// Settings from `QDRANT_URL` and optional `QDRANT_API_KEY`
pub fn settings_from_env() -> Result<HttpSettings> {
    let settings = HttpSettings::new(&require_env("QDRANT_URL")?)?;
    let credentials = match env_var("QDRANT_API_KEY") {
        Some(key) => Credentials::header("api-key", &key)?,
        None => Credentials::None,
    };
    Ok(settings.with_credentials(credentials))
}

/// Build the adapter around a driver
pub fn adapter(driver: HttpDriver) -> Result<Adapter> {
    let conn = Connection::new(NAME, driver);
    Adapter::builder(NAME, "Qdrant vector similarity search engine (QDRANT_URL)", conn.clone())
        .operation(
            OperationDescriptor::builder("qdrant_list_collections", "List collections")
                .read_only()
                .bind(&conn, list_collections),
        )
        .operation(
            OperationDescriptor::builder("qdrant_search", "Find the points nearest to a vector")
                .param("collection", ParamDescriptor::required(ParamKind::String, "Collection name"))
                .param("vector", ParamDescriptor::required(ParamKind::Array, "Query vector"))
                .param("limit", ParamDescriptor::optional(ParamKind::Number, "Maximum results (default 10)"))
                .param("filter", ParamDescriptor::optional(ParamKind::Object, "Payload filter"))
                .param("score_threshold", ParamDescriptor::optional(ParamKind::Number, "Minimum score"))
                .param("with_payload", ParamDescriptor::optional(ParamKind::Boolean, "Return payloads (default true)"))
                .read_only()
                .bind(&conn, search),
        )
        .operation(
            OperationDescriptor::builder("qdrant_upsert", "Insert or replace points")
                .param("collection", ParamDescriptor::required(ParamKind::String, "Collection name"))
                .param("points", ParamDescriptor::required(ParamKind::Array, "Points: [{id, vector, payload}]"))
                .bind(&conn, upsert),
        )
        .operation(
            OperationDescriptor::builder("qdrant_delete", "Delete points by id or by filter")
                .param("collection", ParamDescriptor::required(ParamKind::String, "Collection name"))
                .param("ids", ParamDescriptor::optional(ParamKind::Array, "Point ids to delete"))
                .param("filter", ParamDescriptor::optional(ParamKind::Object, "Delete every point matching this filter"))
                .destructive()
                .bind(&conn, delete),
        )
        .build()
}

/// Qdrant wraps every answer in `{"result": ..., "status": ..., "time": ...}`
fn unwrap_result(response: Value) -> Value {
    match response {
        Value::Object(mut map) if map.contains_key("result") => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    }
}

async fn list_collections(conn: HttpConnection, _args: Args) -> Result<Value> {
    let result = unwrap_result(conn.handle().await?.get(&["collections"]).await?);
    Ok(result.get("collections").cloned().map_or(result, |c| json!({ "collections": c })))
}

async fn search(conn: HttpConnection, args: Args) -> Result<Value> {
    let collection = args.required_str("collection")?;
    let vector = args.required_array("vector")?;
    if vector.is_empty() || !vector.iter().all(Value::is_number) {
        return Err(Error::Validation("'vector' must be a non-empty array of numbers".to_string()));
    }

    let mut body = Map::new();
    body.insert("vector".to_string(), Value::Array(vector));
    body.insert("limit".to_string(), json!(args.optional_u64("limit")?.unwrap_or(10)));
    body.insert(
        "with_payload".to_string(),
        json!(args.optional_bool("with_payload")?.unwrap_or(true)),
    );
    if let Some(filter) = args.optional_object("filter")? {
        body.insert("filter".to_string(), Value::Object(filter));
    }
    if let Some(threshold) = args.optional_f64("score_threshold")? {
        body.insert("score_threshold".to_string(), json!(threshold));
    }

    let response = conn
        .handle()
        .await?
        .post(&["collections", collection, "points", "search"], &Value::Object(body))
        .await?;
    Ok(json!({ "points": unwrap_result(response) }))
}

async fn upsert(conn: HttpConnection, args: Args) -> Result<Value> {
    let collection = args.required_str("collection")?;
    let points = args.required_array("points")?;
    if points.is_empty() {
        return Err(Error::Validation("'points' must not be empty".to_string()));
    }

    let endpoint = conn.handle().await?;
    let request = endpoint
        .request(reqwest::Method::PUT, &["collections", collection, "points"])?
        .query(&[("wait", "true")])
        .json(&json!({ "points": points }));
    Ok(unwrap_result(endpoint.send(request).await?))
}

async fn delete(conn: HttpConnection, args: Args) -> Result<Value> {
    let collection = args.required_str("collection")?;
    let selector = delete_selector(&args)?;

    let endpoint = conn.handle().await?;
    let request = endpoint
        .request(reqwest::Method::POST, &["collections", collection, "points", "delete"])?
        .query(&[("wait", "true")])
        .json(&selector);
    Ok(unwrap_result(endpoint.send(request).await?))
}

/// Refuse a delete that names neither points nor a non-empty filter
fn delete_selector(args: &Args) -> Result<Value> {
    if let Some(ids) = args.optional_array("ids")?.filter(|ids| !ids.is_empty()) {
        return Ok(json!({ "points": ids }));
    }
    if let Some(filter) = args.optional_object("filter")?.filter(|f| !f.is_empty()) {
        return Ok(json!({ "filter": filter }));
    }
    Err(Error::Validation(
        "qdrant_delete requires non-empty 'ids' or 'filter'".to_string(),
    ))
}
