//! Search engine (Elasticsearch / OpenSearch REST API)

use serde_json::{Map, Value, json};

use super::http::{Credentials, HttpConnection, HttpDriver, HttpSettings, env_var, require_env};
use crate::adapter::{Adapter, Args, Connection, OperationDescriptor, ParamDescriptor, ParamKind};
use crate::Result;

/// Adapter name
pub const NAME: &str = "elasticsearch";

/// Settings from `ELASTICSEARCH_URL` plus `ELASTICSEARCH_API_KEY` or
/// `ELASTICSEARCH_USER` / `ELASTICSEARCH_PASSWORD`
pub fn settings_from_env() -> Result<HttpSettings> {
    let settings = HttpSettings::new(&require_env("ELASTICSEARCH_URL")?)?;
    let credentials = match env_var("ELASTICSEARCH_API_KEY") {
        Some(key) => Credentials::authorization("ApiKey", &key)?,
        None => Credentials::basic(
            env_var("ELASTICSEARCH_USER"),
            env_var("ELASTICSEARCH_PASSWORD"),
        ),
    };
    Ok(settings.with_credentials(credentials))
}

/// Build the adapter around a driver
pub fn adapter(driver: HttpDriver) -> Result<Adapter> {
    let conn = Connection::new(NAME, driver);
    Adapter::builder(
        NAME,
        "Elasticsearch full-text search engine (ELASTICSEARCH_URL)",
        conn.clone(),
    )
    .short_name("es")
    .operation(
        OperationDescriptor::builder("es_list_indices", "List indices with health and document counts")
            .read_only()
            .bind(&conn, list_indices),
    )
    .operation(
        OperationDescriptor::builder("es_search", "Search an index with the query DSL")
            .param("index", ParamDescriptor::required(ParamKind::String, "Index name or pattern"))
            .param("query", ParamDescriptor::optional(ParamKind::Object, "Query DSL object (default match_all)"))
            .param("size", ParamDescriptor::optional(ParamKind::Number, "Maximum hits (default 10)"))
            .param("from", ParamDescriptor::optional(ParamKind::Number, "Offset of the first hit"))
            .param("sort", ParamDescriptor::optional(ParamKind::Array, "Sort clauses"))
            .read_only()
            .bind(&conn, search),
    )
    .operation(
        OperationDescriptor::builder("es_get", "Fetch one document by id")
            .param("index", ParamDescriptor::required(ParamKind::String, "Index name"))
            .param("id", ParamDescriptor::required(ParamKind::String, "Document id"))
            .read_only()
            .bind(&conn, get),
    )
    .operation(
        OperationDescriptor::builder("es_index", "Create or replace a document")
            .param("index", ParamDescriptor::required(ParamKind::String, "Index name"))
            .param("document", ParamDescriptor::required(ParamKind::Object, "Document body"))
            .param("id", ParamDescriptor::optional(ParamKind::String, "Document id (generated when omitted)"))
            .param("refresh", ParamDescriptor::optional(ParamKind::Boolean, "Wait until the change is searchable"))
            .bind(&conn, index),
    )
    .operation(
        OperationDescriptor::builder("es_delete", "Delete one document by id")
            .param("index", ParamDescriptor::required(ParamKind::String, "Index name"))
            .param("id", ParamDescriptor::required(ParamKind::String, "Document id"))
            .destructive()
            .bind(&conn, delete),
    )
    .build()
}

async fn list_indices(conn: HttpConnection, _args: Args) -> Result<Value> {
    let indices = conn
        .handle()
        .await?
        .get_with_query(&["_cat", "indices"], &[("format", "json".to_string())])
        .await?;
    let count = indices.as_array().map_or(0, Vec::len);
    Ok(json!({ "count": count, "indices": indices }))
}

async fn search(conn: HttpConnection, args: Args) -> Result<Value> {
    let index = args.required_str("index")?;
    let query = args
        .optional_object("query")?
        .map_or_else(|| json!({ "match_all": {} }), Value::Object);

    let mut body = Map::new();
    body.insert("query".to_string(), query);
    body.insert("size".to_string(), json!(args.optional_u64("size")?.unwrap_or(10)));
    if let Some(from) = args.optional_u64("from")? {
        body.insert("from".to_string(), json!(from));
    }
    if let Some(sort) = args.optional_array("sort")? {
        body.insert("sort".to_string(), Value::Array(sort));
    }

    let response = conn
        .handle()
        .await?
        .post(&[index, "_search"], &Value::Object(body))
        .await?;
    Ok(summarize_hits(&response))
}

/// Keep the parts of a search response callers use
fn summarize_hits(response: &Value) -> Value {
    let hits = &response["hits"];
    let total = hits["total"]
        .get("value")
        .or_else(|| hits.get("total"))
        .cloned()
        .unwrap_or(Value::Null);
    let documents: Vec<Value> = hits["hits"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|h| {
                    json!({
                        "index": h["_index"],
                        "id": h["_id"],
                        "score": h["_score"],
                        "source": h["_source"],
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    json!({
        "total": total,
        "took_ms": response["took"],
        "hits": documents,
    })
}

async fn get(conn: HttpConnection, args: Args) -> Result<Value> {
    let index = args.required_str("index")?;
    let id = args.required_str("id")?;
    conn.handle().await?.get(&[index, "_doc", id]).await
}

async fn index(conn: HttpConnection, args: Args) -> Result<Value> {
    let index = args.required_str("index")?;
    let document = Value::Object(args.required_object("document")?);
    let refresh = args.optional_bool("refresh")?.unwrap_or(false);
    let query: Vec<(&str, String)> = if refresh {
        vec![("refresh", "wait_for".to_string())]
    } else {
        Vec::new()
    };

    let endpoint = conn.handle().await?;
    let request = match args.optional_str("id")? {
        Some(id) => endpoint.request(reqwest::Method::PUT, &[index, "_doc", id])?,
        None => endpoint.request(reqwest::Method::POST, &[index, "_doc"])?,
    };
    endpoint.send(request.query(&query).json(&document)).await
}

async fn delete(conn: HttpConnection, args: Args) -> Result<Value> {
    let index = args.required_str("index")?;
    let id = args.required_str("id")?;
    conn.handle().await?.delete(&[index, "_doc", id], &[]).await
}
