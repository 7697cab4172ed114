//! Document store (Apache CouchDB)

use serde_json::{Map, Value, json};

use super::http::{Credentials, HttpConnection, HttpDriver, HttpSettings, env_var, require_env};
use crate::adapter::{Adapter, Args, Connection, OperationDescriptor, ParamDescriptor, ParamKind};
use crate::Result;

/// Adapter name
pub const NAME: &str = "couchdb";

/// Settings from `COUCHDB_URL`, `COUCHDB_USER` and `COUCHDB_PASSWORD`
pub fn settings_from_env() -> Result<HttpSettings> {
    Ok(HttpSettings::new(&require_env("COUCHDB_URL")?)?.with_credentials(Credentials::basic(
        env_var("COUCHDB_USER"),
        env_var("COUCHDB_PASSWORD"),
    )))
}

/// Build the adapter around a driver. Liveness is checked against `/_up`.
pub fn adapter(driver: HttpDriver) -> Result<Adapter> {
    let conn = Connection::new(NAME, driver.probe_path(&["_up"]));
    Adapter::builder(NAME, "Apache CouchDB document database (COUCHDB_URL)", conn.clone())
        .operation(
            OperationDescriptor::builder("couchdb_list_databases", "List all databases")
                .read_only()
                .bind(&conn, list_databases),
        )
        .operation(
            OperationDescriptor::builder("couchdb_get", "Fetch one document by id")
                .param("database", ParamDescriptor::required(ParamKind::String, "Database name"))
                .param("id", ParamDescriptor::required(ParamKind::String, "Document id"))
                .read_only()
                .bind(&conn, get),
        )
        .operation(
            OperationDescriptor::builder("couchdb_find", "Query documents with a Mango selector")
                .param("database", ParamDescriptor::required(ParamKind::String, "Database name"))
                .param("selector", ParamDescriptor::required(ParamKind::Object, "Mango selector, e.g. {\"type\": \"user\"}"))
                .param("fields", ParamDescriptor::optional(ParamKind::Array, "Fields to return"))
                .param("sort", ParamDescriptor::optional(ParamKind::Array, "Sort clauses"))
                .param("limit", ParamDescriptor::optional(ParamKind::Number, "Maximum documents (default 25)"))
                .read_only()
                .bind(&conn, find),
        )
        .operation(
            OperationDescriptor::builder("couchdb_put", "Create or update a document")
                .param("database", ParamDescriptor::required(ParamKind::String, "Database name"))
                .param("document", ParamDescriptor::required(ParamKind::Object, "Document body; include _rev to update"))
                .param("id", ParamDescriptor::optional(ParamKind::String, "Document id (generated when omitted)"))
                .bind(&conn, put),
        )
        .operation(
            OperationDescriptor::builder("couchdb_delete", "Delete one revision of a document")
                .param("database", ParamDescriptor::required(ParamKind::String, "Database name"))
                .param("id", ParamDescriptor::required(ParamKind::String, "Document id"))
                .param("rev", ParamDescriptor::required(ParamKind::String, "Current revision (_rev)"))
                .destructive()
                .bind(&conn, delete),
        )
        .build()
}

async fn list_databases(conn: HttpConnection, _args: Args) -> Result<Value> {
    let databases = conn.handle().await?.get(&["_all_dbs"]).await?;
    let count = databases.as_array().map_or(0, Vec::len);
    Ok(json!({ "count": count, "databases": databases }))
}

async fn get(conn: HttpConnection, args: Args) -> Result<Value> {
    let database = args.required_str("database")?;
    let id = args.required_str("id")?;
    conn.handle().await?.get(&[database, id]).await
}

async fn find(conn: HttpConnection, args: Args) -> Result<Value> {
    let database = args.required_str("database")?;
    let mut body = Map::new();
    body.insert("selector".to_string(), Value::Object(args.required_object("selector")?));
    body.insert("limit".to_string(), json!(args.optional_u64("limit")?.unwrap_or(25)));
    if let Some(fields) = args.optional_array("fields")? {
        body.insert("fields".to_string(), Value::Array(fields));
    }
    if let Some(sort) = args.optional_array("sort")? {
        body.insert("sort".to_string(), Value::Array(sort));
    }

    let response = conn
        .handle()
        .await?
        .post(&[database, "_find"], &Value::Object(body))
        .await?;
    let docs = response.get("docs").cloned().unwrap_or_else(|| json!([]));
    Ok(json!({
        "count": docs.as_array().map_or(0, Vec::len),
        "docs": docs,
        "warning": response.get("warning"),
    }))
}

async fn put(conn: HttpConnection, args: Args) -> Result<Value> {
    let database = args.required_str("database")?;
    let document = Value::Object(args.required_object("document")?);
    let endpoint = conn.handle().await?;
    match args.optional_str("id")? {
        Some(id) => endpoint.put(&[database, id], &document).await,
        None => endpoint.post(&[database], &document).await,
    }
}

async fn delete(conn: HttpConnection, args: Args) -> Result<Value> {
    let database = args.required_str("database")?;
    let id = args.required_str("id")?;
    let rev = args.required_str("rev")?.to_string();
    conn.handle()
        .await?
        .delete(&[database, id], &[("rev", rev)])
        .await
}
