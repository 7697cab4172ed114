//! Embedded relational store (SQLite)
//!
//! `rusqlite` is blocking, so every statement runs on the blocking pool.
//! The handle is one connection behind a mutex; SQLite serialises writers
//! anyway and this keeps the adapter's state to a single slot.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection as SqliteConnection, params_from_iter};
use serde_json::{Map, Number, Value, json};

use super::http::require_env;
use crate::adapter::{
    Adapter, Args, Connection, Driver, OperationDescriptor, ParamDescriptor, ParamKind,
};
use crate::{Error, Result};

/// Adapter name
pub const NAME: &str = "sqlite";

/// Rows returned by `sqlite_query` when no limit is given
const DEFAULT_ROW_LIMIT: u64 = 1000;

/// Opens the database file named by `SQLITE_PATH` or an explicit path
#[derive(Debug, Clone, Default)]
pub struct SqliteDriver {
    path: Option<PathBuf>,
}

impl SqliteDriver {
    /// Read `SQLITE_PATH` at connect time
    #[must_use]
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Use a fixed database file
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    fn resolve_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => require_env("SQLITE_PATH").map(PathBuf::from),
        }
    }
}

/// Open SQLite connection
pub struct SqliteHandle {
    conn: Mutex<SqliteConnection>,
}

impl SqliteHandle {
    /// Run `f` against the connection on the blocking pool
    async fn run<T, F>(self: Arc<Self>, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteConnection) -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(move || f(&self.conn.lock()))
            .await
            .map_err(|e| Error::Internal(format!("sqlite worker failed: {e}")))?
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    type Handle = SqliteHandle;

    async fn open(&self) -> Result<SqliteHandle> {
        let path = self.resolve_path()?;
        let conn = tokio::task::spawn_blocking(move || -> Result<SqliteConnection> {
            let conn = SqliteConnection::open(&path)?;
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(conn)
        })
        .await
        .map_err(|e| Error::Internal(format!("sqlite worker failed: {e}")))??;
        Ok(SqliteHandle {
            conn: Mutex::new(conn),
        })
    }

    async fn ping(&self, handle: &SqliteHandle) -> Result<()> {
        // Held by a running statement means the connection is alive; never
        // block the runtime waiting for it.
        match handle.conn.try_lock() {
            Some(db) => db.query_row("SELECT 1", [], |_| Ok(())).map_err(Error::from),
            None => Ok(()),
        }
    }
}

/// Build the adapter around a driver
pub fn adapter(driver: SqliteDriver) -> Result<Adapter> {
    let conn = Connection::new(NAME, driver);
    Adapter::builder(
        NAME,
        "SQLite embedded relational database (file named by SQLITE_PATH)",
        conn.clone(),
    )
    .operation(
        OperationDescriptor::builder("sqlite_query", "Run a read-only SQL statement and return its rows")
            .param("sql", ParamDescriptor::required(ParamKind::String, "SELECT (or other read-only) statement; use ? placeholders"))
            .param("params", ParamDescriptor::optional(ParamKind::Array, "Values bound to the ? placeholders, in order"))
            .param("limit", ParamDescriptor::optional(ParamKind::Number, "Maximum rows to return (default 1000)"))
            .read_only()
            .bind(&conn, query),
    )
    .operation(
        OperationDescriptor::builder("sqlite_execute", "Run one data-changing SQL statement (INSERT, UPDATE, DELETE, DDL)")
            .param("sql", ParamDescriptor::required(ParamKind::String, "Single SQL statement; use ? placeholders"))
            .param("params", ParamDescriptor::optional(ParamKind::Array, "Values bound to the ? placeholders, in order"))
            .destructive()
            .bind(&conn, execute),
    )
    .operation(
        OperationDescriptor::builder("sqlite_list_tables", "List tables and views")
            .read_only()
            .bind(&conn, list_tables),
    )
    .operation(
        OperationDescriptor::builder("sqlite_describe_table", "Show the columns of a table")
            .param("table", ParamDescriptor::required(ParamKind::String, "Table name"))
            .read_only()
            .bind(&conn, describe_table),
    )
    .build()
}

async fn query(conn: Arc<Connection<SqliteDriver>>, args: Args) -> Result<Value> {
    let sql = args.required_str("sql")?.to_string();
    let params = bind_values(args.optional_array("params")?.unwrap_or_default())?;
    let limit = args.optional_u64("limit")?.unwrap_or(DEFAULT_ROW_LIMIT);

    conn.handle()
        .await?
        .run(move |db| {
            let mut stmt = db.prepare(&sql)?;
            if !stmt.readonly() {
                return Err(Error::Validation(
                    "sqlite_query only runs read-only statements; use sqlite_execute".to_string(),
                ));
            }
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query(params_from_iter(params))?;

            let mut out = Vec::new();
            let mut truncated = false;
            while let Some(row) = rows.next()? {
                if out.len() as u64 >= limit {
                    truncated = true;
                    break;
                }
                let mut record = Map::with_capacity(columns.len());
                for (i, name) in columns.iter().enumerate() {
                    record.insert(name.clone(), to_json(row.get_ref(i)?));
                }
                out.push(Value::Object(record));
            }

            Ok(json!({
                "columns": columns,
                "row_count": out.len(),
                "truncated": truncated,
                "rows": out,
            }))
        })
        .await
}

async fn execute(conn: Arc<Connection<SqliteDriver>>, args: Args) -> Result<Value> {
    let sql = args.required_str("sql")?.to_string();
    let params = bind_values(args.optional_array("params")?.unwrap_or_default())?;

    conn.handle()
        .await?
        .run(move |db| {
            let mut stmt = db.prepare(&sql)?;
            let affected = stmt.execute(params_from_iter(params))?;
            Ok(json!({
                "rows_affected": affected,
                "last_insert_rowid": db.last_insert_rowid(),
            }))
        })
        .await
}

async fn list_tables(conn: Arc<Connection<SqliteDriver>>, _args: Args) -> Result<Value> {
    conn.handle()
        .await?
        .run(|db| {
            let mut stmt = db.prepare(
                "SELECT name, type FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            )?;
            let tables = stmt
                .query_map([], |row| {
                    Ok(json!({
                        "name": row.get::<_, String>(0)?,
                        "type": row.get::<_, String>(1)?,
                    }))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(json!({ "count": tables.len(), "tables": tables }))
        })
        .await
}

async fn describe_table(conn: Arc<Connection<SqliteDriver>>, args: Args) -> Result<Value> {
    let table = args.required_str("table")?.to_string();

    conn.handle()
        .await?
        .run(move |db| {
            let mut stmt = db.prepare(
                "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1)",
            )?;
            let columns = stmt
                .query_map([table.as_str()], |row| {
                    Ok(json!({
                        "name": row.get::<_, String>(0)?,
                        "type": row.get::<_, String>(1)?,
                        "nullable": row.get::<_, i64>(2)? == 0,
                        "default": row.get::<_, Option<String>>(3)?,
                        "primary_key": row.get::<_, i64>(4)? > 0,
                    }))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            if columns.is_empty() {
                return Err(Error::Backend(format!("no such table: {table}")));
            }
            Ok(json!({ "table": table, "columns": columns }))
        })
        .await
}

/// JSON arguments to SQL values. Nested structures are bound as JSON text.
fn bind_values(values: Vec<Value>) -> Result<Vec<SqlValue>> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| match v {
            Value::Null => Ok(SqlValue::Null),
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(b))),
            Value::Number(n) => n
                .as_i64()
                .map(SqlValue::Integer)
                .or_else(|| n.as_f64().map(SqlValue::Real))
                .ok_or_else(|| Error::Validation(format!("params[{i}] is out of range"))),
            Value::String(s) => Ok(SqlValue::Text(s)),
            nested @ (Value::Array(_) | Value::Object(_)) => Ok(SqlValue::Text(nested.to_string())),
        })
        .collect()
}

/// SQL column value to JSON. Blobs are base64 encoded.
fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(BASE64.encode(b)),
    }
}
