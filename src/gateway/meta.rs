//! Gateway-owned discovery operations: `db_list`, `db_help`, `db_status`
//!
//! Tool definitions and the pure response builders live here so they can be
//! tested without a registry or any backend.

use serde_json::{Value, json};

use crate::adapter::Adapter;
use crate::protocol::{Tool, ToolAnnotations};

/// List every registered database
pub const DB_LIST: &str = "db_list";
/// Describe databases and their operations
pub const DB_HELP: &str = "db_help";
/// Report connectivity of every database
pub const DB_STATUS: &str = "db_status";

/// Whether `name` is one of the gateway's own operations
#[must_use]
pub fn is_meta_operation(name: &str) -> bool {
    matches!(name, DB_LIST | DB_HELP | DB_STATUS)
}

fn read_only() -> Option<ToolAnnotations> {
    Some(ToolAnnotations {
        read_only_hint: Some(true),
        destructive_hint: Some(false),
        open_world_hint: Some(false),
    })
}

/// Tool definitions for the discovery operations, in listing order
#[must_use]
pub fn build_meta_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: DB_LIST.to_string(),
            title: Some("List Databases".to_string()),
            description: Some(
                "List all available databases with their operations. \
                 Set check_connections to also probe each backend."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "check_connections": {
                        "type": "boolean",
                        "description": "Probe every backend and include a 'connected' flag (default false)",
                        "default": false
                    }
                }
            }),
            annotations: read_only(),
        },
        Tool {
            name: DB_HELP.to_string(),
            title: Some("Database Help".to_string()),
            description: Some(
                "Describe the available databases. Pass database to get the full \
                 parameter list of every operation it offers."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "database": {
                        "type": "string",
                        "description": "Database name as returned by db_list. Omit for an overview."
                    }
                }
            }),
            annotations: read_only(),
        },
        Tool {
            name: DB_STATUS.to_string(),
            title: Some("Database Status".to_string()),
            description: Some("Check which databases are currently reachable".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
            annotations: read_only(),
        },
    ]
}

/// One `db_list` entry; `connected` is present only when probed
#[must_use]
pub fn build_list_entry(adapter: &Adapter, connected: Option<bool>) -> Value {
    let mut entry = json!({
        "name": adapter.name(),
        "description": adapter.description(),
        "operations": adapter.operation_names(),
    });
    if let (Some(connected), Some(obj)) = (connected, entry.as_object_mut()) {
        obj.insert("connected".to_string(), Value::Bool(connected));
    }
    entry
}

/// `db_list` response
#[must_use]
pub fn build_list_response(entries: Vec<Value>) -> Value {
    json!({
        "total": entries.len(),
        "databases": entries,
    })
}

/// `db_help` overview when no database is named
#[must_use]
pub fn build_help_overview<'a>(adapters: impl Iterator<Item = &'a Adapter>) -> Value {
    let mut total_operations = 0;
    let databases: Vec<Value> = adapters
        .map(|a| {
            total_operations += a.operations().len();
            json!({
                "name": a.name(),
                "description": a.description(),
                "operation_count": a.operations().len(),
            })
        })
        .collect();
    let meta: Vec<Value> = build_meta_tools()
        .into_iter()
        .map(|t| json!({ "name": t.name, "description": t.description }))
        .collect();
    json!({
        "databases": databases,
        "total_operations": total_operations,
        "meta_operations": meta,
        "hint": "Call db_help with database=<name> for the parameters of each operation",
    })
}

/// `db_status` response: names partitioned by reachability, registration order kept
#[must_use]
pub fn build_status_response(probes: &[(&str, bool)]) -> Value {
    let connected: Vec<&str> = probes.iter().filter(|(_, up)| *up).map(|(n, _)| *n).collect();
    let disconnected: Vec<&str> = probes.iter().filter(|(_, up)| !*up).map(|(n, _)| *n).collect();
    json!({
        "summary": format!("{}/{} databases connected", connected.len(), probes.len()),
        "connected": connected,
        "disconnected": disconnected,
    })
}
