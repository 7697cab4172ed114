//! Compiled-in adapters
//!
//! Each adapter reads its connection settings from the environment on first
//! use, so building the set never touches the network and never fails
//! because a backend is unconfigured.

pub mod couchdb;
pub mod elasticsearch;
pub mod http;
pub mod neo4j;
pub mod qdrant;
pub mod sqlite;

use tracing::{debug, warn};

use crate::Result;
use crate::adapter::Adapter;
use crate::config::Config;
use self::http::HttpDriver;
use self::sqlite::SqliteDriver;

/// Names of every compiled-in adapter, in registration order
pub const BUILTIN: &[&str] = &[
    sqlite::NAME,
    elasticsearch::NAME,
    couchdb::NAME,
    qdrant::NAME,
    neo4j::NAME,
];

/// Every compiled-in adapter, configured from the environment
pub fn builtin_adapters() -> Result<Vec<Adapter>> {
    Ok(vec![
        sqlite::adapter(SqliteDriver::from_env())?,
        elasticsearch::adapter(HttpDriver::from_env(elasticsearch::settings_from_env))?,
        couchdb::adapter(HttpDriver::from_env(couchdb::settings_from_env))?,
        qdrant::adapter(HttpDriver::from_env(qdrant::settings_from_env))?,
        neo4j::adapter(HttpDriver::from_env(neo4j::settings_from_env), None)?,
    ])
}

/// The compiled-in adapters minus those listed in `gateway.disabled`
pub fn enabled_adapters(config: &Config) -> Result<Vec<Adapter>> {
    for name in &config.gateway.disabled {
        if !BUILTIN.contains(&name.as_str()) {
            warn!(adapter = %name, "Disabled adapter does not exist");
        }
    }

    let adapters: Vec<Adapter> = builtin_adapters()?
        .into_iter()
        .filter(|adapter| {
            let disabled = config.is_disabled(adapter.name());
            if disabled {
                debug!(adapter = %adapter.name(), "Adapter disabled by configuration");
            }
            !disabled
        })
        .collect();
    Ok(adapters)
}
