//! MCP Database Gateway Library
//!
//! One Model Context Protocol tool surface over many database backends.
//!
//! # Features
//!
//! - **Adapter registry**: every backend publishes named, described
//!   operations; names are validated once at startup and dispatched with a
//!   single lookup
//! - **Lazy connections**: adapters connect on first use, race-free
//! - **Uniform envelopes**: every call answers `{success, result, error}`
//! - **Discovery**: `db_list`, `db_help` and `db_status` meta-operations
//! - **Transports**: stdio and HTTP (`POST /mcp`)
//!
//! # Protocol Version
//!
//! Implements MCP protocol versions 2024-11-05 through 2025-06-18.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod backends;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging. Logs go to stderr; stdout carries the stdio transport.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| Error::Config(format!("invalid log level '{level}': {e}")))?;

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|e| Error::Internal(format!("failed to install tracing subscriber: {e}")))
}
