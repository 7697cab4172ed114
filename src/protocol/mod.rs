//! MCP protocol types (JSON-RPC 2.0 framing plus the tool subset)

mod messages;
mod types;

pub use messages::*;
pub use types::*;

/// Latest MCP protocol version spoken by the gateway
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol versions the gateway accepts, newest first
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Pick the protocol version to answer a client with.
///
/// Echoes the client's version when supported, otherwise the latest.
#[must_use]
pub fn negotiate_version(client_version: &str) -> &'static str {
    SUPPORTED_VERSIONS
        .iter()
        .find(|v| **v == client_version)
        .copied()
        .unwrap_or(PROTOCOL_VERSION)
}
