//! Error types for the database gateway

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for the database gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Database gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (gateway or adapter settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend unreachable, refused the connection, or rejected authentication
    #[error("Connection error: {0}")]
    Connectivity(String),

    /// No operation with this name exists in the registry
    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    /// No adapter with this name exists in the registry
    #[error("Unknown database: {0}")]
    AdapterNotFound(String),

    /// Arguments missing or malformed; nothing was sent to the backend
    #[error("Invalid arguments: {0}")]
    Validation(String),

    /// The backend accepted the call but failed executing it
    #[error("Backend error: {0}")]
    Backend(String),

    /// The invocation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Registry construction invariant violated (startup only)
    #[error("Registry error: {0}")]
    Registry(String),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Caller-facing classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Adapter cannot build its connection from its settings
    Configuration,
    /// Backend unreachable or authentication rejected
    Connectivity,
    /// Unknown operation name
    OperationNotFound,
    /// Unknown adapter name
    AdapterNotFound,
    /// Handler refused its arguments
    Validation,
    /// Backend failed while executing the call
    BackendExecution,
    /// Deadline exceeded
    Timeout,
    /// Anything else, including handler panics
    Internal,
}

impl ErrorKind {
    /// Whether this is an expected, caller-facing condition rather than a fault
    #[must_use]
    pub fn is_caller_error(self) -> bool {
        matches!(
            self,
            Self::OperationNotFound | Self::AdapterNotFound | Self::Validation
        )
    }
}

impl Error {
    /// Classify this error into the caller-facing taxonomy
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Connectivity(_) | Self::Transport(_) => ErrorKind::Connectivity,
            Self::OperationNotFound(_) => ErrorKind::OperationNotFound,
            Self::AdapterNotFound(_) => ErrorKind::AdapterNotFound,
            Self::Validation(_) | Self::Json(_) => ErrorKind::Validation,
            Self::Backend(_) => ErrorKind::BackendExecution,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Registry(_)
            | Self::Protocol(_)
            | Self::Io(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            Self::Protocol(_) => rpc_codes::INVALID_REQUEST,
            Self::Validation(_) => rpc_codes::INVALID_PARAMS,
            Self::OperationNotFound(_) => rpc_codes::METHOD_NOT_FOUND,
            Self::AdapterNotFound(_) => -32001,
            Self::Connectivity(_) | Self::Timeout(_) | Self::Transport(_) | Self::Backend(_) => {
                rpc_codes::SERVER_ERROR_START
            }
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connectivity(e.to_string())
        } else if e.is_builder() {
            Self::Config(e.to_string())
        } else if e.is_decode() {
            Self::Backend(format!("undecodable response: {e}"))
        } else {
            Self::Backend(e.to_string())
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::NotADatabase
                        | rusqlite::ErrorCode::PermissionDenied
                ) =>
            {
                Self::Connectivity(e.to_string())
            }
            rusqlite::Error::InvalidParameterCount(..)
            | rusqlite::Error::InvalidParameterName(_)
            | rusqlite::Error::MultipleStatement => Self::Validation(e.to_string()),
            other => Self::Backend(other.to_string()),
        }
    }
}

/// Standard JSON-RPC error codes
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// First code of the implementation-defined server error range
    pub const SERVER_ERROR_START: i32 = -32000;
}
