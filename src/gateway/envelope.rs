//! Response envelope: the one shape every invocation produces

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ErrorKind};
use crate::protocol::{Content, ToolsCallResult};

/// Attributed failure of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// Taxonomy bucket
    pub kind: ErrorKind,
    /// Underlying message, never swallowed
    pub message: String,
    /// Operation that was invoked, when one was resolved
    pub operation: Option<String>,
    /// Adapter owning that operation, when one was resolved
    pub adapter: Option<String>,
}

/// Success or attributed failure. Exactly one is ever populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEnvelope", try_from = "WireEnvelope")]
pub enum Envelope {
    /// Handler returned a value
    Success(Value),
    /// Anything went wrong
    Failure(Failure),
}

impl Envelope {
    /// Wrap an error with whatever attribution is known
    #[must_use]
    pub fn failed(error: &Error, operation: Option<&str>, adapter: Option<&str>) -> Self {
        Self::Failure(Failure {
            kind: error.kind(),
            message: error.to_string(),
            operation: operation.map(ToString::to_string),
            adapter: adapter.map(ToString::to_string),
        })
    }

    /// Wrap a failure that could not be attributed to an operation
    #[must_use]
    pub fn unattributed(error: &Error) -> Self {
        Self::failed(error, None, None)
    }

    /// Wrap a failure raised by (or on behalf of) a resolved operation
    #[must_use]
    pub fn attributed(error: &Error, operation: &str, adapter: &str) -> Self {
        Self::failed(error, Some(operation), Some(adapter))
    }

    /// Normalise a handler outcome
    #[must_use]
    pub fn from_result(result: crate::Result<Value>, operation: &str, adapter: &str) -> Self {
        match result {
            Ok(payload) => Self::Success(payload),
            Err(e) => Self::attributed(&e, operation, adapter),
        }
    }

    /// Whether this is a success
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The failure, if any
    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(f) => Some(f),
            Self::Success(_) => None,
        }
    }

    /// The payload, if any
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Success(v) => Some(v),
            Self::Failure(_) => None,
        }
    }

    /// Envelope as a JSON object
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(WireEnvelope::from(self.clone())).unwrap_or(Value::Null)
    }

    /// MCP `tools/call` result carrying this envelope
    #[must_use]
    pub fn into_tool_result(self) -> ToolsCallResult {
        let is_error = !self.is_success();
        let structured = self.to_value();
        ToolsCallResult {
            content: vec![Content::Text {
                text: serde_json::to_string_pretty(&structured).unwrap_or_default(),
            }],
            structured_content: Some(structured),
            is_error,
        }
    }
}

/// Serialized form: same keys for both outcomes, one of them null
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireEnvelope {
    success: bool,
    result: Option<Value>,
    error: Option<Failure>,
}

impl From<Envelope> for WireEnvelope {
    fn from(envelope: Envelope) -> Self {
        match envelope {
            Envelope::Success(payload) => Self {
                success: true,
                result: Some(payload),
                error: None,
            },
            Envelope::Failure(failure) => Self {
                success: false,
                result: None,
                error: Some(failure),
            },
        }
    }
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = String;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        match (wire.success, wire.result, wire.error) {
            (false, None, Some(failure)) => Ok(Self::Failure(failure)),
            (true, result, None) => Ok(Self::Success(result.unwrap_or(Value::Null))),
            _ => Err("envelope must carry exactly one of result or error".to_string()),
        }
    }
}
