//! Argument bag handed to operation handlers
//!
//! The gateway forwards whatever object the caller sent. Handlers use these
//! accessors to decide what is required; every refusal is an
//! [`Error::Validation`] so it is reported apart from backend failures.

use serde_json::{Map, Value};

use crate::{Error, Result};

/// Named arguments of one invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    inner: Map<String, Value>,
}

impl Args {
    /// Wrap a JSON value. `null` becomes an empty bag; stringified JSON
    /// objects are accepted as well.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(inner) => Ok(Self { inner }),
            Value::String(raw) => {
                let parsed: Value = serde_json::from_str(&raw).map_err(|e| {
                    Error::Validation(format!("arguments string is not valid JSON: {e}"))
                })?;
                match parsed {
                    Value::Object(inner) => Ok(Self { inner }),
                    _ => Err(Error::Validation(
                        "arguments must be a JSON object".to_string(),
                    )),
                }
            }
            _ => Err(Error::Validation(
                "arguments must be a JSON object".to_string(),
            )),
        }
    }

    /// Raw access
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key).filter(|v| !v.is_null())
    }

    /// Whether no arguments were given
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Back to a plain JSON object
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.inner)
    }

    /// Required non-empty string
    pub fn required_str(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
            Some(Value::String(_)) => Err(Error::Validation(format!("'{key}' must not be empty"))),
            Some(_) => Err(Error::Validation(format!("'{key}' must be a string"))),
            None => Err(missing(key)),
        }
    }

    /// Optional string
    pub fn optional_str(&self, key: &str) -> Result<Option<&str>> {
        match self.get(key) {
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(Error::Validation(format!("'{key}' must be a string"))),
            None => Ok(None),
        }
    }

    /// Optional non-negative integer
    pub fn optional_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key) {
            Some(v) => v
                .as_u64()
                .map(Some)
                .ok_or_else(|| Error::Validation(format!("'{key}' must be a non-negative integer"))),
            None => Ok(None),
        }
    }

    /// Optional number
    pub fn optional_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| Error::Validation(format!("'{key}' must be a number"))),
            None => Ok(None),
        }
    }

    /// Optional boolean
    pub fn optional_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(Error::Validation(format!("'{key}' must be a boolean"))),
            None => Ok(None),
        }
    }

    /// Required JSON object; stringified objects are parsed
    pub fn required_object(&self, key: &str) -> Result<Map<String, Value>> {
        self.optional_object(key)?.ok_or_else(|| missing(key))
    }

    /// Optional JSON object; stringified objects are parsed
    pub fn optional_object(&self, key: &str) -> Result<Option<Map<String, Value>>> {
        match self.get(key) {
            Some(Value::Object(map)) => Ok(Some(map.clone())),
            Some(Value::String(raw)) => match serde_json::from_str(raw) {
                Ok(Value::Object(map)) => Ok(Some(map)),
                Ok(_) => Err(Error::Validation(format!("'{key}' must be a JSON object"))),
                Err(e) => Err(Error::Validation(format!("'{key}' is not valid JSON: {e}"))),
            },
            Some(_) => Err(Error::Validation(format!("'{key}' must be a JSON object"))),
            None => Ok(None),
        }
    }

    /// Required JSON array; stringified arrays are parsed
    pub fn required_array(&self, key: &str) -> Result<Vec<Value>> {
        self.optional_array(key)?.ok_or_else(|| missing(key))
    }

    /// Optional JSON array; stringified arrays are parsed
    pub fn optional_array(&self, key: &str) -> Result<Option<Vec<Value>>> {
        match self.get(key) {
            Some(Value::Array(items)) => Ok(Some(items.clone())),
            Some(Value::String(raw)) => match serde_json::from_str(raw) {
                Ok(Value::Array(items)) => Ok(Some(items)),
                Ok(_) => Err(Error::Validation(format!("'{key}' must be a JSON array"))),
                Err(e) => Err(Error::Validation(format!("'{key}' is not valid JSON: {e}"))),
            },
            Some(_) => Err(Error::Validation(format!("'{key}' must be a JSON array"))),
            None => Ok(None),
        }
    }
}

fn missing(key: &str) -> Error {
    Error::Validation(format!("missing required argument '{key}'"))
}
