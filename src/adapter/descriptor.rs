//! Parameter and operation descriptors

use std::future::Future;
use std::sync::Arc;
use std::sync::LazyLock;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::args::Args;
use super::connection::{Connection, Driver};
use crate::protocol::{Tool, ToolAnnotations};
use crate::{Error, Result};

/// Lowercase identifier starting with a letter: `[a-z][a-z0-9_]*`
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());

/// Check a name against the adapter/operation naming convention.
pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

/// Semantic type of an operation parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// UTF-8 string
    String,
    /// JSON number (integer or float)
    Number,
    /// `true` / `false`
    Boolean,
    /// JSON object
    Object,
    /// JSON array
    Array,
}

impl ParamKind {
    /// JSON Schema `type` keyword for this kind
    #[must_use]
    pub fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// One named input to an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamDescriptor {
    /// Semantic type
    #[serde(rename = "type")]
    pub kind: ParamKind,
    /// Human description
    pub description: String,
    /// Advertised as required. Handlers enforce this themselves.
    pub required: bool,
}

impl ParamDescriptor {
    /// A parameter the handler refuses to run without
    pub fn required(kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            required: true,
        }
    }

    /// A parameter the handler can do without
    pub fn optional(kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            required: false,
        }
    }
}

/// Boxed future returned by every handler
pub type HandlerFuture = BoxFuture<'static, Result<Value>>;

/// Type-erased operation handler
pub type Handler = Arc<dyn Fn(Args) -> HandlerFuture + Send + Sync>;

/// One invocable unit of work
#[derive(Clone)]
pub struct OperationDescriptor {
    name: String,
    description: String,
    parameters: IndexMap<String, ParamDescriptor>,
    read_only: bool,
    destructive: bool,
    handler: Handler,
}

impl std::fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("name", &self.name)
            .field("parameters", &self.parameters.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl OperationDescriptor {
    /// Start describing an operation
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> OperationBuilder {
        OperationBuilder {
            name: name.into(),
            description: description.into(),
            parameters: IndexMap::new(),
            read_only: false,
            destructive: false,
        }
    }

    /// Globally unique operation name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Parameters in declaration order
    #[must_use]
    pub fn parameters(&self) -> &IndexMap<String, ParamDescriptor> {
        &self.parameters
    }

    /// Whether the operation never modifies backend state
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the operation may delete or overwrite data
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        self.destructive
    }

    /// Run the handler. Errors are returned, never thrown past this call.
    pub fn call(&self, args: Args) -> HandlerFuture {
        (self.handler)(args)
    }

    /// Check the descriptor's own invariants.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.name) {
            return Err(Error::Registry(format!(
                "operation name '{}' must match [a-z][a-z0-9_]*",
                self.name
            )));
        }
        if self.description.trim().is_empty() {
            return Err(Error::Registry(format!(
                "operation '{}' has an empty description",
                self.name
            )));
        }
        for (param, descriptor) in &self.parameters {
            if descriptor.description.trim().is_empty() {
                return Err(Error::Registry(format!(
                    "parameter '{param}' of operation '{}' has an empty description",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// JSON Schema for the argument object
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, param) in &self.parameters {
            properties.insert(
                name.clone(),
                json!({
                    "type": param.kind.json_type(),
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(Value::String(name.clone()));
            }
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = Value::Array(required);
        }
        schema
    }

    /// MCP tool definition for `tools/list`
    #[must_use]
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: self.name.clone(),
            title: None,
            description: Some(self.description.clone()),
            input_schema: self.input_schema(),
            annotations: Some(ToolAnnotations {
                read_only_hint: Some(self.read_only),
                destructive_hint: Some(self.destructive),
                open_world_hint: Some(true),
            }),
        }
    }

    /// Catalogue entry used by `db_help`
    #[must_use]
    pub fn describe(&self) -> Value {
        let parameters: Vec<Value> = self
            .parameters
            .iter()
            .map(|(name, p)| {
                json!({
                    "name": name,
                    "type": p.kind,
                    "description": p.description,
                    "required": p.required,
                })
            })
            .collect();
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": parameters,
            "read_only": self.read_only,
            "destructive": self.destructive,
        })
    }
}

/// Builder for [`OperationDescriptor`]; finished by attaching a handler
#[derive(Debug)]
pub struct OperationBuilder {
    name: String,
    description: String,
    parameters: IndexMap<String, ParamDescriptor>,
    read_only: bool,
    destructive: bool,
}

impl OperationBuilder {
    /// Declare a parameter. Redeclaring a name replaces the earlier entry.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, descriptor: ParamDescriptor) -> Self {
        self.parameters.insert(name.into(), descriptor);
        self
    }

    /// Mark as side-effect free
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Mark as able to delete or overwrite data
    #[must_use]
    pub fn destructive(mut self) -> Self {
        self.destructive = true;
        self
    }

    /// Attach a handler that takes only the arguments
    pub fn handler<F, Fut>(self, f: F) -> OperationDescriptor
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        OperationDescriptor {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
            read_only: self.read_only,
            destructive: self.destructive,
            handler: Arc::new(move |args| Box::pin(f(args))),
        }
    }

    /// Attach a handler that also receives the adapter's connection slot.
    ///
    /// The handler decides when to call [`Connection::handle`], so argument
    /// validation can fail before any connection is attempted.
    pub fn bind<D, F, Fut>(self, connection: &Arc<Connection<D>>, f: F) -> OperationDescriptor
    where
        D: Driver,
        F: Fn(Arc<Connection<D>>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let connection = Arc::clone(connection);
        self.handler(move |args| f(Arc::clone(&connection), args))
    }
}
