//! Backend adapter contract
//!
//! An [`Adapter`] is a named bundle of [`OperationDescriptor`]s plus the
//! connection lifecycle of one backend. The lifecycle lives behind the
//! [`Lifecycle`] trait so the registry can hold heterogeneous adapters while
//! each one keeps its own driver and handle type private.
//!
//! ```text
//! Adapter ──► operations: name → OperationDescriptor ──► handler(Args)
//!    │                                                       │
//!    └──► Arc<dyn Lifecycle> ◄── Connection<D: Driver> ◄─────┘ (lazy handle)
//! ```

mod args;
mod connection;
mod descriptor;

pub use args::Args;
pub use connection::{Connection, ConnectionState, Driver};
pub use descriptor::{
    Handler, HandlerFuture, OperationBuilder, OperationDescriptor, ParamDescriptor, ParamKind,
    is_valid_name,
};

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::{Error, Result};

/// Connection lifecycle of one adapter.
///
/// `connect` and `disconnect` are idempotent. `is_connected` never fails:
/// it connects if needed, probes, and folds every error into `false`.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Establish the connection if not already held
    async fn connect(&self) -> Result<()>;

    /// Release the connection; no-op when already disconnected
    async fn disconnect(&self) -> Result<()>;

    /// Connect if needed and run a liveness probe
    async fn is_connected(&self) -> bool;

    /// Cached state, no I/O
    fn state(&self) -> ConnectionState;
}

/// A named, described bundle of operations for one backend
pub struct Adapter {
    name: String,
    short_name: Option<String>,
    description: String,
    operations: IndexMap<String, OperationDescriptor>,
    lifecycle: Arc<dyn Lifecycle>,
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("name", &self.name)
            .field("operations", &self.operations.keys().collect::<Vec<_>>())
            .field("state", &self.lifecycle.state())
            .finish()
    }
}

impl Adapter {
    /// Start building an adapter around its lifecycle
    pub fn builder(
        name: impl Into<String>,
        description: impl Into<String>,
        lifecycle: Arc<dyn Lifecycle>,
    ) -> AdapterBuilder {
        AdapterBuilder {
            name: name.into(),
            short_name: None,
            description: description.into(),
            operations: Vec::new(),
            lifecycle,
        }
    }

    /// Registry key
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefix its operation names carry: the short name if one was set,
    /// otherwise the adapter name
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.short_name.as_deref().unwrap_or(&self.name)
    }

    /// Whether `operation` is `<short name>_<rest>`
    #[must_use]
    pub fn is_conventional_operation_name(&self, operation: &str) -> bool {
        operation
            .strip_prefix(self.short_name())
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|rest| !rest.is_empty())
    }

    /// Human description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Operations in declaration order
    #[must_use]
    pub fn operations(&self) -> &IndexMap<String, OperationDescriptor> {
        &self.operations
    }

    /// Look up one of this adapter's operations
    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.get(name)
    }

    /// Operation names in declaration order
    #[must_use]
    pub fn operation_names(&self) -> Vec<&str> {
        self.operations.keys().map(String::as_str).collect()
    }

    /// Establish the backend connection (idempotent)
    pub async fn connect(&self) -> Result<()> {
        self.lifecycle.connect().await
    }

    /// Release the backend connection (idempotent)
    pub async fn disconnect(&self) -> Result<()> {
        self.lifecycle.disconnect().await
    }

    /// Probe the backend, connecting first if needed. Never fails.
    pub async fn is_connected(&self) -> bool {
        self.lifecycle.is_connected().await
    }

    /// Cached connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    /// Full catalogue for `db_help <name>`
    #[must_use]
    pub fn catalogue(&self) -> Value {
        let operations: Vec<Value> = self
            .operations
            .values()
            .map(OperationDescriptor::describe)
            .collect();
        json!({
            "database": self.name,
            "description": self.description,
            "operations": operations,
        })
    }

    /// Check the adapter's own invariants (names, descriptions, non-empty).
    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.name) {
            return Err(Error::Registry(format!(
                "adapter name '{}' must match [a-z][a-z0-9_]*",
                self.name
            )));
        }
        if let Some(short) = &self.short_name {
            if !is_valid_name(short) {
                return Err(Error::Registry(format!(
                    "short name '{short}' of adapter '{}' must match [a-z][a-z0-9_]*",
                    self.name
                )));
            }
        }
        if self.description.trim().is_empty() {
            return Err(Error::Registry(format!(
                "adapter '{}' has an empty description",
                self.name
            )));
        }
        if self.operations.is_empty() {
            return Err(Error::Registry(format!(
                "adapter '{}' declares no operations",
                self.name
            )));
        }
        for op in self.operations.values() {
            op.validate()?;
        }
        Ok(())
    }
}

/// Builder for [`Adapter`]
pub struct AdapterBuilder {
    name: String,
    short_name: Option<String>,
    description: String,
    operations: Vec<OperationDescriptor>,
    lifecycle: Arc<dyn Lifecycle>,
}

impl AdapterBuilder {
    /// Prefix used by operation names when it differs from the adapter name
    #[must_use]
    pub fn short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = Some(short_name.into());
        self
    }

    /// Add an operation
    #[must_use]
    pub fn operation(mut self, operation: OperationDescriptor) -> Self {
        self.operations.push(operation);
        self
    }

    /// Finish, rejecting operation names declared twice by this adapter
    pub fn build(self) -> Result<Adapter> {
        let mut operations = IndexMap::with_capacity(self.operations.len());
        for op in self.operations {
            let name = op.name().to_string();
            if operations.insert(name.clone(), op).is_some() {
                return Err(Error::Registry(format!(
                    "adapter '{}' declares operation '{name}' twice",
                    self.name
                )));
            }
        }
        Ok(Adapter {
            name: self.name,
            short_name: self.short_name,
            description: self.description,
            operations,
            lifecycle: self.lifecycle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Always;

    #[async_trait]
    impl Driver for Always {
        type Handle = ();

        async fn open(&self) -> Result<()> {
            Ok(())
        }

        async fn ping(&self, _handle: &()) -> Result<()> {
            Ok(())
        }
    }

    fn noop(name: &str) -> OperationDescriptor {
        OperationDescriptor::builder(name, "Does nothing")
            .handler(|_args: Args| async { Ok(Value::Null) })
    }

    #[test]
    fn builder_rejects_duplicate_operation() {
        let err = Adapter::builder("alpha", "Alpha store", Connection::new("alpha", Always))
            .operation(noop("alpha_get"))
            .operation(noop("alpha_get"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn operation_prefix_must_end_at_an_underscore() {
        let alpha = Adapter::builder("alpha", "Alpha store", Connection::new("alpha", Always))
            .operation(noop("alpha_get"))
            .build()
            .unwrap();
        assert_eq!(alpha.short_name(), "alpha");
        assert!(alpha.is_conventional_operation_name("alpha_get"));
        assert!(!alpha.is_conventional_operation_name("alphabet_get"));
        assert!(!alpha.is_conventional_operation_name("alpha_"));
        assert!(!alpha.is_conventional_operation_name("beta_get"));
    }

    #[test]
    fn short_name_replaces_the_prefix() {
        let search = Adapter::builder("search", "Search engine", Connection::new("search", Always))
            .short_name("se")
            .operation(noop("se_query"))
            .build()
            .unwrap();
        search.validate().unwrap();
        assert!(search.is_conventional_operation_name("se_query"));
        assert!(!search.is_conventional_operation_name("search_query"));

        let bad = Adapter::builder("search", "Search engine", Connection::new("search", Always))
            .short_name("Se")
            .operation(noop("se_query"))
            .build()
            .unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn validate_requires_operations() {
        let adapter = Adapter::builder("alpha", "Alpha store", Connection::new("alpha", Always))
            .build()
            .unwrap();
        assert!(adapter.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_adapter_name() {
        let adapter = Adapter::builder("Alpha", "Alpha store", Connection::new("Alpha", Always))
            .operation(noop("alpha_get"))
            .build()
            .unwrap();
        assert!(adapter.validate().is_err());
    }

    #[tokio::test]
    async fn lifecycle_delegates() {
        let adapter = Adapter::builder("alpha", "Alpha store", Connection::new("alpha", Always))
            .operation(noop("alpha_get"))
            .operation(noop("alpha_put"))
            .build()
            .unwrap();
        assert_eq!(adapter.state(), ConnectionState::Disconnected);
        assert!(adapter.is_connected().await);
        assert_eq!(adapter.state(), ConnectionState::Connected);
        adapter.disconnect().await.unwrap();
        assert_eq!(adapter.state(), ConnectionState::Disconnected);
        assert_eq!(adapter.operation_names(), vec!["alpha_get", "alpha_put"]);
        assert_eq!(adapter.catalogue()["operations"][1]["name"], "alpha_put");
    }
}
