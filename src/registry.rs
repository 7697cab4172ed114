//! Adapter registry
//!
//! Built once at startup from the compiled-in adapter set. Construction
//! validates every naming invariant and flattens all operations into one
//! table so dispatch is a single hash lookup. Membership never changes
//! afterwards; only the adapters' connection state does.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, OperationDescriptor};
use crate::{Error, Result};

/// Operation names owned by the gateway itself
pub const RESERVED_OPERATIONS: &[&str] = &["db_list", "db_help", "db_status"];

/// Location of one operation in the flattened table
#[derive(Debug, Clone, Copy)]
struct Route {
    adapter: usize,
    operation: usize,
}

/// Outcome of disconnecting one adapter during teardown
#[derive(Debug)]
pub struct DisconnectReport {
    /// Adapter name
    pub adapter: String,
    /// Disconnect result
    pub result: Result<()>,
}

/// Validated, ordered collection of adapters
pub struct Registry {
    adapters: IndexMap<String, Arc<Adapter>>,
    routes: HashMap<String, Route>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .field("operations", &self.routes.len())
            .finish()
    }
}

impl Registry {
    /// Build the registry, failing on the first violated invariant.
    ///
    /// Rejects: invalid adapter or operation names, empty descriptions,
    /// adapters without operations, duplicate adapter names, operation names
    /// published by more than one adapter, and the gateway's reserved names.
    pub fn register(adapters: Vec<Adapter>) -> Result<Self> {
        let mut by_name: IndexMap<String, Arc<Adapter>> = IndexMap::with_capacity(adapters.len());
        let mut routes: HashMap<String, Route> = HashMap::new();

        for adapter in adapters {
            adapter.validate()?;

            if by_name.contains_key(adapter.name()) {
                return Err(Error::Registry(format!(
                    "adapter name '{}' registered twice",
                    adapter.name()
                )));
            }
            let adapter_index = by_name.len();

            for (operation_index, op) in adapter.operations().values().enumerate() {
                let name = op.name();
                if RESERVED_OPERATIONS.contains(&name) {
                    return Err(Error::Registry(format!(
                        "adapter '{}' publishes reserved operation name '{name}'",
                        adapter.name()
                    )));
                }
                if let Some(existing) = routes.get(name) {
                    let owner = by_name
                        .get_index(existing.adapter)
                        .map_or("?", |(owner, _)| owner.as_str());
                    return Err(Error::Registry(format!(
                        "operation '{name}' published by both '{owner}' and '{}'",
                        adapter.name()
                    )));
                }
                if !adapter.is_conventional_operation_name(name) {
                    warn!(
                        adapter = %adapter.name(),
                        prefix = %adapter.short_name(),
                        operation = %name,
                        "Operation name is not prefixed with its adapter's short name"
                    );
                }
                routes.insert(
                    name.to_string(),
                    Route {
                        adapter: adapter_index,
                        operation: operation_index,
                    },
                );
            }

            debug!(
                adapter = %adapter.name(),
                operations = adapter.operations().len(),
                "Registered adapter"
            );
            by_name.insert(adapter.name().to_string(), Arc::new(adapter));
        }

        info!(
            adapters = by_name.len(),
            operations = routes.len(),
            "Adapter registry built"
        );

        Ok(Self {
            adapters: by_name,
            routes,
        })
    }

    /// Look up an adapter by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Adapter>> {
        self.adapters.get(name)
    }

    /// Adapters in registration order
    pub fn adapters(&self) -> impl ExactSizeIterator<Item = &Arc<Adapter>> {
        self.adapters.values()
    }

    /// Adapter names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    /// Resolve an operation to its owning adapter and descriptor
    #[must_use]
    pub fn resolve(&self, operation: &str) -> Option<(&Arc<Adapter>, &OperationDescriptor)> {
        let route = self.routes.get(operation)?;
        let (_, adapter) = self.adapters.get_index(route.adapter)?;
        let (_, op) = adapter.operations().get_index(route.operation)?;
        Some((adapter, op))
    }

    /// Every operation, grouped by adapter in registration order
    pub fn operations(&self) -> impl Iterator<Item = (&Arc<Adapter>, &OperationDescriptor)> {
        self.adapters
            .values()
            .flat_map(|a| a.operations().values().map(move |op| (a, op)))
    }

    /// Number of adapters
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Returns `true` if no adapters are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Total number of flattened operations
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.routes.len()
    }

    /// Disconnect every adapter concurrently, each bounded by `timeout`.
    ///
    /// One adapter failing or hanging does not stop the others; all outcomes
    /// are returned in registration order.
    pub async fn disconnect_all(&self, timeout: Duration) -> Vec<DisconnectReport> {
        let tasks = self.adapters.values().map(|adapter| async move {
            let result = match tokio::time::timeout(timeout, adapter.disconnect()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(format!(
                    "disconnect did not complete within {}ms",
                    timeout.as_millis()
                ))),
            };
            if let Err(ref e) = result {
                warn!(adapter = %adapter.name(), error = %e, "Failed to disconnect adapter");
            }
            DisconnectReport {
                adapter: adapter.name().to_string(),
                result,
            }
        });
        join_all(tasks).await
    }
}
