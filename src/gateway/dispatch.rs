//! Invocation dispatch
//!
//! Every call goes through [`Gateway::call`]: discovery operations are
//! answered locally, everything else is resolved through the registry's
//! flattened table and run under a deadline with panics contained. The
//! caller always gets an [`Envelope`], never an error.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::join_all;
use serde_json::Value;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::envelope::Envelope;
use super::meta::{self, DB_HELP, DB_LIST, DB_STATUS};
use crate::adapter::{Adapter, Args};
use crate::config::GatewayConfig;
use crate::error::ErrorKind;
use crate::protocol::Tool;
use crate::registry::Registry;
use crate::{Error, Result};

/// Dispatch front of the registry
pub struct Gateway {
    registry: Arc<Registry>,
    operation_timeout: Duration,
    probe_timeout: Duration,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.registry)
            .field("operation_timeout", &self.operation_timeout)
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

impl Gateway {
    /// Create a gateway with timeouts taken from configuration
    #[must_use]
    pub fn new(registry: Arc<Registry>, config: &GatewayConfig) -> Self {
        Self::with_timeouts(registry, config.operation_timeout, config.probe_timeout)
    }

    /// Create a gateway with explicit timeouts
    #[must_use]
    pub fn with_timeouts(
        registry: Arc<Registry>,
        operation_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            operation_timeout,
            probe_timeout,
        }
    }

    /// The registry behind this gateway
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Default per-invocation deadline
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Discovery tools followed by every operation, grouped by adapter in
    /// registration order. Stable for the process lifetime.
    #[must_use]
    pub fn tools(&self) -> Vec<Tool> {
        let mut tools = meta::build_meta_tools();
        tools.reserve(self.registry.operation_count());
        tools.extend(self.registry.operations().map(|(_, op)| op.to_tool()));
        tools
    }

    /// Invoke any published name with the default deadline
    pub async fn call(&self, name: &str, arguments: Value) -> Envelope {
        self.call_with_deadline(name, arguments, None).await
    }

    /// Invoke any published name; `deadline` overrides the default for
    /// adapter operations.
    pub async fn call_with_deadline(
        &self,
        name: &str,
        arguments: Value,
        deadline: Option<Duration>,
    ) -> Envelope {
        match name {
            DB_LIST | DB_HELP | DB_STATUS => self.call_meta(name, arguments).await,
            _ => self.invoke(name, arguments, deadline).await,
        }
    }

    /// Route to the owning adapter's handler and normalise the outcome
    pub async fn invoke(&self, name: &str, arguments: Value, deadline: Option<Duration>) -> Envelope {
        let Some((adapter, op)) = self.registry.resolve(name) else {
            debug!(operation = %name, "Operation not found");
            return Envelope::unattributed(&Error::OperationNotFound(name.to_string()));
        };

        let args = match Args::from_value(arguments) {
            Ok(args) => args,
            Err(e) => {
                debug!(operation = %name, adapter = %adapter.name(), error = %e, "Rejected arguments");
                return Envelope::attributed(&e, name, adapter.name());
            }
        };

        let deadline = deadline.unwrap_or(self.operation_timeout);
        let span = info_span!(
            "invoke",
            operation = %name,
            adapter = %adapter.name(),
            request_id = %Uuid::new_v4(),
        );

        let started = Instant::now();
        // Build the handler future inside the guarded block so a panic raised
        // before the first await is contained as well.
        let guarded = AssertUnwindSafe(async move { op.call(args).await }).catch_unwind();
        let result = match tokio::time::timeout(deadline, guarded)
            .instrument(span.clone())
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(Error::Internal(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(Error::Timeout(format!(
                "'{name}' did not complete within {}ms",
                deadline.as_millis()
            ))),
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        span.in_scope(|| match &result {
            Ok(_) => debug!(elapsed_ms, "Operation succeeded"),
            Err(e) if e.kind().is_caller_error() => {
                debug!(elapsed_ms, kind = ?e.kind(), error = %e, "Operation rejected");
            }
            Err(e) if e.kind() == ErrorKind::Internal => {
                error!(elapsed_ms, error = %e, "Operation crashed");
            }
            Err(e) => warn!(elapsed_ms, kind = ?e.kind(), error = %e, "Operation failed"),
        });

        Envelope::from_result(result, name, adapter.name())
    }

    async fn call_meta(&self, name: &str, arguments: Value) -> Envelope {
        let outcome = match Args::from_value(arguments) {
            Ok(args) => match name {
                DB_LIST => match args.optional_bool("check_connections") {
                    Ok(check) => Ok(self.list(check.unwrap_or(false)).await),
                    Err(e) => Err(e),
                },
                DB_HELP => match args.optional_str("database") {
                    Ok(database) => self.help(database),
                    Err(e) => Err(e),
                },
                _ => Ok(self.status().await),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(payload) => Envelope::Success(payload),
            Err(e) => {
                debug!(operation = %name, error = %e, "Discovery call rejected");
                Envelope::failed(&e, Some(name), None)
            }
        }
    }

    /// `db_list`: every adapter with its operation names, optionally probed
    pub async fn list(&self, check_connections: bool) -> Value {
        let entries = if check_connections {
            let probes = self.probe_all().await;
            self.registry
                .adapters()
                .zip(probes)
                .map(|(a, up)| meta::build_list_entry(a, Some(up)))
                .collect()
        } else {
            self.registry
                .adapters()
                .map(|a| meta::build_list_entry(a, None))
                .collect()
        };
        meta::build_list_response(entries)
    }

    /// `db_help`: overview, or the full catalogue of one adapter
    pub fn help(&self, database: Option<&str>) -> Result<Value> {
        match database.map(str::trim).filter(|d| !d.is_empty()) {
            None => Ok(meta::build_help_overview(
                self.registry.adapters().map(|a| &**a),
            )),
            Some(name) => self.registry.get(name).map(|a| a.catalogue()).ok_or_else(|| {
                Error::AdapterNotFound(format!(
                    "'{name}' (available: {})",
                    self.registry.names().join(", ")
                ))
            }),
        }
    }

    /// `db_status`: every adapter probed concurrently, partitioned by outcome
    pub async fn status(&self) -> Value {
        let probes = self.probe_all().await;
        let pairs: Vec<(&str, bool)> = self
            .registry
            .adapters()
            .map(|a| a.name())
            .zip(probes)
            .collect();
        meta::build_status_response(&pairs)
    }

    /// Probe every adapter concurrently; results follow registration order
    pub async fn probe_all(&self) -> Vec<bool> {
        join_all(self.registry.adapters().map(|a| self.probe(a))).await
    }

    /// Bounded, panic-tolerant liveness probe of one adapter
    async fn probe(&self, adapter: &Adapter) -> bool {
        let guarded = AssertUnwindSafe(adapter.is_connected()).catch_unwind();
        match tokio::time::timeout(self.probe_timeout, guarded).await {
            Ok(Ok(up)) => up,
            Ok(Err(panic)) => {
                warn!(
                    adapter = %adapter.name(),
                    panic = %panic_message(panic.as_ref()),
                    "Liveness probe panicked"
                );
                false
            }
            Err(_) => {
                debug!(adapter = %adapter.name(), "Liveness probe timed out");
                false
            }
        }
    }

    /// Connect the named adapters up front. Failures are logged, never fatal.
    ///
    /// Each connect is bounded by the operation timeout; abandoning it frees
    /// the adapter's connection slot for later calls.
    pub async fn warm_start(&self, names: &[String]) {
        let timeout = self.operation_timeout;
        let tasks = names.iter().map(|name| async move {
            let Some(adapter) = self.registry.get(name) else {
                warn!(adapter = %name, "Warm start requested for unknown database");
                return;
            };
            match tokio::time::timeout(timeout, adapter.connect()).await {
                Ok(Ok(())) => info!(adapter = %name, "Warm started"),
                Ok(Err(e)) => warn!(adapter = %name, error = %e, "Warm start failed"),
                Err(_) => warn!(
                    adapter = %name,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Warm start timed out"
                ),
            }
        });
        join_all(tasks).await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
