//! Per-adapter connection slot with lazy, race-free connect

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::Lifecycle;
use crate::Result;

/// Connection state of one adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No handle held
    Disconnected,
    /// A handle is held and the last open or probe succeeded
    Connected,
    /// The last open or probe failed
    Failed,
}

/// Backend-specific way to open, probe and close a connection.
///
/// Implementations read their own settings (usually from the environment)
/// inside [`Driver::open`], so missing configuration surfaces on first use.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Client, pool or socket owned by the adapter
    type Handle: Send + Sync + 'static;

    /// Establish a new connection
    async fn open(&self) -> Result<Self::Handle>;

    /// Lightweight liveness check on an open handle
    async fn ping(&self, handle: &Self::Handle) -> Result<()>;

    /// Release an open handle
    async fn close(&self, _handle: Arc<Self::Handle>) -> Result<()> {
        Ok(())
    }
}

/// The single mutable connection slot an adapter owns.
///
/// The async mutex is held across [`Driver::open`], so concurrent first
/// calls open exactly one connection.
pub struct Connection<D: Driver> {
    adapter: String,
    driver: D,
    slot: Mutex<Option<Arc<D::Handle>>>,
    state: RwLock<ConnectionState>,
    opens: AtomicU64,
}

impl<D: Driver> Connection<D> {
    /// Create an empty (disconnected) slot
    pub fn new(adapter: impl Into<String>, driver: D) -> Arc<Self> {
        Arc::new(Self {
            adapter: adapter.into(),
            driver,
            slot: Mutex::new(None),
            state: RwLock::new(ConnectionState::Disconnected),
            opens: AtomicU64::new(0),
        })
    }

    /// The driver behind this slot
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Return the open handle, connecting first if necessary
    pub async fn handle(&self) -> Result<Arc<D::Handle>> {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(Arc::clone(handle));
        }

        debug!(adapter = %self.adapter, "Opening connection");
        match self.driver.open().await {
            Ok(handle) => {
                let handle = Arc::new(handle);
                *slot = Some(Arc::clone(&handle));
                *self.state.write() = ConnectionState::Connected;
                self.opens.fetch_add(1, Ordering::Relaxed);
                info!(adapter = %self.adapter, "Connected");
                Ok(handle)
            }
            Err(e) => {
                *self.state.write() = ConnectionState::Failed;
                warn!(adapter = %self.adapter, error = %e, "Connection failed");
                Err(e)
            }
        }
    }

    /// Number of successful opens over the slot's lifetime
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    /// Remove `stale` from the slot so the next call opens afresh. A handle
    /// another task has already replaced is left alone.
    async fn discard(&self, stale: &Arc<D::Handle>) {
        let taken = {
            let mut slot = self.slot.lock().await;
            match slot.as_ref() {
                Some(current) if Arc::ptr_eq(current, stale) => slot.take(),
                _ => None,
            }
        };
        if let Some(handle) = taken {
            if let Err(e) = self.driver.close(handle).await {
                debug!(adapter = %self.adapter, error = %e, "Closing stale connection failed");
            }
        }
    }
}

#[async_trait]
impl<D: Driver> Lifecycle for Connection<D> {
    async fn connect(&self) -> Result<()> {
        self.handle().await.map(|_| ())
    }

    async fn disconnect(&self) -> Result<()> {
        let taken = self.slot.lock().await.take();
        *self.state.write() = ConnectionState::Disconnected;
        if let Some(handle) = taken {
            self.driver.close(handle).await?;
            info!(adapter = %self.adapter, "Disconnected");
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        let handle = match self.handle().await {
            Ok(handle) => handle,
            Err(_) => return false,
        };
        match self.driver.ping(&handle).await {
            Ok(()) => {
                *self.state.write() = ConnectionState::Connected;
                true
            }
            Err(e) => {
                debug!(adapter = %self.adapter, error = %e, "Liveness probe failed");
                self.discard(&handle).await;
                *self.state.write() = ConnectionState::Failed;
                false
            }
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }
}
