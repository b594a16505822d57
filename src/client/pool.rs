//! Process-wide cache of tool connections, one per endpoint.
//!
//! Each endpoint owns a slot holding an async `OnceCell`. Concurrent first
//! use of an endpoint awaits the same initialization, so at most one
//! connection attempt is in flight per endpoint. A failed attempt leaves the
//! cell empty and the next caller tries again.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::JsonObject;
use tokio::sync::{Mutex, OnceCell};

use crate::decode::ToolResponse;
use crate::error::ToolError;
use crate::tools::{Endpoint, Tool};

/// A live session with one endpoint.
#[async_trait]
pub trait ToolConnection: Send + Sync {
    async fn call(&self, tool: Tool, arguments: JsonObject) -> Result<ToolResponse, ToolError>;

    async fn close(&self);
}

/// Opens sessions; the transport negotiation lives behind this trait.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: Endpoint) -> Result<Arc<dyn ToolConnection>, ToolError>;
}

type Slot = Arc<OnceCell<Arc<dyn ToolConnection>>>;

pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    slots: Mutex<HashMap<Endpoint, Slot>>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Borrow the cached connection for `endpoint`, opening it on first use.
    pub async fn get(&self, endpoint: Endpoint) -> Result<Arc<dyn ToolConnection>, ToolError> {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(endpoint).or_default())
        };

        let connection = slot
            .get_or_try_init(|| async {
                tracing::info!(%endpoint, "opening tool connection");
                self.connector.connect(endpoint).await
            })
            .await?;
        Ok(Arc::clone(connection))
    }

    /// Drop `connection` from the cache if it is still the cached one.
    ///
    /// A connection already replaced by another caller is left alone.
    pub async fn invalidate(&self, endpoint: Endpoint, connection: &Arc<dyn ToolConnection>) {
        let stale = {
            let mut slots = self.slots.lock().await;
            let is_current = slots
                .get(&endpoint)
                .and_then(|slot| slot.get())
                .is_some_and(|cached| Arc::ptr_eq(cached, connection));
            if is_current {
                slots.remove(&endpoint);
            }
            is_current
        };

        if stale {
            tracing::debug!(%endpoint, "dropped cached tool connection");
            connection.close().await;
        }
    }

    /// Number of endpoints with an open connection.
    pub async fn open_count(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter(|slot| slot.initialized()).count()
    }

    /// Close every cached connection and empty the cache.
    pub async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut slots = self.slots.lock().await;
            slots.drain().collect()
        };

        for (endpoint, slot) in drained {
            if let Some(connection) = slot.get() {
                tracing::info!(%endpoint, "closing tool connection");
                connection.close().await;
            }
        }
    }
}
