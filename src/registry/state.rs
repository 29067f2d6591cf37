//! Per-connection provider lifecycle.
//!
//! The registry binds at most one running provider to each connection and
//! gates every provider-scoped operation on that binding.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          ConnectionRegistry             │
//! │  ┌─────────────────────────────────┐    │
//! │  │ ConnectionId=1 → westend (lc)   │    │
//! │  │ ConnectionId=4 → kusama  (ws)   │    │
//! │  └─────────────────────────────────┘    │
//! │             ProviderCatalog             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! 1. `start_provider` - First call per connection starts an instance
//! 2. `send` / `subscribe` / `unsubscribe` / `subscribe_connected` - Routed to it
//! 3. `connection_closed` - Disconnects the instance and drops the entry
//!
//! There is no other way to stop an instance.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, SubscriptionId};
use crate::protocol::{MessageType, RequestRpcSend, RequestRpcSubscribe, RequestRpcUnsubscribe};
use crate::provider::{ProviderCatalog, ProviderInstance, ProviderMeta, SubscriptionSink};

// ============================================================================
// ActiveProvider
// ============================================================================

/// A running provider bound to one connection.
struct ActiveProvider {
    /// Catalog key the instance was started from.
    key: String,
    /// The running instance.
    instance: Arc<dyn ProviderInstance>,
    /// Connectivity forwarders, aborted when the connection closes.
    watchers: Vec<JoinHandle<()>>,
}

// ============================================================================
// ConnectionRegistry
// ============================================================================

/// Owns the connection → provider table on the privileged side.
///
/// # Thread Safety
///
/// The table is behind a [`RwLock`]; the lock is never held across an
/// `.await`, so operations on one connection never wait on another's
/// backend call.
pub struct ConnectionRegistry {
    /// Providers exposed by the extension.
    catalog: Arc<ProviderCatalog>,
    /// Providers currently injected, by connection.
    injected: RwLock<FxHashMap<ConnectionId, ActiveProvider>>,
}

impl ConnectionRegistry {
    /// Creates a registry over a catalog.
    #[must_use]
    pub fn new(catalog: ProviderCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            injected: RwLock::new(FxHashMap::default()),
        }
    }

    /// Returns the catalog.
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    /// Returns the number of connections with a bound provider.
    #[inline]
    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.injected.read().len()
    }

    /// Returns `true` if `connection` has a bound provider.
    #[inline]
    #[must_use]
    pub fn is_bound(&self, connection: ConnectionId) -> bool {
        self.injected.read().contains_key(&connection)
    }
}

// ============================================================================
// ConnectionRegistry - Catalog & Lifecycle
// ============================================================================

impl ConnectionRegistry {
    /// Lists every provider the extension exposes.
    #[must_use]
    pub fn list_providers(&self) -> BTreeMap<String, ProviderMeta> {
        self.catalog.list()
    }

    /// Binds the provider `key` to `connection` and returns its metadata.
    ///
    /// Idempotent: if the connection already has a provider, the bound
    /// provider's metadata is returned and nothing new is started. The
    /// instance is started outside the table lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProvider`] if `key` is not in the catalog.
    pub fn start_provider(&self, key: &str, connection: ConnectionId) -> Result<ProviderMeta> {
        let descriptor = self
            .catalog
            .get(key)
            .ok_or_else(|| Error::unknown_provider(key))?;

        let bound_key = self
            .injected
            .read()
            .get(&connection)
            .map(|active| active.key.clone());
        if let Some(bound_key) = bound_key {
            return self.bound_meta(connection, &bound_key, key);
        }

        let instance = descriptor.start();

        let raced = match self.injected.write().entry(connection) {
            Entry::Occupied(active) => Some(active.get().key.clone()),
            Entry::Vacant(slot) => {
                slot.insert(ActiveProvider {
                    key: key.to_string(),
                    instance: Arc::clone(&instance),
                    watchers: Vec::new(),
                });
                None
            }
        };

        if let Some(bound_key) = raced {
            // Another start for this connection won; discard ours.
            instance.disconnect();
            return self.bound_meta(connection, &bound_key, key);
        }

        info!(connection_id = %connection, provider = key, "Provider started");

        Ok(descriptor.meta().clone())
    }

    /// Metadata of the provider already bound to `connection`.
    fn bound_meta(
        &self,
        connection: ConnectionId,
        bound_key: &str,
        requested: &str,
    ) -> Result<ProviderMeta> {
        if bound_key != requested {
            debug!(
                connection_id = %connection,
                bound = bound_key,
                requested,
                "Provider already bound, keeping existing instance"
            );
        }

        self.catalog
            .get(bound_key)
            .map(|bound| bound.meta().clone())
            .ok_or_else(|| Error::unknown_provider(bound_key))
    }

    /// Handles the closure signal for `connection`.
    ///
    /// Disconnects the bound instance, if any, and removes the entry.
    /// Returns `false` when nothing was bound, which makes a repeated
    /// closure signal a no-op.
    pub fn connection_closed(&self, connection: ConnectionId) -> bool {
        let removed = self.injected.write().remove(&connection);

        let Some(active) = removed else {
            debug!(connection_id = %connection, "Closed connection had no provider");
            return false;
        };

        for watcher in active.watchers {
            watcher.abort();
        }
        active.instance.disconnect();

        info!(connection_id = %connection, provider = %active.key, "Provider disconnected");
        true
    }
}

// ============================================================================
// ConnectionRegistry - Provider Operations
// ============================================================================

/// Backend half of a provider operation, run after the binding check.
pub type BackendCall<T> = BoxFuture<'static, Result<T>>;

impl ConnectionRegistry {
    /// Forwards a one-shot RPC call to the bound provider.
    ///
    /// The binding is checked when this is called. The returned future
    /// only awaits the backend, so callers can check requests in arrival
    /// order and let the backend calls complete in any order.
    ///
    /// # Errors
    ///
    /// - [`Error::PreconditionFailed`] if no provider is bound
    /// - The future yields any backend error, unchanged
    pub fn send(&self, request: RequestRpcSend, connection: ConnectionId) -> Result<BackendCall<Value>> {
        let provider = self.bound(connection, MessageType::RpcSend)?;

        debug!(connection_id = %connection, method = %request.method, "RPC send");
        Ok(async move { provider.send(&request.method, request.params).await }.boxed())
    }

    /// Starts a node subscription on the bound provider.
    ///
    /// `sink` goes to the provider untouched; the registry keeps no
    /// record of it.
    ///
    /// # Errors
    ///
    /// - [`Error::PreconditionFailed`] if no provider is bound
    /// - The future yields any backend error, unchanged
    pub fn subscribe(
        &self,
        request: RequestRpcSubscribe,
        sink: SubscriptionSink,
        connection: ConnectionId,
    ) -> Result<BackendCall<SubscriptionId>> {
        let provider = self.bound(connection, MessageType::RpcSubscribe)?;

        debug!(
            connection_id = %connection,
            kind = %request.kind,
            method = %request.method,
            "RPC subscribe"
        );
        Ok(async move {
            provider
                .subscribe(&request.kind, &request.method, request.params, sink)
                .await
        }
        .boxed())
    }

    /// Streams the bound provider's connectivity into `sink`.
    ///
    /// The current state is delivered immediately, then every transition.
    /// The stream ends only when the connection closes (or the sink's
    /// receiver is dropped).
    ///
    /// # Errors
    ///
    /// Returns [`Error::PreconditionFailed`] if no provider is bound.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime; the transition watcher
    /// is a spawned task.
    pub fn subscribe_connected(&self, connection: ConnectionId, sink: SubscriptionSink) -> Result<()> {
        let mut injected = self.injected.write();
        let active = injected
            .get_mut(&connection)
            .ok_or_else(|| Error::precondition_failed(MessageType::RpcSubscribeConnected.as_str()))?;

        // Listen before reading the state so no transition falls in between.
        let mut events = active.instance.connectivity();
        sink.notify(Value::Bool(active.instance.is_connected()));

        let watcher = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(connected) => {
                        if !sink.notify(Value::Bool(connected)) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Connectivity listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        active.watchers.push(watcher);

        debug!(connection_id = %connection, "Connectivity subscription registered");
        Ok(())
    }

    /// Cancels a node subscription on the bound provider.
    ///
    /// The future yields whether the provider found and removed it.
    ///
    /// # Errors
    ///
    /// - [`Error::PreconditionFailed`] if no provider is bound
    /// - The future yields any backend error, unchanged
    pub fn unsubscribe(
        &self,
        request: RequestRpcUnsubscribe,
        connection: ConnectionId,
    ) -> Result<BackendCall<bool>> {
        let provider = self.bound(connection, MessageType::RpcUnsubscribe)?;

        debug!(
            connection_id = %connection,
            subscription_id = %request.subscription_id,
            "RPC unsubscribe"
        );
        Ok(async move {
            provider
                .unsubscribe(&request.kind, &request.method, &request.subscription_id)
                .await
        }
        .boxed())
    }

    /// Returns the provider bound to `connection`, or a precondition
    /// failure naming `operation`.
    fn bound(
        &self,
        connection: ConnectionId,
        operation: MessageType,
    ) -> Result<Arc<dyn ProviderInstance>> {
        self.injected
            .read()
            .get(&connection)
            .map(|active| Arc::clone(&active.instance))
            .ok_or_else(|| Error::precondition_failed(operation.as_str()))
    }
}

// ============================================================================
// Tests
// ============================================================================
