//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use extension_bridge::{
    Connectivity, Error, NodeKind, ProviderCatalog, ProviderDescriptor, ProviderInstance,
    ProviderMeta, Result, SubscriptionId, SubscriptionSink,
};

// ============================================================================
// Tracing
// ============================================================================

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MockProvider
// ============================================================================

/// In-memory node. `send` echoes, subscriptions are fed by [`emit`](Self::emit).
/// `system_fail` and `chain_subscribeFail` fail with a backend error.
pub struct MockProvider {
    connectivity: Connectivity,
    next_subscription: AtomicU64,
    subscriptions: Mutex<FxHashMap<u64, SubscriptionSink>>,
    disconnects: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            connectivity: Connectivity::new(true),
            next_subscription: AtomicU64::new(1),
            subscriptions: Mutex::new(FxHashMap::default()),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Pushes `payload` to every live subscription. Returns how many took it.
    pub fn emit(&self, payload: Value) -> usize {
        self.subscriptions
            .lock()
            .values()
            .filter(|sink| sink.notify(payload.clone()))
            .count()
    }

    /// Flips connectivity, emitting a transition if it changed.
    pub fn set_connected(&self, connected: bool) -> bool {
        self.connectivity.set(connected)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderInstance for MockProvider {
    async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        match method {
            "system_name" => Ok(json!("mock-node")),
            "system_fail" => Err(Error::backend("1010: Invalid Transaction")),
            _ => Ok(json!({ "method": method, "params": params })),
        }
    }

    async fn subscribe(
        &self,
        _kind: &str,
        method: &str,
        _params: Vec<Value>,
        sink: SubscriptionSink,
    ) -> Result<SubscriptionId> {
        if method == "chain_subscribeFail" {
            return Err(Error::backend("-32602: Invalid params"));
        }

        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().insert(id, sink);
        Ok(SubscriptionId::Number(id))
    }

    async fn unsubscribe(&self, _kind: &str, _method: &str, id: &SubscriptionId) -> Result<bool> {
        let SubscriptionId::Number(id) = id else {
            return Ok(false);
        };
        Ok(self.subscriptions.lock().remove(id).is_some())
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().clear();
        self.connectivity.set(false);
    }

    fn is_connected(&self) -> bool {
        self.connectivity.is_connected()
    }

    fn connectivity(&self) -> broadcast::Receiver<bool> {
        self.connectivity.subscribe()
    }
}

// ============================================================================
// MockBackend
// ============================================================================

/// Records every instance the catalog starts.
#[derive(Default)]
pub struct MockBackend {
    started: Mutex<Vec<Arc<MockProvider>>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Catalog with a `westend` (light) and a `kusama` (full) provider.
    pub fn catalog(self: &Arc<Self>) -> ProviderCatalog {
        ProviderCatalog::new()
            .with_provider("westend", self.descriptor(NodeKind::Light))
            .with_provider("kusama", self.descriptor(NodeKind::Full))
    }

    fn descriptor(self: &Arc<Self>, node: NodeKind) -> ProviderDescriptor {
        let backend = Arc::clone(self);
        let network = match node {
            NodeKind::Light => "westend",
            NodeKind::Full => "kusama",
        };

        ProviderDescriptor::new(ProviderMeta::new(network, node, "mock"), move || {
            let instance = Arc::new(MockProvider::new());
            backend.started.lock().push(Arc::clone(&instance));
            instance as Arc<dyn ProviderInstance>
        })
    }

    pub fn started(&self) -> usize {
        self.started.lock().len()
    }

    /// Returns the `n`-th started instance.
    pub fn instance(&self, n: usize) -> Arc<MockProvider> {
        Arc::clone(&self.started.lock()[n])
    }
}
