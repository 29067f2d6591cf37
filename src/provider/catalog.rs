//! Provider catalog.
//!
//! Static mapping from provider key to descriptor, built at process start.
//!
//! # Example
//!
//! ```ignore
//! let catalog = ProviderCatalog::new()
//!     .with_provider(
//!         "westend",
//!         ProviderDescriptor::new(
//!             ProviderMeta::new("westend", NodeKind::Light, "smoldot"),
//!             || Arc::new(LightClient::westend()) as Arc<dyn ProviderInstance>,
//!         ),
//!     );
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::{ProviderInstance, ProviderMeta};

// ============================================================================
// Types
// ============================================================================

/// Factory creating a fresh provider instance.
pub type StartFn = Arc<dyn Fn() -> Arc<dyn ProviderInstance> + Send + Sync>;

// ============================================================================
// ProviderDescriptor
// ============================================================================

/// Metadata plus a factory for one provider.
#[derive(Clone)]
pub struct ProviderDescriptor {
    meta: ProviderMeta,
    start: StartFn,
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl ProviderDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new<F>(meta: ProviderMeta, start: F) -> Self
    where
        F: Fn() -> Arc<dyn ProviderInstance> + Send + Sync + 'static,
    {
        Self {
            meta,
            start: Arc::new(start),
        }
    }

    /// Returns the provider metadata.
    #[inline]
    #[must_use]
    pub fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    /// Creates a new running instance.
    #[inline]
    #[must_use]
    pub fn start(&self) -> Arc<dyn ProviderInstance> {
        (self.start)()
    }
}

// ============================================================================
// ProviderCatalog
// ============================================================================

/// All providers the extension exposes, by key.
#[derive(Debug, Clone, Default)]
pub struct ProviderCatalog {
    providers: FxHashMap<String, ProviderDescriptor>,
}

impl ProviderCatalog {
    /// Creates an empty catalog.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a provider under `key`, replacing any previous entry.
    #[must_use]
    pub fn with_provider(mut self, key: impl Into<String>, descriptor: ProviderDescriptor) -> Self {
        self.providers.insert(key.into(), descriptor);
        self
    }

    /// Looks up a descriptor.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ProviderDescriptor> {
        self.providers.get(key)
    }

    /// Returns `true` if `key` is exposed.
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.providers.contains_key(key)
    }

    /// Returns the number of providers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if no provider is exposed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Returns key → metadata for every provider, sorted by key.
    #[must_use]
    pub fn list(&self) -> BTreeMap<String, ProviderMeta> {
        self.providers
            .iter()
            .map(|(key, descriptor)| (key.clone(), descriptor.meta.clone()))
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::broadcast;

    use crate::error::Result;
    use crate::identifiers::SubscriptionId;
    use crate::provider::{NodeKind, SubscriptionSink};

    struct Idle;

    #[async_trait]
    impl ProviderInstance for Idle {
        async fn send(&self, _method: &str, _params: Vec<Value>) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn subscribe(
            &self,
            _kind: &str,
            _method: &str,
            _params: Vec<Value>,
            _sink: SubscriptionSink,
        ) -> Result<SubscriptionId> {
            Ok(SubscriptionId::Number(1))
        }

        async fn unsubscribe(&self, _kind: &str, _method: &str, _id: &SubscriptionId) -> Result<bool> {
            Ok(false)
        }

        fn disconnect(&self) {}

        fn is_connected(&self) -> bool {
            false
        }

        fn connectivity(&self) -> broadcast::Receiver<bool> {
            broadcast::channel(1).1
        }
    }

    fn descriptor(network: &str) -> ProviderDescriptor {
        ProviderDescriptor::new(ProviderMeta::new(network, NodeKind::Full, "ws"), || {
            Arc::new(Idle) as Arc<dyn ProviderInstance>
        })
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = ProviderCatalog::new();
        assert!(catalog.is_empty());
        assert!(catalog.list().is_empty());
    }

    #[test]
    fn test_list_is_sorted_by_key() {
        let catalog = ProviderCatalog::new()
            .with_provider("polkadot", descriptor("polkadot"))
            .with_provider("kusama", descriptor("kusama"));

        let keys: Vec<_> = catalog.list().into_keys().collect();
        assert_eq!(keys, vec!["kusama", "polkadot"]);
        assert!(catalog.contains("kusama"));
        assert!(!catalog.contains("westend"));
    }

    #[test]
    fn test_start_creates_fresh_instances() {
        let catalog = ProviderCatalog::new().with_provider("kusama", descriptor("kusama"));
        let descriptor = catalog.get("kusama").expect("present");

        let a = descriptor.start();
        let b = descriptor.start();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
