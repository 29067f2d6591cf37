//! Node RPC capability.
//!
//! Talks to whichever provider the privileged side bound to this page's
//! connection. `start_provider` must succeed before anything else except
//! `list_providers`.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::{Value, json, to_value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::protocol::{MessageType, RequestRpcSend, RequestRpcSubscribe, RequestRpcUnsubscribe};
use crate::provider::ProviderMeta;

use super::{Correlator, Notifications};

// ============================================================================
// RpcSubscription
// ============================================================================

/// A live node subscription.
///
/// Payloads arrive on [`notifications`](Self::notifications). Pass the
/// whole value to [`RpcProvider::unsubscribe`] to cancel it on both sides.
#[derive(Debug)]
pub struct RpcSubscription {
    /// Notification type given at subscribe time.
    pub kind: String,
    /// Backend subscription id.
    pub subscription_id: SubscriptionId,
    /// Notification stream.
    pub notifications: Notifications,
}

// ============================================================================
// RpcProvider
// ============================================================================

/// Node RPC through the extension's providers.
#[derive(Clone)]
pub struct RpcProvider {
    correlator: Correlator,
}

impl RpcProvider {
    pub(crate) fn new(correlator: Correlator) -> Self {
        Self { correlator }
    }

    /// Lists every provider the extension exposes.
    pub async fn list_providers(&self) -> Result<BTreeMap<String, ProviderMeta>> {
        let providers = self
            .correlator
            .call(MessageType::RpcListProviders, Value::Null)
            .await?;
        Ok(serde_json::from_value(providers)?)
    }

    /// Binds provider `key` to this page. Idempotent per connection.
    pub async fn start_provider(&self, key: &str) -> Result<ProviderMeta> {
        let meta = self
            .correlator
            .call(MessageType::RpcStartProvider, json!(key))
            .await?;
        Ok(serde_json::from_value(meta)?)
    }

    /// Executes a one-shot RPC method.
    pub async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let request = RequestRpcSend {
            method: method.to_string(),
            params,
        };
        self.correlator
            .call(MessageType::RpcSend, to_value(request)?)
            .await
    }

    /// Starts a node subscription.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut heads = provider
    ///     .subscribe("chain_newHead", "chain_subscribeNewHeads", vec![])
    ///     .await?;
    /// while let Some(head) = heads.notifications.recv().await {
    ///     println!("{head}");
    /// }
    /// ```
    pub async fn subscribe(
        &self,
        kind: &str,
        method: &str,
        params: Vec<Value>,
    ) -> Result<RpcSubscription> {
        let request = RequestRpcSubscribe {
            kind: kind.to_string(),
            method: method.to_string(),
            params,
        };

        let (subscription_id, notifications) = self
            .correlator
            .subscribe(MessageType::RpcSubscribe, to_value(request)?)
            .await?;

        let subscription_id: SubscriptionId = serde_json::from_value(subscription_id)
            .map_err(|e| Error::protocol(format!("Invalid subscription id: {e}")))?;

        debug!(%subscription_id, kind, method, "Subscribed");

        Ok(RpcSubscription {
            kind: kind.to_string(),
            subscription_id,
            notifications,
        })
    }

    /// Cancels a node subscription using the backend's `method`
    /// (e.g. `chain_unsubscribeNewHeads`).
    ///
    /// The local stream ends regardless of the backend's answer. Returns
    /// whether the backend found the subscription.
    pub async fn unsubscribe(&self, subscription: RpcSubscription, method: &str) -> Result<bool> {
        let RpcSubscription {
            kind,
            subscription_id,
            notifications,
        } = subscription;

        // Closing the stream releases the pending entry.
        drop(notifications);

        let request = RequestRpcUnsubscribe {
            kind,
            method: method.to_string(),
            subscription_id,
        };
        let removed = self
            .correlator
            .call(MessageType::RpcUnsubscribe, to_value(request)?)
            .await?;
        Ok(serde_json::from_value(removed)?)
    }

    /// Streams the bound provider's connectivity as `bool` payloads,
    /// starting with the current state.
    pub async fn subscribe_connected(&self) -> Result<Notifications> {
        let (_, notifications) = self
            .correlator
            .subscribe(MessageType::RpcSubscribeConnected, Value::Null)
            .await?;
        Ok(notifications)
    }
}
