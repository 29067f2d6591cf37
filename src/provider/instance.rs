//! Running provider contract and notification sinks.
//!
//! A [`ProviderInstance`] is created by a catalog descriptor and bound to
//! exactly one connection by the registry. Subscription bookkeeping
//! (which sink belongs to which node subscription) is the instance's own
//! business; the registry only passes sinks through.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::error::Result;
use crate::identifiers::SubscriptionId;

// ============================================================================
// Constants
// ============================================================================

/// Buffered connectivity transitions per listener before lagging.
const CONNECTIVITY_BUFFER: usize = 16;

// ============================================================================
// SubscriptionSink
// ============================================================================

/// Sending half of one subscription's notification stream.
///
/// Dropping the receiving half is how a subscriber goes away; the sink
/// then reports closed and the backend may stop producing.
#[derive(Debug, Clone)]
pub struct SubscriptionSink {
    tx: mpsc::UnboundedSender<Value>,
}

impl SubscriptionSink {
    /// Creates a sink and its receiving half.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Delivers one notification. Returns `false` once the receiver is gone.
    #[inline]
    pub fn notify(&self, payload: Value) -> bool {
        self.tx.send(payload).is_ok()
    }

    /// Returns `true` if the receiving half was dropped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// ProviderInstance
// ============================================================================

/// A running backend provider.
///
/// # Thread Safety
///
/// Instances are shared as `Arc<dyn ProviderInstance>` between the
/// registry and in-flight calls, so they must be `Send + Sync`.
#[async_trait]
pub trait ProviderInstance: Send + Sync {
    /// Executes a one-shot RPC method.
    ///
    /// Failures should be [`Error::Backend`](crate::Error::Backend); they
    /// reach the page verbatim.
    async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value>;

    /// Starts a node subscription feeding `sink`.
    async fn subscribe(
        &self,
        kind: &str,
        method: &str,
        params: Vec<Value>,
        sink: SubscriptionSink,
    ) -> Result<SubscriptionId>;

    /// Cancels a node subscription. Returns whether it existed.
    async fn unsubscribe(&self, kind: &str, method: &str, id: &SubscriptionId) -> Result<bool>;

    /// Closes the backend connection.
    fn disconnect(&self);

    /// Returns the current connectivity state.
    fn is_connected(&self) -> bool;

    /// Returns a listener for connect (`true`) / disconnect (`false`)
    /// transitions after this call.
    fn connectivity(&self) -> broadcast::Receiver<bool>;
}

// ============================================================================
// Connectivity
// ============================================================================

/// Connectivity state with transition events, for provider implementations.
#[derive(Debug)]
pub struct Connectivity {
    connected: AtomicBool,
    events: broadcast::Sender<bool>,
}

impl Connectivity {
    /// Creates the state with an initial value.
    #[must_use]
    pub fn new(connected: bool) -> Self {
        let (events, _) = broadcast::channel(CONNECTIVITY_BUFFER);
        Self {
            connected: AtomicBool::new(connected),
            events,
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Updates the state, emitting an event only on an actual transition.
    ///
    /// Returns `true` if the state changed.
    pub fn set(&self, connected: bool) -> bool {
        let previous = self.connected.swap(connected, Ordering::SeqCst);
        if previous == connected {
            return false;
        }

        let listeners = self.events.send(connected).unwrap_or(0);
        debug!(connected, listeners, "Connectivity changed");
        true
    }

    /// Returns a listener for subsequent transitions.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<bool> {
        self.events.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sink_reports_closed_after_receiver_drop() {
        let (sink, rx) = SubscriptionSink::channel();
        assert!(sink.notify(json!(1)));
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.notify(json!(2)));
    }

    #[tokio::test]
    async fn test_connectivity_emits_only_transitions() {
        let connectivity = Connectivity::new(true);
        let mut rx = connectivity.subscribe();

        assert!(!connectivity.set(true));
        assert!(connectivity.set(false));
        assert!(connectivity.set(true));

        assert_eq!(rx.recv().await.unwrap(), false);
        assert_eq!(rx.recv().await.unwrap(), true);
        assert!(rx.try_recv().is_err());
    }
}
