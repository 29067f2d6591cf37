//! Request/response correlation on the page side.
//!
//! Gives callers an async API over a channel where replies and
//! notifications arrive in any order relative to requests.
//!
//! # Flow
//!
//! 1. `call` allocates an id and stores a pending entry
//! 2. The request envelope goes to the outbound channel (the relay)
//! 3. The relay hands each inbound envelope to `handle_response`
//! 4. The entry's reply channel resolves the awaiting caller
//!
//! Subscription entries also hold a notification channel and outlive
//! their terminal reply; they go away when the [`Notifications`] handle
//! is dropped or released.

// ============================================================================
// Imports
// ============================================================================

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::stream::Stream;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{MessageType, Origin, ResponseKind, TransportRequest, TransportResponse};

// ============================================================================
// Types
// ============================================================================

/// Map of request IDs to waiting callers.
type PendingMap = FxHashMap<RequestId, PendingRequest>;

/// A call waiting for its reply.
struct PendingRequest {
    /// Operation name, for logging.
    message: MessageType,
    /// Terminal reply channel. Taken once the reply arrives.
    reply: Option<oneshot::Sender<Result<Value>>>,
    /// Notification channel for subscription calls.
    subscriber: Option<mpsc::UnboundedSender<Value>>,
}

/// Shared state behind every [`Correlator`] clone.
struct CorrelatorInner {
    origin: Origin,
    max_pending: usize,
    call_timeout: Option<Duration>,
    /// Strictly increasing, owned by this correlator.
    counter: AtomicU64,
    pending: Mutex<PendingMap>,
    outbound: mpsc::UnboundedSender<TransportRequest>,
}

// ============================================================================
// Correlator
// ============================================================================

/// Page-side request correlator.
///
/// Cheap to clone; every capability facade holds a clone of the same
/// correlator, so ids stay unique across all of them.
///
/// # Thread Safety
///
/// The pending table is behind a [`Mutex`] that is never held while a
/// caller is resolved, so a caller reacting to its reply may issue new
/// calls without deadlocking.
#[derive(Clone)]
pub struct Correlator {
    inner: Arc<CorrelatorInner>,
}

impl Correlator {
    /// Creates a correlator writing requests to `outbound`.
    #[must_use]
    pub fn new(config: &BridgeConfig, outbound: mpsc::UnboundedSender<TransportRequest>) -> Self {
        Self {
            inner: Arc::new(CorrelatorInner {
                origin: config.origin,
                max_pending: config.max_pending,
                call_timeout: config.call_timeout,
                counter: AtomicU64::new(0),
                pending: Mutex::new(PendingMap::default()),
                outbound,
            }),
        }
    }

    /// Creates a correlator and the receiving end of its outbound channel.
    #[must_use]
    pub fn channel(config: &BridgeConfig) -> (Self, mpsc::UnboundedReceiver<TransportRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(config, tx), rx)
    }

    /// Returns the origin tag stamped on requests.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Origin {
        self.inner.origin
    }

    /// Returns the number of pending entries.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Returns `true` if `id` still has a pending entry.
    #[inline]
    #[must_use]
    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.inner.pending.lock().contains_key(id)
    }
}

// ============================================================================
// Correlator - Calls
// ============================================================================

impl Correlator {
    /// Sends an operation and waits for its terminal reply.
    ///
    /// Waits forever unless the configuration sets a call timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::Remote`] with the privileged side's error text
    /// - [`Error::ConnectionClosed`] if the relay is gone
    /// - [`Error::RequestTimeout`] if a configured timeout elapses
    /// - [`Error::Protocol`] if too many requests are pending
    pub async fn call(&self, message: MessageType, request: Value) -> Result<Value> {
        let (id, reply) = self.register(message, None)?;
        self.post(&id, message, request)?;
        self.await_reply(&id, reply, self.inner.call_timeout).await
    }

    /// Like [`call`](Self::call) with an explicit deadline.
    ///
    /// On expiry the pending entry is removed, so a late reply is
    /// treated as unmatched.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call).
    pub async fn call_with_timeout(
        &self,
        message: MessageType,
        request: Value,
        limit: Duration,
    ) -> Result<Value> {
        let (id, reply) = self.register(message, None)?;
        self.post(&id, message, request)?;
        self.await_reply(&id, reply, Some(limit)).await
    }

    /// Sends a subscription operation.
    ///
    /// Returns the terminal reply together with the notification stream.
    /// Notifications that arrive before the reply are buffered in the
    /// stream. A failed terminal reply removes the entry.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call).
    pub async fn subscribe(
        &self,
        message: MessageType,
        request: Value,
    ) -> Result<(Value, Notifications)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (id, reply) = self.register(message, Some(tx))?;

        let notifications = Notifications {
            id: id.clone(),
            rx,
            correlator: Arc::downgrade(&self.inner),
        };

        self.post(&id, message, request)?;

        let response = self.await_reply(&id, reply, self.inner.call_timeout).await?;
        Ok((response, notifications))
    }

    /// Allocates an id and inserts the pending entry.
    fn register(
        &self,
        message: MessageType,
        subscriber: Option<mpsc::UnboundedSender<Value>>,
    ) -> Result<(RequestId, oneshot::Receiver<Result<Value>>)> {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id();

        let mut pending = self.inner.pending.lock();
        if pending.len() >= self.inner.max_pending {
            warn!(
                pending = pending.len(),
                max = self.inner.max_pending,
                "Too many pending requests"
            );
            return Err(Error::protocol(format!(
                "Too many pending requests: {}/{}",
                pending.len(),
                self.inner.max_pending
            )));
        }

        pending.insert(
            id.clone(),
            PendingRequest {
                message,
                reply: Some(tx),
                subscriber,
            },
        );

        Ok((id, rx))
    }

    /// Hands the request envelope to the relay.
    fn post(&self, id: &RequestId, message: MessageType, request: Value) -> Result<()> {
        let envelope = TransportRequest::new(id.clone(), message, self.inner.origin, request);

        if self.inner.outbound.send(envelope).is_err() {
            self.inner.pending.lock().remove(id);
            return Err(Error::ConnectionClosed);
        }

        trace!(request_id = %id, %message, "Request posted");
        Ok(())
    }

    /// Waits for the terminal reply, optionally bounded.
    async fn await_reply(
        &self,
        id: &RequestId,
        reply: oneshot::Receiver<Result<Value>>,
        limit: Option<Duration>,
    ) -> Result<Value> {
        let Some(limit) = limit else {
            return reply.await.map_err(|_| Error::ConnectionClosed)?;
        };

        match timeout(limit, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.release(id);
                Err(Error::request_timeout(
                    id.clone(),
                    limit.as_millis() as u64,
                ))
            }
        }
    }

    /// Returns the next `"<epoch-millis>.<counter>"` id.
    fn next_id(&self) -> RequestId {
        let counter = self.inner.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        RequestId::compose(millis, counter)
    }
}

// ============================================================================
// Correlator - Inbound
// ============================================================================

impl Correlator {
    /// Routes one inbound envelope to its pending entry.
    ///
    /// Returns `false` if nothing took the envelope (unknown id, or a
    /// notification for a call that has no subscriber). Never panics.
    pub fn handle_response(&self, response: TransportResponse) -> bool {
        let id = response.id.clone();
        let kind = response.kind();

        let mut pending = self.inner.pending.lock();

        let Some(entry) = pending.get_mut(&id) else {
            warn!(request_id = %id, ?kind, "Unknown response");
            return false;
        };

        if kind == ResponseKind::Notification {
            let Some(subscriber) = entry.subscriber.as_ref() else {
                warn!(request_id = %id, message = %entry.message, "Notification for call without subscriber");
                return false;
            };

            let payload = response.subscription.unwrap_or(Value::Null);
            if subscriber.send(payload).is_err() {
                pending.remove(&id);
                debug!(request_id = %id, "Subscriber dropped, entry released");
            }
            return true;
        }

        // Plain calls always end here; subscriptions end only on failure.
        let reply = if entry.subscriber.is_none() || kind == ResponseKind::Failure {
            pending.remove(&id).and_then(|entry| entry.reply)
        } else {
            entry.reply.take()
        };
        drop(pending);

        match reply {
            Some(tx) => {
                if tx.send(response.into_result()).is_err() {
                    debug!(request_id = %id, "Caller stopped waiting");
                }
            }
            None => debug!(request_id = %id, "Repeated terminal reply ignored"),
        }

        true
    }

    /// Removes the entry for `id`, ending its notification stream.
    ///
    /// Returns `false` if there was no entry.
    pub fn release(&self, id: &RequestId) -> bool {
        release(&self.inner, id)
    }

    /// Fails every pending call with [`Error::ConnectionClosed`] and
    /// empties the table. Called when the relay goes away.
    ///
    /// Returns the number of entries removed.
    pub fn fail_pending(&self) -> usize {
        let drained: Vec<_> = self.inner.pending.lock().drain().collect();
        let count = drained.len();

        for (_, entry) in drained {
            if let Some(tx) = entry.reply {
                let _ = tx.send(Err(Error::ConnectionClosed));
            }
        }

        if count > 0 {
            debug!(count, "Failed pending requests on close");
        }
        count
    }
}

/// Removes a pending entry through the shared state.
fn release(inner: &CorrelatorInner, id: &RequestId) -> bool {
    let removed = inner.pending.lock().remove(id).is_some();
    if removed {
        trace!(request_id = %id, "Pending entry released");
    }
    removed
}

// ============================================================================
// Notifications
// ============================================================================

/// Notification stream of one subscription call.
///
/// Dropping it removes the pending entry, which is how a page stops
/// listening on its side.
pub struct Notifications {
    id: RequestId,
    rx: mpsc::UnboundedReceiver<Value>,
    correlator: Weak<CorrelatorInner>,
}

impl std::fmt::Debug for Notifications {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifications")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Notifications {
    /// Returns the correlation id of the subscription call.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Waits for the next payload. `None` once the entry is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Waits for the next payload and deserializes it.
    pub async fn recv_as<T: DeserializeOwned>(&mut self) -> Option<Result<T>> {
        let payload = self.rx.recv().await?;
        Some(serde_json::from_value(payload).map_err(Error::from))
    }
}

impl Stream for Notifications {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Notifications {
    fn drop(&mut self) {
        if let Some(inner) = self.correlator.upgrade() {
            release(&inner, &self.id);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn correlator() -> (Correlator, mpsc::UnboundedReceiver<TransportRequest>) {
        Correlator::channel(&BridgeConfig::new())
    }

    #[tokio::test]
    async fn test_call_resolves_with_response() {
        let (correlator, mut outbound) = correlator();

        let task = tokio::spawn({
            let correlator = correlator.clone();
            async move { correlator.call(MessageType::RpcListProviders, Value::Null).await }
        });

        let request = outbound.recv().await.unwrap();
        assert_eq!(request.message, "pub(rpc.listProviders)");
        assert_eq!(request.origin, Origin::Page);
        assert!(correlator.is_pending(&request.id));

        assert!(correlator.handle_response(TransportResponse::success(request.id.clone(), json!({}))));
        assert_eq!(task.await.unwrap().unwrap(), json!({}));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_call_rejects_with_error_text() {
        let (correlator, mut outbound) = correlator();

        let task = tokio::spawn({
            let correlator = correlator.clone();
            async move { correlator.call(MessageType::RpcSend, json!({ "method": "x" })).await }
        });

        let request = outbound.recv().await.unwrap();
        correlator.handle_response(TransportResponse::failure(
            request.id,
            "Cannot call pub(rpc.send) before provider is set",
        ));

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
        assert_eq!(err.to_string(), "Cannot call pub(rpc.send) before provider is set");
    }

    #[tokio::test]
    async fn test_out_of_order_replies_reach_their_callers() {
        let (correlator, mut outbound) = correlator();

        let a = tokio::spawn({
            let correlator = correlator.clone();
            async move { correlator.call(MessageType::RpcSend, json!("a")).await }
        });
        let a_id = outbound.recv().await.unwrap().id;

        let b = tokio::spawn({
            let correlator = correlator.clone();
            async move { correlator.call(MessageType::RpcSend, json!("b")).await }
        });
        let b_id = outbound.recv().await.unwrap().id;

        correlator.handle_response(TransportResponse::success(b_id, json!("B")));
        correlator.handle_response(TransportResponse::success(a_id, json!("A")));

        assert_eq!(a.await.unwrap().unwrap(), json!("A"));
        assert_eq!(b.await.unwrap().unwrap(), json!("B"));
    }

    #[test]
    fn test_unknown_id_is_dropped() {
        let (correlator, _outbound) = correlator();
        assert!(!correlator.handle_response(TransportResponse::success("0.0".into(), json!(1))));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_id_leaves_other_entries_alone() {
        let (correlator, mut outbound) = correlator();

        let task = tokio::spawn({
            let correlator = correlator.clone();
            async move { correlator.call(MessageType::MetadataList, Value::Null).await }
        });
        let id = outbound.recv().await.unwrap().id;

        assert!(!correlator.handle_response(TransportResponse::failure("9.9".into(), "stray")));
        assert!(correlator.is_pending(&id));

        correlator.handle_response(TransportResponse::success(id, json!([])));
        assert_eq!(task.await.unwrap().unwrap(), json!([]));
    }

    #[tokio::test]
    async fn test_subscription_keeps_entry_across_notifications() {
        let (correlator, mut outbound) = correlator();

        let task = tokio::spawn({
            let correlator = correlator.clone();
            async move {
                correlator
                    .subscribe(MessageType::RpcSubscribe, json!({ "method": "chain_subscribeNewHeads" }))
                    .await
            }
        });
        let id = outbound.recv().await.unwrap().id;

        correlator.handle_response(TransportResponse::success(id.clone(), json!(7)));
        let (subscription_id, mut notifications) = task.await.unwrap().unwrap();
        assert_eq!(subscription_id, json!(7));

        for head in ["H1", "H2", "H3"] {
            assert!(correlator.handle_response(TransportResponse::notification(id.clone(), json!(head))));
        }

        assert_eq!(notifications.recv().await, Some(json!("H1")));
        assert_eq!(notifications.recv().await, Some(json!("H2")));
        assert_eq!(notifications.recv().await, Some(json!("H3")));
        assert!(correlator.is_pending(&id));

        drop(notifications);
        assert!(!correlator.is_pending(&id));
    }

    #[tokio::test]
    async fn test_notifications_before_reply_are_buffered() {
        let (correlator, mut outbound) = correlator();

        let task = tokio::spawn({
            let correlator = correlator.clone();
            async move { correlator.subscribe(MessageType::RpcSubscribeConnected, Value::Null).await }
        });
        let id = outbound.recv().await.unwrap().id;

        correlator.handle_response(TransportResponse::notification(id.clone(), json!(true)));
        correlator.handle_response(TransportResponse::success(id, json!(true)));

        let (_, mut notifications) = task.await.unwrap().unwrap();
        assert_eq!(notifications.recv_as::<bool>().await.unwrap().unwrap(), true);
    }

    #[tokio::test]
    async fn test_failed_subscription_removes_entry() {
        let (correlator, mut outbound) = correlator();

        let task = tokio::spawn({
            let correlator = correlator.clone();
            async move { correlator.subscribe(MessageType::RpcSubscribe, Value::Null).await }
        });
        let id = outbound.recv().await.unwrap().id;

        correlator.handle_response(TransportResponse::failure(id.clone(), "no provider"));

        assert!(task.await.unwrap().is_err());
        assert!(!correlator.is_pending(&id));
    }

    #[tokio::test]
    async fn test_notification_for_plain_call_is_ignored() {
        let (correlator, mut outbound) = correlator();

        let task = tokio::spawn({
            let correlator = correlator.clone();
            async move { correlator.call(MessageType::RpcSend, Value::Null).await }
        });
        let id = outbound.recv().await.unwrap().id;

        assert!(!correlator.handle_response(TransportResponse::notification(id.clone(), json!(1))));
        assert!(correlator.is_pending(&id));

        correlator.handle_response(TransportResponse::success(id, json!(2)));
        assert_eq!(task.await.unwrap().unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_increasing() {
        let (correlator, _outbound) = correlator();
        let counters: Vec<_> = (0..100)
            .map(|_| correlator.next_id().counter().unwrap())
            .collect();

        assert!(counters.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_closed_relay_fails_call() {
        let (correlator, outbound) = correlator();
        drop(outbound);

        let err = correlator.call(MessageType::RpcSend, Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_pending_rejects_everyone() {
        let (correlator, mut outbound) = correlator();

        let task = tokio::spawn({
            let correlator = correlator.clone();
            async move { correlator.call(MessageType::AccountsList, Value::Null).await }
        });
        outbound.recv().await.unwrap();

        assert_eq!(correlator.fail_pending(), 1);
        assert!(matches!(task.await.unwrap(), Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_timeout_releases_entry() {
        let (correlator, mut outbound) = correlator();

        let err = correlator
            .call_with_timeout(MessageType::RpcSend, Value::Null, Duration::from_millis(20))
            .await
            .unwrap_err();
        let id = outbound.recv().await.unwrap().id;

        assert!(matches!(err, Error::RequestTimeout { .. }));
        assert!(!correlator.is_pending(&id));
        assert!(!correlator.handle_response(TransportResponse::success(id, json!(1))));
    }

    #[tokio::test]
    async fn test_pending_limit() {
        let config = BridgeConfig::new().with_max_pending(1);
        let (correlator, mut outbound) = Correlator::channel(&config);

        let _first = tokio::spawn({
            let correlator = correlator.clone();
            async move { correlator.call(MessageType::RpcSend, Value::Null).await }
        });
        outbound.recv().await.unwrap();

        let err = correlator.call(MessageType::RpcSend, Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_call_waits_without_timeout() {
        let (correlator, mut outbound) = correlator();

        let mut call = tokio_test::task::spawn(correlator.call(MessageType::RpcSend, Value::Null));
        tokio_test::assert_pending!(call.poll());
        tokio_test::assert_pending!(call.poll());

        let id = outbound.try_recv().unwrap().id;
        assert!(correlator.handle_response(TransportResponse::success(id, json!("done"))));

        assert!(call.is_woken());
        let value = tokio_test::assert_ready_ok!(call.poll());
        assert_eq!(value, json!("done"));
    }
}
