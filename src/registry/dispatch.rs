//! Inbound request dispatch on the privileged side.
//!
//! Turns each [`TransportRequest`] from a connection into exactly one
//! terminal [`TransportResponse`], plus notification envelopes under the
//! same id for subscription operations.
//!
//! # Routing
//!
//! | Operation group | Served by |
//! |-----------------|-----------|
//! | `pub(rpc.*)` | [`ConnectionRegistry`] |
//! | everything else | [`PrivilegedHandler`] (accounts, metadata, signing, authorization) |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::{Value, to_value};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, RequestId};
use crate::protocol::{MessageType, TransportRequest, TransportResponse};
use crate::provider::SubscriptionSink;

use super::ConnectionRegistry;
use super::state::BackendCall;

// ============================================================================
// Types
// ============================================================================

/// Channel carrying envelopes back to one connection.
pub type Outbound = mpsc::UnboundedSender<TransportResponse>;

// ============================================================================
// PrivilegedHandler
// ============================================================================

/// Serves the non-RPC operations (keystore, metadata store, signing UI).
///
/// `sink` is `Some` only for operations that stream notifications.
#[async_trait]
pub trait PrivilegedHandler: Send + Sync {
    /// Handles one operation and returns its terminal result.
    async fn handle(
        &self,
        connection: ConnectionId,
        message: MessageType,
        request: Value,
        sink: Option<SubscriptionSink>,
    ) -> Result<Value>;
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes inbound requests to the registry or the privileged handler.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    handler: Option<Arc<dyn PrivilegedHandler>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("bound", &self.registry.bound_count())
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl Dispatcher {
    /// Creates a dispatcher serving only `pub(rpc.*)` operations.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            handler: None,
        }
    }

    /// Adds a handler for the non-RPC operations.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn PrivilegedHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Returns the registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Handles one request and writes its terminal reply to `outbound`.
    ///
    /// Never fails: every error becomes an `error` envelope.
    pub async fn dispatch(
        &self,
        connection: ConnectionId,
        request: TransportRequest,
        outbound: &Outbound,
    ) {
        if let Some(rest) = self.begin(connection, request, outbound) {
            rest.await;
        }
    }

    /// Runs the ordered part of a request now and returns the rest.
    ///
    /// Binding checks, provider starts and connectivity registration
    /// happen before this returns, so a relay calling `begin` for each
    /// frame in arrival order sees every earlier `startProvider` applied.
    /// The returned future awaits the backend (or the privileged handler)
    /// and writes the terminal reply; it is `None` when the reply was
    /// already written.
    pub fn begin(
        &self,
        connection: ConnectionId,
        request: TransportRequest,
        outbound: &Outbound,
    ) -> Option<BoxFuture<'static, ()>> {
        match self.prepare(connection, &request, outbound) {
            Ok(Step::Ready(value)) => {
                reply(connection, &request, Ok(value), outbound);
                None
            }
            Err(e) => {
                reply(connection, &request, Err(e), outbound);
                None
            }
            Ok(Step::Pending(call)) => {
                let outbound = outbound.clone();
                Some(
                    async move {
                        let result = call.await;
                        reply(connection, &request, result, &outbound);
                    }
                    .boxed(),
                )
            }
        }
    }

    /// Checks and applies the request against the registry.
    fn prepare(
        &self,
        connection: ConnectionId,
        request: &TransportRequest,
        outbound: &Outbound,
    ) -> Result<Step> {
        let message = request.message_type()?;

        trace!(connection_id = %connection, request_id = %request.id, %message, "Dispatching");

        match message {
            MessageType::RpcListProviders => Ok(Step::Ready(to_value(self.registry.list_providers())?)),

            MessageType::RpcStartProvider => {
                let key: String = request.payload()?;
                let meta = self.registry.start_provider(&key, connection)?;
                Ok(Step::Ready(to_value(meta)?))
            }

            MessageType::RpcSend => {
                let call = self.registry.send(request.payload()?, connection)?;
                Ok(Step::Pending(call))
            }

            MessageType::RpcSubscribe => {
                let payload = request.payload()?;
                let sink = forward(request.id.clone(), outbound);
                let call = self.registry.subscribe(payload, sink, connection)?;
                Ok(Step::Pending(
                    async move { Ok::<_, Error>(to_value(call.await?)?) }.boxed(),
                ))
            }

            MessageType::RpcSubscribeConnected => {
                let sink = forward(request.id.clone(), outbound);
                self.registry.subscribe_connected(connection, sink)?;
                Ok(Step::Ready(Value::Bool(true)))
            }

            MessageType::RpcUnsubscribe => {
                let call = self.registry.unsubscribe(request.payload()?, connection)?;
                Ok(Step::Pending(
                    async move { Ok::<_, Error>(Value::Bool(call.await?)) }.boxed(),
                ))
            }

            other => {
                let handler = self
                    .handler
                    .as_ref()
                    .map(Arc::clone)
                    .ok_or_else(|| Error::unknown_message(other.as_str()))?;

                let sink = other
                    .has_subscription()
                    .then(|| forward(request.id.clone(), outbound));
                let payload = request.request.clone();

                Ok(Step::Pending(
                    async move { handler.handle(connection, other, payload, sink).await }.boxed(),
                ))
            }
        }
    }
}

/// Outcome of the ordered phase.
enum Step {
    /// Terminal result known already.
    Ready(Value),
    /// Backend work still to await.
    Pending(BackendCall<Value>),
}

/// Writes the terminal reply for `request`.
fn reply(connection: ConnectionId, request: &TransportRequest, result: Result<Value>, outbound: &Outbound) {
    let id = request.id.clone();

    if let Err(ref e) = result {
        debug!(
            connection_id = %connection,
            request_id = %id,
            message = %request.message,
            error = %e,
            "Request rejected"
        );
    }

    if outbound
        .send(TransportResponse::from_result(id.clone(), result))
        .is_err()
    {
        debug!(request_id = %id, "Connection gone, reply dropped");
    }
}

/// Creates a sink whose payloads reach `outbound` as notifications for `id`.
///
/// The forwarding task ends when every sink clone is dropped or the
/// connection's outbound channel closes.
fn forward(id: RequestId, outbound: &Outbound) -> SubscriptionSink {
    let (sink, mut rx) = SubscriptionSink::channel();
    let outbound = outbound.clone();

    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if outbound
                .send(TransportResponse::notification(id.clone(), payload))
                .is_err()
            {
                break;
            }
        }
        trace!(request_id = %id, "Notification forwarder finished");
    });

    sink
}

// ============================================================================
// Tests
// ============================================================================
