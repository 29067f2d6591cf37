//! Privileged-side WebSocket relay.
//!
//! Every accepted socket is one connection. The server assigns it a
//! [`ConnectionId`], feeds its frames to the [`Dispatcher`], writes the
//! replies back, and reports the closure to the [`ConnectionRegistry`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │              BridgeServer                 │
//! │              (single port)                │
//! │  ┌─────────────────────────────────────┐  │
//! │  │ ConnectionId=1 → socket task        │  │
//! │  │ ConnectionId=2 → socket task        │  │
//! │  └─────────────────────────────────────┘  │
//! │                    │                      │
//! │                Dispatcher                 │
//! │                    │                      │
//! │            ConnectionRegistry             │
//! └───────────────────────────────────────────┘
//! ```
//!
//! [`ConnectionRegistry`]: crate::registry::ConnectionRegistry

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::{Value, from_str, to_string};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, RequestId};
use crate::protocol::{TransportRequest, TransportResponse};
use crate::registry::{Dispatcher, Outbound};

// ============================================================================
// Constants
// ============================================================================

/// How often the accept loop rechecks the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// BridgeServer
// ============================================================================

/// WebSocket server that relays page requests to the registry.
///
/// # Example
///
/// ```ignore
/// let registry = Arc::new(ConnectionRegistry::new(catalog));
/// let server = BridgeServer::bind(&BridgeConfig::new(), Dispatcher::new(registry)).await?;
/// println!("Pages connect to {}", server.ws_url());
/// ```
pub struct BridgeServer {
    /// Bound address.
    addr: SocketAddr,

    /// Request router shared by every connection.
    dispatcher: Dispatcher,

    /// Close signals for live connections.
    connections: RwLock<FxHashMap<ConnectionId, oneshot::Sender<()>>>,

    /// Next connection id. Starts at 1.
    next_connection: AtomicU64,

    /// Shutdown flag.
    shutdown: AtomicBool,
}

impl std::fmt::Debug for BridgeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeServer")
            .field("addr", &self.addr)
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// BridgeServer - Constructor
// ============================================================================

impl BridgeServer {
    /// Binds to `config.bind_addr()` and starts the accept loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::Io`] if binding fails
    pub async fn bind(config: &BridgeConfig, dispatcher: Dispatcher) -> Result<Arc<Self>> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_addr()).await?;
        let addr = listener.local_addr()?;

        let server = Arc::new(Self {
            addr,
            dispatcher,
            connections: RwLock::new(FxHashMap::default()),
            next_connection: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
        });

        let accept = Arc::clone(&server);
        tokio::spawn(async move {
            accept.accept_loop(listener).await;
        });

        info!(%addr, "BridgeServer started");

        Ok(server)
    }
}

// ============================================================================
// BridgeServer - Public API
// ============================================================================

impl BridgeServer {
    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Returns the WebSocket URL pages connect to.
    ///
    /// Format: `ws://{ip}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Returns the number of open connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns the dispatcher serving this server.
    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Closes one connection. Its provider is torn down once the socket
    /// task finishes.
    pub fn disconnect(&self, connection: ConnectionId) -> bool {
        let signal = self.connections.write().remove(&connection);

        match signal {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Stops accepting and closes every connection.
    pub fn shutdown(&self) {
        info!("BridgeServer shutting down");

        self.shutdown.store(true, Ordering::SeqCst);

        let connections: Vec<_> = self.connections.write().drain().collect();
        for (connection, tx) in connections {
            let _ = tx.send(());
            debug!(connection_id = %connection, "Connection closed during shutdown");
        }
    }
}

// ============================================================================
// BridgeServer - Accept Loop
// ============================================================================

impl BridgeServer {
    /// Background task that accepts new sockets.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, addr).await {
                            warn!(error = %e, ?addr, "Connection handling failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => continue,
            }
        }

        debug!("Accept loop terminated");
    }

    /// Allocates the next connection id.
    fn next_connection_id(&self) -> Result<ConnectionId> {
        let raw = self.next_connection.fetch_add(1, Ordering::Relaxed);
        ConnectionId::new(raw).ok_or_else(|| Error::protocol("Connection id space exhausted"))
    }

    /// Serves one socket until it closes, then tears down its provider.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let connection = self.next_connection_id()?;
        let (close_tx, mut close_rx) = oneshot::channel();
        self.connections.write().insert(connection, close_tx);

        info!(connection_id = %connection, ?addr, "Connection opened");

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<TransportResponse>();
        let (mut ws_write, mut ws_read) = ws_stream.split();
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_incoming(connection, &text, &outbound, &mut in_flight);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!(connection_id = %connection, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            warn!(connection_id = %connection, error = %e, "WebSocket error");
                            break;
                        }

                        None => break,

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                Some(response) = outbound_rx.recv() => {
                    let json = match to_string(&response) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(request_id = %response.id, error = %e, "Failed to encode reply");
                            continue;
                        }
                    };

                    if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                        warn!(connection_id = %connection, error = %e, "Failed to send reply");
                        break;
                    }

                    trace!(connection_id = %connection, request_id = %response.id, "Reply sent");
                }

                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}

                _ = &mut close_rx => {
                    let _ = ws_write.close().await;
                    break;
                }
            }
        }

        // Backend calls still running reply to nobody.
        in_flight.shutdown().await;

        self.connections.write().remove(&connection);
        self.dispatcher.registry().connection_closed(connection);

        info!(connection_id = %connection, "Connection closed");

        Ok(())
    }

    /// Parses one frame, runs its ordered phase and spawns the rest.
    fn handle_incoming(
        &self,
        connection: ConnectionId,
        text: &str,
        outbound: &Outbound,
        in_flight: &mut JoinSet<()>,
    ) {
        match from_str::<TransportRequest>(text) {
            Ok(request) => {
                // Binding checks run here, in arrival order; only backend
                // awaits run concurrently.
                if let Some(rest) = self.dispatcher.begin(connection, request, outbound) {
                    in_flight.spawn(rest);
                }
            }

            Err(e) => {
                warn!(connection_id = %connection, error = %e, "Unparsable request frame");

                // Answer if the frame at least carries an id.
                if let Some(id) = from_str::<Value>(text)
                    .ok()
                    .and_then(|value| value.get("id")?.as_str().map(RequestId::new))
                {
                    let reply = TransportResponse::failure(
                        id,
                        Error::protocol(format!("Malformed request: {e}")).to_string(),
                    );
                    let _ = outbound.send(reply);
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
