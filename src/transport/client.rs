//! Page-side WebSocket relay.
//!
//! Carries the [`Correlator`]'s outbound requests to a [`BridgeServer`] and
//! hands every inbound envelope back to it. When the socket ends, all
//! pending calls fail with [`Error::ConnectionClosed`].
//!
//! [`BridgeServer`]: super::BridgeServer

// ============================================================================
// Imports
// ============================================================================

use futures_util::{SinkExt, StreamExt};
use serde_json::{from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::page::Correlator;
use crate::protocol::{TransportRequest, TransportResponse};

// ============================================================================
// Types
// ============================================================================

type PageSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// PageTransport
// ============================================================================

/// A page's connection to the privileged side.
///
/// # Example
///
/// ```ignore
/// let transport = PageTransport::connect("ws://127.0.0.1:9944", &BridgeConfig::new()).await?;
/// let injected = Injected::new(transport.correlator());
/// let providers = injected.provider.list_providers().await?;
/// transport.close().await;
/// ```
pub struct PageTransport {
    correlator: Correlator,
    shutdown_tx: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for PageTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageTransport")
            .field("pending", &self.correlator.pending_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PageTransport {
    /// Connects to `url` (`ws://` or `wss://`) and starts the event loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL or configuration is invalid
    /// - [`Error::WebSocket`] if the socket or handshake fails
    pub async fn connect(url: &str, config: &BridgeConfig) -> Result<Self> {
        config.validate()?;

        let url = Url::parse(url).map_err(|e| Error::config(format!("Invalid URL {url}: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Unsupported scheme {}, expected ws or wss",
                url.scheme()
            )));
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;

        info!(%url, "Connected to privileged side");

        let (correlator, outbound_rx) = Correlator::channel(config);
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(Self::run_event_loop(
            ws_stream,
            outbound_rx,
            shutdown_rx,
            correlator.clone(),
        ));

        Ok(Self {
            correlator,
            shutdown_tx,
            task,
        })
    }

    /// Returns the correlator bound to this connection.
    #[inline]
    #[must_use]
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Returns `true` once the event loop has ended.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    /// Asks the event loop to close the socket.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Closes the socket and waits for the event loop to finish.
    pub async fn close(self) {
        self.shutdown();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Page transport task failed");
        }
    }
}

// ============================================================================
// PageTransport - Event Loop
// ============================================================================

impl PageTransport {
    async fn run_event_loop(
        ws_stream: PageSocket,
        mut outbound_rx: mpsc::UnboundedReceiver<TransportRequest>,
        mut shutdown_rx: mpsc::UnboundedReceiver<()>,
        correlator: Correlator,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming(&text, &correlator);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }

                        None => break,

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                request = outbound_rx.recv() => {
                    let Some(request) = request else {
                        break;
                    };

                    let json = match to_string(&request) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(request_id = %request.id, error = %e, "Failed to encode request");
                            correlator.release(&request.id);
                            continue;
                        }
                    };

                    if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                        warn!(error = %e, "Failed to send request");
                        break;
                    }

                    trace!(request_id = %request.id, message = %request.message, "Request sent");
                }

                _ = shutdown_rx.recv() => {
                    debug!("Shutdown requested");
                    let _ = ws_write.close().await;
                    break;
                }
            }
        }

        let failed = correlator.fail_pending();
        if failed > 0 {
            debug!(count = failed, "Failed pending calls on close");
        }

        debug!("Page event loop terminated");
    }

    fn handle_incoming(text: &str, correlator: &Correlator) {
        match from_str::<TransportResponse>(text) {
            Ok(response) => {
                correlator.handle_response(response);
            }
            Err(e) => {
                warn!(error = %e, "Unparsable response frame");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_websocket_scheme() {
        let err = PageTransport::connect("http://127.0.0.1:1", &BridgeConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_rejects_malformed_url() {
        let err = PageTransport::connect("not a url", &BridgeConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        // Port 1 is privileged and unbound in test environments.
        let err = PageTransport::connect("ws://127.0.0.1:1", &BridgeConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WebSocket(_)));
        assert!(err.is_connection_error());
    }
}
