//! Error types for the extension bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use extension_bridge::{Result, ConnectionId};
//!
//! async fn example(registry: &ConnectionRegistry, connection: ConnectionId) -> Result<()> {
//!     registry.start_provider("westend", connection)?;
//!     let head = registry.send(request, connection)?.await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Registry | [`Error::PreconditionFailed`], [`Error::UnknownProvider`] |
//! | Backend | [`Error::Backend`], [`Error::Remote`] |
//! | Protocol | [`Error::UnknownMessage`], [`Error::InvalidArgument`], [`Error::Protocol`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::RequestTimeout`] |
//! | Configuration | [`Error::Config`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! A response for an unknown request id has no variant: it is
//! logged and dropped by the correlator, never surfaced to a caller.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Registry Errors
    // ========================================================================
    /// An operation needing a bound provider ran before `startProvider`.
    ///
    /// Carries the operation name so the page sees which call was early.
    #[error("Cannot call {operation} before provider is set")]
    PreconditionFailed {
        /// Operation that required a bound provider.
        operation: String,
    },

    /// Provider key is not in the catalog.
    #[error("Provider {key} is not exposed by extension")]
    UnknownProvider {
        /// The requested provider key.
        key: String,
    },

    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// The bound provider instance failed the call.
    ///
    /// The message is forwarded verbatim to the page.
    #[error("{message}")]
    Backend {
        /// Backend failure description.
        message: String,
    },

    /// Rejection received over the wire from the privileged side.
    #[error("{message}")]
    Remote {
        /// Error text from the response envelope.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Operation name not recognized by the privileged side.
    #[error("Unknown message type: {message}")]
    UnknownMessage {
        /// The unrecognized operation name.
        message: String,
    },

    /// Request payload does not match the operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Protocol violation or local limit.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport could not be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Transport closed while the operation was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No response arrived within the configured call timeout.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket handshake or I/O error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a precondition failure naming the rejected operation.
    #[inline]
    pub fn precondition_failed(operation: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            operation: operation.into(),
        }
    }

    /// Creates an unknown provider error.
    #[inline]
    pub fn unknown_provider(key: impl Into<String>) -> Self {
        Self::UnknownProvider { key: key.into() }
    }

    /// Creates a backend error.
    #[inline]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates a remote error from a response envelope.
    #[inline]
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Creates an unknown message error.
    #[inline]
    pub fn unknown_message(message: impl Into<String>) -> Self {
        Self::UnknownMessage {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if an operation ran before a provider was bound.
    #[inline]
    #[must_use]
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed { .. })
    }

    /// Returns `true` if the error originated on the far side of the channel.
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. } | Self::Backend { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::RequestTimeout { .. }
                | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
