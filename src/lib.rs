//! Extension Bridge - Request correlation between untrusted pages and a
//! privileged extension process.
//!
//! A page cannot touch keys or node connections. It sends serializable
//! requests over one channel; the privileged side executes them and
//! answers with replies and subscription notifications tagged with the
//! same correlation id.
//!
//! # Architecture
//!
//! The bridge has two halves:
//!
//! - **Page side**: a [`Correlator`] allocates ids, tracks pending calls and
//!   routes each reply to its caller. The capability facade ([`Injected`])
//!   sits on top of it.
//! - **Privileged side**: a [`ConnectionRegistry`] binds at most one
//!   provider instance per connection and tears it down when the
//!   connection closes. A [`Dispatcher`] turns inbound requests into
//!   registry calls.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use extension_bridge::{
//!     BridgeConfig, BridgeServer, ConnectionRegistry, Dispatcher, PageTransport,
//!     ProviderCatalog, Result, enable,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Privileged side
//!     let registry = Arc::new(ConnectionRegistry::new(ProviderCatalog::new()));
//!     let server = BridgeServer::bind(&BridgeConfig::new(), Dispatcher::new(registry)).await?;
//!
//!     // Page side
//!     let transport = PageTransport::connect(&server.ws_url(), &BridgeConfig::new()).await?;
//!     let injected = enable(transport.correlator(), "my-dapp").await?;
//!
//!     let providers = injected.provider.list_providers().await?;
//!     println!("{} providers", providers.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`BridgeConfig`] settings |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`page`] | Correlator and capability facade |
//! | [`protocol`] | Wire envelopes and operation names |
//! | [`provider`] | Backend provider contract and catalog |
//! | [`registry`] | Connection registry and request dispatch |
//! | [`transport`] | Reference WebSocket relay |

// ============================================================================
// Modules
// ============================================================================

/// Shared settings.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing request, connection and subscription ids.
pub mod identifiers;

/// Page-side correlator and capability facade.
pub mod page;

/// Wire message types.
pub mod protocol;

/// Backend providers.
pub mod provider;

/// Privileged-side registry and dispatch.
pub mod registry;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::BridgeConfig;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, RequestId, SubscriptionId};

// Page types
pub use page::{Correlator, Injected, Notifications, enable};

// Protocol types
pub use protocol::{MessageType, Origin, TransportRequest, TransportResponse};

// Provider types
pub use provider::{
    Connectivity, NodeKind, ProviderCatalog, ProviderDescriptor, ProviderInstance, ProviderMeta,
    SubscriptionSink,
};

// Registry types
pub use registry::{ConnectionRegistry, Dispatcher, PrivilegedHandler};

// Transport types
pub use transport::{BridgeServer, PageTransport};
