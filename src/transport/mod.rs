//! WebSocket transport layer.
//!
//! Reference relay between pages and the privileged side. Any other relay
//! works as long as it delivers envelopes in order per connection and
//! reports closure exactly once.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────────┐
//! │  Page           │                              │  Privileged side    │
//! │                 │         WebSocket            │                     │
//! │  Correlator     │◄────────────────────────────►│  BridgeServer       │
//! │  PageTransport  │      localhost:PORT          │  → Dispatcher       │
//! │                 │                              │  → Registry         │
//! └─────────────────┘                              └─────────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `BridgeServer::bind` - Bind and start accepting
//! 2. `PageTransport::connect` - Page opens a socket, server assigns a `ConnectionId`
//! 3. Requests flow page → server, replies and notifications flow back
//! 4. Socket closes - page fails its pending calls, server tears down the provider
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `client` | Page-side socket and event loop |
//! | `server` | Privileged-side accept loop and per-connection relay |

// ============================================================================
// Submodules
// ============================================================================

/// Page-side socket and event loop.
pub mod client;

/// Privileged-side WebSocket server.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::PageTransport;
pub use server::BridgeServer;
