//! Wire message types.
//!
//! This module defines the envelopes exchanged between the page and the
//! privileged side, and the operation names they carry.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `TransportRequest` | Page → Privileged | Operation call |
//! | `TransportResponse` | Privileged → Page | Terminal reply or subscription notification |
//!
//! # Operation Naming
//!
//! Operations follow the `pub(group.method)` format:
//!
//! - `pub(rpc.send)`
//! - `pub(accounts.subscribe)`
//! - `pub(extrinsic.sign)`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | Request and response envelopes |
//! | `method` | Operation names and request payloads |

// ============================================================================
// Submodules
// ============================================================================

/// Request and response envelopes.
pub mod message;

/// Operation names and typed request payloads.
pub mod method;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{Origin, ResponseKind, TransportRequest, TransportResponse};
pub use method::{
    MessageType, RequestAuthorizeTab, RequestRpcSend, RequestRpcSubscribe, RequestRpcUnsubscribe,
};
