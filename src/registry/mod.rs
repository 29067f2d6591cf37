//! Privileged-side connection registry.
//!
//! Binds backend provider instances to connections and serves the
//! operations pages send over their channel.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `dispatch` | Inbound request routing and reply emission |
//! | `state` | Connection → provider table and provider-scoped operations |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound request routing.
pub mod dispatch;

/// Connection → provider table.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatch::{Dispatcher, Outbound, PrivilegedHandler};
pub use state::{BackendCall, ConnectionRegistry};
