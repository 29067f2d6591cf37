//! Backend providers and the catalog that exposes them.
//!
//! A provider executes node RPC methods and emits subscription events.
//! The catalog is supplied once at process start and read-only after.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `catalog` | Key → descriptor mapping |
//! | `instance` | Running provider contract and notification sinks |
//! | `meta` | Serializable provider descriptor |

// ============================================================================
// Submodules
// ============================================================================

/// Key → descriptor mapping.
pub mod catalog;

/// Running provider contract.
pub mod instance;

/// Serializable provider metadata.
pub mod meta;

// ============================================================================
// Re-exports
// ============================================================================

pub use catalog::{ProviderCatalog, ProviderDescriptor};
pub use instance::{Connectivity, ProviderInstance, SubscriptionSink};
pub use meta::{NodeKind, ProviderMeta};
