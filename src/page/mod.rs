//! Page-side API.
//!
//! This module contains what an untrusted page holds: a [`Correlator`]
//! multiplexing calls over one channel, and the capability facade built
//! on top of it.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Correlator`] | Pending-request table and id allocation |
//! | [`Injected`] | Capability bundle returned by [`enable`] |
//! | [`Accounts`], [`Metadata`], [`RpcProvider`], [`Signer`] | Individual capabilities |
//!
//! # Example
//!
//! ```ignore
//! use extension_bridge::{BridgeConfig, page::enable, transport::PageTransport};
//!
//! let transport = PageTransport::connect("ws://127.0.0.1:9944", &BridgeConfig::new()).await?;
//! let injected = enable(transport.correlator(), "my-dapp").await?;
//!
//! injected.provider.start_provider("westend").await?;
//! let header = injected.provider.send("chain_getHeader", vec![]).await?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Account capability.
pub mod accounts;

/// Request/response correlation.
pub mod correlator;

/// Capability bundle and authorization.
pub mod injected;

/// Chain metadata capability.
pub mod metadata;

/// Node RPC capability.
pub mod rpc;

/// Signing capability.
pub mod signer;

// ============================================================================
// Re-exports
// ============================================================================

pub use accounts::{Accounts, InjectedAccount};
pub use correlator::{Correlator, Notifications};
pub use injected::{Injected, enable};
pub use metadata::{InjectedMetadataKnown, Metadata, MetadataDef};
pub use rpc::{RpcProvider, RpcSubscription};
pub use signer::{Signer, SignerPayloadRaw, SignerResult};
