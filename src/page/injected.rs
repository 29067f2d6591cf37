//! The capability bundle a page receives after authorization.

use serde_json::to_value;
use tracing::info;

use crate::error::Result;
use crate::protocol::{MessageType, RequestAuthorizeTab};

use super::{Accounts, Correlator, Metadata, RpcProvider, Signer};

// ============================================================================
// Injected
// ============================================================================

/// Everything the page can reach. Each capability forwards to one shared
/// correlator.
#[derive(Clone)]
pub struct Injected {
    /// Exposed accounts.
    pub accounts: Accounts,
    /// Chain metadata exchange.
    pub metadata: Metadata,
    /// Node RPC.
    pub provider: RpcProvider,
    /// Signing.
    pub signer: Signer,
}

impl Injected {
    /// Builds the facade over `correlator` without authorizing.
    #[must_use]
    pub fn new(correlator: &Correlator) -> Self {
        Self {
            accounts: Accounts::new(correlator.clone()),
            metadata: Metadata::new(correlator.clone()),
            provider: RpcProvider::new(correlator.clone()),
            signer: Signer::new(correlator.clone()),
        }
    }
}

/// Asks the user to authorize `origin`, then returns the facade.
///
/// # Errors
///
/// Returns [`Error::Remote`](crate::Error::Remote) if the user rejects the
/// request, or any transport error.
pub async fn enable(correlator: &Correlator, origin: &str) -> Result<Injected> {
    let request = RequestAuthorizeTab {
        origin: origin.to_string(),
    };
    correlator
        .call(MessageType::AuthorizeTab, to_value(request)?)
        .await?;

    info!(origin, "Page authorized");
    Ok(Injected::new(correlator))
}

// ============================================================================
// Tests
// ============================================================================
