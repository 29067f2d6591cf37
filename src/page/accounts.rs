//! Account capability.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::protocol::MessageType;

use super::{Correlator, Notifications};

// ============================================================================
// InjectedAccount
// ============================================================================

/// An account the user exposed to the page. Never carries key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectedAccount {
    /// SS58 address.
    pub address: String,
    /// Chain the account is restricted to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis_hash: Option<String>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// ============================================================================
// Accounts
// ============================================================================

/// Read access to the accounts the user exposed.
#[derive(Clone)]
pub struct Accounts {
    correlator: Correlator,
}

impl Accounts {
    pub(crate) fn new(correlator: Correlator) -> Self {
        Self { correlator }
    }

    /// Returns the exposed accounts.
    pub async fn get(&self) -> Result<Vec<InjectedAccount>> {
        let accounts = self
            .correlator
            .call(MessageType::AccountsList, Value::Null)
            .await?;
        Ok(serde_json::from_value(accounts)?)
    }

    /// Streams the account list every time it changes.
    ///
    /// Each payload is a full `Vec<InjectedAccount>`; read it with
    /// [`Notifications::recv_as`].
    pub async fn subscribe(&self) -> Result<Notifications> {
        let (_, notifications) = self
            .correlator
            .subscribe(MessageType::AccountsSubscribe, Value::Null)
            .await?;

        debug!(request_id = %notifications.id(), "Account subscription active");
        Ok(notifications)
    }
}
