//! Operation names and typed request payloads.
//!
//! # Operation Groups
//!
//! | Group | Operations |
//! |-------|------------|
//! | `authorize` | `tab` |
//! | `accounts` | `list`, `subscribe` |
//! | `metadata` | `list`, `provide` |
//! | `bytes` / `extrinsic` | `sign` |
//! | `rpc` | `listProviders`, `startProvider`, `send`, `subscribe`, `subscribeConnected`, `unsubscribe` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::identifiers::SubscriptionId;

// ============================================================================
// MessageType
// ============================================================================

/// Every operation a page may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Ask the user to authorize this page.
    AuthorizeTab,
    /// List exposed accounts.
    AccountsList,
    /// Stream account list changes.
    AccountsSubscribe,
    /// List known chain metadata.
    MetadataList,
    /// Offer new chain metadata.
    MetadataProvide,
    /// Sign raw bytes.
    BytesSign,
    /// Sign an extrinsic payload.
    ExtrinsicSign,
    /// List providers in the catalog.
    RpcListProviders,
    /// Bind a provider to this connection.
    RpcStartProvider,
    /// One-shot RPC call on the bound provider.
    RpcSend,
    /// Node subscription on the bound provider.
    RpcSubscribe,
    /// Stream the bound provider's connectivity.
    RpcSubscribeConnected,
    /// Cancel a node subscription.
    RpcUnsubscribe,
}

impl MessageType {
    /// All operations, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::AuthorizeTab,
        Self::AccountsList,
        Self::AccountsSubscribe,
        Self::MetadataList,
        Self::MetadataProvide,
        Self::BytesSign,
        Self::ExtrinsicSign,
        Self::RpcListProviders,
        Self::RpcStartProvider,
        Self::RpcSend,
        Self::RpcSubscribe,
        Self::RpcSubscribeConnected,
        Self::RpcUnsubscribe,
    ];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizeTab => "pub(authorize.tab)",
            Self::AccountsList => "pub(accounts.list)",
            Self::AccountsSubscribe => "pub(accounts.subscribe)",
            Self::MetadataList => "pub(metadata.list)",
            Self::MetadataProvide => "pub(metadata.provide)",
            Self::BytesSign => "pub(bytes.sign)",
            Self::ExtrinsicSign => "pub(extrinsic.sign)",
            Self::RpcListProviders => "pub(rpc.listProviders)",
            Self::RpcStartProvider => "pub(rpc.startProvider)",
            Self::RpcSend => "pub(rpc.send)",
            Self::RpcSubscribe => "pub(rpc.subscribe)",
            Self::RpcSubscribeConnected => "pub(rpc.subscribeConnected)",
            Self::RpcUnsubscribe => "pub(rpc.unsubscribe)",
        }
    }

    /// Returns `true` if the operation streams notifications under its id.
    #[inline]
    #[must_use]
    pub const fn has_subscription(&self) -> bool {
        matches!(
            self,
            Self::AccountsSubscribe | Self::RpcSubscribe | Self::RpcSubscribeConnected
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::unknown_message(s))
    }
}

// ============================================================================
// Request Payloads
// ============================================================================

/// Payload of `pub(authorize.tab)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAuthorizeTab {
    /// Human-readable name of the requesting dapp.
    pub origin: String,
}

/// Payload of `pub(rpc.send)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRpcSend {
    /// Node RPC method, e.g. `chain_getHeader`.
    pub method: String,
    /// Positional parameters.
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Payload of `pub(rpc.subscribe)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRpcSubscribe {
    /// Notification type, e.g. `chain_newHead`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Subscribe method, e.g. `chain_subscribeNewHeads`.
    pub method: String,
    /// Positional parameters.
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Payload of `pub(rpc.unsubscribe)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRpcUnsubscribe {
    /// Notification type the subscription was created with.
    #[serde(rename = "type")]
    pub kind: String,
    /// Unsubscribe method, e.g. `chain_unsubscribeNewHeads`.
    pub method: String,
    /// Id returned by the matching subscribe.
    #[serde(rename = "subscriptionId")]
    pub subscription_id: SubscriptionId,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_names_round_trip_through_from_str() {
        for message in MessageType::ALL {
            assert_eq!(message.as_str().parse::<MessageType>().unwrap(), message);
        }
    }

    #[test]
    fn test_subscription_flags() {
        assert!(MessageType::RpcSubscribe.has_subscription());
        assert!(MessageType::RpcSubscribeConnected.has_subscription());
        assert!(MessageType::AccountsSubscribe.has_subscription());
        assert!(!MessageType::RpcSend.has_subscription());
        assert!(!MessageType::RpcUnsubscribe.has_subscription());
    }

    #[test]
    fn test_subscribe_payload_uses_type_key() {
        let request: RequestRpcSubscribe = serde_json::from_value(json!({
            "type": "chain_newHead",
            "method": "chain_subscribeNewHeads",
            "params": []
        }))
        .expect("parse");

        assert_eq!(request.kind, "chain_newHead");
        assert_eq!(
            serde_json::to_value(&request).unwrap()["type"],
            "chain_newHead"
        );
    }

    #[test]
    fn test_unsubscribe_payload_camel_case() {
        let request = RequestRpcUnsubscribe {
            kind: "chain_newHead".into(),
            method: "chain_unsubscribeNewHeads".into(),
            subscription_id: SubscriptionId::Number(3),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["subscriptionId"], 3);
    }

    #[test]
    fn test_send_params_default_empty() {
        let request: RequestRpcSend =
            serde_json::from_value(json!({ "method": "system_name" })).expect("parse");
        assert!(request.params.is_empty());
    }
}
