//! Request and response envelopes.
//!
//! Both directions share one untyped channel per connection, so every
//! envelope carries the correlation id of the request it belongs to.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::MessageType;

// ============================================================================
// Origin
// ============================================================================

/// Tag identifying the context that sent a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Injected page script.
    Page,
    /// Extension-owned UI (popup, options page).
    Extension,
}

impl Origin {
    /// Returns the wire tag.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Extension => "extension",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TransportRequest
// ============================================================================

/// An operation call from the page.
///
/// # Format
///
/// ```json
/// {
///   "id": "1700000000000.1",
///   "message": "pub(rpc.send)",
///   "origin": "page",
///   "request": { "method": "chain_getHeader", "params": [] }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportRequest {
    /// Correlation id.
    pub id: RequestId,

    /// Operation name. Kept as a string so unknown names can be rejected
    /// with a reply instead of a parse failure.
    pub message: String,

    /// Sender context.
    pub origin: Origin,

    /// Operation payload, `null` when the operation takes none.
    #[serde(default)]
    pub request: Value,
}

impl TransportRequest {
    /// Creates a request envelope.
    #[inline]
    #[must_use]
    pub fn new(id: RequestId, message: MessageType, origin: Origin, request: Value) -> Self {
        Self {
            id,
            message: message.as_str().to_string(),
            origin,
            request,
        }
    }

    /// Parses the operation name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMessage`] for names outside [`MessageType`].
    pub fn message_type(&self) -> Result<MessageType> {
        self.message.parse()
    }

    /// Deserializes the payload into the operation's request type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the payload has the wrong shape.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.request.clone()).map_err(|e| {
            Error::invalid_argument(format!("{} payload: {e}", self.message))
        })
    }
}

// ============================================================================
// TransportResponse
// ============================================================================

/// A reply or notification from the privileged side.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": "1700000000000.1", "response": { ... } }
/// ```
///
/// Error:
/// ```json
/// { "id": "1700000000000.1", "error": "Cannot call pub(rpc.send) before provider is set" }
/// ```
///
/// Notification:
/// ```json
/// { "id": "1700000000000.2", "subscription": { ... } }
/// ```
///
/// A present field holding `null` is kept distinct from an absent one, so
/// a `null` notification is still a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportResponse {
    /// Matches the request `id`.
    pub id: RequestId,

    /// Terminal success payload.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub response: Option<Value>,

    /// Terminal failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Subscription notification payload.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub subscription: Option<Value>,
}

/// Maps any present value, `null` included, to `Some`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl TransportResponse {
    /// Creates a terminal success reply.
    #[inline]
    #[must_use]
    pub fn success(id: RequestId, response: Value) -> Self {
        Self {
            id,
            response: Some(response),
            error: None,
            subscription: None,
        }
    }

    /// Creates a terminal failure reply.
    #[inline]
    #[must_use]
    pub fn failure(id: RequestId, error: impl Into<String>) -> Self {
        Self {
            id,
            response: None,
            error: Some(error.into()),
            subscription: None,
        }
    }

    /// Creates a subscription notification.
    #[inline]
    #[must_use]
    pub fn notification(id: RequestId, payload: Value) -> Self {
        Self {
            id,
            response: None,
            error: None,
            subscription: Some(payload),
        }
    }

    /// Creates a terminal reply from an operation outcome.
    #[must_use]
    pub fn from_result(id: RequestId, result: Result<Value>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(e) => Self::failure(id, e.to_string()),
        }
    }

    /// Classifies the envelope.
    ///
    /// A notification wins over terminal fields, then an error wins over
    /// a success payload.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ResponseKind {
        if self.subscription.is_some() {
            ResponseKind::Notification
        } else if self.error.is_some() {
            ResponseKind::Failure
        } else {
            ResponseKind::Success
        }
    }

    /// Converts a terminal reply into its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] carrying the `error` text.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(message) => Err(Error::remote(message)),
            None => Ok(self.response.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// ResponseKind
// ============================================================================

/// Response envelope discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Terminal success.
    Success,
    /// Terminal failure.
    Failure,
    /// Subscription notification.
    Notification,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = TransportRequest::new(
            RequestId::compose(1, 1),
            MessageType::RpcSend,
            Origin::Page,
            json!({ "method": "system_health", "params": [] }),
        );
        let json = serde_json::to_value(&request).expect("serialize");

        assert_eq!(json["id"], "1.1");
        assert_eq!(json["message"], "pub(rpc.send)");
        assert_eq!(json["origin"], "page");
        assert_eq!(json["request"]["method"], "system_health");
    }

    #[test]
    fn test_request_missing_payload_is_null() {
        let request: TransportRequest = serde_json::from_str(
            r#"{ "id": "1.2", "message": "pub(accounts.list)", "origin": "page" }"#,
        )
        .expect("parse");

        assert!(request.request.is_null());
        assert_eq!(request.message_type().unwrap(), MessageType::AccountsList);
    }

    #[test]
    fn test_unknown_message_type() {
        let request: TransportRequest = serde_json::from_str(
            r#"{ "id": "1.3", "message": "pub(wallet.drain)", "origin": "page", "request": null }"#,
        )
        .expect("parse");

        assert!(matches!(
            request.message_type(),
            Err(Error::UnknownMessage { .. })
        ));
    }

    #[test]
    fn test_success_omits_other_fields() {
        let json =
            serde_json::to_string(&TransportResponse::success("1.1".into(), json!(42))).unwrap();
        assert_eq!(json, r#"{"id":"1.1","response":42}"#);
    }

    #[test]
    fn test_null_notification_stays_notification() {
        let response: TransportResponse =
            serde_json::from_str(r#"{ "id": "1.4", "subscription": null }"#).expect("parse");

        assert_eq!(response.kind(), ResponseKind::Notification);
        assert_eq!(response.subscription, Some(Value::Null));
    }

    #[test]
    fn test_error_reply_into_result() {
        let response: TransportResponse =
            serde_json::from_str(r#"{ "id": "1.5", "error": "boom" }"#).expect("parse");

        assert_eq!(response.kind(), ResponseKind::Failure);
        let err = response.into_result().unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_from_result_failure_uses_display() {
        let response = TransportResponse::from_result(
            "1.6".into(),
            Err(Error::precondition_failed("pub(rpc.send)")),
        );
        assert_eq!(
            response.error.as_deref(),
            Some("Cannot call pub(rpc.send) before provider is set")
        );
    }
}
