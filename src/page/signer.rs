//! Signing capability.
//!
//! Payloads go to the privileged side as-is; signatures come back, keys
//! never do.

use serde::{Deserialize, Serialize};
use serde_json::{Value, to_value};

use crate::error::Result;
use crate::protocol::MessageType;

use super::Correlator;

/// Raw bytes to sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerPayloadRaw {
    /// Signing account.
    pub address: String,
    /// Hex-encoded data.
    pub data: String,
    /// Payload kind, `bytes` or `payload`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Signature returned by the extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerResult {
    /// Extension-side signing request id.
    pub id: u64,
    /// Hex-encoded signature.
    pub signature: String,
}

/// Signs on the page's behalf after user approval.
#[derive(Clone)]
pub struct Signer {
    correlator: Correlator,
}

impl Signer {
    pub(crate) fn new(correlator: Correlator) -> Self {
        Self { correlator }
    }

    /// Signs an extrinsic payload (passed through as JSON).
    pub async fn sign_payload(&self, payload: Value) -> Result<SignerResult> {
        let result = self
            .correlator
            .call(MessageType::ExtrinsicSign, payload)
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Signs raw bytes.
    pub async fn sign_raw(&self, raw: &SignerPayloadRaw) -> Result<SignerResult> {
        let result = self
            .correlator
            .call(MessageType::BytesSign, to_value(raw)?)
            .await?;
        Ok(serde_json::from_value(result)?)
    }
}
