//! Chain metadata capability.

use serde::{Deserialize, Serialize};
use serde_json::{Value, to_value};

use crate::error::Result;
use crate::protocol::MessageType;

use super::Correlator;

/// Metadata version already known to the extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectedMetadataKnown {
    /// Chain genesis hash.
    pub genesis_hash: String,
    /// Runtime spec version.
    pub spec_version: u32,
}

/// Chain metadata a page offers to the extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataDef {
    /// Chain name.
    pub chain: String,
    /// Chain genesis hash.
    pub genesis_hash: String,
    /// Identicon theme.
    pub icon: String,
    /// Address prefix.
    pub ss58_format: u16,
    /// Runtime spec version.
    pub spec_version: u32,
    /// Token decimals.
    pub token_decimals: u8,
    /// Token symbol.
    pub token_symbol: String,
    /// Custom type definitions.
    #[serde(default)]
    pub types: Value,
}

/// Metadata exchange with the extension.
#[derive(Clone)]
pub struct Metadata {
    correlator: Correlator,
}

impl Metadata {
    pub(crate) fn new(correlator: Correlator) -> Self {
        Self { correlator }
    }

    /// Returns the metadata versions the extension already has.
    pub async fn get(&self) -> Result<Vec<InjectedMetadataKnown>> {
        let known = self
            .correlator
            .call(MessageType::MetadataList, Value::Null)
            .await?;
        Ok(serde_json::from_value(known)?)
    }

    /// Offers new metadata. Returns whether the user accepted it.
    pub async fn provide(&self, definition: &MetadataDef) -> Result<bool> {
        let accepted = self
            .correlator
            .call(MessageType::MetadataProvide, to_value(definition)?)
            .await?;
        Ok(serde_json::from_value(accepted)?)
    }
}
