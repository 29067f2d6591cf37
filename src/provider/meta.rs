//! Serializable provider metadata.

use serde::{Deserialize, Serialize};

// ============================================================================
// NodeKind
// ============================================================================

/// How the provider reaches the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Remote full node.
    Full,
    /// Embedded light client.
    Light,
}

// ============================================================================
// ProviderMeta
// ============================================================================

/// What the page learns about a provider before and after starting it.
///
/// # Format
///
/// ```json
/// {
///   "network": "westend",
///   "node": "light",
///   "source": "extension",
///   "transport": "smoldot"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMeta {
    /// Network name.
    pub network: String,
    /// Node kind.
    pub node: NodeKind,
    /// Who exposes the provider.
    pub source: String,
    /// Transport used to reach the node.
    pub transport: String,
}

impl ProviderMeta {
    /// Creates metadata for a provider exposed by this extension.
    #[must_use]
    pub fn new(network: impl Into<String>, node: NodeKind, transport: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            node,
            source: "extension".to_string(),
            transport: transport.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_wire_format() {
        let meta = ProviderMeta::new("westend", NodeKind::Light, "smoldot");
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["node"], "light");
        assert_eq!(json["source"], "extension");
    }
}
