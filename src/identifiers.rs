//! Type-safe identifiers for bridge entities.
//!
//! Newtype wrappers keep correlation ids, connection ids and backend
//! subscription ids from being mixed up at compile time.
//!
//! | Type | Assigned by | Wire form |
//! |------|-------------|-----------|
//! | [`RequestId`] | page-side correlator | `"<epoch-millis>.<counter>"` |
//! | [`ConnectionId`] | transport relay at open time | not serialized |
//! | [`SubscriptionId`] | backend provider instance | number or string |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

// ============================================================================
// RequestId
// ============================================================================

/// Correlation id tying a request to its response and notifications.
///
/// Opaque to the privileged side, which only echoes it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Creates an id from any string received on the wire.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Composes the `"<epoch-millis>.<counter>"` form.
    #[inline]
    #[must_use]
    pub fn compose(epoch_millis: u64, counter: u64) -> Self {
        Self(format!("{epoch_millis}.{counter}"))
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the counter part of a composed id, if present.
    #[must_use]
    pub fn counter(&self) -> Option<u64> {
        self.0.rsplit_once('.').and_then(|(_, c)| c.parse().ok())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// Stable id for one logical channel to a single page.
///
/// The relay maps its own socket/port handles to this value; the
/// registry never sees the handle itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(NonZeroU64);

impl ConnectionId {
    /// Creates a connection id. Returns `None` for zero.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Option<Self> {
        match NonZeroU64::new(id) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Subscription id handed out by a backend provider.
///
/// Nodes answer with either a number or a string, so both are kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubscriptionId {
    /// Numeric id.
    Number(u64),
    /// String id (typically hex).
    Text(String),
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for SubscriptionId {
    fn from(id: u64) -> Self {
        Self::Number(id)
    }
}

impl From<String> for SubscriptionId {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

// ============================================================================
// Tests
// ============================================================================
