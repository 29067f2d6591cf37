//! Bridge configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use extension_bridge::BridgeConfig;
//!
//! let config = BridgeConfig::new()
//!     .with_port(9944)
//!     .with_max_pending(256)
//!     .with_call_timeout(Duration::from_secs(60));
//!
//! config.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::Origin;

// ============================================================================
// Constants
// ============================================================================

/// Default bind address (localhost).
const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Maximum pending requests before `call` rejects new ones.
const DEFAULT_MAX_PENDING: usize = 4096;

// ============================================================================
// BridgeConfig
// ============================================================================

/// Settings shared by the privileged server and the page-side correlator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Address the privileged side listens on.
    pub bind_ip: IpAddr,

    /// Port to listen on (0 = random).
    pub port: u16,

    /// Origin tag stamped on every outbound request.
    pub origin: Origin,

    /// Upper bound on entries in the pending table.
    pub max_pending: usize,

    /// Deadline for terminal replies. `None` waits forever.
    pub call_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl BridgeConfig {
    /// Creates a configuration with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bind_ip: DEFAULT_BIND_IP,
            port: 0,
            origin: Origin::Page,
            max_pending: DEFAULT_MAX_PENDING,
            call_timeout: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl BridgeConfig {
    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Sets the listen port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the origin tag for outbound requests.
    #[inline]
    #[must_use]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Sets the pending table limit.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Enables a deadline on terminal replies.
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

// ============================================================================
// Accessors & Validation
// ============================================================================

impl BridgeConfig {
    /// Returns the socket address to bind.
    #[inline]
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Checks the configuration for unusable values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `max_pending` is zero or the call
    /// timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_pending == 0 {
            return Err(Error::config(
                "max_pending must be at least 1. Use .with_max_pending() to set it.",
            ));
        }

        if self.call_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config("call_timeout must be non-zero"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.bind_ip, DEFAULT_BIND_IP);
        assert_eq!(config.port, 0);
        assert_eq!(config.origin, Origin::Page);
        assert_eq!(config.max_pending, DEFAULT_MAX_PENDING);
        assert!(config.call_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = BridgeConfig::new()
            .with_port(9944)
            .with_origin(Origin::Extension)
            .with_max_pending(8)
            .with_call_timeout(Duration::from_secs(5));

        assert_eq!(config.bind_addr().port(), 9944);
        assert_eq!(config.origin, Origin::Extension);
        assert_eq!(config.max_pending, 8);
        assert_eq!(config.call_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        assert!(BridgeConfig::new().with_max_pending(0).validate().is_err());
        assert!(
            BridgeConfig::new()
                .with_call_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
