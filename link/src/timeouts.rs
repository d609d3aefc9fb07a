//! Timeout configuration for gateway client operations.
//!
//! Covers REST requests and the push connection (handshake and keepalive).
//! Subscribe/unsubscribe invocations are deliberately not bounded here: a
//! request the gateway never answers stays pending.

use std::time::Duration;

/// Timeout configuration for gateway client operations.
///
/// # Examples
///
/// ```rust
/// use webpac_link::LinkTimeouts;
/// use std::time::Duration;
///
/// let timeouts = LinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(20))
///     .keepalive_interval_secs(0)
///     .build();
/// assert!(timeouts.keepalive_interval.is_zero());
/// ```
#[derive(Debug, Clone)]
pub struct LinkTimeouts {
    /// Timeout for establishing connections (TCP + TLS + websocket handshake).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// Timeout for a complete REST request/response.
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// Keep-alive ping interval on the push connection.
    /// Set to 0 to disable keep-alive pings.
    /// Default: 15 seconds
    pub keepalive_interval: Duration,

    /// Maximum wait for any frame after a keepalive Ping before the connection
    /// is considered dead. Set to 0 to disable.
    /// Default: 5 seconds
    pub pong_timeout: Duration,
}

impl Default for LinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(5),
        }
    }
}

impl LinkTimeouts {
    pub fn builder() -> LinkTimeoutsBuilder {
        LinkTimeoutsBuilder::new()
    }

    /// Short timeouts for a gateway on the local network.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(3),
        }
    }

    /// Long timeouts for high-latency links (VPN, cellular).
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            keepalive_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for [`LinkTimeouts`].
#[derive(Debug, Clone)]
pub struct LinkTimeoutsBuilder {
    timeouts: LinkTimeouts,
}

impl LinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: LinkTimeouts::default(),
        }
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout = timeout;
        self
    }

    pub fn request_timeout_secs(self, secs: u64) -> Self {
        self.request_timeout(Duration::from_secs(secs))
    }

    /// Set to 0 to disable keepalive pings.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.timeouts.keepalive_interval = interval;
        self
    }

    pub fn keepalive_interval_secs(self, secs: u64) -> Self {
        self.keepalive_interval(Duration::from_secs(secs))
    }

    /// Set to 0 to disable pong timeout checking.
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.pong_timeout = timeout;
        self
    }

    pub fn pong_timeout_secs(self, secs: u64) -> Self {
        self.pong_timeout(Duration::from_secs(secs))
    }

    pub fn build(self) -> LinkTimeouts {
        self.timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = LinkTimeouts::default();
        assert_eq!(timeouts.connection_timeout, Duration::from_secs(10));
        assert_eq!(timeouts.request_timeout, Duration::from_secs(30));
        assert_eq!(timeouts.keepalive_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_builder() {
        let timeouts = LinkTimeouts::builder()
            .connection_timeout_secs(60)
            .request_timeout_secs(90)
            .pong_timeout_secs(0)
            .build();

        assert_eq!(timeouts.connection_timeout, Duration::from_secs(60));
        assert_eq!(timeouts.request_timeout, Duration::from_secs(90));
        assert!(timeouts.pong_timeout.is_zero());
    }

    #[test]
    fn test_presets() {
        assert!(LinkTimeouts::fast().connection_timeout <= Duration::from_secs(5));
        assert!(LinkTimeouts::relaxed().request_timeout >= Duration::from_secs(60));
    }

    #[test]
    fn test_is_no_timeout() {
        assert!(LinkTimeouts::is_no_timeout(Duration::ZERO));
        assert!(!LinkTimeouts::is_no_timeout(Duration::from_secs(1)));
    }
}
