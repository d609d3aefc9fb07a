use serde::{Deserialize, Serialize};

/// Connection-level behaviour of the push transport and the REST client.
///
/// Reconnection is performed by the transport, which reports `Reconnecting`
/// while it retries. The supervisor itself never retries a failed start.
///
/// # Example
///
/// ```rust
/// use webpac_link::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_auto_reconnect(true)
///     .with_reconnect_delay_ms(2000)
///     .with_max_reconnect_attempts(Some(10));
/// assert_eq!(options.max_reconnect_attempts, Some(10));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Re-open a dropped push connection
    /// Default: true
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Initial delay in milliseconds between reconnection attempts, doubled per attempt
    /// Default: 1000ms
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Upper bound for the backoff delay
    /// Default: 30000ms
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Maximum number of reconnection attempts before giving up
    /// Default: None (infinite retries)
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,

    /// Retries of idempotent REST reads on connect/timeout errors
    /// Default: 3
    #[serde(default = "default_max_http_retries")]
    pub max_http_retries: u32,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30000
}

fn default_max_http_retries() -> u32 {
    3
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            max_reconnect_attempts: None,
            max_http_retries: default_max_http_retries(),
        }
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    pub fn with_max_reconnect_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_reconnect_delay_ms = max_delay_ms;
        self
    }

    /// Pass None for infinite retries, Some(0) to never reconnect
    pub fn with_max_reconnect_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self
    }

    pub fn with_max_http_retries(mut self, retries: u32) -> Self {
        self.max_http_retries = retries;
        self
    }

    /// Backoff before reconnection attempt `attempt` (0-based).
    pub fn reconnect_delay(&self, attempt: u32) -> std::time::Duration {
        let delay = std::cmp::min(
            self.reconnect_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt)),
            self.max_reconnect_delay_ms,
        );
        std::time::Duration::from_millis(delay)
    }
}
