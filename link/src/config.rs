//! Gateway endpoint configuration.
//!
//! ```toml
//! server_url = "http://localhost:5000/"
//! api_path = "api/"
//! realtime_path = "signalr"
//! channel_name = "webpac"
//! use_realtime = true
//! ```

use crate::error::{Result, WebpacLinkError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where the gateway lives and whether the push channel is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base server URL, e.g. `http://localhost:5000/`
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Path suffix of the REST data API below `server_url`
    #[serde(default = "default_api_path")]
    pub api_path: String,

    /// Path suffix of the real-time endpoint below `server_url`
    #[serde(default = "default_realtime_path")]
    pub realtime_path: String,

    /// Logical channel (hub) name on the real-time endpoint
    #[serde(default = "default_channel_name")]
    pub channel_name: String,

    /// Open the push channel after login and allow subscriptions
    #[serde(default = "default_use_realtime")]
    pub use_realtime: bool,
}

fn default_server_url() -> String {
    "http://localhost:5000/".to_string()
}

fn default_api_path() -> String {
    "api/".to_string()
}

fn default_realtime_path() -> String {
    "signalr".to_string()
}

fn default_channel_name() -> String {
    "webpac".to_string()
}

fn default_use_realtime() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            api_path: default_api_path(),
            realtime_path: default_realtime_path(),
            channel_name: default_channel_name(),
            use_realtime: default_use_realtime(),
        }
    }
}

/// Join a base URL and a relative suffix with exactly one `/` between them.
fn join_url(base: &str, suffix: &str) -> String {
    let base = base.trim_end_matches('/');
    let suffix = suffix.trim_start_matches('/');
    if suffix.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, suffix)
    }
}

impl ClientConfig {
    /// Config pointing at `server_url` with every other field defaulted.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    pub fn with_api_path(mut self, path: impl Into<String>) -> Self {
        self.api_path = path.into();
        self
    }

    pub fn with_realtime_path(mut self, path: impl Into<String>) -> Self {
        self.realtime_path = path.into();
        self
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    pub fn with_realtime(mut self, enabled: bool) -> Self {
        self.use_realtime = enabled;
        self
    }

    /// REST base URL, always ending in `/`.
    pub fn api_base_url(&self) -> String {
        let mut url = join_url(&self.server_url, &self.api_path);
        url.push('/');
        url
    }

    /// Real-time endpoint URL (without the channel name).
    pub fn realtime_url(&self) -> String {
        join_url(&self.server_url, &self.realtime_path)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content).map_err(|e| {
            WebpacLinkError::ConfigurationError(format!("Failed to parse config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            WebpacLinkError::ConfigurationError(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject settings the client cannot work with.
    pub fn validate(&self) -> Result<()> {
        let url = self.server_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(WebpacLinkError::ConfigurationError(format!(
                "server_url must start with http:// or https://, got '{}'",
                self.server_url
            )));
        }
        Ok(())
    }
}
