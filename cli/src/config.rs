//! Configuration file management
//!
//! `CliConfiguration` is read from `~/.webpac/config.toml`. A missing file
//! means defaults; flags given on the command line win over the file.
//!
//! # Configuration Format
//!
//! ```toml
//! [server]
//! url = "http://localhost:5000/"   # gateway base URL
//! api_path = "api/"
//! realtime_path = "signalr"
//! channel_name = "webpac"
//! use_realtime = true
//! timeout = 30                     # REST request timeout (seconds)
//! connection_timeout = 10          # TCP + TLS + handshake (seconds)
//! max_retries = 3                  # retries of idempotent reads
//!
//! [connection]
//! auto_reconnect = true
//! reconnect_delay_ms = 1000
//! max_reconnect_delay_ms = 30000
//! max_reconnect_attempts = 0       # 0 = unlimited
//!
//! [logging]
//! level = "warn"
//! format = "compact"               # compact, json
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use webpac_link::{ClientConfig, ConnectionOptions, LinkTimeouts};

use crate::error::{CliError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "~/.webpac/config.toml";

/// CLI configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfiguration {
    /// Gateway endpoint settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Push connection reconnect behaviour
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Gateway base URL (e.g., http://localhost:5000/)
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_api_path")]
    pub api_path: String,

    #[serde(default = "default_realtime_path")]
    pub realtime_path: String,

    #[serde(default = "default_channel_name")]
    pub channel_name: String,

    /// Open the push channel (needed by `watch`)
    #[serde(default = "default_use_realtime")]
    pub use_realtime: bool,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,

    /// Maximum retry attempts for reads
    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

/// Connection settings for reconnection behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Initial delay between reconnection attempts in milliseconds
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Maximum number of reconnection attempts (0 = unlimited)
    #[serde(default)]
    pub max_reconnect_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// compact or json
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_url() -> String {
    ClientConfig::default().server_url
}

fn default_api_path() -> String {
    ClientConfig::default().api_path
}

fn default_realtime_path() -> String {
    ClientConfig::default().realtime_path
}

fn default_channel_name() -> String {
    ClientConfig::default().channel_name
}

fn default_use_realtime() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
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

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_path: default_api_path(),
            realtime_path: default_realtime_path(),
            channel_name: default_channel_name(),
            use_realtime: default_use_realtime(),
            timeout: default_timeout(),
            connection_timeout: default_connection_timeout(),
            max_retries: default_retries(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            max_reconnect_attempts: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

pub fn expand_config_path(path: &Path) -> PathBuf {
    let path_str = path.to_str().unwrap_or(DEFAULT_CONFIG_PATH);
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    }
    path.to_path_buf()
}

pub fn default_config_path() -> PathBuf {
    expand_config_path(Path::new(DEFAULT_CONFIG_PATH))
}

impl CliConfiguration {
    /// Load configuration from file
    ///
    /// Returns default configuration if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_config_path(path);
        let path = &expanded_path;

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            CliError::ConfigurationError(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: CliConfiguration = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let expanded_path = expand_config_path(path);
        let path = &expanded_path;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| CliError::ConfigurationError(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Gateway endpoints, with `url_override` replacing the configured URL.
    pub fn to_client_config(&self, url_override: Option<&str>, no_realtime: bool) -> ClientConfig {
        let server = &self.server;
        ClientConfig::new(url_override.unwrap_or(&server.url))
            .with_api_path(server.api_path.clone())
            .with_realtime_path(server.realtime_path.clone())
            .with_channel_name(server.channel_name.clone())
            .with_realtime(server.use_realtime && !no_realtime)
    }

    /// Converts CLI config settings to webpac-link ConnectionOptions
    pub fn to_connection_options(&self) -> ConnectionOptions {
        let conn = &self.connection;

        // 0 means unlimited
        let max_attempts = if conn.max_reconnect_attempts == 0 {
            None
        } else {
            Some(conn.max_reconnect_attempts)
        };

        ConnectionOptions::default()
            .with_auto_reconnect(conn.auto_reconnect)
            .with_reconnect_delay_ms(conn.reconnect_delay_ms)
            .with_max_reconnect_delay_ms(conn.max_reconnect_delay_ms)
            .with_max_reconnect_attempts(max_attempts)
            .with_max_http_retries(self.server.max_retries)
    }

    pub fn to_timeouts(&self) -> LinkTimeouts {
        LinkTimeouts::builder()
            .connection_timeout_secs(self.server.connection_timeout)
            .request_timeout_secs(self.server.timeout)
            .build()
    }
}
