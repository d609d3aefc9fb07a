use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

/// webpac - Terminal client for WebPAC controller gateways
#[derive(Parser, Debug)]
#[command(name = "webpac")]
#[command(version)]
#[command(about = "Read, write and watch tags on a WebPAC gateway", long_about = None)]
pub struct Cli {
    /// Gateway URL (e.g., http://localhost:5000/), overrides the config file
    #[arg(short = 'u', long = "url", global = true)]
    pub url: Option<String>,

    /// Gateway instance name (for credential storage)
    #[arg(long = "instance", default_value = "local", global = true)]
    pub instance: String,

    /// Configuration file path
    #[arg(long = "config", default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Credentials file path (default: ~/.config/webpac/credentials.toml)
    #[arg(long = "credentials-file", global = true)]
    pub credentials_file: Option<PathBuf>,

    /// Log level or filter directives (e.g. debug, webpac_link=trace)
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long = "json-logs", global = true)]
    pub json_logs: bool,

    /// Do not open the push connection
    #[arg(long = "no-realtime", global = true)]
    pub no_realtime: bool,

    /// Use fast timeout preset (gateway on the local network)
    #[arg(long = "fast-timeouts", global = true, conflicts_with = "relaxed_timeouts")]
    pub fast_timeouts: bool,

    /// Use relaxed timeout preset (high-latency links)
    #[arg(long = "relaxed-timeouts", global = true)]
    pub relaxed_timeouts: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Log in and store the bearer token for this instance
    Login {
        #[arg(long = "username")]
        username: Option<String>,

        /// Prompted for when omitted
        #[arg(long = "password")]
        password: Option<String>,
    },

    /// Forget the stored login for this instance
    Logout,

    /// Show login and connection status
    Status,

    /// List symbolic mappings (or data blocks with --blocks)
    Symbols {
        #[arg(long = "blocks")]
        blocks: bool,
    },

    /// Read a symbolic mapping, optionally one dotted variable path
    Read {
        name: String,
        path: Option<String>,

        /// Read from the block namespace instead
        #[arg(long = "block")]
        block: bool,
    },

    /// Write a JSON object of values into a symbolic mapping
    Write {
        name: String,
        json: String,

        /// Write into the block namespace instead
        #[arg(long = "block")]
        block: bool,
    },

    /// Read a value by area and address
    ReadRaw { area: String, address: String },

    /// Write a JSON value by area and address
    WriteRaw {
        area: String,
        address: String,
        json: String,
    },

    /// Stream value changes of symbolic variables
    Watch {
        mapping: String,

        #[arg(required = true)]
        variables: Vec<String>,

        #[command(flatten)]
        limits: WatchLimits,
    },

    /// Stream value changes of raw addresses
    WatchRaw {
        area: String,

        #[arg(required = true)]
        addresses: Vec<String>,

        #[command(flatten)]
        limits: WatchLimits,
    },
}

impl Command {
    /// Only the watch commands use the push channel.
    pub fn needs_realtime(&self) -> bool {
        matches!(self, Command::Watch { .. } | Command::WatchRaw { .. })
    }
}

#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchLimits {
    /// Exit after this many events
    #[arg(long = "limit")]
    pub limit: Option<usize>,

    /// Exit after this many seconds (0 = run until interrupted)
    #[arg(long = "timeout", value_name = "SECONDS", default_value_t = 0)]
    pub timeout: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "webpac",
            "symbols",
            "--url",
            "http://gw:5000/",
            "--instance",
            "line2",
        ])
        .unwrap();
        assert_eq!(cli.url.as_deref(), Some("http://gw:5000/"));
        assert_eq!(cli.instance, "line2");
        assert_eq!(cli.command, Command::Symbols { blocks: false });
    }

    #[test]
    fn test_read_with_optional_path() {
        let cli = Cli::try_parse_from(["webpac", "read", "DB1112", "Motor.Speed"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Read {
                name: "DB1112".into(),
                path: Some("Motor.Speed".into()),
                block: false
            }
        );
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_watch_requires_variables() {
        assert!(Cli::try_parse_from(["webpac", "watch", "DB1112"]).is_err());

        let cli = Cli::try_parse_from([
            "webpac", "watch-raw", "DB1112", "W0", "W2", "--limit", "3",
        ])
        .unwrap();
        match cli.command {
            Command::WatchRaw {
                area,
                addresses,
                limits,
            } => {
                assert_eq!(area, "DB1112");
                assert_eq!(addresses, vec!["W0", "W2"]);
                assert_eq!(limits.limit, Some(3));
                assert_eq!(limits.timeout, 0);
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_timeout_presets_conflict() {
        assert!(Cli::try_parse_from([
            "webpac",
            "status",
            "--fast-timeouts",
            "--relaxed-timeouts"
        ])
        .is_err());
    }
}
