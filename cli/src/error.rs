//! Error types for webpac-cli
//!
//! Wraps library failures and adds the ones only a terminal client has
//! (config files, argument values, prompts).

use std::fmt;
use webpac_link::WebpacLinkError;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug)]
pub enum CliError {
    /// Error from webpac-link
    LinkError(WebpacLinkError),

    /// Configuration file error
    ConfigurationError(String),

    /// File I/O error
    FileError(String),

    /// A value passed on the command line could not be parsed
    ParseError(String),

    /// The gateway refused the supplied username/password
    LoginRejected,

    /// The gateway answered a write with `false`
    WriteRejected(String),

    /// User cancelled operation
    Cancelled,
}

impl CliError {
    fn format_link_error(err: &WebpacLinkError) -> String {
        match err {
            WebpacLinkError::Unauthenticated => {
                "Not logged in (or the session expired). Run `webpac login` first.".to_string()
            },
            WebpacLinkError::NetworkError(msg) => Self::clean_nested_message(msg),
            WebpacLinkError::ConnectionError(msg) => Self::clean_nested_message(msg),
            WebpacLinkError::ServerError {
                status_code,
                message,
            } if message.is_empty() => format!("Server error ({})", status_code),
            other => other.to_string(),
        }
    }

    fn clean_nested_message(message: &str) -> String {
        let mut cleaned = message.trim();
        let prefixes = [
            "Connection failed:",
            "connection failed:",
            "Network error:",
            "network error:",
        ];

        loop {
            let mut stripped = false;
            for prefix in &prefixes {
                if let Some(rest) = cleaned.strip_prefix(prefix) {
                    cleaned = rest.trim_start();
                    stripped = true;
                    break;
                }
            }

            if !stripped {
                break;
            }
        }

        cleaned.to_string()
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LinkError(e) => write!(f, "{}", Self::format_link_error(e)),
            CliError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            CliError::FileError(msg) => write!(f, "File error: {}", msg),
            CliError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            CliError::LoginRejected => write!(f, "Login rejected: invalid username or password"),
            CliError::WriteRejected(target) => write!(f, "Gateway did not apply the write to {}", target),
            CliError::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<WebpacLinkError> for CliError {
    fn from(err: WebpacLinkError) -> Self {
        CliError::LinkError(err)
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::FileError(err.to_string())
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        CliError::ConfigurationError(format!("TOML parse error: {}", err))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::ParseError(format!("invalid JSON value: {}", err))
    }
}
