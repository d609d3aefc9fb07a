// Logging for the terminal client, powered by tracing-subscriber.
//
// webpac-link logs through the `log` facade; the `tracing_log::LogTracer`
// bridge routes those records into the subscriber installed here. Output
// goes to stderr so command results on stdout stay pipeable.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{CliError, Result};

/// Log format type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact text format: timestamp LEVEL target - message
    Compact,
    /// JSON Lines format for structured logging
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" | "jsonl" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Build the `EnvFilter` from the base level plus overrides for noisy crates.
///
/// `RUST_LOG`, when set, wins over `level`.
pub fn build_env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = vec![level.to_string()];
    let noisy: &[(&str, &str)] = &[
        ("hyper", "warn"),
        ("hyper_util", "warn"),
        ("reqwest", "warn"),
        ("rustls", "warn"),
        ("tungstenite", "warn"),
        ("tokio_tungstenite", "warn"),
    ];
    for (target, lvl) in noisy {
        directives.push(format!("{}={}", target, lvl));
    }

    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str).map_err(|e| {
        CliError::ConfigurationError(format!("Invalid log filter '{}': {}", filter_str, e))
    })
}

/// Install the global subscriber and the `log` bridge.
///
/// Calling it twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    tracing_log::LogTracer::init().ok();

    let layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(build_env_filter(level)?)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(build_env_filter(level)?)
            .boxed(),
    };

    tracing_subscriber::registry().with(layer).try_init().ok();
    Ok(())
}
