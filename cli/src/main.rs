//! webpac - terminal client for WebPAC controller gateways
//!
//! # Usage
//!
//! ```bash
//! webpac -u http://plc-gw:5000/ login --username operator
//! webpac symbols
//! webpac read DB1112 Motor.Speed
//! webpac write DB1112 '{"W0": 5}'
//! webpac watch-raw DB1112 W0 W2 --limit 10
//! ```

use clap::Parser;
use std::sync::Arc;

use webpac_cli::logging::{init_logging, LogFormat};
use webpac_cli::{commands, connect, Cli, CliConfiguration};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CliConfiguration::load(&cli.config)?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::parse(&config.logging.format)
    };
    init_logging(level, format)?;

    let store = connect::open_credential_store(&cli)?;
    let client = connect::create_client(&cli, &config, Arc::new(store))?;

    let mut stdout = std::io::stdout();
    let outcome = commands::dispatch(&cli.command, &client, &cli.instance, &mut stdout).await;
    client.stop().await;

    outcome?;
    Ok(())
}
