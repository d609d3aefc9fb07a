use std::sync::Arc;
use webpac_link::{CredentialStore, LinkTimeouts, WebpacClient};

use crate::args::Cli;
use crate::config::CliConfiguration;
use crate::credentials::FileCredentialStore;
use crate::error::{CliError, Result};

/// Timeouts from the preset flags, else from the config file.
pub fn build_timeouts(cli: &Cli, config: &CliConfiguration) -> LinkTimeouts {
    if cli.fast_timeouts {
        return LinkTimeouts::fast();
    }
    if cli.relaxed_timeouts {
        return LinkTimeouts::relaxed();
    }
    config.to_timeouts()
}

/// Credential store for the selected instance.
pub fn open_credential_store(cli: &Cli) -> Result<FileCredentialStore> {
    let path = cli
        .credentials_file
        .clone()
        .unwrap_or_else(FileCredentialStore::default_path);
    FileCredentialStore::with_path(path, cli.instance.clone())
        .map_err(|e| CliError::ConfigurationError(format!("Failed to load credentials: {}", e)))
}

/// Client for one command invocation.
///
/// The push channel is enabled only for commands that stream events.
pub fn create_client(
    cli: &Cli,
    config: &CliConfiguration,
    store: Arc<dyn CredentialStore>,
) -> Result<WebpacClient> {
    let no_realtime = cli.no_realtime || !cli.command.needs_realtime();
    let client_config = config.to_client_config(cli.url.as_deref(), no_realtime);

    tracing::debug!(
        server_url = %client_config.server_url,
        instance = %cli.instance,
        realtime = client_config.use_realtime,
        "creating gateway client"
    );

    let client = WebpacClient::builder()
        .config(client_config)
        .credential_store(store)
        .timeouts(build_timeouts(cli, config))
        .connection_options(config.to_connection_options())
        .build()?;
    Ok(client)
}
