//! Library entry point for webpac-cli components.
//!
//! Exposes the argument model, configuration, credential storage and the
//! command implementations so integration tests can drive them without going
//! through the binary entry point.

pub mod args;
pub mod commands;
pub mod config;
pub mod connect;
pub mod credentials;
pub mod error;
pub mod logging;

pub use args::{Cli, Command};
pub use config::CliConfiguration;
pub use credentials::FileCredentialStore;
pub use error::{CliError, Result};
