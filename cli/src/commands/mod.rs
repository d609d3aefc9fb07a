//! Subcommand implementations.
//!
//! Every command writes its result to `out` so it can be captured in tests;
//! prompts and logs go to the terminal directly.

pub mod data;
pub mod session;
pub mod watch;

use std::io::Write;
use webpac_link::{SubscriptionKey, WebpacClient};

use crate::args::Command;
use crate::error::Result;

pub async fn dispatch(
    command: &Command,
    client: &WebpacClient,
    instance: &str,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        Command::Login { username, password } => {
            let username = session::resolve_username(username.as_deref())?;
            let password = session::resolve_password(password.as_deref())?;
            session::login(client, instance, &username, &password, out).await
        },
        Command::Logout => session::logout(client, instance, out),
        Command::Status => session::status(client, instance, out),
        Command::Symbols { blocks } => data::symbols(client, *blocks, out).await,
        Command::Read { name, path, block } => {
            data::read(client, name, path.as_deref(), *block, out).await
        },
        Command::Write { name, json, block } => data::write(client, name, json, *block, out).await,
        Command::ReadRaw { area, address } => data::read_raw(client, area, address, out).await,
        Command::WriteRaw {
            area,
            address,
            json,
        } => data::write_raw(client, area, address, json, out).await,
        Command::Watch {
            mapping,
            variables,
            limits,
        } => {
            let key = SubscriptionKey::symbolic(mapping.as_str(), variables.iter().cloned());
            watch::watch(client, key, limits, out).await.map(|_| ())
        },
        Command::WatchRaw {
            area,
            addresses,
            limits,
        } => {
            let key = SubscriptionKey::raw(area.as_str(), addresses.iter().cloned());
            watch::watch(client, key, limits, out).await.map(|_| ())
        },
    }
}
