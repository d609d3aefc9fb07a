use std::io::{self, BufRead, Write};
use webpac_link::WebpacClient;

use crate::error::{CliError, Result};

/// Username from the flag, else read from stdin.
pub fn resolve_username(flag: Option<&str>) -> Result<String> {
    if let Some(user) = flag {
        return Ok(user.to_string());
    }

    print!("Username: ");
    io::stdout().flush()?;
    let mut input = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut input)
        .map_err(|e| CliError::FileError(format!("Failed to read username: {}", e)))?;
    let username = input.trim();
    if read == 0 || username.is_empty() {
        return Err(CliError::Cancelled);
    }
    Ok(username.to_string())
}

/// Password from the flag, else prompted without echo.
pub fn resolve_password(flag: Option<&str>) -> Result<String> {
    match flag {
        Some(pass) => Ok(pass.to_string()),
        None => rpassword::prompt_password("Password: ")
            .map_err(|e| CliError::FileError(format!("Failed to read password: {}", e))),
    }
}

/// Exchange credentials for a token; the record lands in the client's store.
pub async fn login(
    client: &WebpacClient,
    instance: &str,
    username: &str,
    password: &str,
    out: &mut dyn Write,
) -> Result<()> {
    if !client.login(username, password).await? {
        return Err(CliError::LoginRejected);
    }

    match client.session().cached_record() {
        Some(record) => writeln!(
            out,
            "Logged in to '{}' as {} ({}), token expires {}",
            instance,
            record.user,
            record.role,
            record.token_expires_at.to_rfc3339()
        )?,
        None => writeln!(out, "Logged in to '{}'", instance)?,
    }
    Ok(())
}

pub fn logout(client: &WebpacClient, instance: &str, out: &mut dyn Write) -> Result<()> {
    let was_logged_in = client.is_logged_in();
    client.logout()?;
    if was_logged_in {
        writeln!(out, "Logged out of '{}'", instance)?;
    } else {
        writeln!(out, "No active login for '{}'", instance)?;
    }
    Ok(())
}

pub fn status(client: &WebpacClient, instance: &str, out: &mut dyn Write) -> Result<()> {
    let config = client.config();
    writeln!(out, "Instance:  {}", instance)?;
    writeln!(out, "Gateway:   {}", config.server_url)?;
    writeln!(out, "REST API:  {}", config.api_base_url())?;
    writeln!(
        out,
        "Push:      {}/{}",
        config.realtime_url(),
        config.channel_name
    )?;

    let record = client.session().cached_record();
    match record {
        Some(record) if client.is_logged_in() => writeln!(
            out,
            "Login:     {} ({}), expires {}",
            record.user,
            record.role,
            record.token_expires_at.to_rfc3339()
        )?,
        Some(record) if record.authenticated => writeln!(
            out,
            "Login:     expired at {}",
            record.token_expires_at.to_rfc3339()
        )?,
        _ => writeln!(out, "Login:     none")?,
    }
    Ok(())
}
