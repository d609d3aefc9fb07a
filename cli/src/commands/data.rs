use serde_json::Value as JsonValue;
use std::io::Write;
use webpac_link::WebpacClient;

use crate::error::{CliError, Result};

fn parse_value(raw: &str) -> Result<JsonValue> {
    Ok(serde_json::from_str(raw)?)
}

fn print_value(out: &mut dyn Write, value: &JsonValue) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    writeln!(out, "{}", rendered)?;
    Ok(())
}

fn confirm(out: &mut dyn Write, applied: bool, target: String) -> Result<()> {
    if !applied {
        return Err(CliError::WriteRejected(target));
    }
    writeln!(out, "OK {}", target)?;
    Ok(())
}

pub async fn symbols(client: &WebpacClient, blocks: bool, out: &mut dyn Write) -> Result<()> {
    let names = if blocks {
        client.list_blocks().await?
    } else {
        client.list_symbols().await?
    };
    for name in names {
        writeln!(out, "{}", name)?;
    }
    Ok(())
}

pub async fn read(
    client: &WebpacClient,
    name: &str,
    path: Option<&str>,
    block: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let value = if block {
        client.read_block(name, path).await?
    } else {
        client.read_symbolic(name, path).await?
    };
    print_value(out, &value)
}

/// `json` must be an object of variable names to values.
pub async fn write(
    client: &WebpacClient,
    name: &str,
    json: &str,
    block: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let values = parse_value(json)?;
    if !values.is_object() {
        return Err(CliError::ParseError(format!(
            "expected a JSON object of values for '{}', got {}",
            name, values
        )));
    }

    let applied = if block {
        client.write_block(name, &values).await?
    } else {
        client.write_symbolic(name, &values).await?
    };
    confirm(out, applied, name.to_string())
}

pub async fn read_raw(
    client: &WebpacClient,
    area: &str,
    address: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let value = client.read_absolute(area, address).await?;
    print_value(out, &value)
}

pub async fn write_raw(
    client: &WebpacClient,
    area: &str,
    address: &str,
    json: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let value = parse_value(json)?;
    let applied = client.write_absolute(area, address, &value).await?;
    confirm(out, applied, format!("{}/{}", area, address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_accepts_scalars_and_objects() {
        assert_eq!(parse_value("42").unwrap(), serde_json::json!(42));
        assert_eq!(
            parse_value("{\"W0\": true}").unwrap(),
            serde_json::json!({ "W0": true })
        );
        assert!(matches!(parse_value("W0=1"), Err(CliError::ParseError(_))));
    }

    #[test]
    fn test_rejected_write_is_an_error() {
        let mut out = Vec::new();
        assert!(matches!(
            confirm(&mut out, false, "DB1/W0".into()),
            Err(CliError::WriteRejected(target)) if target == "DB1/W0"
        ));
        assert!(out.is_empty());

        confirm(&mut out, true, "DB1/W0".into()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "OK DB1/W0\n");
    }
}
