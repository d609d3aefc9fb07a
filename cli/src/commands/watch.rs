use std::io::Write;
use std::time::Duration;
use tokio::time::Instant;
use webpac_link::{ChangeEvent, ConnectionState, SubscriptionKey, WebpacClient};

use crate::args::WatchLimits;
use crate::error::Result;

/// One line per change: `timestamp mapping.variable = value`.
pub fn format_event(event: &ChangeEvent) -> String {
    let separator = if event.is_raw { "/" } else { "." };
    format!(
        "{} {}{}{} = {}",
        event.timestamp.to_rfc3339(),
        event.mapping,
        separator,
        event.variable,
        event.value
    )
}

/// Subscribe to `key` and print changes until a limit is hit, the
/// subscription closes, or the user interrupts.
///
/// Returns the number of events printed.
pub async fn watch(
    client: &WebpacClient,
    key: SubscriptionKey,
    limits: &WatchLimits,
    out: &mut dyn Write,
) -> Result<usize> {
    if client.current_connection_state() != ConnectionState::Connected {
        client.start().await?;
    }

    let mut subscription = client.subscribe_key(key).await?;
    tracing::info!(key = %subscription.key(), id = subscription.id(), "watching");

    let deadline = (limits.timeout > 0).then(|| Instant::now() + Duration::from_secs(limits.timeout));
    let expired = async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(expired);

    let mut received = 0usize;
    loop {
        if limits.limit.is_some_and(|limit| received >= limit) {
            break;
        }

        tokio::select! {
            _ = &mut expired => break,
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("interrupted");
                break;
            },
            event = subscription.next() => match event {
                Some(Ok(event)) => {
                    writeln!(out, "{}", format_event(&event))?;
                    out.flush()?;
                    received += 1;
                },
                Some(Err(e)) => return Err(e.into()),
                None => {
                    tracing::info!("subscription ended");
                    break;
                },
            },
        }
    }

    subscription.close().await?;
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_format_event() {
        let timestamp = Utc.with_ymd_and_hms(2026, 10, 18, 8, 30, 0).unwrap();
        let event = ChangeEvent {
            mapping: "DB1112".into(),
            variable: "W0".into(),
            value: json!(42),
            is_raw: false,
            timestamp,
        };
        assert_eq!(format_event(&event), "2026-10-18T08:30:00+00:00 DB1112.W0 = 42");

        let raw = ChangeEvent {
            is_raw: true,
            value: json!("on"),
            ..event
        };
        assert_eq!(format_event(&raw), "2026-10-18T08:30:00+00:00 DB1112/W0 = \"on\"");
    }
}
