use serde_json::Value as JsonValue;

use crate::error::{Result, WebpacLinkError};

/// Decoded `DataChanged(mapping, variable, value, isRaw)` push.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChanged {
    pub mapping: String,
    pub variable: String,
    pub value: JsonValue,
    pub is_raw: bool,
}

/// Server pushes the client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    DataChanged(DataChanged),
    ConnectionChanged { connected: bool },
}

fn string_arg(target: &str, arguments: &[JsonValue], index: usize) -> Result<String> {
    arguments
        .get(index)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            WebpacLinkError::SerializationError(format!(
                "{}: argument {} must be a string",
                target, index
            ))
        })
}

impl InboundFrame {
    /// Decode a named push.
    ///
    /// Returns `Ok(None)` for targets this client does not consume and an
    /// error when a known target carries malformed arguments.
    pub fn decode(target: &str, arguments: &[JsonValue]) -> Result<Option<Self>> {
        match target {
            "DataChanged" => {
                let mapping = string_arg(target, arguments, 0)?;
                let variable = string_arg(target, arguments, 1)?;
                let value = arguments.get(2).cloned().unwrap_or(JsonValue::Null);
                let is_raw = match arguments.get(3) {
                    None | Some(JsonValue::Null) => false,
                    Some(JsonValue::Bool(b)) => *b,
                    Some(other) => {
                        return Err(WebpacLinkError::SerializationError(format!(
                            "DataChanged: isRaw must be a boolean, got {}",
                            other
                        )))
                    },
                };
                Ok(Some(InboundFrame::DataChanged(DataChanged {
                    mapping,
                    variable,
                    value,
                    is_raw,
                })))
            },
            "ConnectionChanged" => match arguments.first() {
                Some(JsonValue::Bool(connected)) => Ok(Some(InboundFrame::ConnectionChanged {
                    connected: *connected,
                })),
                _ => Err(WebpacLinkError::SerializationError(
                    "ConnectionChanged: argument 0 must be a boolean".to_string(),
                )),
            },
            _ => Ok(None),
        }
    }
}
