use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::inbound_frame::DataChanged;

/// A tag value change delivered to a subscriber.
///
/// Each matching subscriber receives its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Mapping name, or area for raw subscriptions
    pub mapping: String,
    /// Variable name, or address for raw subscriptions
    pub variable: String,
    pub value: JsonValue,
    pub is_raw: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub(crate) fn from_frame(frame: &DataChanged, timestamp: DateTime<Utc>) -> Self {
        Self {
            mapping: frame.mapping.clone(),
            variable: frame.variable.clone(),
            value: frame.value.clone(),
            is_raw: frame.is_raw,
            timestamp,
        }
    }
}

/// Coarse up/down signal of the gateway's controller link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionChangeEvent {
    pub connected: bool,
    pub timestamp: DateTime<Utc>,
}
