use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Gateway-to-client frames on the push connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Server push, e.g. `DataChanged` or `ConnectionChanged`
    Invocation {
        target: String,
        #[serde(default)]
        arguments: Vec<JsonValue>,
    },

    /// Answer to a client invocation
    Completion {
        invocation_id: String,
        #[serde(default)]
        result: Option<JsonValue>,
        #[serde(default)]
        error: Option<String>,
    },

    /// Application-level heartbeat
    Ping,
}
