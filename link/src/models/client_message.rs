use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Client-to-gateway frames on the push connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Call a hub method. The gateway answers with a `completion` frame
    /// carrying the same `invocation_id`.
    Invocation {
        invocation_id: String,
        target: String,
        arguments: Vec<JsonValue>,
    },
}
