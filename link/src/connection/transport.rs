//! Transport abstraction for the push channel.

use crate::{
    error::Result,
    models::{ConnectionState, DataChanged},
};
use serde_json::Value as JsonValue;
use std::fmt;
use tokio::sync::mpsc;

/// Where and how to open the push connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Real-time endpoint URL (http(s) or ws(s))
    pub url: String,
    /// Logical channel (hub) name
    pub channel: String,
    /// Bearer token attached at connection time
    pub token: Option<String>,
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("url", &self.url)
            .field("channel", &self.channel)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Lifecycle and data callbacks reported by a transport, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    StateChanged {
        old: ConnectionState,
        new: ConnectionState,
    },
    Error(String),
    Frame {
        target: String,
        arguments: Vec<JsonValue>,
    },
}

/// A persistent, bidirectional channel to the gateway.
///
/// Implementations report every lifecycle change as
/// [`TransportEvent::StateChanged`] on the sender handed to [`start`], and
/// every server push as [`TransportEvent::Frame`].
///
/// [`start`]: Transport::start
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open the connection. Resolves once it is open or has failed.
    ///
    /// Starting an already started transport replaces the old connection.
    async fn start(
        &self,
        request: ConnectRequest,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<()>;

    /// Call a hub method and wait for the gateway's completion.
    async fn invoke(&self, target: &str, arguments: Vec<JsonValue>) -> Result<JsonValue>;

    /// Close the connection. Pending invocations fail with `Cancelled`.
    async fn stop(&self);
}

/// Receiver of decoded inbound pushes.
///
/// The supervisor calls these from a single task, one frame at a time in
/// arrival order.
#[async_trait::async_trait]
pub trait FrameSink: Send + Sync + 'static {
    async fn data_changed(&self, frame: DataChanged);

    fn connection_changed(&self, connected: bool);

    fn state_changed(&self, _old: ConnectionState, _new: ConnectionState) {}
}
