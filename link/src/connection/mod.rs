//! Push connection management.
//!
//! This module contains:
//! - [`transport`]: the [`Transport`] seam and the events a transport reports
//! - [`websocket`]: the default websocket transport with keepalive and reconnect
//! - [`loopback`]: an in-process transport for tests and embedding
//! - [`supervisor`]: the [`ConnectionSupervisor`] owning connection state

pub mod loopback;
pub mod supervisor;
pub mod transport;
pub mod websocket;

pub use loopback::{Invocation, LoopbackTransport};
pub use supervisor::ConnectionSupervisor;
pub use transport::{ConnectRequest, FrameSink, Transport, TransportEvent};
pub use websocket::WsTransport;

/// Capacity of each subscription's delivery channel.
pub(crate) const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 8192;

/// Capacity of the transport → supervisor event channel.
pub(crate) const TRANSPORT_EVENT_CAPACITY: usize = 1024;

/// Maximum accepted text frame size (16 MiB).
pub(crate) const MAX_WS_TEXT_MESSAGE_BYTES: usize = 16 << 20;

/// A duration far enough in the future (~100 years) to act as "never" for
/// deadline calculations without overflowing `Instant::now() + dur`.
pub(crate) const FAR_FUTURE: std::time::Duration =
    std::time::Duration::from_secs(100 * 365 * 24 * 3600);
