//! Supervisor of the single shared push connection.
//!
//! The supervisor owns the transport handle and the current
//! [`ConnectionState`]. State changes come only from the transport's
//! lifecycle events; the supervisor republishes them, never infers them.
//! Inbound frames are decoded on one task, one at a time in arrival order,
//! and handed to a [`FrameSink`] (the event router). The supervisor itself
//! knows nothing about subscribers.

use crate::{
    auth::TokenSource,
    config::ClientConfig,
    connection::{
        transport::{ConnectRequest, FrameSink, Transport, TransportEvent},
        TRANSPORT_EVENT_CAPACITY,
    },
    error::{Result, WebpacLinkError},
    models::{ConnectionState, InboundFrame, TransportError},
    stream::{EventStream, DEFAULT_BROADCAST_CAPACITY},
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

struct SupervisorShared {
    state: RwLock<ConnectionState>,
    state_tx: broadcast::Sender<ConnectionState>,
    error_tx: broadcast::Sender<TransportError>,
}

impl SupervisorShared {
    fn publish_error(&self, message: String) {
        log::warn!("[webpac-link] Transport error: {}", message);
        let _ = self.error_tx.send(TransportError::new(message));
    }
}

pub struct ConnectionSupervisor {
    url: String,
    channel: String,
    tokens: Arc<dyn TokenSource>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn FrameSink>,
    shared: Arc<SupervisorShared>,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    frame_loop: Mutex<Option<JoinHandle<()>>>,
    start_lock: tokio::sync::Mutex<()>,
}

impl ConnectionSupervisor {
    /// Bind a transport to the configured real-time endpoint and channel.
    ///
    /// Fails with [`WebpacLinkError::TransportMisconfigured`] when the
    /// endpoint path, the channel name or the resulting URL is unusable.
    pub fn configure(
        config: &ClientConfig,
        tokens: Arc<dyn TokenSource>,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Self> {
        if config.realtime_path.trim_matches('/').is_empty() {
            return Err(WebpacLinkError::TransportMisconfigured(
                "real-time endpoint path is empty".to_string(),
            ));
        }
        if config.channel_name.trim().is_empty() {
            return Err(WebpacLinkError::TransportMisconfigured(
                "real-time channel name is empty".to_string(),
            ));
        }

        let url = config.realtime_url();
        let parsed = reqwest::Url::parse(&url).map_err(|e| {
            WebpacLinkError::TransportMisconfigured(format!(
                "invalid real-time URL '{}': {}",
                url, e
            ))
        })?;
        if !matches!(parsed.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(WebpacLinkError::TransportMisconfigured(format!(
                "unsupported real-time URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let (state_tx, _) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        let (error_tx, _) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(TRANSPORT_EVENT_CAPACITY);

        log::debug!(
            "[webpac-link] Supervisor configured for {} (channel '{}')",
            url,
            config.channel_name
        );

        Ok(Self {
            url,
            channel: config.channel_name.clone(),
            tokens,
            transport,
            sink,
            shared: Arc::new(SupervisorShared {
                state: RwLock::new(ConnectionState::Disconnected),
                state_tx,
                error_tx,
            }),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            frame_loop: Mutex::new(None),
            start_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn ensure_frame_loop(&self) {
        let rx = match self.events_rx.lock().take() {
            Some(rx) => rx,
            None => return,
        };
        let handle = tokio::spawn(frame_loop(rx, self.shared.clone(), self.sink.clone()));
        *self.frame_loop.lock() = Some(handle);
    }

    /// Open the push connection with the session's current bearer token.
    ///
    /// The returned future is the one-shot outcome of this attempt. A
    /// failure is also published on [`errors`](Self::errors). Calls are
    /// serialized; callers decide whether to skip the call when already
    /// connected. A failed start is not retried here.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.start_lock.lock().await;
        self.ensure_frame_loop();

        let request = ConnectRequest {
            url: self.url.clone(),
            channel: self.channel.clone(),
            token: self.tokens.bearer_token(),
        };
        log::info!(
            "[webpac-link] Starting push connection to {} (channel '{}', token attached: {})",
            request.url,
            request.channel,
            request.token.is_some()
        );

        match self.transport.start(request, self.events_tx.clone()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.shared.publish_error(e.to_string());
                Err(e)
            },
        }
    }

    /// Close the push connection.
    pub async fn stop(&self) {
        let _guard = self.start_lock.lock().await;
        log::info!("[webpac-link] Stopping push connection");
        self.transport.stop().await;
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.current_state() == ConnectionState::Connected
    }

    /// Every state transition from now on, in transport order.
    pub fn connection_state(&self) -> EventStream<ConnectionState> {
        EventStream::new(self.shared.state_tx.subscribe())
    }

    /// Transport-level errors. They never end the stream.
    pub fn errors(&self) -> EventStream<TransportError> {
        EventStream::new(self.shared.error_tx.subscribe())
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if let Some(handle) = self.frame_loop.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("url", &self.url)
            .field("channel", &self.channel)
            .field("state", &self.current_state())
            .finish()
    }
}

async fn frame_loop(
    mut rx: mpsc::Receiver<TransportEvent>,
    shared: Arc<SupervisorShared>,
    sink: Arc<dyn FrameSink>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            TransportEvent::StateChanged { old, new } => {
                log::debug!("[webpac-link] Connection state {} -> {}", old, new);
                *shared.state.write() = new;
                let _ = shared.state_tx.send(new);
                sink.state_changed(old, new);
            },
            TransportEvent::Error(message) => shared.publish_error(message),
            TransportEvent::Frame { target, arguments } => {
                match InboundFrame::decode(&target, &arguments) {
                    Ok(Some(InboundFrame::DataChanged(frame))) => sink.data_changed(frame).await,
                    Ok(Some(InboundFrame::ConnectionChanged { connected })) => {
                        sink.connection_changed(connected)
                    },
                    Ok(None) => {
                        log::debug!("[webpac-link] Ignoring push '{}'", target);
                    },
                    Err(e) => {
                        log::warn!("[webpac-link] Dropping malformed '{}' frame: {}", target, e);
                    },
                }
            },
        }
    }
    log::debug!("[webpac-link] Frame loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connection::LoopbackTransport, models::DataChanged};
    use serde_json::json;

    struct NoToken;

    impl TokenSource for NoToken {
        fn bearer_token(&self) -> Option<String> {
            None
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        frames: Mutex<Vec<DataChanged>>,
        links: Mutex<Vec<bool>>,
    }

    #[async_trait::async_trait]
    impl FrameSink for RecordingSink {
        async fn data_changed(&self, frame: DataChanged) {
            self.frames.lock().push(frame);
        }

        fn connection_changed(&self, connected: bool) {
            self.links.lock().push(connected);
        }
    }

    fn supervisor(
        config: &ClientConfig,
    ) -> Result<(ConnectionSupervisor, Arc<LoopbackTransport>, Arc<RecordingSink>)> {
        let transport = Arc::new(LoopbackTransport::new());
        let sink = Arc::new(RecordingSink::default());
        let supervisor =
            ConnectionSupervisor::configure(config, Arc::new(NoToken), transport.clone(), sink.clone())?;
        Ok((supervisor, transport, sink))
    }

    #[test]
    fn test_configure_rejects_missing_integration_points() {
        let no_path = ClientConfig::default().with_realtime_path("");
        assert!(matches!(
            supervisor(&no_path),
            Err(WebpacLinkError::TransportMisconfigured(_))
        ));

        let no_channel = ClientConfig::default().with_channel_name("  ");
        assert!(matches!(
            supervisor(&no_channel),
            Err(WebpacLinkError::TransportMisconfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_state_stream_mirrors_transport_order() {
        let (supervisor, transport, _sink) = supervisor(&ClientConfig::default()).unwrap();
        let mut states = supervisor.connection_state();

        supervisor.start().await.unwrap();
        transport.push_state(ConnectionState::Reconnecting).await;
        transport.push_state(ConnectionState::Connected).await;

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(states.next().await.unwrap());
        }
        assert_eq!(
            seen,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Reconnecting,
                ConnectionState::Connected,
            ]
        );
        assert!(supervisor.is_connected());
    }

    #[tokio::test]
    async fn test_failed_start_is_published_on_error_stream() {
        let (supervisor, transport, _sink) = supervisor(&ClientConfig::default()).unwrap();
        transport.fail_start("gateway unreachable");
        let mut errors = supervisor.errors();

        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, WebpacLinkError::ConnectionError(_)));

        let published = errors.next().await.unwrap();
        assert!(published.message.contains("gateway unreachable"));
        assert_eq!(transport.start_count(), 1, "no automatic retry");
    }

    #[tokio::test]
    async fn test_frames_are_decoded_and_forwarded_in_order() {
        let (supervisor, transport, sink) = supervisor(&ClientConfig::default()).unwrap();
        let mut states = supervisor.connection_state();
        supervisor.start().await.unwrap();

        transport.data_changed("DB1112", "W0", json!(1), false).await;
        transport.push_frame("DataChanged", vec![json!(7)]).await;
        transport.push_frame("Unknown", vec![]).await;
        transport.data_changed("DB1112", "W0", json!(2), false).await;
        transport.push_frame("ConnectionChanged", vec![json!(false)]).await;
        // A state change after the frames proves the loop has consumed them.
        transport.stop().await;
        while states.next().await != Some(ConnectionState::Disconnected) {}

        let values: Vec<_> = sink.frames.lock().iter().map(|f| f.value.clone()).collect();
        assert_eq!(values, vec![json!(1), json!(2)]);
        assert_eq!(*sink.links.lock(), vec![false]);
    }

    #[tokio::test]
    async fn test_transport_errors_do_not_change_state() {
        let (supervisor, transport, _sink) = supervisor(&ClientConfig::default()).unwrap();
        let mut errors = supervisor.errors();
        supervisor.start().await.unwrap();

        transport.push_error("keepalive missed").await;
        assert_eq!(errors.next().await.unwrap().message, "keepalive missed");
        assert_eq!(supervisor.current_state(), ConnectionState::Connected);
    }
}
