//! Websocket transport for the push channel.
//!
//! One background task owns the socket. It:
//!
//! - attaches `Authorization: Bearer <token>` to the handshake
//! - correlates outbound invocations with the gateway's completions
//! - forwards server pushes as [`TransportEvent::Frame`] in arrival order
//! - sends keepalive pings and tears the socket down on pong timeout
//! - reconnects with exponential backoff when `auto_reconnect` is set,
//!   re-reading the token from its [`TokenSource`] before every attempt

use crate::{
    auth::TokenSource,
    connection::{
        transport::{ConnectRequest, Transport, TransportEvent},
        FAR_FUTURE, MAX_WS_TEXT_MESSAGE_BYTES,
    },
    error::{Result, WebpacLinkError},
    models::{ClientMessage, ConnectionOptions, ConnectionState, ServerMessage},
    timeouts::LinkTimeouts,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tokio_tungstenite::{
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue},
        protocol::Message,
    },
    MaybeTlsStream, WebSocketStream,
};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Turn the configured real-time URL and channel into a websocket URL.
///
/// `http` maps to `ws` and `https` to `wss`; the channel becomes the last
/// path segment.
pub(crate) fn resolve_ws_url(url: &str, channel: &str) -> Result<String> {
    let url = url.trim();
    let ws_url = if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if url.starts_with("ws://") || url.starts_with("wss://") {
        url.to_string()
    } else {
        return Err(WebpacLinkError::TransportMisconfigured(format!(
            "unsupported real-time URL '{}'",
            url
        )));
    };

    let channel = channel.trim_matches('/');
    if channel.is_empty() {
        Ok(ws_url)
    } else {
        Ok(format!("{}/{}", ws_url.trim_end_matches('/'), channel))
    }
}

enum WsCmd {
    Invoke {
        target: String,
        arguments: Vec<JsonValue>,
        result_tx: oneshot::Sender<Result<JsonValue>>,
    },
    Shutdown,
}

struct WsHandle {
    cmd_tx: mpsc::Sender<WsCmd>,
    task: JoinHandle<()>,
}

/// Default [`Transport`]: JSON text frames over a websocket.
pub struct WsTransport {
    timeouts: LinkTimeouts,
    options: ConnectionOptions,
    tokens: Option<Arc<dyn TokenSource>>,
    handle: Mutex<Option<WsHandle>>,
}

impl WsTransport {
    pub fn new(timeouts: LinkTimeouts, options: ConnectionOptions) -> Self {
        Self {
            timeouts,
            options,
            tokens: None,
            handle: Mutex::new(None),
        }
    }

    /// Source consulted for a fresh token before every reconnect. Without one
    /// the handshake token is reused.
    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    async fn shutdown_current(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.cmd_tx.send(WsCmd::Shutdown).await;
            let _ = handle.task.await;
        }
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn start(
        &self,
        request: ConnectRequest,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<()> {
        self.shutdown_current().await;

        let url = resolve_ws_url(&request.url, &request.channel)?;
        let (cmd_tx, cmd_rx) = mpsc::channel::<WsCmd>(256);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        let connection = ConnectionTask {
            url,
            token: request.token,
            tokens: self.tokens.clone(),
            timeouts: self.timeouts.clone(),
            options: self.options.clone(),
            events,
            state: ConnectionState::Disconnected,
        };
        let task = tokio::spawn(connection.run(cmd_rx, ready_tx));
        *self.handle.lock() = Some(WsHandle { cmd_tx, task });

        match ready_rx.await {
            Ok(result) => result,
            Err(_) => Err(WebpacLinkError::ConnectionError(
                "Connection task exited before signalling readiness".to_string(),
            )),
        }
    }

    async fn invoke(&self, target: &str, arguments: Vec<JsonValue>) -> Result<JsonValue> {
        let cmd_tx = self
            .handle
            .lock()
            .as_ref()
            .map(|handle| handle.cmd_tx.clone())
            .ok_or_else(|| {
                WebpacLinkError::ConnectionError("Push connection is not started".to_string())
            })?;

        let (result_tx, result_rx) = oneshot::channel();
        cmd_tx
            .send(WsCmd::Invoke {
                target: target.to_string(),
                arguments,
                result_tx,
            })
            .await
            .map_err(|_| {
                WebpacLinkError::ConnectionError("Connection task is not running".to_string())
            })?;

        result_rx.await.map_err(|_| {
            WebpacLinkError::ConnectionError(
                "Connection task ended before completing the invocation".to_string(),
            )
        })?
    }

    async fn stop(&self) {
        self.shutdown_current().await;
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            let _ = handle.cmd_tx.try_send(WsCmd::Shutdown);
        }
    }
}

// ── Background connection task ──────────────────────────────────────────────

struct PendingInvocation {
    target: String,
    result_tx: oneshot::Sender<Result<JsonValue>>,
}

fn fail_pending(
    pending: &mut HashMap<String, PendingInvocation>,
    err: impl Fn() -> WebpacLinkError,
) {
    for (_, invocation) in pending.drain() {
        let _ = invocation.result_tx.send(Err(err()));
    }
}

async fn establish_ws(url: &str, token: Option<&str>, timeouts: &LinkTimeouts) -> Result<WsStream> {
    log::debug!("[webpac-link] Opening push connection to {}", url);

    let mut request = url.into_client_request().map_err(|e| {
        WebpacLinkError::TransportMisconfigured(format!("Invalid real-time URL '{}': {}", url, e))
    })?;

    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
            WebpacLinkError::ConnectionError(format!("Bearer token is not a valid header: {}", e))
        })?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let connect = tokio_tungstenite::connect_async(request);
    let connect_result = if LinkTimeouts::is_no_timeout(timeouts.connection_timeout) {
        Ok(connect.await)
    } else {
        tokio::time::timeout(timeouts.connection_timeout, connect).await
    };

    match connect_result {
        Ok(Ok((stream, _))) => Ok(stream),
        Ok(Err(tokio_tungstenite::tungstenite::Error::Http(response))) => {
            let message = match response.status().as_u16() {
                401 => "Unauthorized: push connection requires a valid bearer token".to_string(),
                403 => "Forbidden: access to the push connection denied".to_string(),
                code => format!("Push connection HTTP error: {}", code),
            };
            Err(WebpacLinkError::ConnectionError(message))
        },
        Ok(Err(e)) => Err(WebpacLinkError::ConnectionError(format!("Connection failed: {}", e))),
        Err(_) => Err(WebpacLinkError::TimeoutError(format!(
            "Connection timeout ({:?})",
            timeouts.connection_timeout
        ))),
    }
}

async fn send_message(ws: &mut WsStream, msg: &ClientMessage) -> Result<()> {
    let payload = serde_json::to_string(msg)?;
    ws.send(Message::Text(payload.into())).await.map_err(|e| {
        WebpacLinkError::ConnectionError(format!("Failed to send invocation: {}", e))
    })
}

struct ConnectionTask {
    url: String,
    token: Option<String>,
    tokens: Option<Arc<dyn TokenSource>>,
    timeouts: LinkTimeouts,
    options: ConnectionOptions,
    events: mpsc::Sender<TransportEvent>,
    state: ConnectionState,
}

impl ConnectionTask {
    async fn transition(&mut self, new: ConnectionState) {
        if self.state == new {
            return;
        }
        let old = self.state;
        self.state = new;
        let _ = self
            .events
            .send(TransportEvent::StateChanged { old, new })
            .await;
    }

    async fn report_error(&self, message: String) {
        let _ = self.events.send(TransportEvent::Error(message)).await;
    }

    async fn handle_text(&self, text: &str, pending: &mut HashMap<String, PendingInvocation>) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::Invocation { target, arguments }) => {
                let _ = self
                    .events
                    .send(TransportEvent::Frame { target, arguments })
                    .await;
            },
            Ok(ServerMessage::Completion {
                invocation_id,
                result,
                error,
            }) => match pending.remove(&invocation_id) {
                Some(invocation) => {
                    let outcome = match error {
                        Some(message) => Err(WebpacLinkError::InvocationFailed {
                            target: invocation.target,
                            message,
                        }),
                        None => Ok(result.unwrap_or(JsonValue::Null)),
                    };
                    let _ = invocation.result_tx.send(outcome);
                },
                None => {
                    log::debug!(
                        "[webpac-link] Completion for unknown invocation '{}'",
                        invocation_id
                    );
                },
            },
            Ok(ServerMessage::Ping) => {},
            Err(e) => log::warn!("[webpac-link] Dropping undecodable frame: {}", e),
        }
    }

    /// Token for the next handshake, or an error message when the session
    /// no longer holds a live token.
    fn refresh_token(&self) -> std::result::Result<Option<String>, String> {
        match (&self.tokens, &self.token) {
            (Some(source), Some(_)) => source
                .bearer_token()
                .map(Some)
                .ok_or_else(|| "Bearer token is no longer live; not reconnecting".to_string()),
            (Some(source), None) => Ok(source.bearer_token()),
            (None, token) => Ok(token.clone()),
        }
    }

    /// Retry with backoff until a socket is open, attempts run out, or a
    /// shutdown arrives.
    async fn reconnect(&mut self, cmd_rx: &mut mpsc::Receiver<WsCmd>) -> Option<WsStream> {
        let mut attempt: u32 = 0;
        loop {
            if let Some(max) = self.options.max_reconnect_attempts {
                if attempt >= max {
                    log::warn!("[webpac-link] Max reconnection attempts ({}) reached", max);
                    self.report_error(format!("Max reconnection attempts ({}) reached", max))
                        .await;
                    return None;
                }
            }

            let delay = self.options.reconnect_delay(attempt);
            log::info!(
                "[webpac-link] Reconnecting in {}ms (attempt {})",
                delay.as_millis(),
                attempt + 1
            );

            let sleep_fut = tokio::time::sleep(delay);
            tokio::pin!(sleep_fut);
            loop {
                tokio::select! {
                    biased;
                    cmd = cmd_rx.recv() => match cmd {
                        Some(WsCmd::Invoke { result_tx, .. }) => {
                            let _ = result_tx.send(Err(WebpacLinkError::ConnectionError(
                                "Push connection is reconnecting".to_string(),
                            )));
                        },
                        Some(WsCmd::Shutdown) | None => return None,
                    },
                    _ = &mut sleep_fut => break,
                }
            }
            attempt += 1;

            let token = match self.refresh_token() {
                Ok(token) => token,
                Err(message) => {
                    log::warn!("[webpac-link] {}", message);
                    self.report_error(message).await;
                    return None;
                },
            };

            match establish_ws(&self.url, token.as_deref(), &self.timeouts).await {
                Ok(stream) => {
                    log::info!("[webpac-link] Reconnection successful");
                    self.token = token;
                    return Some(stream);
                },
                Err(e) => {
                    log::warn!("[webpac-link] Reconnection attempt {} failed: {}", attempt, e);
                    self.report_error(e.to_string()).await;
                },
            }
        }
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<WsCmd>,
        ready_tx: oneshot::Sender<Result<()>>,
    ) {
        self.transition(ConnectionState::Connecting).await;

        let mut ws_stream = match establish_ws(&self.url, self.token.as_deref(), &self.timeouts)
            .await
        {
            Ok(stream) => {
                log::info!("[webpac-link] Push connection open: {}", self.url);
                self.transition(ConnectionState::Connected).await;
                let _ = ready_tx.send(Ok(()));
                Some(stream)
            },
            Err(e) => {
                log::warn!("[webpac-link] Push connection failed: {}", e);
                self.transition(ConnectionState::Disconnected).await;
                let _ = ready_tx.send(Err(e));
                return;
            },
        };

        let mut pending: HashMap<String, PendingInvocation> = HashMap::new();
        let mut next_invocation_id: u64 = 1;

        let has_keepalive = !self.timeouts.keepalive_interval.is_zero();
        let keepalive_dur = if has_keepalive {
            self.timeouts.keepalive_interval
        } else {
            FAR_FUTURE
        };
        let pong_timeout_dur = self.timeouts.pong_timeout;
        let has_pong_timeout = has_keepalive && !pong_timeout_dur.is_zero();
        let mut idle_deadline = TokioInstant::now() + keepalive_dur;
        let mut awaiting_pong = false;
        let mut pong_deadline = TokioInstant::now() + FAR_FUTURE;

        loop {
            if let Some(ws) = ws_stream.as_mut() {
                let idle_sleep = tokio::time::sleep_until(idle_deadline);
                tokio::pin!(idle_sleep);
                let pong_sleep = tokio::time::sleep_until(pong_deadline);
                tokio::pin!(pong_sleep);

                tokio::select! {
                    biased;

                    _ = &mut pong_sleep, if has_pong_timeout && awaiting_pong => {
                        let message = format!("Pong timeout ({:?}): gateway unresponsive", pong_timeout_dur);
                        log::warn!("[webpac-link] {}", message);
                        self.report_error(message).await;
                        awaiting_pong = false;
                        ws_stream = None;
                        continue;
                    }

                    cmd = cmd_rx.recv() => match cmd {
                        Some(WsCmd::Invoke { target, arguments, result_tx }) => {
                            let invocation_id = next_invocation_id.to_string();
                            next_invocation_id += 1;
                            let msg = ClientMessage::Invocation {
                                invocation_id: invocation_id.clone(),
                                target: target.clone(),
                                arguments,
                            };
                            match send_message(ws, &msg).await {
                                Ok(()) => {
                                    log::debug!("[webpac-link] Invoked {} (id={})", target, invocation_id);
                                    pending.insert(invocation_id, PendingInvocation { target, result_tx });
                                },
                                Err(e) => {
                                    let message = e.to_string();
                                    let _ = result_tx.send(Err(e));
                                    self.report_error(message).await;
                                    ws_stream = None;
                                    continue;
                                },
                            }
                        },
                        Some(WsCmd::Shutdown) | None => {
                            let _ = ws.close(None).await;
                            fail_pending(&mut pending, || WebpacLinkError::Cancelled);
                            self.transition(ConnectionState::Disconnected).await;
                            return;
                        },
                    },

                    _ = &mut idle_sleep, if has_keepalive && !awaiting_pong => {
                        if let Err(e) = ws.send(Message::Ping(Bytes::new())).await {
                            let message = format!("Keepalive ping failed: {}", e);
                            log::warn!("[webpac-link] {}", message);
                            self.report_error(message).await;
                            ws_stream = None;
                            continue;
                        }
                        if has_pong_timeout {
                            awaiting_pong = true;
                            pong_deadline = TokioInstant::now() + pong_timeout_dur;
                        }
                        idle_deadline = TokioInstant::now() + keepalive_dur;
                    }

                    frame = ws.next() => {
                        idle_deadline = TokioInstant::now() + keepalive_dur;
                        if awaiting_pong {
                            awaiting_pong = false;
                            pong_deadline = TokioInstant::now() + FAR_FUTURE;
                        }

                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                if text.len() > MAX_WS_TEXT_MESSAGE_BYTES {
                                    log::warn!("[webpac-link] Text frame too large ({} bytes)", text.len());
                                    continue;
                                }
                                self.handle_text(text.as_str(), &mut pending).await;
                            },
                            Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                                Ok(text) => self.handle_text(text, &mut pending).await,
                                Err(_) => log::warn!("[webpac-link] Dropping non-UTF-8 binary frame"),
                            },
                            Some(Ok(Message::Close(frame))) => {
                                match frame {
                                    Some(f) => log::info!(
                                        "[webpac-link] Gateway closed connection: {} (code {})",
                                        f.reason, u16::from(f.code)
                                    ),
                                    None => log::info!("[webpac-link] Gateway closed connection"),
                                }
                                ws_stream = None;
                                continue;
                            },
                            Some(Ok(Message::Ping(payload))) => {
                                let _ = ws.send(Message::Pong(payload)).await;
                            },
                            Some(Ok(Message::Pong(_))) => {
                                log::debug!("[webpac-link] Keepalive: received Pong");
                            },
                            Some(Ok(Message::Frame(_))) => {},
                            Some(Err(e)) => {
                                let message = format!("Websocket error: {}", e);
                                log::warn!("[webpac-link] {}", message);
                                self.report_error(message).await;
                                ws_stream = None;
                                continue;
                            },
                            None => {
                                log::info!("[webpac-link] Push connection stream ended");
                                ws_stream = None;
                                continue;
                            },
                        }
                    }
                }
            } else {
                // ── Connection lost ─────────────────────────────────────
                fail_pending(&mut pending, || {
                    WebpacLinkError::ConnectionError("Push connection lost".to_string())
                });

                if !self.options.auto_reconnect {
                    self.transition(ConnectionState::Disconnected).await;
                    return;
                }

                self.transition(ConnectionState::Reconnecting).await;
                match self.reconnect(&mut cmd_rx).await {
                    Some(stream) => {
                        ws_stream = Some(stream);
                        idle_deadline = TokioInstant::now() + keepalive_dur;
                        awaiting_pong = false;
                        pong_deadline = TokioInstant::now() + FAR_FUTURE;
                        self.transition(ConnectionState::Connected).await;
                    },
                    None => {
                        self.transition(ConnectionState::Disconnected).await;
                        return;
                    },
                }
            }
        }
    }
}
