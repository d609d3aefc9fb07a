//! In-process transport.
//!
//! [`LoopbackTransport`] never touches the network. It records every
//! invocation, answers them from a configurable table, and lets the owner
//! inject server pushes, lifecycle changes and errors. Useful for tests and
//! for embedding the client against a simulated gateway.

use crate::{
    connection::transport::{ConnectRequest, Transport, TransportEvent},
    error::{Result, WebpacLinkError},
    models::ConnectionState,
};
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// An outbound call recorded by [`LoopbackTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub target: String,
    pub arguments: Vec<JsonValue>,
}

#[derive(Default)]
struct LoopbackState {
    events: Option<mpsc::Sender<TransportEvent>>,
    state: ConnectionState,
    fail_start: Option<String>,
    failing_targets: HashMap<String, String>,
    invocations: Vec<Invocation>,
    last_request: Option<ConnectRequest>,
    start_count: usize,
}

#[derive(Default)]
pub struct LoopbackTransport {
    inner: Mutex<LoopbackState>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `start` fail with `message`.
    pub fn fail_start(&self, message: impl Into<String>) {
        self.inner.lock().fail_start = Some(message.into());
    }

    /// Let `start` succeed again.
    pub fn allow_start(&self) {
        self.inner.lock().fail_start = None;
    }

    /// Answer invocations of `target` with a gateway error.
    pub fn fail_invocations(&self, target: impl Into<String>, message: impl Into<String>) {
        self.inner
            .lock()
            .failing_targets
            .insert(target.into(), message.into());
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.inner.lock().invocations.clone()
    }

    pub fn invocations_of(&self, target: &str) -> Vec<Invocation> {
        self.inner
            .lock()
            .invocations
            .iter()
            .filter(|inv| inv.target == target)
            .cloned()
            .collect()
    }

    pub fn last_connect_request(&self) -> Option<ConnectRequest> {
        self.inner.lock().last_request.clone()
    }

    pub fn start_count(&self) -> usize {
        self.inner.lock().start_count
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    fn sender(&self) -> Option<mpsc::Sender<TransportEvent>> {
        self.inner.lock().events.clone()
    }

    /// Inject a server push. Returns `false` when never started.
    pub async fn push_frame(&self, target: &str, arguments: Vec<JsonValue>) -> bool {
        match self.sender() {
            Some(tx) => tx
                .send(TransportEvent::Frame {
                    target: target.to_string(),
                    arguments,
                })
                .await
                .is_ok(),
            None => false,
        }
    }

    /// Inject a `DataChanged(mapping, variable, value, isRaw)` push.
    pub async fn data_changed(
        &self,
        mapping: &str,
        variable: &str,
        value: JsonValue,
        is_raw: bool,
    ) -> bool {
        self.push_frame(
            "DataChanged",
            vec![json!(mapping), json!(variable), value, json!(is_raw)],
        )
        .await
    }

    /// Inject a lifecycle transition from the current state to `new`.
    pub async fn push_state(&self, new: ConnectionState) -> bool {
        let (tx, old) = {
            let mut inner = self.inner.lock();
            let old = inner.state;
            inner.state = new;
            (inner.events.clone(), old)
        };
        match tx {
            Some(tx) => tx.send(TransportEvent::StateChanged { old, new }).await.is_ok(),
            None => false,
        }
    }

    pub async fn push_error(&self, message: impl Into<String>) -> bool {
        match self.sender() {
            Some(tx) => tx.send(TransportEvent::Error(message.into())).await.is_ok(),
            None => false,
        }
    }

    async fn emit(tx: &mpsc::Sender<TransportEvent>, old: ConnectionState, new: ConnectionState) {
        if old != new {
            let _ = tx.send(TransportEvent::StateChanged { old, new }).await;
        }
    }
}

#[async_trait::async_trait]
impl Transport for LoopbackTransport {
    async fn start(
        &self,
        request: ConnectRequest,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<()> {
        let (old, failure) = {
            let mut inner = self.inner.lock();
            inner.start_count += 1;
            inner.last_request = Some(request);
            inner.events = Some(events.clone());
            (inner.state, inner.fail_start.clone())
        };

        Self::emit(&events, old, ConnectionState::Connecting).await;
        match failure {
            Some(message) => {
                self.inner.lock().state = ConnectionState::Disconnected;
                Self::emit(&events, ConnectionState::Connecting, ConnectionState::Disconnected)
                    .await;
                Err(WebpacLinkError::ConnectionError(message))
            },
            None => {
                self.inner.lock().state = ConnectionState::Connected;
                Self::emit(&events, ConnectionState::Connecting, ConnectionState::Connected).await;
                Ok(())
            },
        }
    }

    async fn invoke(&self, target: &str, arguments: Vec<JsonValue>) -> Result<JsonValue> {
        let mut inner = self.inner.lock();
        inner.invocations.push(Invocation {
            target: target.to_string(),
            arguments,
        });

        if inner.state != ConnectionState::Connected {
            return Err(WebpacLinkError::ConnectionError(
                "Push connection is not open".to_string(),
            ));
        }
        match inner.failing_targets.get(target) {
            Some(message) => Err(WebpacLinkError::InvocationFailed {
                target: target.to_string(),
                message: message.clone(),
            }),
            None => Ok(JsonValue::Bool(true)),
        }
    }

    async fn stop(&self) {
        let (tx, old) = {
            let mut inner = self.inner.lock();
            let old = inner.state;
            inner.state = ConnectionState::Disconnected;
            (inner.events.clone(), old)
        };
        if let Some(tx) = tx {
            Self::emit(&tx, old, ConnectionState::Disconnected).await;
        }
    }
}
