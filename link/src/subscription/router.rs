use crate::{
    connection::FrameSink,
    models::{ChangeEvent, ConnectionChangeEvent, ConnectionState, DataChanged},
    stream::{EventStream, DEFAULT_BROADCAST_CAPACITY},
    subscription::registry::SubscriptionRegistry,
};
use chrono::Utc;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::{broadcast, mpsc::error::TrySendError};

/// Fans inbound pushes out to the registry.
///
/// A `DataChanged` push is delivered once to every entry whose key covers
/// `(mapping, variable)`: N matches mean N deliveries, zero matches mean the
/// push is dropped. `ConnectionChanged` pushes go to every link-status
/// listener.
///
/// Every connection after the first re-registers the live keys, whether the
/// transport reconnected by itself or the caller restarted it.
pub struct EventRouter {
    registry: Arc<SubscriptionRegistry>,
    link_tx: broadcast::Sender<ConnectionChangeEvent>,
    connected_before: AtomicBool,
}

impl EventRouter {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        let (link_tx, _) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            registry,
            link_tx,
            connected_before: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Deliver `frame` to every matching subscription. Returns the number of
    /// deliveries.
    ///
    /// Never waits on a subscriber: a subscription whose buffer is full
    /// loses this event, the others still get theirs.
    pub fn route(&self, frame: &DataChanged) -> usize {
        let targets = self
            .registry
            .matching_senders(&frame.mapping, &frame.variable);
        if targets.is_empty() {
            log::trace!(
                "[webpac-link] No subscriber for {}.{}",
                frame.mapping,
                frame.variable
            );
            return 0;
        }

        let timestamp = Utc::now();
        let mut delivered = 0;
        let mut gone = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(Ok(ChangeEvent::from_frame(frame, timestamp))) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    log::warn!(
                        "[webpac-link] Subscription {} is not keeping up; dropped {}.{}",
                        id,
                        frame.mapping,
                        frame.variable
                    );
                },
                Err(TrySendError::Closed(_)) => gone.push(id),
            }
        }
        if !gone.is_empty() {
            self.registry.evict(&gone);
        }
        delivered
    }

    pub fn subscribe_connection_changed(&self) -> EventStream<ConnectionChangeEvent> {
        EventStream::new(self.link_tx.subscribe())
    }

    pub(crate) fn publish_connection_changed(&self, connected: bool) {
        log::debug!("[webpac-link] Gateway link {}", if connected { "up" } else { "down" });
        let _ = self.link_tx.send(ConnectionChangeEvent {
            connected,
            timestamp: Utc::now(),
        });
    }
}

#[async_trait::async_trait]
impl FrameSink for EventRouter {
    async fn data_changed(&self, frame: DataChanged) {
        self.route(&frame);
    }

    fn connection_changed(&self, connected: bool) {
        self.publish_connection_changed(connected);
    }

    fn state_changed(&self, old: ConnectionState, new: ConnectionState) {
        if new != ConnectionState::Connected || old == ConnectionState::Connected {
            return;
        }
        if self.connected_before.swap(true, Ordering::AcqRel) {
            let registry = Arc::clone(&self.registry);
            tokio::spawn(async move {
                registry.resubscribe_all().await;
            });
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("registry", &self.registry)
            .finish()
    }
}
