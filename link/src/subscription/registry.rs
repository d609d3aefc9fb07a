//! Routing table of active subscriptions.
//!
//! Entries are appended by `subscribe` and read by the frame loop. Frame
//! delivery takes a read snapshot of the matching senders and releases the
//! lock before sending, so a slow subscriber never blocks new subscriptions.

use crate::{
    connection::{Transport, DEFAULT_EVENT_CHANNEL_CAPACITY},
    error::{Result, WebpacLinkError},
    models::{ChangeEvent, SubscriptionInfo, SubscriptionKey},
    subscription::handle::Subscription,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::mpsc;

pub(crate) type EventSender = mpsc::Sender<Result<ChangeEvent>>;

struct SubEntry {
    id: u64,
    key: SubscriptionKey,
    event_tx: EventSender,
    created_at: DateTime<Utc>,
}

pub struct SubscriptionRegistry {
    entries: RwLock<Vec<SubEntry>>,
    next_id: AtomicU64,
    event_capacity: usize,
    transport: Arc<dyn Transport>,
    /// Serializes subscribe/unsubscribe invocations so the gateway sees them
    /// in the order the local table changed.
    control: tokio::sync::Mutex<()>,
}

fn ack_failure(key: &SubscriptionKey, message: String) -> WebpacLinkError {
    WebpacLinkError::SubscriptionAckFailure {
        mapping: key.mapping.clone(),
        message,
    }
}

impl SubscriptionRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_event_capacity(transport, DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    /// Registry whose subscriptions buffer at most `capacity` undelivered
    /// events each. Events beyond that are dropped for that subscription.
    pub fn with_event_capacity(transport: Arc<dyn Transport>, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            event_capacity: capacity.max(1),
            transport,
            control: tokio::sync::Mutex::new(()),
        }
    }

    /// Append an entry for `key` and ask the gateway to register it.
    ///
    /// The handle is returned at once; the entry is routable while the
    /// acknowledgement is pending. If the gateway refuses, the error is
    /// delivered on this handle only, then the entry is removed and the
    /// handle's stream ends.
    pub fn register(self: &Arc<Self>, key: SubscriptionKey) -> Subscription {
        let (event_tx, event_rx) = mpsc::channel(self.event_capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.entries.write().push(SubEntry {
            id,
            key: key.clone(),
            event_tx,
            created_at: Utc::now(),
        });
        log::debug!("[webpac-link] Registered subscription {} for {}", id, key);

        let registry = Arc::clone(self);
        let ack_key = key.clone();
        tokio::spawn(async move {
            registry.acknowledge(id, ack_key).await;
        });

        Subscription::new(id, key, event_rx, Arc::downgrade(self))
    }

    async fn acknowledge(&self, id: u64, key: SubscriptionKey) {
        let outcome = {
            let _control = self.control.lock().await;
            if !self.contains(id) {
                log::debug!("[webpac-link] Subscription {} closed before its request went out", id);
                return;
            }
            self.transport
                .invoke(key.subscribe_target(), key.arguments())
                .await
        };

        let message = match outcome {
            Ok(JsonValue::Bool(false)) => "gateway declined the subscription".to_string(),
            Ok(_) => {
                log::debug!("[webpac-link] Subscription {} acknowledged", id);
                return;
            },
            Err(e) => e.to_string(),
        };

        log::warn!("[webpac-link] Subscription {} to {} failed: {}", id, key, message);
        let removed = self.remove_where(|entry| entry.id == id);
        for entry in removed {
            let _ = entry.event_tx.send(Err(ack_failure(&key, message.clone()))).await;
        }
    }

    /// Remove every entry keyed exactly `key`, closing their streams, then
    /// tell the gateway.
    pub async fn unsubscribe(&self, key: &SubscriptionKey) -> Result<bool> {
        let _control = self.control.lock().await;
        let removed = self.remove_where(|entry| entry.key == *key);
        log::debug!(
            "[webpac-link] Unsubscribing {} ({} local entr{})",
            key,
            removed.len(),
            if removed.len() == 1 { "y" } else { "ies" }
        );
        drop(removed);

        let result = self
            .transport
            .invoke(key.unsubscribe_target(), key.arguments())
            .await?;
        Ok(result.as_bool().unwrap_or(true))
    }

    fn remove_where(&self, predicate: impl Fn(&SubEntry) -> bool) -> Vec<SubEntry> {
        let mut entries = self.entries.write();
        let all = std::mem::take(&mut *entries);
        let (removed, kept): (Vec<_>, Vec<_>) = all.into_iter().partition(|e| predicate(e));
        *entries = kept;
        removed
    }

    /// Remove one entry. Returns its key when no other entry shares it, i.e.
    /// when the gateway registration is no longer needed.
    fn detach(&self, id: u64) -> Option<SubscriptionKey> {
        let mut entries = self.entries.write();
        let index = entries.iter().position(|entry| entry.id == id)?;
        let entry = entries.remove(index);
        let shared = entries.iter().any(|other| other.key == entry.key);
        (!shared).then_some(entry.key)
    }

    /// Drop the gateway registration of `key` unless an entry for it was
    /// added since it was detached.
    async fn unsubscribe_if_unused(&self, key: SubscriptionKey) -> Result<()> {
        let _control = self.control.lock().await;
        let in_use = self.entries.read().iter().any(|entry| entry.key == key);
        if in_use {
            log::debug!("[webpac-link] {} is subscribed again; keeping gateway registration", key);
            return Ok(());
        }
        self.transport
            .invoke(key.unsubscribe_target(), key.arguments())
            .await?;
        Ok(())
    }

    /// Drop path of a handle: fire-and-forget.
    pub(crate) fn release(self: &Arc<Self>, id: u64) {
        let Some(key) = self.detach(id) else {
            return;
        };
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::debug!("[webpac-link] No runtime; skipping server unsubscribe for {}", key);
                return;
            },
        };
        let registry = Arc::clone(self);
        handle.spawn(async move {
            let label = key.to_string();
            if let Err(e) = registry.unsubscribe_if_unused(key).await {
                log::debug!("[webpac-link] Server unsubscribe for {} failed: {}", label, e);
            }
        });
    }

    /// Explicit close of a handle: waits for the gateway.
    pub(crate) async fn close_entry(&self, id: u64) -> Result<()> {
        match self.detach(id) {
            Some(key) => self.unsubscribe_if_unused(key).await,
            None => Ok(()),
        }
    }

    fn contains(&self, id: u64) -> bool {
        self.entries.read().iter().any(|entry| entry.id == id)
    }

    /// Senders of every entry interested in `(mapping, variable)`.
    pub(crate) fn matching_senders(&self, mapping: &str, variable: &str) -> Vec<(u64, EventSender)> {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.key.matches(mapping, variable))
            .map(|entry| (entry.id, entry.event_tx.clone()))
            .collect()
    }

    /// Remove entries whose receiver is gone.
    pub(crate) fn evict(self: &Arc<Self>, ids: &[u64]) {
        for &id in ids {
            log::debug!("[webpac-link] Evicting unobserved subscription {}", id);
            self.release(id);
        }
    }

    /// Re-register every distinct key, e.g. after the transport reconnected.
    /// Keys the gateway now refuses are failed like a refused first ack.
    pub async fn resubscribe_all(&self) {
        let keys: Vec<SubscriptionKey> = {
            let entries = self.entries.read();
            let mut seen = HashSet::new();
            entries
                .iter()
                .filter(|entry| seen.insert(entry.key.clone()))
                .map(|entry| entry.key.clone())
                .collect()
        };
        if keys.is_empty() {
            return;
        }

        log::info!("[webpac-link] Re-subscribing {} key(s) on the new connection", keys.len());
        let mut refused = Vec::new();
        {
            let _control = self.control.lock().await;
            for key in keys {
                match self
                    .transport
                    .invoke(key.subscribe_target(), key.arguments())
                    .await
                {
                    Ok(JsonValue::Bool(false)) => {
                        refused.push((key, "gateway declined the subscription".to_string()))
                    },
                    Ok(_) => {},
                    Err(e) => refused.push((key, e.to_string())),
                }
            }
        }

        for (key, message) in refused {
            log::warn!("[webpac-link] Re-subscribing {} failed: {}", key, message);
            for entry in self.remove_where(|entry| entry.key == key) {
                let _ = entry.event_tx.send(Err(ack_failure(&key, message.clone()))).await;
            }
        }
    }

    pub fn snapshot(&self) -> Vec<SubscriptionInfo> {
        self.entries
            .read()
            .iter()
            .map(|entry| SubscriptionInfo {
                id: entry.id,
                key: entry.key.clone(),
                created_at: entry.created_at,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("entries", &self.len())
            .finish()
    }
}
