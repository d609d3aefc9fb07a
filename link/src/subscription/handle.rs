use crate::{
    error::Result,
    models::{ChangeEvent, SubscriptionKey},
    subscription::registry::SubscriptionRegistry,
};
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Caller's end of one subscription.
///
/// Yields a fresh [`ChangeEvent`] for every matching push, in server-send
/// order. A refused subscription yields one
/// [`SubscriptionAckFailure`](crate::WebpacLinkError::SubscriptionAckFailure)
/// and then ends. Dropping the handle removes its registry entry.
///
/// # Examples
///
/// ```rust,no_run
/// # async fn example(client: &webpac_link::WebpacClient) -> webpac_link::Result<()> {
/// let mut sub = client.subscribe("DB1112", ["W0"]).await?;
/// while let Some(event) = sub.next().await {
///     let change = event?;
///     println!("{}.{} = {}", change.mapping, change.variable, change.value);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Subscription {
    id: u64,
    key: SubscriptionKey,
    event_rx: mpsc::Receiver<Result<ChangeEvent>>,
    registry: Weak<SubscriptionRegistry>,
    closed: bool,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        key: SubscriptionKey,
        event_rx: mpsc::Receiver<Result<ChangeEvent>>,
        registry: Weak<SubscriptionRegistry>,
    ) -> Self {
        Self {
            id,
            key,
            event_rx,
            registry,
            closed: false,
        }
    }

    /// Next event, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<Result<ChangeEvent>> {
        if self.closed {
            return None;
        }
        match self.event_rx.recv().await {
            Some(event) => Some(event),
            None => {
                self.closed = true;
                None
            },
        }
    }

    /// Next event if one is already buffered.
    pub fn try_next(&mut self) -> Option<Result<ChangeEvent>> {
        if self.closed {
            return None;
        }
        match self.event_rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                None
            },
        }
    }

    /// Client-side id, unique per client.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// End the subscription and wait for the gateway to drop the
    /// registration when no other subscription shares the key.
    ///
    /// Safe to call multiple times.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.event_rx.close();

        match self.registry.upgrade() {
            Some(registry) => registry.close_entry(self.id).await,
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Stream for Subscription {
    type Item = Result<ChangeEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(None);
        }
        match this.event_rx.poll_recv(cx) {
            Poll::Ready(None) => {
                this.closed = true;
                Poll::Ready(None)
            },
            other => other,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("closed", &self.closed)
            .finish()
    }
}
