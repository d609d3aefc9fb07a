//! Multi-subscriber event streams.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// Default buffer of each broadcast stream.
pub(crate) const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Receiving end of a broadcast publisher (connection state, errors, link status).
///
/// Every subscriber sees every value in publish order. A subscriber that falls
/// more than the buffer size behind skips the overwritten values and a warning
/// is logged.
pub struct EventStream<T: Clone> {
    rx: broadcast::Receiver<T>,
}

impl<T: Clone> EventStream<T> {
    pub(crate) fn new(rx: broadcast::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Next value, or `None` once the publisher is gone.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(value) => return Some(value),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("[webpac-link] Event stream lagged, skipped {} value(s)", skipped);
                },
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next value if one is already buffered.
    pub fn try_next(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok(value) => return Some(value),
                Err(TryRecvError::Lagged(skipped)) => {
                    log::warn!("[webpac-link] Event stream lagged, skipped {} value(s)", skipped);
                },
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

impl<T: Clone> std::fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").field("buffered", &self.rx.len()).finish()
    }
}
