//! Pipeline notification bus.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel. Every subscriber
//! gets its own bounded slot window: a subscriber that falls more than
//! `capacity` events behind loses the oldest ones instead of slowing the
//! publisher or its peers. There is no replay; a subscription only sees
//! events published after it was created.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::ids::MediaItemId;
use crate::media::{FailureReason, MediaStatus};

/// Default per-subscriber buffer size.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

// ---------------------------------------------------------------------------
// MediaEvent
// ---------------------------------------------------------------------------

/// A status change or progress tick for one media item.
///
/// Transitions carry `status`; progress ticks carry only `progress`.
/// `reason` is set on `failed` transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaEvent {
    pub item_id: MediaItemId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MediaStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl MediaEvent {
    /// Item admitted and waiting for its run.
    pub fn queued(item_id: MediaItemId) -> Self {
        Self::transition(item_id, MediaStatus::Queued, None)
    }

    /// Run started; progress resets to zero.
    pub fn processing(item_id: MediaItemId) -> Self {
        Self::transition(item_id, MediaStatus::Processing, Some(0))
    }

    pub fn progress(item_id: MediaItemId, progress: u8) -> Self {
        Self {
            item_id,
            status: None,
            progress: Some(progress),
            reason: None,
        }
    }

    /// Verdict reached (`safe` or `flagged`).
    pub fn completed(item_id: MediaItemId, status: MediaStatus) -> Self {
        Self::transition(item_id, status, None)
    }

    pub fn failed(item_id: MediaItemId, reason: FailureReason) -> Self {
        Self {
            item_id,
            status: Some(MediaStatus::Failed),
            progress: None,
            reason: Some(reason),
        }
    }

    fn transition(item_id: MediaItemId, status: MediaStatus, progress: Option<u8>) -> Self {
        Self {
            item_id,
            status: Some(status),
            progress,
            reason: None,
        }
    }

    /// `true` for events that end an item's run.
    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(|s| s.is_terminal())
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast fan-out of [`MediaEvent`]s to any number of subscribers.
pub struct EventBus {
    tx: broadcast::Sender<MediaEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus whose subscribers each buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an event to every current subscriber.
    ///
    /// Never blocks. Returns the number of subscribers the event was queued
    /// for (zero when nobody is listening).
    pub fn publish(&self, event: MediaEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            dropped: self.dropped.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Total events skipped by lagging subscribers since start.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Handle yielding events in publish order until the bus is dropped.
pub struct Subscription {
    rx: broadcast::Receiver<MediaEvent>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the bus is gone.
    ///
    /// Events lost to overflow are skipped and counted; the subscription
    /// resumes with the oldest event still buffered.
    pub async fn next(&mut self) -> Option<MediaEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(n)) => self.record_lag(n),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::next`].
    pub fn try_next(&mut self) -> Option<MediaEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(n)) => self.record_lag(n),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    fn record_lag(&self, n: u64) {
        tracing::debug!(skipped = n, "Event subscriber lagged; oldest events dropped");
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }
}
