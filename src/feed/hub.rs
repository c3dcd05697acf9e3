//! Frame fan-out.
//!
//! One shared ring (tokio broadcast) with a per-subscriber cursor. The bound is
//! enforced before sending: when the slowest subscriber already has `capacity`
//! frames pending, the new frame is dropped instead of evicting older ones, so
//! publishing never blocks and never overwrites what a subscriber still holds.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::stats::Stats;
use crate::types::Frame;

pub const DEFAULT_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Queued for this many subscribers.
    Delivered(usize),
    NoSubscribers,
    /// Buffer saturated; frame discarded.
    Dropped,
}

pub struct BroadcastHub {
    tx: broadcast::Sender<Arc<Frame>>,
    capacity: usize,
    stats: Arc<Stats>,
}

impl BroadcastHub {
    pub fn new(capacity: usize, stats: Arc<Stats>) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity, stats }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Frames still pending for the slowest subscriber.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    pub fn publish(&self, frame: Arc<Frame>) -> PublishOutcome {
        if self.tx.receiver_count() == 0 {
            return PublishOutcome::NoSubscribers;
        }
        if self.tx.len() >= self.capacity {
            let dropped = self.stats.inc_dropped();
            tracing::warn!(
                kind = frame.kind.as_str(),
                changes = frame.rows.len(),
                pending = self.tx.len(),
                dropped_total = dropped,
                "hub buffer full, dropping frame"
            );
            return PublishOutcome::Dropped;
        }
        match self.tx.send(frame) {
            Ok(n) => {
                self.stats.inc_published();
                PublishOutcome::Delivered(n)
            }
            // last receiver went away between the checks
            Err(_) => PublishOutcome::NoSubscribers,
        }
    }

    /// Live frame stream, optionally prefixed with a baseline snapshot.
    pub fn subscribe(&self, baseline: Option<Arc<Frame>>) -> FrameStream {
        let id = Uuid::new_v4();
        let live = BroadcastStream::new(self.tx.subscribe()).filter_map(move |res| async move {
            match res {
                Ok(frame) => Some(frame),
                Err(e) => {
                    tracing::warn!(subscriber = %id, error = %e, "subscriber lagged, frames skipped");
                    None
                }
            }
        });

        self.stats.subscriber_joined();
        tracing::debug!(subscriber = %id, baseline = baseline.is_some(), "subscriber joined");

        FrameStream {
            id,
            inner: stream::iter(baseline).chain(live).boxed(),
            stats: self.stats.clone(),
        }
    }
}

/// One subscriber's view of the hub. Dropping it unsubscribes.
pub struct FrameStream {
    id: Uuid,
    inner: BoxStream<'static, Arc<Frame>>,
    stats: Arc<Stats>,
}

impl FrameStream {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Stream for FrameStream {
    type Item = Arc<Frame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.stats.subscriber_left();
        tracing::debug!(subscriber = %self.id, "subscriber left");
    }
}
