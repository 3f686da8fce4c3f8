//! The live update pump: fans one ordered feed of new posts out to many
//! per-room subscriptions.
//!
//! A single dispatcher task owns every subscription. Everything else talks to
//! it through queues: the feed reader pushes posts, [`Pump`] and
//! [`Subscription`] push control requests. Delivery never waits on a
//! subscriber; one that falls `stream_capacity` posts behind is closed.

mod dispatcher;
mod registry;
mod subscription;

pub use subscription::Subscription;

use chatter_common::id::{prefix, prefixed_ulid};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::error::FeedError;
use crate::feed::{reader, ChangeFeed};

use dispatcher::{Control, Dispatcher};

#[derive(Debug, Clone, Copy)]
pub struct PumpConfig {
    /// Posts buffered per subscription.
    pub stream_capacity: usize,
    /// Posts buffered between the feed reader and the dispatcher.
    pub feed_queue: usize,
}

impl PumpConfig {
    pub const DEFAULT_STREAM_CAPACITY: usize = 128;
    pub const DEFAULT_FEED_QUEUE: usize = 16;
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            stream_capacity: Self::DEFAULT_STREAM_CAPACITY,
            feed_queue: Self::DEFAULT_FEED_QUEUE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpState {
    Running,
    Draining,
    ShutDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PumpStats {
    pub state: PumpState,
    /// Rooms with at least one subscription.
    pub rooms: usize,
    pub subscriptions: usize,
}

/// Cloneable handle to a running pump.
#[derive(Clone)]
pub struct Pump {
    control: mpsc::UnboundedSender<Control>,
    shutdown: mpsc::Sender<()>,
    stream_capacity: usize,
}

impl Pump {
    /// Open `feed` and start the reader and dispatcher tasks.
    pub async fn start<F: ChangeFeed>(feed: F, config: PumpConfig) -> Result<Self, FeedError> {
        tracing::info!(
            stream_capacity = config.stream_capacity,
            feed_queue = config.feed_queue,
            "initializing pump"
        );
        let cursor = feed.open().await?;

        let (feed_tx, feed_rx) = mpsc::channel(config.feed_queue.max(1));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(reader::run(cursor, feed_tx));
        tokio::spawn(Dispatcher::new(feed_rx, control_rx, shutdown_rx).run());

        Ok(Self {
            control: control_tx,
            shutdown: shutdown_tx,
            stream_capacity: config.stream_capacity.max(1),
        })
    }

    /// Subscribe to new posts in `room_id`. Returns immediately.
    pub fn stream_room(&self, room_id: impl Into<String>) -> Subscription {
        let room_id = room_id.into();
        let id = prefixed_ulid(prefix::SUBSCRIPTION);
        let (sender, posts) = mpsc::channel(self.stream_capacity);

        // If the dispatcher has exited the request is dropped along with the
        // sender, so the subscription reads as already closed.
        let _ = self.control.send(Control::Attach {
            id: id.clone(),
            room_id: room_id.clone(),
            sender,
        });
        Subscription::new(id, room_id, posts, self.control.clone())
    }

    /// Ask the pump to close `subscription`. Unknown and already closed
    /// subscriptions are ignored.
    pub fn cancel_stream(&self, subscription: &Subscription) {
        let _ = self.control.send(Control::Detach {
            id: subscription.id().to_string(),
        });
    }

    /// Close every subscription, including ones requested from now on.
    ///
    /// Call before tearing down the server so long-lived streams end while
    /// short requests in flight finish normally. Repeated calls are no-ops.
    pub fn cancel_streams(&self) {
        if self.shutdown.try_send(()).is_ok() {
            tracing::info!("cancelling all streams");
        }
    }

    /// Registry counts and state. Answered in order with other control
    /// requests, so every attach or detach sent before it has been applied.
    /// `None` once the dispatcher has exited.
    pub async fn stats(&self) -> Option<PumpStats> {
        let (reply, rx) = oneshot::channel();
        self.control.send(Control::Stats { reply }).ok()?;
        rx.await.ok()
    }
}
