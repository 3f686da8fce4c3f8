//! The dispatcher task: the only owner of the subscription registries.

use std::fmt;
use std::sync::Arc;

use chatter_common::Post;
use tokio::sync::{mpsc, oneshot};

use crate::error::FeedError;
use crate::feed::reader::FeedItem;

use super::registry::{Eviction, PostSender, Registry};
use super::{PumpState, PumpStats};

/// Requests sent to the dispatcher by [`super::Pump`] and
/// [`super::Subscription`].
pub(crate) enum Control {
    Attach {
        id: String,
        room_id: String,
        sender: PostSender,
    },
    Detach {
        id: String,
    },
    Stats {
        reply: oneshot::Sender<PumpStats>,
    },
}

enum WindDown {
    Cancelled,
    FeedEnded(FeedError),
    Released,
}

impl fmt::Display for WindDown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindDown::Cancelled => f.write_str("asked to cancel"),
            WindDown::FeedEnded(err) => write!(f, "change feed ended: {err}"),
            WindDown::Released => f.write_str("no pump handles left"),
        }
    }
}

pub(crate) struct Dispatcher {
    registry: Registry,
    state: PumpState,
    feed: mpsc::Receiver<FeedItem>,
    control: mpsc::UnboundedReceiver<Control>,
    shutdown: mpsc::Receiver<()>,
}

impl Dispatcher {
    pub fn new(
        feed: mpsc::Receiver<FeedItem>,
        control: mpsc::UnboundedReceiver<Control>,
        shutdown: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            registry: Registry::default(),
            state: PumpState::Running,
            feed,
            control,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let reason = self.serve().await;
        match &reason {
            WindDown::FeedEnded(_) => tracing::error!(%reason, "pump winding down"),
            _ => tracing::info!(%reason, "pump winding down"),
        }

        self.state = PumpState::Draining;
        let closed = self.registry.clear();
        tracing::info!(closed, "closed all subscriptions");

        // Nothing reads the feed from here on; this also stops the reader.
        self.feed.close();
        self.state = PumpState::ShutDown;

        // Late callers still need answers: keep closing whatever they attach
        // until the last handle to this pump is gone.
        while let Some(request) = self.control.recv().await {
            match request {
                Control::Attach { id, room_id, sender } => {
                    tracing::debug!(
                        subscription_id = %id,
                        room_id = %room_id,
                        "closing subscription requested after shutdown"
                    );
                    drop(sender);
                }
                Control::Detach { .. } => {}
                Control::Stats { reply } => {
                    let _ = reply.send(self.stats());
                }
            }
        }
        tracing::debug!("pump stopped");
    }

    /// The running state. Handles one event at a time until something ends it.
    async fn serve(&mut self) -> WindDown {
        loop {
            tokio::select! {
                item = self.feed.recv() => match item {
                    Some(FeedItem::Post(post)) => self.dispatch(post),
                    Some(FeedItem::Ended(err)) => return WindDown::FeedEnded(err),
                    None => return WindDown::FeedEnded(FeedError::Closed),
                },
                request = self.control.recv() => match request {
                    Some(request) => self.handle(request),
                    None => return WindDown::Released,
                },
                Some(()) = self.shutdown.recv() => return WindDown::Cancelled,
            }
        }
    }

    fn handle(&mut self, request: Control) {
        match request {
            Control::Attach { id, room_id, sender } => {
                tracing::debug!(subscription_id = %id, room_id = %room_id, "attaching subscription");
                self.registry.attach(id, room_id, sender);
            }
            Control::Detach { id } => {
                if self.registry.detach(&id) {
                    tracing::debug!(subscription_id = %id, "detached subscription");
                }
            }
            Control::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn dispatch(&mut self, post: Arc<Post>) {
        for (id, eviction) in self.registry.deliver(&post) {
            match eviction {
                Eviction::Lagging => tracing::info!(
                    subscription_id = %id,
                    room_id = %post.room_id,
                    serial = post.serial,
                    "evicting lagging subscription"
                ),
                Eviction::Gone => tracing::debug!(
                    subscription_id = %id,
                    room_id = %post.room_id,
                    "dropping subscription with no reader"
                ),
            }
        }
    }

    fn stats(&self) -> PumpStats {
        PumpStats {
            state: self.state,
            rooms: self.registry.rooms(),
            subscriptions: self.registry.len(),
        }
    }
}
