//! In-process change feed for tests and local development.

use async_trait::async_trait;
use chatter_common::Post;
use futures_util::{stream, StreamExt};
use tokio::sync::mpsc;

use crate::error::FeedError;

use super::{ChangeFeed, FeedCursor, FeedEvent};

type Item = Result<FeedEvent, FeedError>;

/// The reading side. Hand it to [`crate::pump::Pump::start`].
pub struct MemoryFeed {
    rx: mpsc::UnboundedReceiver<Item>,
}

/// The writing side. The feed ends once every publisher is dropped.
#[derive(Clone)]
pub struct FeedPublisher {
    tx: mpsc::UnboundedSender<Item>,
}

impl MemoryFeed {
    pub fn new() -> (Self, FeedPublisher) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, FeedPublisher { tx })
    }
}

#[async_trait]
impl ChangeFeed for MemoryFeed {
    async fn open(self) -> Result<FeedCursor, FeedError> {
        let cursor = stream::unfold(self.rx, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        });
        Ok(cursor.boxed())
    }
}

impl FeedPublisher {
    /// Publish a post the way the insert trigger would. Returns `false` if
    /// the feed is no longer being read.
    pub fn publish(&self, post: &Post) -> bool {
        match serde_json::to_string(post) {
            Ok(payload) => self.publish_raw(payload),
            Err(err) => {
                tracing::warn!(?err, "failed to encode post for memory feed");
                false
            }
        }
    }

    /// Publish an arbitrary payload, well-formed or not.
    pub fn publish_raw(&self, payload: impl Into<String>) -> bool {
        self.tx.send(Ok(FeedEvent::new(payload))).is_ok()
    }

    /// Make the cursor fail, as a dropped database connection would.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.tx.send(Err(FeedError::Source(message.into()))).is_ok()
    }
}
