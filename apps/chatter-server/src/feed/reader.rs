//! The change feed reader: decodes feed events into posts and pushes them
//! to the dispatcher.

use std::sync::Arc;

use chatter_common::Post;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::error::FeedError;

use super::FeedCursor;

/// What the reader hands to the dispatcher.
#[derive(Debug)]
pub enum FeedItem {
    Post(Arc<Post>),
    /// The feed is gone for good. Always the last item sent.
    Ended(FeedError),
}

/// Read `cursor` until it fails or ends.
///
/// Sends block while the dispatcher's queue is full. A malformed event is
/// logged and skipped. Cursor errors and exhaustion are not retried: the
/// reader sends [`FeedItem::Ended`] and returns.
pub async fn run(mut cursor: FeedCursor, inbound: mpsc::Sender<FeedItem>) {
    let reason = loop {
        match cursor.next().await {
            Some(Ok(event)) => match Post::from_json(&event.payload) {
                Ok(post) => {
                    if inbound.send(FeedItem::Post(Arc::new(post))).await.is_err() {
                        tracing::debug!("dispatcher stopped, feed reader exiting");
                        return;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        %err,
                        payload_len = event.payload.len(),
                        "failed to decode change feed event, skipping"
                    );
                }
            },
            Some(Err(err)) => break err,
            None => break FeedError::Closed,
        }
    };

    drop(cursor);
    tracing::error!(error = %reason, "change feed ended");
    let _ = inbound.send(FeedItem::Ended(reason)).await;
}
