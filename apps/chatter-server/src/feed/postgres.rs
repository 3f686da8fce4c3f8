//! PostgreSQL change feed: `LISTEN` on the channel the post insert trigger
//! notifies.

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use tokio::sync::mpsc;
use tokio_postgres::{AsyncMessage, NoTls};

use crate::error::FeedError;

use super::{ChangeFeed, FeedCursor, FeedEvent};

/// Channel used by the `notify_post_inserted` trigger.
pub const DEFAULT_CHANNEL: &str = "post_inserted";

/// Notifications buffered between the connection driver and the reader.
const NOTIFICATION_BUFFER: usize = 256;

/// Longest identifier Postgres accepts without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

pub struct PgChangeFeed {
    database_url: String,
    channel: String,
}

impl PgChangeFeed {
    pub fn new(database_url: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn open(self) -> Result<FeedCursor, FeedError> {
        // The channel is spliced into the LISTEN statement, so only plain
        // identifiers are allowed.
        if !is_plain_identifier(&self.channel) {
            return Err(FeedError::InvalidChannel(self.channel));
        }

        tracing::info!(channel = %self.channel, "opening post change feed");
        let (client, mut connection) = tokio_postgres::connect(&self.database_url, NoTls).await?;

        // The connection must be polled for LISTEN to complete, so drive it
        // on its own task and hand notifications over a channel.
        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        tokio::spawn(async move {
            let messages = stream::poll_fn(move |cx| connection.poll_message(cx));
            futures_util::pin_mut!(messages);

            while let Some(message) = messages.next().await {
                let event = match message {
                    Ok(AsyncMessage::Notification(n)) => Ok(FeedEvent::new(n.payload())),
                    Ok(AsyncMessage::Notice(notice)) => {
                        tracing::debug!(%notice, "postgres notice on feed connection");
                        continue;
                    }
                    Ok(_) => continue,
                    Err(err) => Err(FeedError::from(err)),
                };
                let fatal = event.is_err();
                if tx.send(event).await.is_err() || fatal {
                    break;
                }
            }
            tracing::debug!("feed connection finished");
        });

        client
            .batch_execute(&format!("LISTEN {}", self.channel))
            .await?;
        tracing::info!(channel = %self.channel, "listening for new posts");

        // The client rides along with the cursor: dropping the cursor closes
        // the connection and stops the driver task.
        let cursor = stream::unfold((client, rx), |(client, mut rx)| async move {
            let event = rx.recv().await?;
            Some((event, (client, rx)))
        });
        Ok(cursor.boxed())
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
