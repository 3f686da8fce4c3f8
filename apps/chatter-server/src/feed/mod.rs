//! Sources of the live "post inserted" feed and the reader that turns them
//! into dispatcher input.

pub mod memory;
pub mod postgres;
pub mod reader;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::FeedError;

/// One raw event from a change feed. The payload is the JSON of a
/// [`chatter_common::Post`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEvent {
    pub payload: String,
}

impl FeedEvent {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

/// A live, ordered cursor over post insert events.
///
/// An `Err` item is fatal: the reader stops after the first one. The cursor
/// ending means the feed was closed upstream.
pub type FeedCursor = BoxStream<'static, Result<FeedEvent, FeedError>>;

/// A change feed that can be opened once.
///
/// Backed by PostgreSQL LISTEN/NOTIFY in production and an in-memory queue
/// in tests.
#[async_trait]
pub trait ChangeFeed: Send + 'static {
    async fn open(self) -> Result<FeedCursor, FeedError>;
}
