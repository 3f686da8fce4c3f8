use std::sync::Arc;

use chatter_common::Post;
use futures_util::{stream, Stream};
use tokio::sync::mpsc;

use super::dispatcher::Control;

/// A live feed of new posts in one room.
///
/// Posts arrive in serial order. `recv` returns `None` once the pump has
/// closed the subscription: after [`cancel`](Self::cancel), after the reader
/// fell too far behind, or after the pump shut down. A closed subscription
/// never reopens.
///
/// Dropping the subscription detaches it.
pub struct Subscription {
    id: String,
    room_id: String,
    posts: mpsc::Receiver<Arc<Post>>,
    control: mpsc::UnboundedSender<Control>,
}

impl Subscription {
    pub(crate) fn new(
        id: String,
        room_id: String,
        posts: mpsc::Receiver<Arc<Post>>,
        control: mpsc::UnboundedSender<Control>,
    ) -> Self {
        Self {
            id,
            room_id,
            posts,
            control,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Wait for the next post. `None` means end of stream.
    pub async fn recv(&mut self) -> Option<Arc<Post>> {
        self.posts.recv().await
    }

    /// Ask the pump to close this subscription. Takes effect asynchronously;
    /// keep reading until `recv` returns `None`.
    pub fn cancel(&self) {
        let _ = self.control.send(Control::Detach {
            id: self.id.clone(),
        });
    }

    pub fn into_stream(self) -> impl Stream<Item = Arc<Post>> + Send + 'static {
        stream::unfold(self, |mut subscription| async move {
            let post = subscription.recv().await?;
            Some((post, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("room_id", &self.room_id)
            .finish()
    }
}
