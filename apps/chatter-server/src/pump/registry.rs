//! Subscription registries owned by the dispatcher task.

use std::collections::HashMap;
use std::sync::Arc;

use chatter_common::Post;
use tokio::sync::mpsc::{self, error::TrySendError};

pub(crate) type PostSender = mpsc::Sender<Arc<Post>>;

/// Why a subscription was dropped during delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Eviction {
    /// Its buffer was full.
    Lagging,
    /// Its reader is gone.
    Gone,
}

/// `by_room` and `by_subscription` always hold the same set of
/// subscriptions. Removing a subscription drops its sender, which is what
/// closes it for the reader.
#[derive(Default)]
pub(crate) struct Registry {
    by_room: HashMap<String, HashMap<String, PostSender>>,
    by_subscription: HashMap<String, String>,
}

impl Registry {
    pub fn attach(&mut self, id: String, room_id: String, sender: PostSender) {
        if let Some(previous) = self.by_subscription.insert(id.clone(), room_id.clone()) {
            self.remove_from_room(&previous, &id);
        }
        self.by_room.entry(room_id).or_default().insert(id, sender);
    }

    /// Returns `false` for unknown or already detached subscriptions.
    pub fn detach(&mut self, id: &str) -> bool {
        match self.by_subscription.remove(id) {
            Some(room_id) => {
                self.remove_from_room(&room_id, id);
                true
            }
            None => false,
        }
    }

    /// Offer `post` to every subscriber of its room without waiting.
    /// Subscribers that cannot take it are detached and returned.
    pub fn deliver(&mut self, post: &Arc<Post>) -> Vec<(String, Eviction)> {
        let Some(room) = self.by_room.get(&post.room_id) else {
            return Vec::new();
        };

        let mut evicted = Vec::new();
        for (id, sender) in room {
            match sender.try_send(Arc::clone(post)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => evicted.push((id.clone(), Eviction::Lagging)),
                Err(TrySendError::Closed(_)) => evicted.push((id.clone(), Eviction::Gone)),
            }
        }
        for (id, _) in &evicted {
            self.detach(id);
        }
        evicted
    }

    /// Detach everything. Returns how many subscriptions were closed.
    pub fn clear(&mut self) -> usize {
        let closed = self.by_subscription.len();
        self.by_subscription.clear();
        self.by_room.clear();
        closed
    }

    pub fn len(&self) -> usize {
        self.by_subscription.len()
    }

    pub fn rooms(&self) -> usize {
        self.by_room.len()
    }

    fn remove_from_room(&mut self, room_id: &str, id: &str) {
        if let Some(room) = self.by_room.get_mut(room_id) {
            room.remove(id);
            if room.is_empty() {
                self.by_room.remove(room_id);
            }
        }
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let in_rooms: usize = self.by_room.values().map(HashMap::len).sum();
        in_rooms == self.by_subscription.len()
            && self.by_subscription.iter().all(|(id, room_id)| {
                self.by_room
                    .get(room_id)
                    .is_some_and(|room| room.contains_key(id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::mpsc::error::TryRecvError;

    fn post(room_id: &str, serial: u64) -> Arc<Post> {
        Arc::new(Post {
            room_id: room_id.to_string(),
            serial,
            author: "tester".to_string(),
            time: Utc::now(),
            text: String::new(),
        })
    }

    #[test]
    fn attach_and_detach_keep_both_maps_in_step() {
        let mut registry = Registry::default();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        registry.attach("s1".into(), "r1".into(), tx1);
        registry.attach("s2".into(), "r1".into(), tx2);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.rooms(), 1);
        assert!(registry.is_consistent());

        assert!(registry.detach("s1"));
        assert!(registry.is_consistent());
        assert!(registry.detach("s2"));
        assert_eq!(registry.rooms(), 0);
        assert!(registry.is_consistent());
    }

    #[test]
    fn detach_is_idempotent_and_closes_once() {
        let mut registry = Registry::default();
        let (tx, mut rx) = mpsc::channel(4);
        registry.attach("s1".into(), "r1".into(), tx);

        assert!(registry.detach("s1"));
        assert!(!registry.detach("s1"));
        assert!(!registry.detach("unknown"));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn deliver_only_reaches_the_posts_room() {
        let mut registry = Registry::default();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        registry.attach("a".into(), "room-a".into(), tx_a);
        registry.attach("b".into(), "room-b".into(), tx_b);

        assert!(registry.deliver(&post("room-a", 1)).is_empty());
        assert_eq!(rx_a.try_recv().unwrap().serial, 1);
        assert_eq!(rx_b.try_recv(), Err(TryRecvError::Empty));

        assert!(registry.deliver(&post("nobody", 1)).is_empty());
    }

    #[test]
    fn full_buffer_evicts_subscriber() {
        let mut registry = Registry::default();
        let (tx, mut rx) = mpsc::channel(2);
        registry.attach("slow".into(), "r1".into(), tx);

        assert!(registry.deliver(&post("r1", 1)).is_empty());
        assert!(registry.deliver(&post("r1", 2)).is_empty());
        let evicted = registry.deliver(&post("r1", 3));
        assert_eq!(evicted, vec![("slow".to_string(), Eviction::Lagging)]);
        assert_eq!(registry.len(), 0);
        assert!(registry.is_consistent());

        // Buffered posts are still readable, then the stream ends.
        assert_eq!(rx.try_recv().unwrap().serial, 1);
        assert_eq!(rx.try_recv().unwrap().serial, 2);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn dropped_reader_is_evicted() {
        let mut registry = Registry::default();
        let (tx, rx) = mpsc::channel(2);
        registry.attach("gone".into(), "r1".into(), tx);
        drop(rx);

        let evicted = registry.deliver(&post("r1", 1));
        assert_eq!(evicted, vec![("gone".to_string(), Eviction::Gone)]);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn clear_closes_everything() {
        let mut registry = Registry::default();
        let (tx1, mut rx1) = mpsc::channel(2);
        let (tx2, mut rx2) = mpsc::channel(2);
        registry.attach("s1".into(), "r1".into(), tx1);
        registry.attach("s2".into(), "r2".into(), tx2);

        assert_eq!(registry.clear(), 2);
        assert_eq!(registry.rooms(), 0);
        assert_eq!(rx1.try_recv(), Err(TryRecvError::Disconnected));
        assert_eq!(rx2.try_recv(), Err(TryRecvError::Disconnected));
    }
}
