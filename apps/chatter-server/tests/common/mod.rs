#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chatter_common::Post;
use chatter_server::config::Config;
use chatter_server::feed::memory::{FeedPublisher, MemoryFeed};
use chatter_server::pump::{Pump, PumpConfig, PumpStats, Subscription};
use chatter_server::AppState;
use chrono::Utc;
use tokio::time;

/// How long a test waits for something that should happen promptly.
pub const WAIT: Duration = Duration::from_secs(5);

/// Start a pump over an in-memory feed.
pub async fn start_pump(stream_capacity: usize) -> (Pump, FeedPublisher) {
    let (feed, publisher) = MemoryFeed::new();
    let config = PumpConfig {
        stream_capacity,
        feed_queue: 4,
    };
    let pump = Pump::start(feed, config).await.expect("start pump");
    (pump, publisher)
}

pub fn post(room_id: &str, serial: u64) -> Post {
    Post {
        room_id: room_id.to_string(),
        serial,
        author: "tester".to_string(),
        time: Utc::now(),
        text: format!("post {serial} in {room_id}"),
    }
}

/// Next item from a subscription, failing the test instead of hanging.
pub async fn next(subscription: &mut Subscription) -> Option<Arc<Post>> {
    time::timeout(WAIT, subscription.recv())
        .await
        .expect("timed out waiting on subscription")
}

/// Read until end of stream and return the serials seen.
pub async fn drain(subscription: &mut Subscription) -> Vec<u64> {
    let mut serials = Vec::new();
    while let Some(post) = next(subscription).await {
        serials.push(post.serial);
    }
    serials
}

/// Stats from the dispatcher. Also a barrier: every control request sent
/// before this call has been applied when it returns.
pub async fn stats(pump: &Pump) -> PumpStats {
    time::timeout(WAIT, pump.stats())
        .await
        .expect("timed out waiting for stats")
        .expect("dispatcher is gone")
}

/// Poll stats until `done` holds.
pub async fn wait_for(pump: &Pump, done: impl Fn(&PumpStats) -> bool) -> PumpStats {
    time::timeout(WAIT, async {
        loop {
            let current = stats(pump).await;
            if done(&current) {
                return current;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached")
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/chatter_test".to_string(),
        port: 0,
        feed_channel: "post_inserted".to_string(),
        stream_capacity: 8,
        feed_queue: 4,
    }
}

pub async fn test_state() -> (AppState, FeedPublisher) {
    let config = test_config();
    let (feed, publisher) = MemoryFeed::new();
    let pump = Pump::start(feed, config.pump()).await.expect("start pump");
    let state = AppState {
        pump,
        config: Arc::new(config),
    };
    (state, publisher)
}

/// Start an actual TCP server in the background for streaming tests.
pub async fn start_server() -> (SocketAddr, AppState, FeedPublisher) {
    let (state, publisher) = test_state().await;
    let app = chatter_server::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state, publisher)
}
