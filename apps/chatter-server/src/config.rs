use crate::pump::PumpConfig;

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string. Used to LISTEN for new posts.
    pub database_url: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// NOTIFY channel the post insert trigger publishes on.
    pub feed_channel: String,
    /// Buffered posts per subscription before a slow reader is evicted.
    pub stream_capacity: usize,
    /// Depth of the queue between the feed reader and the dispatcher.
    pub feed_queue: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_var("DATABASE_URL"),
            port: parsed_var("PORT").unwrap_or(10242),
            feed_channel: std::env::var("FEED_CHANNEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| crate::feed::postgres::DEFAULT_CHANNEL.to_string()),
            stream_capacity: parsed_var::<usize>("STREAM_CAPACITY")
                .filter(|n| *n > 0)
                .unwrap_or(PumpConfig::DEFAULT_STREAM_CAPACITY),
            feed_queue: parsed_var::<usize>("FEED_QUEUE")
                .filter(|n| *n > 0)
                .unwrap_or(PumpConfig::DEFAULT_FEED_QUEUE),
        }
    }

    pub fn pump(&self) -> PumpConfig {
        PumpConfig {
            stream_capacity: self.stream_capacity,
            feed_queue: self.feed_queue,
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
