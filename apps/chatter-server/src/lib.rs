pub mod config;
pub mod error;
pub mod feed;
pub mod pump;
pub mod routes;

use std::sync::Arc;

use config::Config;
use pump::Pump;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pump: Pump,
    pub config: Arc<Config>,
}
