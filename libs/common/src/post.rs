//! The post notification shared between the storage layer and the live
//! update pump.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A newly created post in a room.
///
/// `serial` is assigned by storage, starts at 1 and strictly increases
/// within a room. Clients use it both for ordering and as the resume cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub room_id: String,
    pub serial: u64,
    pub author: String,
    pub time: DateTime<Utc>,
    pub text: String,
}

impl Post {
    /// Decode a post from its change-feed JSON payload.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}
