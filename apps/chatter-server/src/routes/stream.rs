//! Server-sent events for live room updates.
//!
//! Each event carries one post as JSON with `id: serial:<n>`, so a browser
//! reconnecting with `Last-Event-ID` resumes after the last post it saw.
//! Loading the posts between the cursor and now is up to the client; this
//! endpoint only suppresses live posts at or below the cursor.

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use chatter_common::Post;
use futures_util::{future, Stream, StreamExt};
use serde::Deserialize;

use crate::error::ApiError;
use crate::AppState;

const LAST_EVENT_ID: &str = "last-event-id";
const SERIAL_PREFIX: &str = "serial:";

pub fn router() -> Router<AppState> {
    Router::new().route("/rooms/{room_id}/updates", get(room_updates))
}

#[derive(Debug, Deserialize)]
pub struct UpdatesQuery {
    pub since: Option<String>,
}

async fn room_updates(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<UpdatesQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let cutoff = resume_cutoff(&headers, query.since.as_deref())?;

    let subscription = state.pump.stream_room(room_id);
    tracing::debug!(
        subscription_id = %subscription.id(),
        room_id = %subscription.room_id(),
        cutoff,
        "streaming room updates"
    );

    let events = subscription
        .into_stream()
        .filter(move |post| future::ready(post.serial > cutoff))
        .map(|post| Ok(post_event(&post)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// The serial after which to start. `Last-Event-ID` wins over `?since=`.
pub fn resume_cutoff(headers: &HeaderMap, since: Option<&str>) -> Result<u64, ApiError> {
    if let Some(last) = headers.get(LAST_EVENT_ID) {
        let last = last
            .to_str()
            .map_err(|_| ApiError::bad_request("Last-Event-ID is not valid text"))?;
        return last
            .strip_prefix(SERIAL_PREFIX)
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| ApiError::bad_request(format!("bad Last-Event-ID: {last:?}")));
    }

    match since {
        None | Some("") => Ok(0),
        Some(since) => since
            .parse()
            .map_err(|_| ApiError::bad_request(format!("bad since: {since:?}"))),
    }
}

fn post_event(post: &Post) -> Event {
    let event = Event::default()
        .event("post")
        .id(format!("{SERIAL_PREFIX}{}", post.serial));
    match event.json_data(post) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(%err, serial = post.serial, "failed to encode post event");
            Event::default().comment("unencodable post")
        }
    }
}
