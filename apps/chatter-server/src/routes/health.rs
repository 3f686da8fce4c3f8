use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::pump::{PumpState, PumpStats};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` while the pump is running, `degraded` once live updates stopped.
    pub status: &'static str,
    pub pump: Option<PumpStats>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let pump = state.pump.stats().await;
    let status = match pump {
        Some(PumpStats {
            state: PumpState::Running,
            ..
        }) => "ok",
        _ => "degraded",
    };
    Json(HealthResponse { status, pump })
}
