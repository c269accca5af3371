//! Axum router assembly: health check plus the two WebSocket fan-out
//! routes (spec §4.2). The HTTP API surface proper (accounts, auth, DB-
//! backed CRUD) is out of scope.

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws::{transcript_ws, user_ws};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/transcripts/:id/ws", get(transcript_ws))
        .route("/v1/users/:id/ws", get(user_ws))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}
