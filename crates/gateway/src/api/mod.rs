pub mod chat;
pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the HTTP API: a chat surface plus two liveness/readiness probes.
/// No auth middleware — the Non-goals exclude an auth layer entirely, not
/// just trim it down.
pub fn router(_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/chat", post(chat::chat))
        .route("/v1/chat/stream", post(chat::chat_stream))
        .route("/healthz", get(health::healthz))
        .route("/v1/models/readiness", get(health::models_readiness))
}
