//! Liveness and readiness probes.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// Plain liveness probe — the process is up and answering HTTP.
pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// LLM provider readiness, including per-provider init failures so an
/// operator can tell "no providers configured" apart from "configured but
/// failed to initialize" without scraping logs.
pub async fn models_readiness(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.llm.registry();
    let init_errors: Vec<serde_json::Value> = registry
        .init_errors()
        .iter()
        .map(|e| serde_json::json!({ "provider_id": e.provider_id, "kind": e.kind, "error": e.error }))
        .collect();

    Json(serde_json::json!({
        "ready": !registry.is_empty(),
        "providers": registry.list_providers(),
        "roles": registry.list_roles(),
        "init_errors": init_errors,
        "startup_policy": format!("{:?}", state.config.llm.startup_policy),
    }))
}
