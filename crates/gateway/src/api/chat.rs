//! Chat API: the gateway's primary surface onto the ReAct engine.
//!
//! - `POST /v1/chat`        — non-streaming: drains a run to its terminal `Update`.
//! - `POST /v1/chat/stream` — SSE: every `Update` as a `chunk_type`-tagged event.
//!
//! A message beginning with the literal prefix `CONFIRM_ACTION:` is not a new
//! turn — it answers a pending [`parley_domain::react::Update::ConfirmationRequest`]
//! on an existing session. The SSE connection that received that request is
//! still open, blocked on the engine's confirmation wait; answering here
//! resolves that wait and the original stream resumes on its own. This
//! avoids needing a second long-lived connection per confirmation round.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use futures_util::stream::Stream;
use serde::Deserialize;
use uuid::Uuid;

use parley_domain::react::{ConfirmationAction, ConfirmationVerdict, Update};

use crate::state::AppState;

const CONFIRM_PREFIX: &str = "CONFIRM_ACTION:";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Existing session to resume, or the literal id to create one under.
    /// Generated server-side when absent.
    #[serde(default)]
    pub session_id: Option<String>,
    /// User message text, or a `CONFIRM_ACTION:` directive (see module docs).
    pub message: String,
}

pub async fn chat(State(state): State<AppState>, Json(body): Json<ChatRequest>) -> impl IntoResponse {
    if let Err(resp) = require_llm_provider(&state) {
        return resp.into_response();
    }

    if let Some(verdict) = parse_confirm_action(&body.message) {
        let Some(session_id) = body.session_id else {
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "session_id is required for CONFIRM_ACTION" })))
                .into_response();
        };
        return submit_confirmation_ack(&state, &session_id, verdict).into_response();
    }

    let session_id = body.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut rx = state.engine.clone().run(session_id.clone(), body.message);

    let mut final_text = String::new();
    let mut error: Option<serde_json::Value> = None;
    while let Some(update) = rx.recv().await {
        let terminal = update.is_terminal();
        match update {
            Update::FinalResult { text, .. } => final_text = text,
            Update::ConversationalResponse { text } => final_text = text,
            Update::Error { category, text } => {
                error = Some(serde_json::json!({ "category": category.to_string(), "message": text }));
            }
            _ => {}
        }
        if terminal {
            break;
        }
    }

    Json(serde_json::json!({
        "session_id": session_id,
        "content": final_text,
        "error": error,
    }))
    .into_response()
}

pub async fn chat_stream(State(state): State<AppState>, Json(body): Json<ChatRequest>) -> impl IntoResponse {
    if let Err(resp) = require_llm_provider(&state) {
        return resp.into_response();
    }

    if let Some(verdict) = parse_confirm_action(&body.message) {
        let Some(session_id) = body.session_id else {
            return error_event_stream("session_id is required for CONFIRM_ACTION").into_response();
        };
        return submit_confirmation_ack(&state, &session_id, verdict).into_response();
    }

    let session_id = body.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let rx = state.engine.clone().run(session_id, body.message);

    Sse::new(make_sse_stream(rx)).keep_alive(KeepAlive::default()).into_response()
}

fn make_sse_stream(mut rx: tokio::sync::mpsc::Receiver<Update>) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        while let Some(update) = rx.recv().await {
            let chunk_type = update.chunk_type();
            let is_confirmation_request = matches!(update, Update::ConfirmationRequest { .. });
            let mut payload = serde_json::to_value(&update).unwrap_or(serde_json::Value::Null);
            if let serde_json::Value::Object(ref mut obj) = payload {
                obj.insert("chunk_type".to_string(), serde_json::Value::String(chunk_type.to_string()));
                if is_confirmation_request {
                    obj.insert("requires_response".to_string(), serde_json::Value::Bool(true));
                    obj.insert("stream_paused".to_string(), serde_json::Value::Bool(true));
                }
            }
            let data = serde_json::to_string(&payload).unwrap_or_default();
            yield Ok(Event::default().event(chunk_type).data(data));
        }
    }
}

fn error_event_stream(message: &str) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let data = serde_json::json!({ "chunk_type": "error", "text": message }).to_string();
    let stream = futures_util::stream::once(async move { Ok::<_, std::convert::Infallible>(Event::default().event("error").data(data)) });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Parse a `CONFIRM_ACTION:confirm`, `CONFIRM_ACTION:modify[:<free text>]`,
/// or `CONFIRM_ACTION:cancel` message into a [`ConfirmationVerdict`]. Any
/// other message is a new turn, not a confirmation answer.
fn parse_confirm_action(message: &str) -> Option<ConfirmationVerdict> {
    let rest = message.strip_prefix(CONFIRM_PREFIX)?;
    let mut parts = rest.splitn(2, ':');
    let action = parts.next().unwrap_or("").trim();
    let free_text = parts.next().map(|s| s.trim().to_string());

    let action = match action {
        "confirm" => ConfirmationAction::Confirm,
        "modify" => ConfirmationAction::Modify,
        "cancel" => ConfirmationAction::Cancel,
        _ => return None,
    };

    Some(ConfirmationVerdict { action, modified_tasks: None, free_text })
}

fn submit_confirmation_ack(state: &AppState, session_id: &str, verdict: ConfirmationVerdict) -> impl IntoResponse {
    let accepted = state.confirmation.submit_confirmation(session_id, verdict);
    if accepted {
        Json(serde_json::json!({ "session_id": session_id, "status": "accepted" })).into_response()
    } else {
        (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "session_id": session_id, "status": "no_pending_confirmation" })),
        )
            .into_response()
    }
}

/// Pre-flight check: a 503 with the readiness detail baked in, instead of
/// a turn failing deep inside planning with a vague error.
fn require_llm_provider(state: &AppState) -> Result<(), (StatusCode, Json<serde_json::Value>)> {
    if !state.llm.registry().is_empty() {
        return Ok(());
    }

    let init_errors: Vec<serde_json::Value> = state
        .llm
        .registry()
        .init_errors()
        .iter()
        .map(|e| serde_json::json!({ "provider_id": e.provider_id, "kind": e.kind, "error": e.error }))
        .collect();

    Err((
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({
            "error": "no_llm_provider",
            "reason": "No LLM providers are available. Configure at least one provider in \
                       config.toml under [[llm.providers]], or check /v1/models/readiness.",
            "init_errors": init_errors,
            "startup_policy": format!("{:?}", state.config.llm.startup_policy),
        })),
    ))
}
