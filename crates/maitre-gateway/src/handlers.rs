use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use maitre_core::{AskError, ChatService};

use crate::server::AppState;

#[derive(serde::Deserialize)]
pub(crate) struct ChatPayload {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub question: String,
}

#[derive(serde::Serialize)]
struct ChatReply {
    question: String,
    answer: String,
}

#[derive(serde::Serialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

/// Distinct statuses per failure kind: a rejected question is the
/// caller's fault, an unreachable index is an upstream fault, and a
/// failed generation is ours.
pub(crate) fn ask_error_response(err: &AskError) -> Response {
    let status = match err {
        AskError::Validation => StatusCode::BAD_REQUEST,
        AskError::Retrieval(_) => StatusCode::BAD_GATEWAY,
        AskError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
        .into_response()
}

pub(crate) async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatPayload>,
) -> Response {
    match state
        .chat
        .ask(payload.session_id, payload.question.clone())
        .await
    {
        Ok(answer) => Json(ChatReply {
            question: payload.question,
            answer,
        })
        .into_response(),
        Err(e) => {
            tracing::warn!("chat turn failed: {e}");
            ask_error_response(&e)
        }
    }
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
