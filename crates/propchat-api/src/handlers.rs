//! JSON route handlers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::debug;

use propchat_chat::{ChatTurnRequest, ChatTurnResponse};
use propchat_core::types::Message;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// POST /chat - handle one chat turn.
///
/// The body is parsed after the session check so an anonymous caller gets
/// 401 even when the body is malformed. A body that is not a JSON object
/// of the expected shape is a 400.
pub async fn chat(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    body: Bytes,
) -> Result<Json<ChatTurnResponse>, ApiError> {
    let Some(user) = user else {
        return Err(ApiError::Unauthorized);
    };

    let request: ChatTurnRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!(error = %e, "Rejected chat body");
        ApiError::BadRequest
    })?;

    let turn = state.orchestrator.handle_turn(Some(&user), request).await?;
    Ok(Json(turn))
}

/// GET /conversations/{id}/messages - the caller's messages in that
/// conversation, oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let user = user.ok_or(ApiError::Unauthorized)?;
    let messages = state
        .messages
        .list_messages(&conversation_id, user.id)
        .await?;
    Ok(Json(messages))
}

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
