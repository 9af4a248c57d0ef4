//! API error types and JSON error response formatting.
//!
//! Every error body is `{"error": "<message>"}`. Internal detail is logged
//! server-side and never sent to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use propchat_chat::ChatError;
use propchat_core::error::PropChatError;

pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized - Please log in";
pub const BAD_REQUEST_MESSAGE: &str = "Missing message or conversationId";
pub const SAVE_FAILED_MESSAGE: &str = "Error saving message";
pub const INTERNAL_MESSAGE: &str = "Internal server error";

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 401 - no valid session.
    Unauthorized,
    /// 400 - missing or malformed chat request.
    BadRequest,
    /// 500 - the assistant message could not be stored.
    Persistence(String),
    /// 500 - any other failure.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, UNAUTHORIZED_MESSAGE),
            ApiError::BadRequest => (StatusCode::BAD_REQUEST, BAD_REQUEST_MESSAGE),
            ApiError::Persistence(detail) => {
                error!(detail = %detail, "Error saving message");
                (StatusCode::INTERNAL_SERVER_ERROR, SAVE_FAILED_MESSAGE)
            }
            ApiError::Internal(detail) => {
                error!(detail = %detail, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
            }
        };

        let body = ErrorBody {
            error: message.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Unauthorized => ApiError::Unauthorized,
            ChatError::BadRequest => ApiError::BadRequest,
            ChatError::Persistence(detail) => ApiError::Persistence(detail),
            ChatError::Internal(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<PropChatError> for ApiError {
    fn from(err: PropChatError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
