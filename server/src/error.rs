use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use semchat_protocol::RoomIdError;
use serde::Serialize;

use crate::store::StoreError;

/// Errors surfaced by the chat core.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Empty text or missing identity; rejected before persistence.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The message store was unreachable or timed out. Retryable by the
    /// sender; the message was not persisted and is never broadcast.
    #[error("persistence failed: {0}")]
    Persistence(String),
    /// Request without a valid session.
    #[error("unauthorized")]
    Authorization,
    /// Room string or semester id outside the `semester:<integer>` grammar.
    #[error(transparent)]
    RoomId(#[from] RoomIdError),
}

impl ChatError {
    /// Short machine-readable code used in acks and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "validation",
            ChatError::Persistence(_) => "persistence",
            ChatError::Authorization => "unauthorized",
            ChatError::RoomId(_) => "bad_room",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ChatError::Validation(_) | ChatError::RoomId(_) => StatusCode::BAD_REQUEST,
            ChatError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::Authorization => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        ChatError::Persistence(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.code().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
