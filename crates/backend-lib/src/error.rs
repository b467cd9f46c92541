// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use scorched_common::{ErrorCode, ErrorPayload, RoomId};
use thiserror::Error;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    RoomNotFound(String),

    #[error("Room is full ({current}/{max})")]
    RoomFull {
        room_id: RoomId,
        current: usize,
        max: usize,
    },

    #[error("upgrade required")]
    UpgradeRequired,

    #[error("bad websocket key")]
    BadWebSocketKey,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::UpgradeRequired => StatusCode::UPGRADE_REQUIRED,
            AppError::BadRequest(_) | AppError::BadWebSocketKey => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::RoomNotFound(_) => StatusCode::NOT_FOUND,
            AppError::RoomFull { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) | AppError::BadWebSocketKey => ErrorCode::BadRequest.as_str(),
            AppError::Forbidden(_) => ErrorCode::Forbidden.as_str(),
            AppError::RoomNotFound(_) => ErrorCode::RoomNotFound.as_str(),
            AppError::RoomFull { .. } => ErrorCode::RoomFull.as_str(),
            AppError::UpgradeRequired => "upgrade_required",
            AppError::InvalidConfig(_) => "invalid_config",
            AppError::Internal(_) => "internal",
        }
    }

    /// Wire code used in `error` envelopes. Server-side faults surface as `bad_request`.
    fn wire_code(&self) -> ErrorCode {
        match self {
            AppError::Forbidden(_) => ErrorCode::Forbidden,
            AppError::RoomNotFound(_) => ErrorCode::RoomNotFound,
            AppError::RoomFull { .. } => ErrorCode::RoomFull,
            _ => ErrorCode::BadRequest,
        }
    }

    /// Payload of the `error` envelope sent to the offending client
    pub fn to_payload(&self) -> ErrorPayload {
        let mut payload = ErrorPayload {
            code: self.wire_code(),
            message: self.to_string(),
            room_id: None,
            current_players: None,
            max_players: None,
        };
        if let AppError::RoomFull { room_id, current, max } = self {
            payload.room_id = Some(room_id.clone());
            payload.current_players = Some(*current);
            payload.max_players = Some(*max);
        }
        payload
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
