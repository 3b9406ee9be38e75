//! HTTP error mapping.
//!
//! Every handler returns `Result<_, ApiError>`. Client errors carry the core error's message;
//! server errors are logged with full detail and answered with a generic body.

use api_shared::ErrorRes;
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use camp_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("missing or malformed bearer token")]
    MissingToken,

    #[error("invalid multipart body: {message}")]
    Multipart { status: StatusCode, message: String },

    #[error("multipart body has no 'file' field")]
    MissingFile,
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Multipart {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Core(err) => match err {
                CoreError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
                CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                CoreError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
                CoreError::InvalidState(_) => (StatusCode::CONFLICT, "invalid_state"),
                CoreError::Unauthorised(_) => (StatusCode::UNAUTHORIZED, "unauthorised"),
                CoreError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
                CoreError::PayloadTooLarge { .. } => {
                    (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
            ApiError::MissingToken => (StatusCode::UNAUTHORIZED, "unauthorised"),
            ApiError::Multipart { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
            }
            ApiError::Multipart { .. } | ApiError::MissingFile => {
                (StatusCode::BAD_REQUEST, "invalid_input")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status.is_server_error() {
            tracing::error!("request failed: {:?}", self);
            "Internal error".to_string()
        } else {
            tracing::debug!(status = %status, "request rejected: {}", self);
            self.to_string()
        };

        (
            status,
            Json(ErrorRes {
                error: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
