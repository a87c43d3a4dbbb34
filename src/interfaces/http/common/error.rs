//! HTTP error type
//!
//! Every failure leaves the API as `{success: false, message}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use super::ApiResponse;
use crate::shared::DomainError;

/// Message returned for server-side failures; driver details stay in the logs.
const INTERNAL_MESSAGE: &str = "服务器错误";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        let status = match &err {
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::Validation(_) => StatusCode::BAD_REQUEST,
            DomainError::Conflict(_) => StatusCode::CONFLICT,
            DomainError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DomainError::Token(e) if e.is_server_fault() => StatusCode::INTERNAL_SERVER_ERROR,
            DomainError::Token(_) => StatusCode::UNAUTHORIZED,
            DomainError::Database(_) | DomainError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        match &err {
            DomainError::Database(_) | DomainError::Configuration(_) => {
                error!("Request failed: {}", err);
                Self::new(status, INTERNAL_MESSAGE)
            }
            _ => Self::new(status, err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}
