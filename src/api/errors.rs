//! API Error Handling
//!
//! Structured error responses with proper HTTP status codes and request tracking.

use crate::errors::{DealError, ValidationError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (NOT_FOUND, INVALID_STATE, INSUFFICIENT_FUNDS, etc.)
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Whether the same call may succeed later without changes
    pub retryable: bool,
}

/// API error types with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    /// Engine refused the operation
    Engine(DealError),
    BadRequest(String),
    Unauthenticated(String),
    InternalError(String),
}

impl ApiError {
    pub fn engine(request_id: String, error: DealError) -> Self {
        Self {
            kind: ApiErrorKind::Engine(error),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn unauthenticated(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::Unauthenticated(message),
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    fn status_code(&self) -> StatusCode {
        match &self.kind {
            ApiErrorKind::Engine(err) => match err {
                DealError::Validation(ValidationError::GameNotFound(_)) => StatusCode::NOT_FOUND,
                DealError::Validation(_) => StatusCode::BAD_REQUEST,
                DealError::Authorization(_) => StatusCode::FORBIDDEN,
                DealError::State(_) => StatusCode::CONFLICT,
                DealError::Resource(_) => StatusCode::PAYMENT_REQUIRED,
                DealError::Oracle(_) => StatusCode::UNPROCESSABLE_ENTITY,
                DealError::Configuration(_) | DealError::Storage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiErrorKind::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiErrorKind::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiErrorKind::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::Engine(err) => write!(f, "[{}] {}", self.request_id, err),
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::Unauthenticated(msg) => {
                write!(f, "[{}] Unauthenticated: {}", self.request_id, msg)
            }
            ApiErrorKind::InternalError(msg) => {
                write!(f, "[{}] Internal Error: {}", self.request_id, msg)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message, retryable) = match &self.kind {
            ApiErrorKind::Engine(err) => (err.code(), err.to_string(), err.is_retryable()),
            ApiErrorKind::BadRequest(msg) => ("BAD_REQUEST", msg.clone(), false),
            ApiErrorKind::Unauthenticated(msg) => ("UNAUTHENTICATED", msg.clone(), false),
            ApiErrorKind::InternalError(msg) => ("INTERNAL_ERROR", msg.clone(), false),
        };

        if status.is_server_error() {
            tracing::error!(request_id = %self.request_id, "{}", message);
        }

        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: code.to_string(),
                message,
                retryable,
            },
        });

        (status, body).into_response()
    }
}
