//! HTTP error mapping.
//!
//! | failure              | status |
//! |----------------------|--------|
//! | bad request          | 400    |
//! | not found            | 404    |
//! | evaluation rejected  | 400    |
//! | timeout              | 504    |
//! | unknown              | 500    |
//!
//! Bodies are `{"status": <code>, "error": <message>}`. Unknown failures are
//! logged in full and answered with a generic message.

use crate::errors::{ChainError, ResolveError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: u16,
    error: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::Resolve(ResolveError::NotFound(message.into()))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Resolve(ResolveError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Resolve(ResolveError::EvaluationRejected(_)) => StatusCode::BAD_REQUEST,
            ApiError::Resolve(ResolveError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Resolve(ResolveError::Unknown(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Resolve(ResolveError::Unknown(_)) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::Resolve(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }
        let body = Json(ErrorBody {
            status: status.as_u16(),
            error: self.public_message(),
        });
        (status, body).into_response()
    }
}
