// src/error.rs

//! Application error kinds and their HTTP rendering.
//!
//! Every fallible operation in the relay returns [`AppError`]. Handlers
//! return it directly; [`IntoResponse`] turns it into the JSON error
//! envelope `{ "success": false, "error": "..." }` with the status code
//! matching its kind.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A room id, or a persisted record, that does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Malformed request payload or parameter.
    #[error("{0}")]
    Invalid(String),

    /// An identity that is already registered.
    #[error("{0}")]
    Conflict(String),

    /// The room id generator ran out of attempts.
    #[error("{0}")]
    ResourceExhausted(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Invalid(_) => "invalid",
            Self::Conflict(_) => "conflict",
            Self::ResourceExhausted(_) => "resource_exhausted",
            Self::Internal(_) | Self::Database(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ResourceExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) | Self::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to clients. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::Internal(_) | Self::Database(_) => {
                "Internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
        }

        let body = ErrorResponse {
            success: false,
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}
