use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_with::skip_serializing_none;

use crate::orchestrator::GenerationError;
use crate::store::StoreError;

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    details: Option<String>,
}

/// Every failure a handler can return, mapped to its HTTP status.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Unprocessable { message: String, details: Option<String> },
    Internal { message: String, details: Option<String> },
}

impl AppError {
    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal {
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, details) = match self {
            AppError::BadRequest(message) | AppError::NotFound(message) => (message, None),
            AppError::Unprocessable { message, details } | AppError::Internal { message, details } => (message, details),
        };
        if status.is_server_error() {
            tracing::error!("❌ {} {}", status, error);
        }
        (status, Json(ErrorBody { error, details })).into_response()
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        let message = err.to_string();
        match err {
            GenerationError::InvalidPrompt | GenerationError::Image(_) => AppError::BadRequest(message),
            GenerationError::ValidationExhausted { reason } => AppError::Unprocessable {
                message,
                details: Some(reason),
            },
            GenerationError::NotConfigured | GenerationError::Upstream(_) => AppError::internal(message),
            GenerationError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::NotFound("Generation not found".into()),
            other => AppError::Internal {
                message: "Internal server error".into(),
                details: Some(other.to_string()),
            },
        }
    }
}
