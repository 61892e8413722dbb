// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::auth::AuthError;
use crate::data::DataError;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Data service error: {0}")]
    Data(#[from] DataError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Auth(e) if e.is_rejection() => StatusCode::UNAUTHORIZED,
            AppError::Auth(_) | AppError::Data(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "AUTH_001",
            AppError::Auth(_) => "AUTH_002",
            AppError::Data(_) => "DATA_001",
            AppError::NotFound(_) => "NF_001",
            AppError::InvalidInput(_) => "VAL_001",
            AppError::Internal(_) => "INT_001",
            AppError::Json(_) => "JSON_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Unauthenticated => "Authentication required".to_string(),
            AppError::Auth(_) => "Authentication failed".to_string(),
            AppError::Data(_) => "Failed to load data, please retry".to_string(),
            AppError::NotFound(_) => "Resource not found".to_string(),
            AppError::InvalidInput(_) => "Invalid input provided".to_string(),
            AppError::Internal(_) | AppError::Json(_) => {
                "An internal server error occurred".to_string()
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        if status.is_server_error() {
            tracing::error!(code = error_code, error = %self, "request failed");
        }

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}
