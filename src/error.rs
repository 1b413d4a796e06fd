//! Error types for github-login
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::service::GitHubError;

/// Application-wide error type
///
/// Every upstream failure (token exchange, profile fetch, transport,
/// undecodable body) surfaces to the client as a plain 500; the detail
/// only goes to the log.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// GitHub OAuth or API error (500)
    #[error("GitHub error: {0}")]
    GitHub(#[from] GitHubError),

    /// Template rendering error (500)
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Session signing error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "unauthorized"),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::GitHub(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "github",
            ),
            AppError::Template(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "template",
            ),
            AppError::Encryption(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "encryption",
            ),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, error_type, "Request failed");
        } else {
            tracing::warn!(error = %self, error_type, "Request rejected");
        }

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
