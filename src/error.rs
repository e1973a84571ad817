use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or duplicate input. Handlers recover from this by
    /// re-rendering the submitted form.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The authenticated user may not perform the action.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Resource not found error.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No valid session accompanies the request.
    #[error("Authentication required")]
    Unauthorized {
        /// Path to return to after logging in.
        next: Option<String>,
    },

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Unauthorized { next } => {
                let target = match next {
                    Some(path) => format!("/login?next={}", urlencoding::encode(path)),
                    None => "/login".to_string(),
                };
                return Redirect::to(&target).into_response();
            }
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request error");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }

        (status, self.to_string()).into_response()
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;
