//! Error types for the lost-and-found bot

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for bot operations
pub type LostFoundResult<T> = Result<T, LostFoundError>;

/// Bot error types
#[derive(Debug, Error)]
pub enum LostFoundError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Payload verification failed: {0}")]
    Crypto(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Credential rejected by platform: errcode={errcode} errmsg={errmsg}")]
    Credential { errcode: i64, errmsg: String },

    #[error("Delivery failed after {attempts} attempts: {reason}")]
    Delivery { attempts: u32, reason: String },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Session invariant violated: {0}")]
    SessionInvariant(String),
}

impl From<sqlx::Error> for LostFoundError {
    fn from(err: sqlx::Error) -> Self {
        LostFoundError::Database(err.to_string())
    }
}

impl From<std::io::Error> for LostFoundError {
    fn from(err: std::io::Error) -> Self {
        LostFoundError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LostFoundError {
    fn from(err: serde_json::Error) -> Self {
        LostFoundError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for LostFoundError {
    fn from(err: reqwest::Error) -> Self {
        LostFoundError::Transport(err.to_string())
    }
}

impl From<quick_xml::DeError> for LostFoundError {
    fn from(err: quick_xml::DeError) -> Self {
        LostFoundError::MalformedPayload(err.to_string())
    }
}

impl From<quick_xml::SeError> for LostFoundError {
    fn from(err: quick_xml::SeError) -> Self {
        LostFoundError::Serialization(err.to_string())
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl LostFoundError {
    /// Convert to API error code
    pub fn code(&self) -> &'static str {
        match self {
            LostFoundError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            LostFoundError::Crypto(_) => "CRYPTO_ERROR",
            LostFoundError::Validation(_) => "VALIDATION_ERROR",
            LostFoundError::Database(_) => "DATABASE_ERROR",
            LostFoundError::Transport(_) => "TRANSPORT_ERROR",
            LostFoundError::Credential { .. } => "CREDENTIAL_ERROR",
            LostFoundError::Delivery { .. } => "DELIVERY_FAILED",
            LostFoundError::Io(_) => "IO_ERROR",
            LostFoundError::Serialization(_) => "SERIALIZATION_ERROR",
            LostFoundError::SessionInvariant(_) => "SESSION_INVARIANT",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            LostFoundError::MalformedPayload(_) | LostFoundError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }

            LostFoundError::Crypto(_) => StatusCode::UNAUTHORIZED,

            LostFoundError::Transport(_)
            | LostFoundError::Credential { .. }
            | LostFoundError::Delivery { .. } => StatusCode::BAD_GATEWAY,

            LostFoundError::Database(_)
            | LostFoundError::Io(_)
            | LostFoundError::Serialization(_)
            | LostFoundError::SessionInvariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a push attempt that failed with this error may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LostFoundError::Transport(_) | LostFoundError::Credential { .. }
        )
    }
}

impl IntoResponse for LostFoundError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiError {
            code: self.code().to_string(),
            message: self.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
