//! Error types for PermitDesk.
//!
//! All errors are explicitly typed using thiserror. No panics in production code.

use thiserror::Error;

/// Central error type for all PermitDesk operations.
#[derive(Debug, Error)]
pub enum PermitDeskError {
    /// Configuration error (missing env vars, invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Input failed shape or field validation before reaching the store.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Mail relay rejected or failed to accept a message.
    #[error("Email error: {0}")]
    Email(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal state error (invalid state transitions, impossible rows).
    #[error("Internal state error: {0}")]
    InternalState(String),
}

impl PermitDeskError {
    /// Check if this error is critical and requires alerting.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Database(_) | Self::InternalState(_))
    }

    /// Get user-friendly error message (hides internal details).
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Config(_) => "Service configuration error",
            Self::Database(_) => "Database service temporarily unavailable",
            Self::Validation(_) => "Invalid input",
            Self::Email(_) => "Mail service temporarily unavailable",
            Self::Http(_) => "Network error, please try again",
            Self::Json(_) => "Data format error",
            Self::InternalState(_) => "Internal service error",
        }
    }
}

/// Result type alias for PermitDesk operations.
pub type Result<T> = std::result::Result<T, PermitDeskError>;
