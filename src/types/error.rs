//! Error types for tally
//!
//! One enum for the whole service. Handlers turn it into a JSON error body
//! with the status from [`StatsError::status_code`].

use hyper::StatusCode;

/// Main error type for tally operations
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A report statement failed inside the store driver
    #[error("Query failed: {0}")]
    Query(String),

    /// A store could not be opened or reached
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StatsError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code included in error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Query(_) => "QUERY_FAILED",
            Self::Database(_) => "DATABASE_UNAVAILABLE",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

// Implement From conversions for common error types

impl From<rusqlite::Error> for StatsError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Query(err.to_string())
    }
}

impl From<std::io::Error> for StatsError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for StatsError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for StatsError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("TOML error: {}", err))
    }
}

impl From<hyper::Error> for StatsError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for StatsError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

/// Result type alias for tally operations
pub type Result<T> = std::result::Result<T, StatsError>;
