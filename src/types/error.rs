//! Error types for fieldops
//!
//! Every route converts these into a JSON body with an `error` field.
//! Server-side variants never leak their detail to the client.

use hyper::StatusCode;

/// Main error type for fieldops operations
#[derive(Debug, thiserror::Error)]
pub enum FieldOpsError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FieldOpsError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(_) => StatusCode::BAD_GATEWAY,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Http(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to clients. 5xx details stay in the server log.
    pub fn public_message(&self) -> String {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Auth(m)
            | Self::Http(m) => m.clone(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl From<std::io::Error> for FieldOpsError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for FieldOpsError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("Invalid JSON: {}", err))
    }
}

impl From<hyper::Error> for FieldOpsError {
    fn from(err: hyper::Error) -> Self {
        Self::Http(format!("Failed to read body: {}", err))
    }
}

impl From<mongodb::error::Error> for FieldOpsError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for FieldOpsError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Database(format!("BSON serialization failed: {}", err))
    }
}

impl From<bson::de::Error> for FieldOpsError {
    fn from(err: bson::de::Error) -> Self {
        Self::Database(format!("BSON deserialization failed: {}", err))
    }
}

impl From<reqwest::Error> for FieldOpsError {
    fn from(err: reqwest::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for FieldOpsError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

/// Result type alias for fieldops operations
pub type Result<T> = std::result::Result<T, FieldOpsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(FieldOpsError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(FieldOpsError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(FieldOpsError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            FieldOpsError::Database("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = FieldOpsError::Database("connection reset by 10.0.0.4".into());
        assert_eq!(err.public_message(), "Internal server error");

        let err = FieldOpsError::NotFound("Assignment not found".into());
        assert_eq!(err.public_message(), "Assignment not found");
    }
}
