//! Error types for mixcat.

use thiserror::Error;

/// Result type alias using mixcat's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for mixcat operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Staged record not found
    #[error("Staged record not found: {0}")]
    StagedRecordNotFound(uuid::Uuid),

    /// Malformed payload or input; never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// Provider missing from the fixed prefix table; configuration bug
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Context rule failed to load or compile
    #[error("Rule error: {0}")]
    Rule(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Whether the job processor should retry an attempt that failed with
    /// this error.
    ///
    /// Database and I/O failures are treated as transient; validation and
    /// provider-table errors are permanent and fail the job immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(_) | Error::Io(_) | Error::Internal(_) | Error::Job(_) => true,
            Error::Validation(_)
            | Error::UnsupportedProvider(_)
            | Error::Serialization(_)
            | Error::Config(_)
            | Error::Rule(_)
            | Error::NotFound(_)
            | Error::StagedRecordNotFound(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("missing staged_id".to_string());
        assert_eq!(err.to_string(), "Validation error: missing staged_id");
    }

    #[test]
    fn test_error_display_unsupported_provider() {
        let err = Error::UnsupportedProvider("mixcloud".to_string());
        assert_eq!(err.to_string(), "Unsupported provider: mixcloud");
    }

    #[test]
    fn test_error_display_staged_record_not_found() {
        let id = Uuid::nil();
        let err = Error::StagedRecordNotFound(id);
        assert_eq!(err.to_string(), format!("Staged record not found: {}", id));
    }

    #[test]
    fn test_validation_errors_are_not_retryable() {
        assert!(!Error::Validation("bad payload".into()).is_retryable());
        assert!(!Error::UnsupportedProvider("x".into()).is_retryable());
        assert!(!Error::Serialization("truncated".into()).is_retryable());
    }

    #[test]
    fn test_io_errors_are_retryable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        assert!(Error::Io(io_err).is_retryable());
        assert!(Error::Internal("unexpected state".into()).is_retryable());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
