use thiserror::Error;

/// Error types shared by the supervisor and the serving process
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Persisted state errors (recovered locally, only ever logged)
    #[error("State document {0} is corrupt: {1}")]
    StateCorruption(String, String),

    /// Probe and capture errors
    #[error("Liveness probe unavailable for {0}: {1}")]
    ProbeUnavailable(String, String),

    #[error("Failed to spawn capture process: {0}")]
    ProcessSpawnFailure(String),

    /// Upload errors
    #[error("Credentials missing: {0}")]
    CredentialsMissing(String),

    #[error("Upload backend unavailable: {0}")]
    UploadBackendUnavailable(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// Lock and ownership violations
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upload already in progress for {0}")]
    AlreadyInProgress(String),

    /// Operator request errors
    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using RecorderError
pub type Result<T> = std::result::Result<T, RecorderError>;

impl RecorderError {
    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        RecorderError::Internal(msg.into())
    }

    /// Helper to create network errors
    pub fn network(msg: impl Into<String>) -> Self {
        RecorderError::Network(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        RecorderError::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        RecorderError::Conflict(msg.into())
    }

    /// HTTP status code used when the error crosses the operator surface
    pub fn status_code(&self) -> u16 {
        match self {
            RecorderError::NotFound(_) => 404,
            RecorderError::Conflict(_) | RecorderError::AlreadyInProgress(_) => 409,
            RecorderError::InvalidRequest(_) => 400,
            RecorderError::CredentialsMissing(_)
            | RecorderError::UploadBackendUnavailable(_)
            | RecorderError::UploadFailed(_) => 502,
            _ => 500,
        }
    }
}

impl From<reqwest::Error> for RecorderError {
    fn from(err: reqwest::Error) -> Self {
        RecorderError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RecorderError::AlreadyInProgress("rec_alpha".to_string());
        assert_eq!(err.to_string(), "Upload already in progress for rec_alpha");

        let err = RecorderError::not_found("Channel alpha");
        assert_eq!(err.to_string(), "Channel alpha not found");
    }

    #[test]
    fn test_error_helpers() {
        let err = RecorderError::internal("Something went wrong");
        assert!(matches!(err, RecorderError::Internal(_)));

        let err = RecorderError::conflict("locked");
        assert!(matches!(err, RecorderError::Conflict(_)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RecorderError::not_found("x").status_code(), 404);
        assert_eq!(RecorderError::conflict("x").status_code(), 409);
        assert_eq!(RecorderError::AlreadyInProgress("x".into()).status_code(), 409);
        assert_eq!(RecorderError::InvalidRequest("x".into()).status_code(), 400);
        assert_eq!(RecorderError::CredentialsMissing("x".into()).status_code(), 502);
        assert_eq!(RecorderError::internal("x").status_code(), 500);
    }
}
