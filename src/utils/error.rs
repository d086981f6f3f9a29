//! Error types and handling
//!
//! Error taxonomy shared by the allocator, the supervisor, and the session
//! controller. A process that exits non-zero is not an error here: that is
//! reported as a `SessionOutcome` and a final log line.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Capture error type
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory error at {path:?}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("A capture session is already running")]
    AlreadyRunning,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CaptureError {
    pub(crate) fn directory(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CaptureError::Directory {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable code for the front-end
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::Config(_) => "CONFIG_ERROR",
            CaptureError::Io(_) | CaptureError::Directory { .. } => "IO_ERROR",
            CaptureError::Spawn { .. } => "SPAWN_ERROR",
            CaptureError::AlreadyRunning => "ALREADY_RUNNING",
            CaptureError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Error response for frontend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<CaptureError> for ErrorResponse {
    fn from(error: CaptureError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_codes() {
        let response = ErrorResponse::from(CaptureError::AlreadyRunning);
        assert_eq!(response.code, "ALREADY_RUNNING");
        assert_eq!(response.message, "A capture session is already running");

        let response = ErrorResponse::from(CaptureError::directory(
            "/nope",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        ));
        assert_eq!(response.code, "IO_ERROR");

        let response = ErrorResponse::from(CaptureError::Spawn {
            program: "dvgrab".to_string(),
            message: "No such file or directory".to_string(),
        });
        assert_eq!(response.code, "SPAWN_ERROR");
        assert!(response.message.contains("dvgrab"));
    }
}
