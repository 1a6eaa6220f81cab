//! Error types shared across Presenter crates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level error type for Presenter operations.
#[derive(Debug, thiserror::Error)]
pub enum PresenterError {
    #[error("Device unavailable: {message}")]
    DeviceUnavailable { message: String },

    #[error("Authorization denied: {message}")]
    AuthorizationDenied { message: String },

    #[error("Encoder setup failed: {message}")]
    EncoderSetupFailed { message: String },

    #[error("Failed to create session directory {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Finalize error: {message}")]
    Finalize { message: String },

    #[error("Input tracking error: {message}")]
    InputTracking { message: String },

    #[error("Platform error: {message}")]
    Platform { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using PresenterError.
pub type PresenterResult<T> = Result<T, PresenterError>;

/// Coarse classification of a track failure, stable enough to show to users
/// and to assert on in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DeviceUnavailable,
    AuthorizationDenied,
    EncoderSetupFailed,
    CaptureFailed,
    FinalizeFailed,
}

impl PresenterError {
    pub fn device_unavailable(msg: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            message: msg.into(),
        }
    }

    pub fn authorization_denied(msg: impl Into<String>) -> Self {
        Self::AuthorizationDenied {
            message: msg.into(),
        }
    }

    pub fn encoder_setup(msg: impl Into<String>) -> Self {
        Self::EncoderSetupFailed {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn finalize(msg: impl Into<String>) -> Self {
        Self::Finalize {
            message: msg.into(),
        }
    }

    pub fn input_tracking(msg: impl Into<String>) -> Self {
        Self::InputTracking {
            message: msg.into(),
        }
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Map this error onto the per-track failure taxonomy.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::DeviceUnavailable { .. } | Self::Unsupported { .. } | Self::Platform { .. } => {
                FailureKind::DeviceUnavailable
            }
            Self::AuthorizationDenied { .. } => FailureKind::AuthorizationDenied,
            Self::EncoderSetupFailed { .. } => FailureKind::EncoderSetupFailed,
            Self::Finalize { .. } => FailureKind::FinalizeFailed,
            _ => FailureKind::CaptureFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_follows_taxonomy() {
        assert_eq!(
            PresenterError::authorization_denied("camera").failure_kind(),
            FailureKind::AuthorizationDenied
        );
        assert_eq!(
            PresenterError::unsupported("wayland screen capture").failure_kind(),
            FailureKind::DeviceUnavailable
        );
        assert_eq!(
            PresenterError::encoder_setup("no x264enc").failure_kind(),
            FailureKind::EncoderSetupFailed
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        assert_eq!(
            PresenterError::from(io).failure_kind(),
            FailureKind::CaptureFailed
        );
    }

    #[test]
    fn directory_error_names_the_path() {
        let err = PresenterError::DirectoryCreationFailed {
            path: PathBuf::from("/nope/2026-01-01_00-00-00"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/nope/2026-01-01_00-00-00"));
    }
}
