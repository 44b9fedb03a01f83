//! Error types shared across camkit crates.

use std::path::PathBuf;

/// Top-level error type for camkit operations.
#[derive(Debug, thiserror::Error)]
pub enum CamError {
    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Device error: {message}")]
    Device { message: String },

    #[error("Device unavailable: {message}")]
    DeviceUnavailable { message: String },

    #[error("Device busy: {message}")]
    DeviceBusy { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Platform error: {message}")]
    Platform { message: String },

    #[error("Invalid session state: {message}")]
    InvalidState { message: String },

    #[error("Invalid media name: {name:?}")]
    InvalidName { name: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using CamError.
pub type CamResult<T> = Result<T, CamError>;

impl CamError {
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device {
            message: msg.into(),
        }
    }

    pub fn device_unavailable(msg: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            message: msg.into(),
        }
    }

    pub fn device_busy(msg: impl Into<String>) -> Self {
        Self::DeviceBusy {
            message: msg.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage {
            message: msg.into(),
        }
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error comes from the device configuration lock
    /// (busy or removed device).
    pub fn is_lock_failure(&self) -> bool {
        matches!(self, Self::DeviceBusy { .. } | Self::DeviceUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_failures_are_classified() {
        assert!(CamError::device_busy("locked").is_lock_failure());
        assert!(CamError::device_unavailable("gone").is_lock_failure());
        assert!(!CamError::capture("boom").is_lock_failure());
    }

    #[test]
    fn serialization_errors_convert() {
        let err: CamError = serde_json::from_str::<u32>("not a number")
            .unwrap_err()
            .into();
        assert!(matches!(err, CamError::Json(_)));
    }

    #[test]
    fn display_includes_message() {
        let err = CamError::InvalidName {
            name: "../x".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid media name: \"../x\"");
    }
}
