use std::fmt;

use thiserror::Error;

/// Errors that can occur during capture, clipping, or session management.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("device not available")]
    DeviceNotAvailable,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("a capture session is already active")]
    SessionActive,

    #[error("no active capture session")]
    NoActiveSession,

    #[error("{operation} requires the {expected} state, engine is {actual}")]
    InvalidState {
        operation: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("capture device failed: {0}")]
    DeviceFailed(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

/// One device's failure within a multi-device clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipFailure {
    pub device: String,
    pub error: CaptureError,
}

/// Aggregate of every per-device failure from one `save_clip` call.
///
/// Devices that succeeded are not listed; they resumed capturing on their
/// own. Displays as a numbered list, one line per device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveClipError {
    pub failures: Vec<ClipFailure>,
}

impl fmt::Display for SaveClipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}) {}: {}", i + 1, failure.device, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for SaveClipError {}
