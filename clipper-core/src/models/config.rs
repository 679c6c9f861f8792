use std::path::PathBuf;

use crate::models::error::CaptureError;

/// Shared configuration for one capture session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory where clip files are written. Must already exist.
    pub output_dir: PathBuf,

    /// Sink registry key, case-insensitive (e.g. "WAV", "MP3").
    pub output_format: String,

    /// Length of the trailing window each engine retains, in seconds.
    pub clip_length_secs: u32,
}

impl SessionConfig {
    /// Checked before any engine is touched; violations are configuration
    /// errors with no side effects.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.clip_length_secs == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "clip length must be positive".into(),
            ));
        }
        if !self.output_dir.is_dir() {
            return Err(CaptureError::ConfigurationFailed(
                "output directory doesn't exist".into(),
            ));
        }
        Ok(())
    }
}

/// Parse the clip length the presentation layer hands over as raw text.
///
/// Accepts positive integers only.
pub fn parse_clip_length(value: &str) -> Option<u32> {
    match value.trim().parse::<u32>() {
        Ok(v) if v > 0 => Some(v),
        _ => None,
    }
}
