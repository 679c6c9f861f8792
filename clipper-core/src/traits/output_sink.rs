use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;

/// What a sink reports once its file is finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkArtifact {
    pub path: PathBuf,
    /// Final file size in bytes.
    pub bytes_written: u64,
    /// SHA-256 hex digest of the finished file.
    pub checksum: String,
}

/// Write-only destination bound to one finalized file path and one encoding.
///
/// Owned exclusively by the engine performing the current clip; released
/// (flushed, closed) before that engine resumes capture.
pub trait OutputSink: Send + std::fmt::Debug {
    fn path(&self) -> &Path;

    /// Append raw audio bytes in the device's native format.
    fn write(&mut self, data: &[u8]) -> Result<(), CaptureError>;

    fn flush(&mut self) -> Result<(), CaptureError>;

    /// Finalize the file. Callable once; the sink is unusable afterwards.
    fn close(&mut self) -> Result<SinkArtifact, CaptureError>;
}
