use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::audio_models::AudioDevice;
use crate::traits::output_sink::SinkArtifact;

/// Result returned per device when a clip completes successfully.
///
/// Serializable for handoff to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipResult {
    pub id: String,
    pub device: String,
    pub file_path: PathBuf,
    /// Total bytes in the finalized file, container overhead included.
    pub bytes_written: u64,
    /// Audio duration of the drained window, from the device's byte rate.
    pub duration_secs: f64,
    pub checksum: String,
    pub created_at: String,
}

impl ClipResult {
    pub(crate) fn new(device: &AudioDevice, artifact: SinkArtifact, duration_secs: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device: device.name.clone(),
            file_path: artifact.path,
            bytes_written: artifact.bytes_written,
            duration_secs,
            checksum: artifact.checksum,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
