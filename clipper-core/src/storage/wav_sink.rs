use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::models::audio_models::SampleFormat;
use crate::models::error::CaptureError;
use crate::processing::wav_format;
use crate::storage::sha256_file;
use crate::traits::output_sink::{OutputSink, SinkArtifact};

/// Streaming WAV writer: 44-byte header up front, raw capture bytes behind
/// it, size fields patched on close.
///
/// ```text
/// [44-byte WAV header]
/// [native-format audio bytes, verbatim...]
/// ```
#[derive(Debug)]
pub struct WavSink {
    path: PathBuf,
    file: Option<File>,
    total_bytes: u64,
}

impl WavSink {
    /// Create the file and write the header. The destination directory must
    /// already exist; the factory resolves a collision-free path first.
    pub fn create(path: &Path, format: &SampleFormat) -> Result<Self, CaptureError> {
        let file = File::create(path)
            .map_err(|e| CaptureError::StorageError(format!("failed to create file: {}", e)))?;

        let mut sink = Self {
            path: path.to_path_buf(),
            file: Some(file),
            total_bytes: 0,
        };

        // Data size is a placeholder until close.
        let header = wav_format::generate_wav_header(format, 0);
        sink.write_raw(&header)?;
        Ok(sink)
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;
        file.write_all(data)
            .map_err(|e| CaptureError::StorageError(format!("write failed: {}", e)))?;
        self.total_bytes += data.len() as u64;
        Ok(())
    }
}

impl OutputSink for WavSink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        self.write_raw(data)
    }

    fn flush(&mut self) -> Result<(), CaptureError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;
        file.flush()
            .map_err(|e| CaptureError::StorageError(e.to_string()))
    }

    fn close(&mut self) -> Result<SinkArtifact, CaptureError> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| CaptureError::StorageError("file already closed".into()))?;

        // Patch RIFF chunk size at offset 4 and data size at offset 40.
        let riff_size = (self.total_bytes - 8) as u32;
        file.seek(SeekFrom::Start(4))
            .map_err(|e| CaptureError::StorageError(e.to_string()))?;
        file.write_all(&riff_size.to_le_bytes())
            .map_err(|e| CaptureError::StorageError(e.to_string()))?;

        let data_size = (self.total_bytes - wav_format::WAV_HEADER_SIZE as u64) as u32;
        file.seek(SeekFrom::Start(40))
            .map_err(|e| CaptureError::StorageError(e.to_string()))?;
        file.write_all(&data_size.to_le_bytes())
            .map_err(|e| CaptureError::StorageError(e.to_string()))?;

        file.flush()
            .map_err(|e| CaptureError::StorageError(e.to_string()))?;
        drop(file);

        Ok(SinkArtifact {
            path: self.path.clone(),
            bytes_written: self.total_bytes,
            checksum: sha256_file(&self.path)?,
        })
    }
}
