pub mod mp3_sink;
pub mod sink_factory;
pub mod wav_sink;

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;

/// Compute the SHA-256 hex digest of a finalized clip file.
pub(crate) fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let data = fs::read(path)
        .map_err(|e| CaptureError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
