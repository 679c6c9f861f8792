use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Datelike, Local, Timelike};

use crate::models::audio_models::{AudioDevice, DeviceDirection, SampleFormat};
use crate::models::error::CaptureError;
use crate::storage::mp3_sink::Mp3Sink;
use crate::storage::wav_sink::WavSink;
use crate::traits::output_sink::OutputSink;

/// Constructor for one output format: `(path, native format, bit rate)`.
pub type SinkConstructor =
    Arc<dyn Fn(&Path, &SampleFormat, u32) -> Result<Box<dyn OutputSink>, CaptureError> + Send + Sync>;

/// Registry mapping case-insensitive format names to sink constructors,
/// plus collision-free output path resolution.
pub struct OutputSinkFactory {
    formats: HashMap<String, SinkConstructor>,
}

impl OutputSinkFactory {
    /// Empty registry; callers plug formats in via `register`.
    pub fn new() -> Self {
        Self {
            formats: HashMap::new(),
        }
    }

    /// Registry with the built-in formats: "WAV" (tagged PCM) and "MP3"
    /// (LAME).
    pub fn with_default_formats() -> Self {
        let mut factory = Self::new();
        factory.register("WAV", Arc::new(|path, format, _bit_rate| {
            Ok(Box::new(WavSink::create(path, format)?) as Box<dyn OutputSink>)
        }));
        factory.register("MP3", Arc::new(|path, format, bit_rate| {
            Ok(Box::new(Mp3Sink::create(path, format, bit_rate)?) as Box<dyn OutputSink>)
        }));
        factory
    }

    pub fn register(&mut self, format: &str, constructor: SinkConstructor) {
        self.formats.insert(format.to_uppercase(), constructor);
    }

    pub fn supports(&self, format: &str) -> bool {
        self.formats.contains_key(&format.to_uppercase())
    }

    /// Resolve a fresh output path for `device` and construct the sink.
    ///
    /// The destination folder must already exist; its absence is a
    /// configuration error raised before any file is touched.
    pub fn open_sink(
        &self,
        folder: &Path,
        format: &str,
        device: &AudioDevice,
    ) -> Result<Box<dyn OutputSink>, CaptureError> {
        let constructor = self
            .formats
            .get(&format.to_uppercase())
            .ok_or_else(|| {
                CaptureError::ConfigurationFailed(format!("unknown output format: {}", format))
            })?;
        if !folder.is_dir() {
            return Err(CaptureError::ConfigurationFailed(
                "output directory doesn't exist".into(),
            ));
        }

        let path = resolve_output_path(folder, device, format);
        constructor(&path, &device.format, device.format.bit_rate())
    }
}

impl Default for OutputSinkFactory {
    fn default() -> Self {
        Self::with_default_formats()
    }
}

/// Build a timestamped, device-labeled path that does not exist yet.
pub fn resolve_output_path(folder: &Path, device: &AudioDevice, format: &str) -> PathBuf {
    let now = Local::now();
    let stamp = format!(
        "{}-{}-{}_{}-{}-{}",
        now.day(),
        now.month(),
        now.year(),
        now.hour(),
        now.minute(),
        now.second()
    );
    let base = format!("{}_{}", stamp, device_file_label(device));
    unique_path(folder, &base, &format.to_lowercase())
}

/// Append the smallest unused integer suffix; the bare name wins when free.
fn unique_path(folder: &Path, base: &str, extension: &str) -> PathBuf {
    let mut path = folder.join(format!("{}.{}", base, extension));
    let mut suffix = 0;
    while path.exists() {
        path = folder.join(format!("{}_{}.{}", base, suffix, extension));
        suffix += 1;
    }
    path
}

/// Turn a device's display name into a filename-safe label.
///
/// The name is truncated at its first parenthetical group, trimmed, and
/// tagged "(Output)"/"(Input)" by direction; spaces become underscores and
/// characters the target filesystem rejects are stripped.
fn device_file_label(device: &AudioDevice) -> String {
    let mut name = device.name.as_str();
    if let Some(open) = name.find('(') {
        if open > 0 {
            name = name[..open].trim_end();
        }
    }

    let tag = match device.direction {
        DeviceDirection::Render => "(Output)",
        DeviceDirection::Capture => "(Input)",
    };

    format!("{} {}", name, tag)
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') && !c.is_control())
        .collect()
}
