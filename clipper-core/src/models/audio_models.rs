use serde::{Deserialize, Serialize};

/// Data flow direction of an audio endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    /// An input endpoint (microphone, line-in).
    Capture,
    /// An output endpoint whose signal is captured via loopback.
    Render,
}

/// Native sample format of a device, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl SampleFormat {
    /// Average bytes of audio per second at this format.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.channels as u32 * self.bits_per_sample as u32 / 8
    }

    /// Raw bit rate in bits per second, handed to sink constructors.
    pub fn bit_rate(&self) -> u32 {
        self.sample_rate * self.bits_per_sample as u32 * self.channels as u32
    }

    /// Size of one interleaved frame in bytes.
    pub fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample / 8
    }
}

/// An audio device available for capture.
///
/// Immutable snapshot; re-fetched on each enumeration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Stable, platform-scoped identifier.
    pub id: String,
    /// Friendly display name.
    pub name: String,
    pub direction: DeviceDirection,
    pub is_active: bool,
    pub format: SampleFormat,
    /// Endpoints that only deliver capture callbacks while something is
    /// rendering need a silent keep-alive stream. Set by the backend;
    /// a platform quirk, not a property of the direction.
    pub requires_keep_alive: bool,
}

impl AudioDevice {
    pub fn is_output(&self) -> bool {
        matches!(self.direction, DeviceDirection::Render)
    }
}
