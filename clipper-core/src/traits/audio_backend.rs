use std::sync::Arc;

use crate::models::audio_models::AudioDevice;
use crate::models::error::CaptureError;
use crate::traits::capture_stream::{CaptureObserver, CaptureStream, KeepAliveStream};

/// Interface to the platform audio subsystem.
///
/// Implemented by `clipper-windows` (WASAPI); the core crate's tests use a
/// mock. All methods may be called from any thread.
pub trait AudioBackend: Send + Sync {
    /// Snapshot of all currently active devices, both directions.
    fn enumerate_devices(&self) -> Result<Vec<AudioDevice>, CaptureError>;

    /// Resolve a device descriptor by its stable identifier.
    fn resolve_device(&self, id: &str) -> Result<AudioDevice, CaptureError>;

    /// Open a capture binding on `device`. The observer is registered for
    /// the stream's lifetime; capture does not start until
    /// `CaptureStream::start`.
    fn open_capture(
        &self,
        device: &AudioDevice,
        observer: Arc<dyn CaptureObserver>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError>;

    /// Open the silent keep-alive stream for a device that requires one.
    fn open_keep_alive(
        &self,
        device: &AudioDevice,
    ) -> Result<Box<dyn KeepAliveStream>, CaptureError>;
}
