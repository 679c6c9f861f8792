//! `AudioBackend` implementation over WASAPI.

use std::sync::Arc;

use clipper_core::models::audio_models::AudioDevice;
use clipper_core::models::error::CaptureError;
use clipper_core::traits::audio_backend::AudioBackend;
use clipper_core::traits::capture_stream::{CaptureObserver, CaptureStream, KeepAliveStream};

use crate::com;
use crate::device_enumerator::DeviceEnumerator;
use crate::keep_alive::WasapiKeepAlive;
use crate::permissions;
use crate::wasapi_stream::WasapiCaptureStream;

/// Stateless backend handle; COM objects live on the threads that use them.
pub struct WasapiBackend;

impl WasapiBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WasapiBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for WasapiBackend {
    fn enumerate_devices(&self) -> Result<Vec<AudioDevice>, CaptureError> {
        let _com = com::initialize()?;
        DeviceEnumerator::new()?.list_devices()
    }

    fn resolve_device(&self, id: &str) -> Result<AudioDevice, CaptureError> {
        let _com = com::initialize()?;
        DeviceEnumerator::new()?.resolve(id)
    }

    fn open_capture(
        &self,
        device: &AudioDevice,
        observer: Arc<dyn CaptureObserver>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        // Loopback needs no permission; microphones hit the privacy toggle.
        if !device.is_output() && !permissions::check_microphone_permission()? {
            return Err(CaptureError::PermissionDenied);
        }
        Ok(Box::new(WasapiCaptureStream::new(device, observer)))
    }

    fn open_keep_alive(
        &self,
        device: &AudioDevice,
    ) -> Result<Box<dyn KeepAliveStream>, CaptureError> {
        Ok(Box::new(WasapiKeepAlive::new(device.id.clone())))
    }
}
