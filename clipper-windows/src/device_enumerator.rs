//! Windows audio device enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to list active capture and render endpoints
//! with friendly names and native mix formats, and to resolve an endpoint
//! by its stable identifier.

use windows::core::*;
use windows::Win32::Devices::FunctionDiscovery::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::StructuredStorage::{PropVariantClear, PROPVARIANT};
use windows::Win32::System::Com::*;
use windows::Win32::System::Variant::*;

use clipper_core::models::audio_models::{AudioDevice, DeviceDirection, SampleFormat};
use clipper_core::models::error::CaptureError;

/// Audio device enumerator using the Windows MMDevice API.
///
/// Requires COM to be initialized on the calling thread; `WasapiBackend`
/// handles that.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    pub fn new() -> Result<Self, CaptureError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                    .map_err(|e| CaptureError::Unknown(format!("failed to create enumerator: {}", e)))?;
            Ok(Self { enumerator })
        }
    }

    /// List active endpoints in both directions, capture first.
    pub fn list_devices(&self) -> Result<Vec<AudioDevice>, CaptureError> {
        let mut devices = self.list_flow(eCapture, DeviceDirection::Capture)?;
        devices.extend(self.list_flow(eRender, DeviceDirection::Render)?);
        Ok(devices)
    }

    /// Resolve an endpoint descriptor by its MMDevice ID.
    pub fn resolve(&self, id: &str) -> Result<AudioDevice, CaptureError> {
        unsafe {
            let wide_id: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
            let device = self
                .enumerator
                .GetDevice(PCWSTR(wide_id.as_ptr()))
                .map_err(|_| CaptureError::DeviceNotAvailable)?;
            self.describe(&device, None)
        }
    }

    fn list_flow(
        &self,
        flow: EDataFlow,
        direction: DeviceDirection,
    ) -> Result<Vec<AudioDevice>, CaptureError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(flow, DEVICE_STATE_ACTIVE)
                .map_err(|e| CaptureError::Unknown(format!("EnumAudioEndpoints failed: {}", e)))?;

            let count = collection
                .GetCount()
                .map_err(|e| CaptureError::Unknown(format!("GetCount failed: {}", e)))?;

            let mut devices = Vec::new();
            for i in 0..count {
                let device = match collection.Item(i) {
                    Ok(d) => d,
                    Err(_) => continue,
                };
                match self.describe(&device, Some(direction)) {
                    Ok(descriptor) => devices.push(descriptor),
                    Err(e) => log::warn!("skipping endpoint {}: {}", i, e),
                }
            }
            Ok(devices)
        }
    }

    unsafe fn describe(
        &self,
        device: &IMMDevice,
        direction: Option<DeviceDirection>,
    ) -> Result<AudioDevice, CaptureError> {
        let id = device
            .GetId()
            .map_err(|e| CaptureError::Unknown(format!("GetId failed: {}", e)))?
            .to_string()
            .unwrap_or_default();

        let direction = match direction {
            Some(d) => d,
            None => {
                let endpoint: IMMEndpoint = device
                    .cast()
                    .map_err(|e| CaptureError::Unknown(format!("IMMEndpoint cast failed: {}", e)))?;
                let flow = endpoint
                    .GetDataFlow()
                    .map_err(|e| CaptureError::Unknown(format!("GetDataFlow failed: {}", e)))?;
                if flow == eRender {
                    DeviceDirection::Render
                } else {
                    DeviceDirection::Capture
                }
            }
        };

        let is_active = device
            .GetState()
            .map(|s| s == DEVICE_STATE_ACTIVE)
            .unwrap_or(false);

        let name = Self::friendly_name(device).unwrap_or_else(|| "Unknown Device".into());
        let format = Self::mix_format(device)?;

        Ok(AudioDevice {
            id,
            name,
            direction,
            is_active,
            format,
            // Render endpoints only fire capture callbacks while rendering.
            requires_keep_alive: matches!(direction, DeviceDirection::Render),
        })
    }

    /// Read the PKEY_Device_FriendlyName property from a device.
    unsafe fn friendly_name(device: &IMMDevice) -> Option<String> {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;

        let mut prop_variant = std::mem::zeroed::<PROPVARIANT>();
        store
            .GetValue(&PKEY_Device_FriendlyName, &mut prop_variant)
            .ok()?;

        let name = if prop_variant.Anonymous.Anonymous.vt == VT_LPWSTR {
            let pwsz = prop_variant.Anonymous.Anonymous.Anonymous.pwszVal;
            if !pwsz.is_null() {
                let len = (0..).take_while(|&i| *pwsz.offset(i) != 0).count();
                Some(String::from_utf16_lossy(std::slice::from_raw_parts(pwsz, len)))
            } else {
                None
            }
        } else {
            None
        };

        PropVariantClear(&mut prop_variant).ok();
        name
    }

    /// Query the endpoint's shared-mode mix format.
    unsafe fn mix_format(device: &IMMDevice) -> Result<SampleFormat, CaptureError> {
        let audio_client: IAudioClient = device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("Activate failed: {}", e)))?;

        let mix_format_ptr = audio_client
            .GetMixFormat()
            .map_err(|e| CaptureError::ConfigurationFailed(format!("GetMixFormat failed: {}", e)))?;

        let mix_format = &*mix_format_ptr;
        let format = SampleFormat {
            sample_rate: mix_format.nSamplesPerSec,
            bits_per_sample: mix_format.wBitsPerSample,
            channels: mix_format.nChannels,
        };
        CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));
        Ok(format)
    }
}
