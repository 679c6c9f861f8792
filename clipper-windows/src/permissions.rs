//! Windows microphone privacy permission check.
//!
//! On Windows 10 1803+, microphone access is controlled by the privacy
//! settings at Settings > Privacy > Microphone. Desktop apps are generally
//! allowed unless the user has disabled the global toggle; there is no
//! per-app consent dialog for unpackaged desktop apps.

use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use clipper_core::models::error::CaptureError;

use crate::com;

/// Check if microphone access is available.
///
/// Attempts to activate an audio client on the default capture endpoint.
/// `E_ACCESSDENIED` or `AUDCLNT_E_DEVICE_IN_USE` indicate the privacy
/// toggle is off.
pub fn check_microphone_permission() -> Result<bool, CaptureError> {
    let _com = com::initialize()?;
    unsafe { check_mic_access_inner() }
}

unsafe fn check_mic_access_inner() -> Result<bool, CaptureError> {
    let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
        .map_err(|e| CaptureError::Unknown(format!("failed to create enumerator: {}", e)))?;

    let device = match enumerator.GetDefaultAudioEndpoint(eCapture, eConsole) {
        Ok(d) => d,
        Err(_) => return Ok(false), // No capture device
    };

    let result: windows::core::Result<IAudioClient> = device.Activate(CLSCTX_ALL, None);

    match result {
        Ok(_) => Ok(true),
        Err(e) => {
            let code = e.code();
            // E_ACCESSDENIED or AUDCLNT_E_DEVICE_IN_USE
            if code.0 == -2147024891i32 || code.0 == -2004287478i32 {
                Ok(false)
            } else {
                log::warn!("unexpected error checking mic permission: {}", e);
                Ok(true)
            }
        }
    }
}

/// Loopback capture of render endpoints needs no permission on Windows.
pub fn check_system_audio_permission() -> bool {
    true
}
