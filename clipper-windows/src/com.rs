//! Per-thread COM initialization.
//!
//! Every WASAPI call path initializes COM on its own thread and balances it
//! on scope exit, including the S_FALSE already-initialized case.

use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

use clipper_core::models::error::CaptureError;

pub(crate) struct ComGuard;

pub(crate) fn initialize() -> Result<ComGuard, CaptureError> {
    unsafe {
        CoInitializeEx(None, COINIT_MULTITHREADED)
            .ok()
            .map_err(|e| CaptureError::Unknown(format!("CoInitializeEx failed: {}", e)))?;
    }
    Ok(ComGuard)
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}
