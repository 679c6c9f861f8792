//! WASAPI capture stream.
//!
//! One implementation covers both directions: capture endpoints are opened
//! directly, render endpoints with `AUDCLNT_STREAMFLAGS_LOOPBACK`. Buffers
//! are handed to the observer as raw bytes in the endpoint's mix format,
//! verbatim.
//!
//! Each `start` spawns a fresh capture thread with its own stop flag. The
//! engine restarts the stream from inside the previous thread's stop
//! notification (drain-and-resume), so the flag is per-generation: a
//! restart can never resurrect or clobber a thread that is already on its
//! way out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use windows::core::PCWSTR;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use clipper_core::models::audio_models::AudioDevice;
use clipper_core::models::error::CaptureError;
use clipper_core::traits::capture_stream::{CaptureObserver, CaptureStream};

use crate::com;

pub struct WasapiCaptureStream {
    device_id: String,
    loopback: bool,
    observer: Arc<dyn CaptureObserver>,
    /// Stop flag of the currently running capture thread, if any.
    generation: Mutex<Option<Arc<AtomicBool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WasapiCaptureStream {
    pub(crate) fn new(device: &AudioDevice, observer: Arc<dyn CaptureObserver>) -> Self {
        Self {
            device_id: device.id.clone(),
            loopback: device.is_output(),
            observer,
            generation: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    fn signal_stop(&self) {
        if let Some(running) = self.generation.lock().as_ref() {
            running.store(false, Ordering::SeqCst);
        }
    }
}

impl CaptureStream for WasapiCaptureStream {
    fn start(&mut self) -> Result<(), CaptureError> {
        let mut generation = self.generation.lock();
        if generation.as_ref().is_some_and(|g| g.load(Ordering::SeqCst)) {
            return Err(CaptureError::ConfigurationFailed(
                "capture already running".into(),
            ));
        }

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let observer = Arc::clone(&self.observer);
        let device_id = self.device_id.clone();
        let loopback = self.loopback;

        let handle = thread::Builder::new()
            .name("wasapi-capture".into())
            .spawn(move || {
                match capture_loop(thread_running, &device_id, loopback, &observer) {
                    Ok(()) => observer.on_stopped(None),
                    Err(e) => {
                        log::error!("capture loop for {} failed: {}", device_id, e);
                        observer.on_stopped(Some(e));
                    }
                }
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn capture thread: {}", e)))?;

        *generation = Some(running);
        // On a restart from inside a stop notification this drops the
        // exiting thread's handle, detaching it; it is already past its
        // loop.
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    fn request_stop(&mut self) {
        self.signal_stop();
    }
}

impl Drop for WasapiCaptureStream {
    fn drop(&mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// Capture thread body.
///
/// Sequence:
/// 1. CoInitializeEx (MTA)
/// 2. Resolve the endpoint by ID
/// 3. Activate IAudioClient, initialize shared mode (+ LOOPBACK for render)
/// 4. Get IAudioCaptureClient
/// 5. Register with MMCSS
/// 6. Start, poll for buffers every 10ms until the stop flag clears
fn capture_loop(
    running: Arc<AtomicBool>,
    device_id: &str,
    loopback: bool,
    observer: &Arc<dyn CaptureObserver>,
) -> Result<(), CaptureError> {
    unsafe {
        let _com = com::initialize()?;

        let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
            .map_err(|_| CaptureError::DeviceNotAvailable)?;

        let wide_id: Vec<u16> = device_id.encode_utf16().chain(std::iter::once(0)).collect();
        let device = enumerator
            .GetDevice(PCWSTR(wide_id.as_ptr()))
            .map_err(|_| CaptureError::DeviceNotAvailable)?;

        let audio_client: IAudioClient = device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("Activate failed: {}", e)))?;

        let mix_format_ptr = audio_client
            .GetMixFormat()
            .map_err(|e| CaptureError::ConfigurationFailed(format!("GetMixFormat failed: {}", e)))?;

        let mix_format = &*mix_format_ptr;
        let block_align = mix_format.nBlockAlign as usize;

        let stream_flags = if loopback {
            AUDCLNT_STREAMFLAGS_LOOPBACK | AUDCLNT_STREAMFLAGS_NOPERSIST
        } else {
            AUDCLNT_STREAMFLAGS_NOPERSIST
        };

        let buffer_duration = 1_000_000; // 100ms in 100ns units

        audio_client
            .Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                stream_flags,
                buffer_duration,
                0,
                mix_format,
                None,
            )
            .map_err(|e| {
                CaptureError::ConfigurationFailed(format!("IAudioClient::Initialize failed: {}", e))
            })?;

        let capture_client: IAudioCaptureClient = audio_client
            .GetService()
            .map_err(|e| CaptureError::ConfigurationFailed(format!("GetService failed: {}", e)))?;

        // MMCSS registration for real-time priority
        let mut task_index: u32 = 0;
        let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
        let _mmcss_handle = AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index);

        audio_client
            .Start()
            .map_err(|e| CaptureError::Unknown(format!("IAudioClient::Start failed: {}", e)))?;

        while running.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(10));

            let mut packet_length = capture_client
                .GetNextPacketSize()
                .map_err(|e| CaptureError::Unknown(format!("GetNextPacketSize failed: {}", e)))?;

            while packet_length > 0 {
                let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
                let mut num_frames: u32 = 0;
                let mut flags: u32 = 0;

                capture_client
                    .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                    .map_err(|e| CaptureError::Unknown(format!("GetBuffer failed: {}", e)))?;

                if num_frames > 0 && !buffer_ptr.is_null() {
                    let byte_count = num_frames as usize * block_align;

                    if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                        // Silence still advances the trailing window.
                        let silence = vec![0u8; byte_count];
                        observer.on_data(&silence);
                    } else {
                        let bytes = std::slice::from_raw_parts(buffer_ptr, byte_count);
                        observer.on_data(bytes);
                    }
                }

                capture_client
                    .ReleaseBuffer(num_frames)
                    .map_err(|e| CaptureError::Unknown(format!("ReleaseBuffer failed: {}", e)))?;

                packet_length = capture_client
                    .GetNextPacketSize()
                    .map_err(|e| CaptureError::Unknown(format!("GetNextPacketSize failed: {}", e)))?;
            }
        }

        let _ = audio_client.Stop();
        CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));
    }

    Ok(())
}
