//! Silent keep-alive render stream.
//!
//! WASAPI loopback capture on a render endpoint only produces callbacks
//! while something is being rendered to that endpoint, so the backend feeds
//! it silence for the whole session. Pausing stops the audio client but
//! parks the render thread, keeping a clip's resume cheap; only a full stop
//! tears the thread down.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use windows::core::PCWSTR;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use clipper_core::models::error::CaptureError;
use clipper_core::traits::capture_stream::KeepAliveStream;

use crate::com;

const STATE_STOPPED: u8 = 0;
const STATE_PLAYING: u8 = 1;
const STATE_PAUSED: u8 = 2;

pub struct WasapiKeepAlive {
    device_id: String,
    state: Arc<AtomicU8>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WasapiKeepAlive {
    pub(crate) fn new(device_id: String) -> Self {
        Self {
            device_id,
            state: Arc::new(AtomicU8::new(STATE_STOPPED)),
            handle: Mutex::new(None),
        }
    }

    fn ensure_thread(&self) -> Result<(), CaptureError> {
        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }

        let state = Arc::clone(&self.state);
        let device_id = self.device_id.clone();
        let spawned = thread::Builder::new()
            .name("wasapi-keepalive".into())
            .spawn(move || {
                if let Err(e) = render_silence_loop(&state, &device_id) {
                    log::warn!("keep-alive render for {} failed: {}", device_id, e);
                    state.store(STATE_STOPPED, Ordering::SeqCst);
                }
            })
            .map_err(|e| {
                CaptureError::Unknown(format!("failed to spawn keep-alive thread: {}", e))
            })?;
        *handle = Some(spawned);
        Ok(())
    }

    fn halt(&self) {
        self.state.store(STATE_STOPPED, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl KeepAliveStream for WasapiKeepAlive {
    fn play(&mut self) -> Result<(), CaptureError> {
        self.state.store(STATE_PLAYING, Ordering::SeqCst);
        self.ensure_thread()
    }

    fn pause(&mut self) -> Result<(), CaptureError> {
        self.state.store(STATE_PAUSED, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.halt();
        Ok(())
    }
}

impl Drop for WasapiKeepAlive {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Render thread body: keep the endpoint's shared-mode buffer topped up
/// with silent frames while playing, idle while paused.
fn render_silence_loop(state: &AtomicU8, device_id: &str) -> Result<(), CaptureError> {
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

        let buffer_duration = 2_000_000; // 200ms in 100ns units

        let init_result = audio_client.Initialize(
            AUDCLNT_SHAREMODE_SHARED,
            0,
            buffer_duration,
            0,
            &*mix_format_ptr,
            None,
        );
        if let Err(e) = init_result {
            CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));
            return Err(CaptureError::ConfigurationFailed(format!(
                "IAudioClient::Initialize (render) failed: {}",
                e
            )));
        }
        CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));

        let render_client: IAudioRenderClient = audio_client
            .GetService()
            .map_err(|e| CaptureError::ConfigurationFailed(format!("GetService failed: {}", e)))?;

        let buffer_frames = audio_client
            .GetBufferSize()
            .map_err(|e| CaptureError::Unknown(format!("GetBufferSize failed: {}", e)))?;

        let mut started = false;
        loop {
            match state.load(Ordering::SeqCst) {
                STATE_STOPPED => break,
                STATE_PAUSED => {
                    if started {
                        let _ = audio_client.Stop();
                        started = false;
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                _ => {
                    if !started {
                        audio_client
                            .Start()
                            .map_err(|e| CaptureError::Unknown(format!("IAudioClient::Start failed: {}", e)))?;
                        started = true;
                    }

                    let padding = audio_client
                        .GetCurrentPadding()
                        .map_err(|e| CaptureError::Unknown(format!("GetCurrentPadding failed: {}", e)))?;
                    let free_frames = buffer_frames.saturating_sub(padding);
                    if free_frames > 0 {
                        render_client
                            .GetBuffer(free_frames)
                            .map_err(|e| CaptureError::Unknown(format!("GetBuffer failed: {}", e)))?;
                        // SILENT flag: no need to zero the buffer ourselves.
                        render_client
                            .ReleaseBuffer(free_frames, AUDCLNT_BUFFERFLAGS_SILENT.0 as u32)
                            .map_err(|e| CaptureError::Unknown(format!("ReleaseBuffer failed: {}", e)))?;
                    }
                    thread::sleep(Duration::from_millis(50));
                }
            }
        }

        let _ = audio_client.Stop();
    }

    Ok(())
}
