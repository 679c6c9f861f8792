//! Shared test doubles: a scriptable backend, streams whose cooperative
//! stops are delivered asynchronously like real hardware, and an in-memory
//! sink.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioDevice, DeviceDirection, SampleFormat};
use crate::models::error::CaptureError;
use crate::traits::audio_backend::AudioBackend;
use crate::traits::capture_stream::{CaptureObserver, CaptureStream, KeepAliveStream};
use crate::traits::output_sink::{OutputSink, SinkArtifact};
use crate::traits::session_delegate::SessionDelegate;

/// 1000 bytes/second keeps ring capacities tiny in tests.
fn small_format() -> SampleFormat {
    SampleFormat {
        sample_rate: 500,
        bits_per_sample: 16,
        channels: 1,
    }
}

pub(crate) fn test_device(id: &str) -> AudioDevice {
    AudioDevice {
        id: id.into(),
        name: format!("{} (Test Hardware)", id),
        direction: DeviceDirection::Capture,
        is_active: true,
        format: small_format(),
        requires_keep_alive: false,
    }
}

pub(crate) fn render_device(id: &str) -> AudioDevice {
    AudioDevice {
        id: id.into(),
        name: format!("{} (Test Hardware)", id),
        direction: DeviceDirection::Render,
        is_active: true,
        format: small_format(),
        requires_keep_alive: true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeepAliveMode {
    Absent,
    Playing,
    Paused,
    Stopped,
}

/// Shared view of one mock device's streams, kept by the backend so tests
/// can inject data and inspect what the engine did.
pub(crate) struct MockStreamHandle {
    observer: Mutex<Option<Arc<dyn CaptureObserver>>>,
    started: AtomicBool,
    start_count: AtomicUsize,
    next_stop_error: Mutex<Option<CaptureError>>,
    keep_alive: Mutex<KeepAliveMode>,
    keep_alive_paused_seen: AtomicBool,
    dropped: AtomicBool,
}

impl MockStreamHandle {
    fn new() -> Self {
        Self {
            observer: Mutex::new(None),
            started: AtomicBool::new(false),
            start_count: AtomicUsize::new(0),
            next_stop_error: Mutex::new(None),
            keep_alive: Mutex::new(KeepAliveMode::Absent),
            keep_alive_paused_seen: AtomicBool::new(false),
            dropped: AtomicBool::new(false),
        }
    }

    fn observer(&self) -> Arc<dyn CaptureObserver> {
        self.observer
            .lock()
            .clone()
            .expect("capture stream was never opened")
    }

    /// Deliver a buffer as if the hardware produced it.
    pub fn push_data(&self, bytes: &[u8]) {
        self.observer().on_data(bytes);
    }

    /// Make the next cooperative stop arrive as a device failure instead.
    pub fn fail_next_stop(&self, error: CaptureError) {
        *self.next_stop_error.lock() = Some(error);
    }

    /// Deliver a spontaneous device failure (disconnect mid-capture).
    pub fn trigger_failure(&self, error: CaptureError) {
        self.started.store(false, Ordering::SeqCst);
        self.observer().on_stopped(Some(error));
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }

    pub fn keep_alive_mode(&self) -> KeepAliveMode {
        *self.keep_alive.lock()
    }

    pub fn keep_alive_was_paused(&self) -> bool {
        self.keep_alive_paused_seen.load(Ordering::SeqCst)
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

struct MockCaptureStream {
    handle: Arc<MockStreamHandle>,
}

impl CaptureStream for MockCaptureStream {
    fn start(&mut self) -> Result<(), CaptureError> {
        self.handle.started.store(true, Ordering::SeqCst);
        self.handle.start_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn request_stop(&mut self) {
        self.handle.started.store(false, Ordering::SeqCst);
        // Deliver the notification off-thread, the way real hardware does.
        let handle = Arc::clone(&self.handle);
        thread::spawn(move || {
            let error = handle.next_stop_error.lock().take();
            handle.observer().on_stopped(error);
        });
    }
}

impl Drop for MockCaptureStream {
    fn drop(&mut self) {
        self.handle.dropped.store(true, Ordering::SeqCst);
    }
}

struct MockKeepAlive {
    handle: Arc<MockStreamHandle>,
}

impl KeepAliveStream for MockKeepAlive {
    fn play(&mut self) -> Result<(), CaptureError> {
        *self.handle.keep_alive.lock() = KeepAliveMode::Playing;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), CaptureError> {
        *self.handle.keep_alive.lock() = KeepAliveMode::Paused;
        self.handle
            .keep_alive_paused_seen
            .store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        *self.handle.keep_alive.lock() = KeepAliveMode::Stopped;
        Ok(())
    }
}

pub(crate) struct MockBackend {
    devices: Vec<AudioDevice>,
    handles: Mutex<HashMap<String, Arc<MockStreamHandle>>>,
    open_capture_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(devices: Vec<AudioDevice>) -> Self {
        Self {
            devices,
            handles: Mutex::new(HashMap::new()),
            open_capture_calls: AtomicUsize::new(0),
        }
    }

    pub fn stream(&self, id: &str) -> Arc<MockStreamHandle> {
        Arc::clone(
            self.handles
                .lock()
                .get(id)
                .unwrap_or_else(|| panic!("no stream opened for device {}", id)),
        )
    }

    pub fn open_capture_calls(&self) -> usize {
        self.open_capture_calls.load(Ordering::SeqCst)
    }

    fn handle_for(&self, id: &str) -> Arc<MockStreamHandle> {
        Arc::clone(
            self.handles
                .lock()
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(MockStreamHandle::new())),
        )
    }
}

impl AudioBackend for MockBackend {
    fn enumerate_devices(&self) -> Result<Vec<AudioDevice>, CaptureError> {
        Ok(self.devices.clone())
    }

    fn resolve_device(&self, id: &str) -> Result<AudioDevice, CaptureError> {
        self.devices
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or(CaptureError::DeviceNotAvailable)
    }

    fn open_capture(
        &self,
        device: &AudioDevice,
        observer: Arc<dyn CaptureObserver>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        self.open_capture_calls.fetch_add(1, Ordering::SeqCst);
        let handle = self.handle_for(&device.id);
        *handle.observer.lock() = Some(observer);
        Ok(Box::new(MockCaptureStream { handle }))
    }

    fn open_keep_alive(
        &self,
        device: &AudioDevice,
    ) -> Result<Box<dyn KeepAliveStream>, CaptureError> {
        let handle = self.handle_for(&device.id);
        *handle.keep_alive.lock() = KeepAliveMode::Stopped;
        Ok(Box::new(MockKeepAlive { handle }))
    }
}

/// In-memory sink exposing what was written through a shared buffer.
#[derive(Debug)]
pub(crate) struct MemorySink {
    path: PathBuf,
    data: Arc<Mutex<Vec<u8>>>,
    fail_on_write: bool,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from("memory"),
            data: Arc::new(Mutex::new(Vec::new())),
            fail_on_write: false,
            closed: false,
        }
    }

    pub fn failing_on_write() -> Self {
        Self {
            fail_on_write: true,
            ..Self::new()
        }
    }

    pub fn shared_data(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.data)
    }
}

impl OutputSink for MemorySink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        if self.fail_on_write {
            return Err(CaptureError::StorageError("simulated write failure".into()));
        }
        self.data.lock().extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn close(&mut self) -> Result<SinkArtifact, CaptureError> {
        if self.closed {
            return Err(CaptureError::StorageError("sink already closed".into()));
        }
        self.closed = true;
        Ok(SinkArtifact {
            path: self.path.clone(),
            bytes_written: self.data.lock().len() as u64,
            checksum: String::new(),
        })
    }
}

/// Delegate that records everything for later assertions.
#[derive(Default)]
pub(crate) struct RecordingDelegate {
    pub statuses: Mutex<Vec<String>>,
    pub failures: Mutex<Vec<(String, CaptureError)>>,
}

impl SessionDelegate for RecordingDelegate {
    fn on_status(&self, message: &str) {
        self.statuses.lock().push(message.to_string());
    }

    fn on_device_failure(&self, device: &str, error: &CaptureError) {
        self.failures.lock().push((device.to_string(), error.clone()));
    }
}
