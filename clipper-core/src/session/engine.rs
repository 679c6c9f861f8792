use std::mem;
use std::sync::mpsc;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::AudioDevice;
use crate::models::clip_result::ClipResult;
use crate::models::error::CaptureError;
use crate::models::state::{EngineState, PendingOp};
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::audio_backend::AudioBackend;
use crate::traits::capture_stream::{CaptureObserver, CaptureStream, KeepAliveStream};
use crate::traits::output_sink::OutputSink;

/// Invoked when the device fails at runtime (disconnect, driver fault).
/// Fires on the backend's capture thread.
pub type FailureCallback = Arc<dyn Fn(&AudioDevice, &CaptureError) + Send + Sync>;

/// Resolves once a clip has been drained to its sink and capture has
/// resumed.
///
/// If the device fails before the clip completes, the engine drops its end
/// of the channel instead of resolving; `wait` maps that disconnect to a
/// `DeviceFailed` error so joining callers never hang.
#[derive(Debug)]
pub struct ClipCompletion {
    rx: mpsc::Receiver<Result<ClipResult, CaptureError>>,
}

impl ClipCompletion {
    pub fn wait(self) -> Result<ClipResult, CaptureError> {
        match self.rx.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(CaptureError::DeviceFailed(
                "capture failed before the clip completed".into(),
            )),
        }
    }
}

/// Resolves once the engine has halted. A disconnect means the device
/// failed first, which still leaves the engine halted, so `wait` treats it
/// as done.
pub struct StopCompletion {
    rx: mpsc::Receiver<()>,
}

impl StopCompletion {
    pub fn wait(self) {
        let _ = self.rx.recv();
    }
}

struct Shared {
    state: EngineState,
    pending: PendingOp,
    sink: Option<Box<dyn OutputSink>>,
    clip_done: Option<mpsc::SyncSender<Result<ClipResult, CaptureError>>>,
    stop_done: Option<mpsc::SyncSender<()>>,
}

struct Streams {
    capture: Option<Box<dyn CaptureStream>>,
    keep_alive: Option<Box<dyn KeepAliveStream>>,
}

/// Continuous capture of one device into a fixed-size trailing window.
///
/// Owns one ring buffer sized from the device's native byte rate and the
/// session's clip length, one capture stream, and (for devices that need
/// one) a keep-alive stream. State machine:
///
/// ```text
/// idle --activate--> capturing --clip--> draining --drained--> capturing
///                              --stop--> draining --halted---> idle
/// ```
///
/// The ring is written by the backend's capture thread and drained on that
/// same thread after the hardware confirms its stop, so writer and reader
/// never run concurrently.
pub struct DeviceCaptureEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    device: AudioDevice,
    ring: Mutex<RingBuffer>,
    shared: Mutex<Shared>,
    streams: Mutex<Streams>,
    on_failure: FailureCallback,
}

impl DeviceCaptureEngine {
    /// Open the device's streams and size the ring buffer. The capacity is
    /// computed once here and never changes for the engine's lifetime.
    pub fn new(
        backend: &dyn AudioBackend,
        device: AudioDevice,
        clip_length_secs: u32,
        on_failure: FailureCallback,
    ) -> Result<Self, CaptureError> {
        let capacity = device.format.bytes_per_second() as usize * clip_length_secs as usize;
        if capacity == 0 {
            return Err(CaptureError::ConfigurationFailed(format!(
                "device {} reports a zero byte rate",
                device.name
            )));
        }

        let inner = Arc::new(EngineInner {
            device,
            ring: Mutex::new(RingBuffer::new(capacity)),
            shared: Mutex::new(Shared {
                state: EngineState::Idle,
                pending: PendingOp::None,
                sink: None,
                clip_done: None,
                stop_done: None,
            }),
            streams: Mutex::new(Streams {
                capture: None,
                keep_alive: None,
            }),
            on_failure,
        });

        let observer: Arc<dyn CaptureObserver> = inner.clone();
        let capture = backend.open_capture(&inner.device, observer)?;
        let keep_alive = if inner.device.requires_keep_alive {
            Some(backend.open_keep_alive(&inner.device)?)
        } else {
            None
        };
        {
            let mut streams = inner.streams.lock();
            streams.capture = Some(capture);
            streams.keep_alive = keep_alive;
        }

        Ok(Self { inner })
    }

    pub fn device(&self) -> &AudioDevice {
        &self.inner.device
    }

    pub fn state(&self) -> EngineState {
        self.inner.shared.lock().state
    }

    /// Begin capturing. Idle only; the ring is reset so the window starts
    /// empty.
    pub fn activate(&self) -> Result<(), CaptureError> {
        {
            let mut shared = self.inner.shared.lock();
            if !shared.state.is_idle() {
                return Err(invalid_state("activate", "idle", shared.state));
            }
            shared.state = EngineState::Capturing;
        }
        self.inner.ring.lock().reset();

        if let Err(e) = self.inner.start_streams() {
            self.inner.shared.lock().state = EngineState::Idle;
            return Err(e);
        }
        Ok(())
    }

    /// Flush the trailing window into `sink` and resume capturing.
    ///
    /// Capturing only. The hardware stop is cooperative: this returns as
    /// soon as the stop is requested, and the completion resolves after the
    /// drain has finished and capture is running again.
    pub fn clip(&self, sink: Box<dyn OutputSink>) -> Result<ClipCompletion, CaptureError> {
        let (tx, rx) = mpsc::sync_channel(1);
        {
            let mut shared = self.inner.shared.lock();
            if !shared.state.is_capturing() {
                return Err(invalid_state("clip", "capturing", shared.state));
            }
            shared.state = EngineState::Draining;
            shared.pending = PendingOp::Clip;
            shared.sink = Some(sink);
            shared.clip_done = Some(tx);
        }
        self.inner.halt_streams(false);
        Ok(ClipCompletion { rx })
    }

    /// Halt capture without draining.
    ///
    /// Idle engines complete immediately as a no-op; an engine that is
    /// already draining rejects the call (there is no mid-clip
    /// cancellation).
    pub fn stop(&self) -> Result<StopCompletion, CaptureError> {
        let (tx, rx) = mpsc::sync_channel(1);
        {
            let mut shared = self.inner.shared.lock();
            match shared.state {
                EngineState::Idle => {
                    let _ = tx.send(());
                    return Ok(StopCompletion { rx });
                }
                EngineState::Draining => {
                    return Err(invalid_state("stop", "capturing", shared.state));
                }
                EngineState::Capturing => {
                    shared.state = EngineState::Draining;
                    shared.pending = PendingOp::Stop;
                    shared.stop_done = Some(tx);
                }
            }
        }
        self.inner.halt_streams(true);
        Ok(StopCompletion { rx })
    }

    /// Release the capture binding and keep-alive stream. Idle only;
    /// idempotent.
    pub fn dispose(&self) -> Result<(), CaptureError> {
        {
            let shared = self.inner.shared.lock();
            if !shared.state.is_idle() {
                return Err(invalid_state("dispose", "idle", shared.state));
            }
        }
        // Dropping a stream may join its backend thread; do it outside the
        // lock so a late capture callback can never deadlock against us.
        let (capture, keep_alive) = {
            let mut streams = self.inner.streams.lock();
            (streams.capture.take(), streams.keep_alive.take())
        };
        drop(capture);
        drop(keep_alive);
        Ok(())
    }
}

impl EngineInner {
    fn start_streams(&self) -> Result<(), CaptureError> {
        let mut streams = self.streams.lock();
        let capture = streams
            .capture
            .as_mut()
            .ok_or_else(|| CaptureError::Unknown("engine already disposed".into()))?;
        capture.start()?;
        if let Some(keep_alive) = streams.keep_alive.as_mut() {
            keep_alive.play()?;
        }
        Ok(())
    }

    /// Request the cooperative hardware stop. For a clip the keep-alive
    /// stream is only paused so resuming is cheap; for a stop it is halted
    /// outright.
    fn halt_streams(&self, full: bool) {
        let mut streams = self.streams.lock();
        if let Some(capture) = streams.capture.as_mut() {
            capture.request_stop();
        }
        if let Some(keep_alive) = streams.keep_alive.as_mut() {
            let result = if full { keep_alive.stop() } else { keep_alive.pause() };
            if let Err(e) = result {
                log::warn!("keep-alive stream for {} failed to halt: {}", self.device.name, e);
            }
        }
    }

    fn stop_keep_alive(&self) {
        let mut streams = self.streams.lock();
        if let Some(keep_alive) = streams.keep_alive.as_mut() {
            if let Err(e) = keep_alive.stop() {
                log::warn!("keep-alive stream for {} failed to stop: {}", self.device.name, e);
            }
        }
    }

    /// The hardware confirmed a cooperative stop; perform whatever was
    /// pending. Runs on the backend's capture thread.
    fn handle_cooperative_stop(&self) {
        let (pending, sink, clip_done, stop_done) = {
            let mut shared = self.shared.lock();
            (
                mem::take(&mut shared.pending),
                shared.sink.take(),
                shared.clip_done.take(),
                shared.stop_done.take(),
            )
        };

        match pending {
            PendingOp::Clip => {
                let outcome = self.finish_clip(sink);
                if let Some(tx) = clip_done {
                    let _ = tx.send(outcome);
                }
            }
            PendingOp::Stop => {
                self.shared.lock().state = EngineState::Idle;
                if let Some(tx) = stop_done {
                    let _ = tx.send(());
                }
            }
            PendingOp::None => {
                log::warn!(
                    "capture for {} stopped with no operation pending",
                    self.device.name
                );
                self.shared.lock().state = EngineState::Idle;
            }
        }
    }

    /// Drain the window, finalize the sink, and resume capture. Any failure
    /// leaves the engine idle rather than half-resumed.
    fn finish_clip(&self, sink: Option<Box<dyn OutputSink>>) -> Result<ClipResult, CaptureError> {
        let mut sink =
            sink.ok_or_else(|| CaptureError::Unknown("clip requested without a sink".into()))?;

        let drained_bytes;
        let drain_outcome = {
            let ring = self.ring.lock();
            drained_bytes = ring.buffered_bytes();
            ring.drain(sink.as_mut())
        };
        let artifact = drain_outcome
            .and_then(|_| sink.flush())
            .and_then(|_| sink.close());

        match artifact {
            Ok(artifact) => {
                log::debug!(
                    "clipped {} bytes from {} to {}",
                    drained_bytes,
                    self.device.name,
                    artifact.path.display()
                );
                // Resume right away; the gap is only the stop/start latency.
                self.ring.lock().reset();
                match self.start_streams() {
                    Ok(()) => {
                        self.shared.lock().state = EngineState::Capturing;
                        let duration =
                            drained_bytes as f64 / self.device.format.bytes_per_second() as f64;
                        Ok(ClipResult::new(&self.device, artifact, duration))
                    }
                    Err(e) => {
                        self.shared.lock().state = EngineState::Idle;
                        self.stop_keep_alive();
                        Err(e)
                    }
                }
            }
            Err(e) => {
                log::error!("clip for {} failed: {}", self.device.name, e);
                self.shared.lock().state = EngineState::Idle;
                self.stop_keep_alive();
                Err(e)
            }
        }
    }

    /// The hardware stopped with an error. Completion handles are dropped,
    /// not resolved; recovery belongs to the orchestrator.
    fn handle_failure(&self, error: CaptureError) {
        let (_sink, _clip_done, _stop_done) = {
            let mut shared = self.shared.lock();
            shared.pending = PendingOp::None;
            shared.state = EngineState::Idle;
            (
                shared.sink.take(),
                shared.clip_done.take(),
                shared.stop_done.take(),
            )
        };
        self.stop_keep_alive();
        log::error!("capture for {} failed: {}", self.device.name, error);
        (self.on_failure)(&self.device, &error);
        // The completion senders drop here, unresolved: waiters observe the
        // disconnect only after the failure has been reported.
    }
}

impl CaptureObserver for EngineInner {
    fn on_data(&self, bytes: &[u8]) {
        self.ring.lock().write_circular(bytes);
    }

    fn on_stopped(&self, error: Option<CaptureError>) {
        match error {
            None => self.handle_cooperative_stop(),
            Some(e) => self.handle_failure(e),
        }
    }
}

fn invalid_state(operation: &'static str, expected: &'static str, actual: EngineState) -> CaptureError {
    CaptureError::InvalidState {
        operation,
        expected,
        actual: actual.name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::testing::{render_device, test_device, KeepAliveMode, MemorySink, MockBackend};

    fn no_failure() -> FailureCallback {
        Arc::new(|device, error| panic!("unexpected failure on {}: {}", device.name, error))
    }

    fn recording_failures() -> (FailureCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let callback: FailureCallback = Arc::new(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (callback, count)
    }

    #[test]
    fn activate_starts_capture() {
        let backend = MockBackend::new(vec![test_device("mic")]);
        let engine =
            DeviceCaptureEngine::new(&backend, test_device("mic"), 1, no_failure()).unwrap();

        assert!(engine.state().is_idle());
        engine.activate().unwrap();
        assert!(engine.state().is_capturing());
        assert_eq!(backend.stream("mic").start_count(), 1);
    }

    #[test]
    fn activate_rejected_while_capturing() {
        let backend = MockBackend::new(vec![test_device("mic")]);
        let engine =
            DeviceCaptureEngine::new(&backend, test_device("mic"), 1, no_failure()).unwrap();

        engine.activate().unwrap();
        assert!(matches!(
            engine.activate(),
            Err(CaptureError::InvalidState { .. })
        ));
    }

    #[test]
    fn clip_drains_window_and_resumes() {
        let backend = MockBackend::new(vec![test_device("mic")]);
        let engine =
            DeviceCaptureEngine::new(&backend, test_device("mic"), 1, no_failure()).unwrap();
        engine.activate().unwrap();

        backend.stream("mic").push_data(&[1, 2, 3, 4, 5]);

        let sink = MemorySink::new();
        let written = sink.shared_data();
        let result = engine.clip(Box::new(sink)).unwrap().wait().unwrap();

        assert_eq!(*written.lock(), vec![1, 2, 3, 4, 5]);
        assert!(engine.state().is_capturing());
        assert_eq!(backend.stream("mic").start_count(), 2);
        assert_eq!(result.bytes_written, 5);
        assert!(result.duration_secs > 0.0);

        // The window starts over after a clip.
        backend.stream("mic").push_data(&[9]);
        let sink = MemorySink::new();
        let written = sink.shared_data();
        engine.clip(Box::new(sink)).unwrap().wait().unwrap();
        assert_eq!(*written.lock(), vec![9]);
    }

    #[test]
    fn clip_rejected_unless_capturing() {
        let backend = MockBackend::new(vec![test_device("mic")]);
        let engine =
            DeviceCaptureEngine::new(&backend, test_device("mic"), 1, no_failure()).unwrap();

        let err = engine.clip(Box::new(MemorySink::new())).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidState { .. }));
    }

    #[test]
    fn clip_failure_leaves_engine_idle() {
        let backend = MockBackend::new(vec![test_device("mic")]);
        let engine =
            DeviceCaptureEngine::new(&backend, test_device("mic"), 1, no_failure()).unwrap();
        engine.activate().unwrap();
        backend.stream("mic").push_data(&[1, 2, 3]);

        let err = engine
            .clip(Box::new(MemorySink::failing_on_write()))
            .unwrap()
            .wait()
            .unwrap_err();
        assert!(matches!(err, CaptureError::StorageError(_)));
        assert!(engine.state().is_idle());
        // No restart happened.
        assert_eq!(backend.stream("mic").start_count(), 1);
    }

    #[test]
    fn stop_halts_without_draining() {
        let backend = MockBackend::new(vec![test_device("mic")]);
        let engine =
            DeviceCaptureEngine::new(&backend, test_device("mic"), 1, no_failure()).unwrap();
        engine.activate().unwrap();
        backend.stream("mic").push_data(&[1, 2, 3]);

        engine.stop().unwrap().wait();
        assert!(engine.state().is_idle());
        assert!(!backend.stream("mic").is_started());
    }

    #[test]
    fn stop_on_idle_engine_is_a_noop_twice() {
        let backend = MockBackend::new(vec![test_device("mic")]);
        let engine =
            DeviceCaptureEngine::new(&backend, test_device("mic"), 1, no_failure()).unwrap();

        engine.stop().unwrap().wait();
        engine.stop().unwrap().wait();
        assert!(engine.state().is_idle());
        assert_eq!(backend.stream("mic").start_count(), 0);
    }

    #[test]
    fn keep_alive_pauses_for_clip_and_stops_for_stop() {
        let backend = MockBackend::new(vec![render_device("speakers")]);
        let engine =
            DeviceCaptureEngine::new(&backend, render_device("speakers"), 1, no_failure()).unwrap();

        engine.activate().unwrap();
        assert_eq!(backend.stream("speakers").keep_alive_mode(), KeepAliveMode::Playing);

        backend.stream("speakers").push_data(&[1]);
        engine
            .clip(Box::new(MemorySink::new()))
            .unwrap()
            .wait()
            .unwrap();
        // Paused during the drain, playing again after the resume.
        assert_eq!(backend.stream("speakers").keep_alive_mode(), KeepAliveMode::Playing);
        assert!(backend.stream("speakers").keep_alive_was_paused());

        engine.stop().unwrap().wait();
        assert_eq!(backend.stream("speakers").keep_alive_mode(), KeepAliveMode::Stopped);
    }

    #[test]
    fn capture_device_gets_no_keep_alive() {
        let backend = MockBackend::new(vec![test_device("mic")]);
        let engine =
            DeviceCaptureEngine::new(&backend, test_device("mic"), 1, no_failure()).unwrap();
        engine.activate().unwrap();
        assert_eq!(backend.stream("mic").keep_alive_mode(), KeepAliveMode::Absent);
    }

    #[test]
    fn device_failure_fires_callback_and_abandons_completion() {
        let backend = MockBackend::new(vec![test_device("mic")]);
        let (on_failure, failures) = recording_failures();
        let engine =
            DeviceCaptureEngine::new(&backend, test_device("mic"), 1, on_failure).unwrap();
        engine.activate().unwrap();

        backend
            .stream("mic")
            .fail_next_stop(CaptureError::DeviceNotAvailable);
        let err = engine
            .clip(Box::new(MemorySink::new()))
            .unwrap()
            .wait()
            .unwrap_err();

        assert!(matches!(err, CaptureError::DeviceFailed(_)));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(engine.state().is_idle());

        // The failed engine is stoppable and disposable afterwards.
        engine.stop().unwrap().wait();
        engine.dispose().unwrap();
    }

    #[test]
    fn dispose_requires_idle_and_is_idempotent() {
        let backend = MockBackend::new(vec![test_device("mic")]);
        let engine =
            DeviceCaptureEngine::new(&backend, test_device("mic"), 1, no_failure()).unwrap();

        engine.activate().unwrap();
        assert!(matches!(
            engine.dispose(),
            Err(CaptureError::InvalidState { .. })
        ));

        engine.stop().unwrap().wait();
        engine.dispose().unwrap();
        engine.dispose().unwrap();
    }

    #[test]
    fn ring_capacity_follows_native_format() {
        let backend = MockBackend::new(vec![test_device("mic")]);
        let device = test_device("mic");
        let engine = DeviceCaptureEngine::new(&backend, device.clone(), 3, no_failure()).unwrap();
        engine.activate().unwrap();

        // Overfill: drain must cap at bytes_per_second * seconds.
        let capacity = device.format.bytes_per_second() as usize * 3;
        backend.stream("mic").push_data(&vec![7u8; capacity + 100]);

        let sink = MemorySink::new();
        let written = sink.shared_data();
        engine.clip(Box::new(sink)).unwrap().wait().unwrap();
        assert_eq!(written.lock().len(), capacity);
    }
}
