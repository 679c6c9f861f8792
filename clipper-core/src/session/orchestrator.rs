use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::audio_models::AudioDevice;
use crate::models::clip_result::ClipResult;
use crate::models::config::SessionConfig;
use crate::models::error::{CaptureError, ClipFailure, SaveClipError};
use crate::session::engine::{DeviceCaptureEngine, FailureCallback};
use crate::storage::sink_factory::OutputSinkFactory;
use crate::traits::audio_backend::AudioBackend;
use crate::traits::session_delegate::SessionDelegate;

/// The active set of engines plus the configuration they share.
///
/// Exists from `start_capture` to `stop_capture`; the orchestrator holds at
/// most one, so overlapping sessions are impossible by construction.
struct CaptureSession {
    id: Uuid,
    config: SessionConfig,
    engines: Vec<Arc<DeviceCaptureEngine>>,
}

/// Owns the capture session and fans clip/stop operations out across its
/// engines.
///
/// Operations validate synchronously, then run on named background threads
/// and report through callbacks, so the presentation layer is never
/// blocked. Fan-outs issue every per-device request before joining any;
/// one device's failure never cancels another's operation.
pub struct CaptureOrchestrator {
    backend: Arc<dyn AudioBackend>,
    sinks: Arc<OutputSinkFactory>,
    delegate: Arc<dyn SessionDelegate>,
    session: Arc<Mutex<Option<CaptureSession>>>,
}

impl CaptureOrchestrator {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        sinks: OutputSinkFactory,
        delegate: Arc<dyn SessionDelegate>,
    ) -> Self {
        Self {
            backend,
            sinks: Arc::new(sinks),
            delegate,
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Fresh snapshot of every active device, both directions. Pure read;
    /// no session side effects.
    pub fn get_audio_sources(&self) -> Result<Vec<AudioDevice>, CaptureError> {
        self.backend.enumerate_devices()
    }

    pub fn has_active_session(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Start capturing on every device in `device_ids`.
    ///
    /// Configuration problems and an already-active session are rejected
    /// synchronously, before any engine exists. The session slot is claimed
    /// before this returns, so a racing second call sees `SessionActive`
    /// even while engines are still activating. `on_ready` fires once every
    /// engine is capturing.
    ///
    /// A device that fails to resolve or activate aborts the remaining
    /// list; earlier engines keep running and the failure is reported
    /// through the delegate (`stop_capture` cleans up either way).
    pub fn start_capture(
        &self,
        device_ids: &[String],
        config: SessionConfig,
        on_ready: impl FnOnce() + Send + 'static,
    ) -> Result<(), CaptureError> {
        if device_ids.is_empty() {
            return Err(CaptureError::ConfigurationFailed(
                "no devices selected".into(),
            ));
        }
        config.validate()?;
        if !self.sinks.supports(&config.output_format) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unknown output format: {}",
                config.output_format
            )));
        }

        {
            let mut slot = self.session.lock();
            if slot.is_some() {
                return Err(CaptureError::SessionActive);
            }
            *slot = Some(CaptureSession {
                id: Uuid::new_v4(),
                config: config.clone(),
                engines: Vec::new(),
            });
        }
        self.delegate.on_status("Starting...");

        let backend = Arc::clone(&self.backend);
        let delegate = Arc::clone(&self.delegate);
        let session = Arc::clone(&self.session);
        let ids: Vec<String> = device_ids.to_vec();
        let clip_length = config.clip_length_secs;

        thread::Builder::new()
            .name("capture-start".into())
            .spawn(move || {
                for id in ids {
                    let device = match backend.resolve_device(&id) {
                        Ok(device) => device,
                        Err(e) => {
                            delegate.on_device_failure(&id, &e);
                            return;
                        }
                    };
                    let name = device.name.clone();

                    let failure: FailureCallback = {
                        let delegate = Arc::clone(&delegate);
                        Arc::new(move |device: &AudioDevice, error: &CaptureError| {
                            delegate.on_device_failure(&device.name, error);
                        })
                    };

                    let engine =
                        match DeviceCaptureEngine::new(backend.as_ref(), device, clip_length, failure)
                        {
                            Ok(engine) => Arc::new(engine),
                            Err(e) => {
                                delegate.on_device_failure(&name, &e);
                                return;
                            }
                        };
                    if let Err(e) = engine.activate() {
                        delegate.on_device_failure(&name, &e);
                        return;
                    }

                    let mut slot = session.lock();
                    match slot.as_mut() {
                        Some(session) => session.engines.push(engine),
                        None => {
                            // The session was stopped while we were still
                            // starting; halt this engine instead of leaking
                            // it.
                            drop(slot);
                            if let Ok(done) = engine.stop() {
                                done.wait();
                            }
                            let _ = engine.dispose();
                            return;
                        }
                    }
                }
                on_ready();
            })
            .expect("failed to spawn capture start thread");

        Ok(())
    }

    /// Flush every engine's trailing window to a fresh file.
    ///
    /// Sinks are resolved per device from the session's folder and format,
    /// then every engine's clip is issued before any completion is joined.
    /// Per-device failures are aggregated into one report; devices that
    /// succeeded are already capturing again and are not rolled back.
    pub fn save_clip(
        &self,
        on_success: impl FnOnce(Vec<ClipResult>) + Send + 'static,
        on_error: impl FnOnce(SaveClipError) + Send + 'static,
    ) -> Result<(), CaptureError> {
        let (engines, config) = {
            let slot = self.session.lock();
            let session = slot.as_ref().ok_or(CaptureError::NoActiveSession)?;
            (session.engines.clone(), session.config.clone())
        };
        self.delegate.on_status("Saving clips...");

        let sinks = Arc::clone(&self.sinks);
        thread::Builder::new()
            .name("clip-save".into())
            .spawn(move || {
                let mut failures = Vec::new();
                let mut joins = Vec::new();

                for engine in &engines {
                    let device = engine.device();
                    let sink = match sinks.open_sink(&config.output_dir, &config.output_format, device)
                    {
                        Ok(sink) => sink,
                        Err(e) => {
                            failures.push(ClipFailure {
                                device: device.name.clone(),
                                error: e,
                            });
                            continue;
                        }
                    };
                    match engine.clip(sink) {
                        Ok(completion) => joins.push((device.name.clone(), completion)),
                        Err(e) => failures.push(ClipFailure {
                            device: device.name.clone(),
                            error: e,
                        }),
                    }
                }

                let mut results = Vec::new();
                for (device, completion) in joins {
                    match completion.wait() {
                        Ok(result) => results.push(result),
                        Err(error) => failures.push(ClipFailure { device, error }),
                    }
                }

                if failures.is_empty() {
                    on_success(results);
                } else {
                    on_error(SaveClipError { failures });
                }
            })
            .expect("failed to spawn clip save thread");

        Ok(())
    }

    /// Halt every engine, release their resources, and discard the session.
    ///
    /// Engines a failure already idled stop as no-ops, so this is the safe
    /// follow-up to a failed `save_clip`. With no active session it just
    /// reports finished.
    pub fn stop_capture(&self, on_finished: impl FnOnce() + Send + 'static) {
        let Some(session) = self.session.lock().take() else {
            on_finished();
            return;
        };
        self.delegate.on_status("Stopping...");
        log::debug!("stopping capture session {}", session.id);

        thread::Builder::new()
            .name("capture-stop".into())
            .spawn(move || {
                let mut joins = Vec::new();
                for engine in &session.engines {
                    match engine.stop() {
                        Ok(completion) => joins.push(completion),
                        Err(e) => {
                            log::warn!("stop rejected for {}: {}", engine.device().name, e)
                        }
                    }
                }
                for completion in joins {
                    completion.wait();
                }
                for engine in &session.engines {
                    if let Err(e) = engine.dispose() {
                        log::warn!("dispose failed for {}: {}", engine.device().name, e);
                    }
                }
                on_finished();
            })
            .expect("failed to spawn capture stop thread");
    }
}
