use crate::models::error::CaptureError;

/// Receives a capture stream's asynchronous events.
///
/// Supplied once when the stream is opened; both methods fire on the
/// backend's capture thread, never on the caller's.
pub trait CaptureObserver: Send + Sync {
    /// A buffer of raw audio bytes in the device's native format.
    ///
    /// Must not block or allocate; the hardware is waiting.
    fn on_data(&self, bytes: &[u8]);

    /// Capture halted. `None` means the stop that was requested completed
    /// cooperatively; `Some` means the device or driver failed.
    fn on_stopped(&self, error: Option<CaptureError>);
}

/// One hardware capture binding on a device.
pub trait CaptureStream: Send {
    /// Begin delivering buffers to the observer. Restartable: may be called
    /// again after an earlier stop has been confirmed via `on_stopped`.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Request a cooperative stop. Returns immediately; the outcome arrives
    /// as `on_stopped` on the capture thread.
    fn request_stop(&mut self);
}

/// Silent playback stream that keeps a render endpoint's capture callbacks
/// flowing.
///
/// Paused in lockstep with a clip rather than torn down, so resuming is
/// cheap.
pub trait KeepAliveStream: Send {
    fn play(&mut self) -> Result<(), CaptureError>;
    fn pause(&mut self) -> Result<(), CaptureError>;
    fn stop(&mut self) -> Result<(), CaptureError>;
}
