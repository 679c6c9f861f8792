use crate::models::error::CaptureError;

/// Notification channel from the orchestrator to the presentation layer.
///
/// Methods are called from background threads; implementations should
/// marshal to the UI thread if needed.
pub trait SessionDelegate: Send + Sync {
    /// Human-readable progress text ("Starting...", "Saving clips...").
    fn on_status(&self, message: &str);

    /// A device failed unrecoverably. The session cannot continue on that
    /// device; the presentation layer is expected to request a full stop.
    fn on_device_failure(&self, device: &str, error: &CaptureError);
}
