/// Capture engine state machine.
///
/// State transitions:
/// ```text
/// idle → capturing → draining → capturing   (after a clip)
///                             → idle        (after a stop)
/// ```
/// Draining is entered for both clip and stop; the pending operation decides
/// where it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Capturing,
    Draining,
}

impl EngineState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn is_draining(&self) -> bool {
        matches!(self, Self::Draining)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Draining => "draining",
        }
    }
}

/// What the engine will do when the hardware confirms its stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingOp {
    #[default]
    None,
    Clip,
    Stop,
}
