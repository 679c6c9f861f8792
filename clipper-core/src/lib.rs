//! # clipper-core
//!
//! Platform-agnostic clip capture core.
//!
//! Continuously captures live audio from selected devices into fixed-length
//! in-memory ring buffers and flushes ("clips") each buffer's trailing
//! window to durable files on demand, without interrupting capture.
//! Platform backends (Windows WASAPI via `clipper-windows`) implement the
//! `AudioBackend` trait and plug into the generic `CaptureOrchestrator`.
//!
//! ## Architecture
//!
//! ```text
//! clipper-core (this crate)
//! ├── traits/       ← AudioBackend, CaptureStream, CaptureObserver, OutputSink, SessionDelegate
//! ├── models/       ← CaptureError, EngineState, AudioDevice, SessionConfig, ClipResult
//! ├── processing/   ← RingBuffer, WAV header generation
//! ├── session/      ← DeviceCaptureEngine, CaptureOrchestrator
//! └── storage/      ← WavSink, Mp3Sink, OutputSinkFactory
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{AudioDevice, DeviceDirection, SampleFormat};
pub use models::clip_result::ClipResult;
pub use models::config::{parse_clip_length, SessionConfig};
pub use models::error::{CaptureError, ClipFailure, SaveClipError};
pub use models::state::{EngineState, PendingOp};
pub use processing::ring_buffer::RingBuffer;
pub use session::engine::{ClipCompletion, DeviceCaptureEngine, FailureCallback, StopCompletion};
pub use session::orchestrator::CaptureOrchestrator;
pub use storage::mp3_sink::Mp3Sink;
pub use storage::sink_factory::{OutputSinkFactory, SinkConstructor};
pub use storage::wav_sink::WavSink;
pub use traits::audio_backend::AudioBackend;
pub use traits::capture_stream::{CaptureObserver, CaptureStream, KeepAliveStream};
pub use traits::output_sink::{OutputSink, SinkArtifact};
pub use traits::session_delegate::SessionDelegate;
