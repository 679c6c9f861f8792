//! # clipper-windows
//!
//! Windows WASAPI backend for clipper.
//!
//! Provides:
//! - `WasapiBackend` — `clipper_core::AudioBackend` implementation
//! - `DeviceEnumerator` — endpoint enumeration via the MMDevice API
//! - `WasapiCaptureStream` — capture for microphone endpoints and
//!   render-endpoint loopback
//! - `WasapiKeepAlive` — silent render stream that keeps loopback capture
//!   callbacks flowing
//! - `permissions` — Windows microphone privacy check
//!
//! ## Platform Requirements
//! - Windows 10 1703+ (build 15063)
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use clipper_core::{CaptureOrchestrator, OutputSinkFactory};
//! use clipper_windows::WasapiBackend;
//!
//! let orchestrator = CaptureOrchestrator::new(
//!     Arc::new(WasapiBackend::new()),
//!     OutputSinkFactory::with_default_formats(),
//!     delegate,
//! );
//! ```

#[cfg(target_os = "windows")]
pub mod backend;
#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod keep_alive;
#[cfg(target_os = "windows")]
pub mod permissions;
#[cfg(target_os = "windows")]
pub mod wasapi_stream;

#[cfg(target_os = "windows")]
pub use backend::WasapiBackend;
#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use keep_alive::WasapiKeepAlive;
#[cfg(target_os = "windows")]
pub use wasapi_stream::WasapiCaptureStream;
