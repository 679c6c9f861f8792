pub mod audio_backend;
pub mod capture_stream;
pub mod output_sink;
pub mod session_delegate;
