use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use mp3lame_encoder::{
    max_required_buffer_size, Bitrate, Builder, Encoder, FlushNoGap, InterleavedPcm, MonoPcm,
    Quality,
};

use crate::models::audio_models::SampleFormat;
use crate::models::error::CaptureError;
use crate::storage::sha256_file;
use crate::traits::output_sink::{OutputSink, SinkArtifact};

/// Lossy MP3 sink backed by LAME.
///
/// The encoder lives on a dedicated worker thread fed over a channel; the
/// sink itself stays `Send` and the drain path never blocks on encoding.
/// Dropping the sender (on `close`) tells the worker to flush the encoder
/// tail and finalize the file.
#[derive(Debug)]
pub struct Mp3Sink {
    path: PathBuf,
    tx: Option<mpsc::Sender<Vec<u8>>>,
    worker: Option<JoinHandle<Result<u64, CaptureError>>>,
}

impl Mp3Sink {
    pub fn create(path: &Path, format: &SampleFormat, bit_rate: u32) -> Result<Self, CaptureError> {
        if format.bits_per_sample != 16 && format.bits_per_sample != 32 {
            return Err(CaptureError::EncodingFailed(format!(
                "unsupported sample depth for mp3: {} bits",
                format.bits_per_sample
            )));
        }
        if format.channels == 0 || format.channels > 2 {
            return Err(CaptureError::EncodingFailed(format!(
                "unsupported channel count for mp3: {}",
                format.channels
            )));
        }

        let file = File::create(path)
            .map_err(|e| CaptureError::StorageError(format!("failed to create file: {}", e)))?;

        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), CaptureError>>(1);

        let worker_format = *format;
        let worker = thread::Builder::new()
            .name("mp3-encoder".into())
            .spawn(move || encoder_worker(rx, file, worker_format, bit_rate, ready_tx))
            .map_err(|e| {
                CaptureError::Unknown(format!("failed to spawn mp3 encoder thread: {}", e))
            })?;

        // The encoder is created on the worker; surface its failure here so
        // a bad format never produces a half-born sink.
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(CaptureError::EncodingFailed(
                    "mp3 encoder thread exited during startup".into(),
                ))
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            tx: Some(tx),
            worker: Some(worker),
        })
    }
}

impl OutputSink for Mp3Sink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| CaptureError::StorageError("sink already closed".into()))?;
        tx.send(data.to_vec())
            .map_err(|_| CaptureError::StorageError("mp3 encoder thread exited early".into()))
    }

    fn flush(&mut self) -> Result<(), CaptureError> {
        // LAME buffers internally; the real flush happens on close.
        Ok(())
    }

    fn close(&mut self) -> Result<SinkArtifact, CaptureError> {
        // Hanging up the channel is the end-of-stream signal.
        self.tx.take();
        let worker = self
            .worker
            .take()
            .ok_or_else(|| CaptureError::StorageError("sink already closed".into()))?;

        let bytes_written = worker
            .join()
            .map_err(|_| CaptureError::EncodingFailed("mp3 encoder thread panicked".into()))??;

        Ok(SinkArtifact {
            path: self.path.clone(),
            bytes_written,
            checksum: sha256_file(&self.path)?,
        })
    }
}

fn encoder_worker(
    rx: Receiver<Vec<u8>>,
    mut file: File,
    format: SampleFormat,
    bit_rate: u32,
    ready: SyncSender<Result<(), CaptureError>>,
) -> Result<u64, CaptureError> {
    let mut encoder = match build_encoder(&format, bit_rate) {
        Ok(encoder) => {
            let _ = ready.send(Ok(()));
            encoder
        }
        Err(e) => {
            let _ = ready.send(Err(e.clone()));
            return Err(e);
        }
    };

    let frame_size = format.block_align() as usize;
    let float_input = format.bits_per_sample == 32;
    let mut pending: Vec<u8> = Vec::new();
    let mut written = 0u64;

    while let Ok(chunk) = rx.recv() {
        let samples = take_frames(&mut pending, &chunk, frame_size, float_input);
        written += encode_block(&mut encoder, &samples, format.channels, &mut file)?;
    }

    written += flush_encoder(&mut encoder, &mut file)?;
    file.flush()
        .map_err(|e| CaptureError::StorageError(e.to_string()))?;
    Ok(written)
}

fn build_encoder(format: &SampleFormat, bit_rate: u32) -> Result<Encoder, CaptureError> {
    let mut builder = Builder::new()
        .ok_or_else(|| CaptureError::EncodingFailed("failed to initialize LAME".into()))?;
    builder
        .set_num_channels(format.channels as u8)
        .map_err(lame_err)?;
    builder
        .set_sample_rate(format.sample_rate)
        .map_err(lame_err)?;
    builder.set_brate(nearest_bitrate(bit_rate)).map_err(lame_err)?;
    builder.set_quality(Quality::Best).map_err(lame_err)?;
    builder.build().map_err(lame_err)
}

fn lame_err<E: std::fmt::Debug>(e: E) -> CaptureError {
    CaptureError::EncodingFailed(format!("lame: {:?}", e))
}

/// Map the raw PCM bit rate handed to sink constructors onto LAME's ladder.
///
/// The derived rate (rate x bits x channels) far exceeds MP3's ceiling, so
/// real captures land on 320 kbps; the ladder matters for synthetic formats.
fn nearest_bitrate(bits_per_second: u32) -> Bitrate {
    let kbps = bits_per_second / 1000;
    let ladder = [
        (8, Bitrate::Kbps8),
        (16, Bitrate::Kbps16),
        (24, Bitrate::Kbps24),
        (32, Bitrate::Kbps32),
        (40, Bitrate::Kbps40),
        (48, Bitrate::Kbps48),
        (64, Bitrate::Kbps64),
        (80, Bitrate::Kbps80),
        (96, Bitrate::Kbps96),
        (112, Bitrate::Kbps112),
        (128, Bitrate::Kbps128),
        (160, Bitrate::Kbps160),
        (192, Bitrate::Kbps192),
        (224, Bitrate::Kbps224),
        (256, Bitrate::Kbps256),
        (320, Bitrate::Kbps320),
    ];
    let mut chosen = Bitrate::Kbps8;
    for (threshold, rate) in ladder {
        if kbps >= threshold {
            chosen = rate;
        }
    }
    chosen
}

/// Carve whole frames out of `pending + incoming` as i16 samples, leaving
/// any partial frame buffered for the next chunk.
///
/// Drain chunks split at arbitrary byte offsets (the ring wraps mid-sample),
/// so the carry buffer is what keeps sample boundaries intact.
fn take_frames(
    pending: &mut Vec<u8>,
    incoming: &[u8],
    frame_size: usize,
    float_input: bool,
) -> Vec<i16> {
    pending.extend_from_slice(incoming);
    let whole = pending.len() / frame_size * frame_size;

    let sample_size = if float_input { 4 } else { 2 };
    let mut samples = Vec::with_capacity(whole / sample_size);
    for chunk in pending[..whole].chunks_exact(sample_size) {
        if float_input {
            let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            samples.push((value.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
        } else {
            samples.push(i16::from_le_bytes([chunk[0], chunk[1]]));
        }
    }
    pending.drain(..whole);
    samples
}

fn encode_block(
    encoder: &mut Encoder,
    pcm: &[i16],
    channels: u16,
    file: &mut File,
) -> Result<u64, CaptureError> {
    if pcm.is_empty() {
        return Ok(0);
    }
    let per_channel = pcm.len() / channels as usize;
    let mut out: Vec<u8> = Vec::with_capacity(max_required_buffer_size(per_channel));
    let size = if channels == 1 {
        encoder.encode(MonoPcm(pcm), out.spare_capacity_mut())
    } else {
        encoder.encode(InterleavedPcm(pcm), out.spare_capacity_mut())
    }
    .map_err(lame_err)?;
    // SAFETY: `encode` initialized `size` bytes of the spare capacity.
    unsafe { out.set_len(size) };

    file.write_all(&out)
        .map_err(|e| CaptureError::StorageError(format!("write failed: {}", e)))?;
    Ok(size as u64)
}

fn flush_encoder(encoder: &mut Encoder, file: &mut File) -> Result<u64, CaptureError> {
    let mut out: Vec<u8> = Vec::with_capacity(max_required_buffer_size(0));
    let size = encoder
        .flush::<FlushNoGap>(out.spare_capacity_mut())
        .map_err(lame_err)?;
    // SAFETY: `flush` initialized `size` bytes of the spare capacity.
    unsafe { out.set_len(size) };

    file.write_all(&out)
        .map_err(|e| CaptureError::StorageError(format!("write failed: {}", e)))?;
    Ok(size as u64)
}
