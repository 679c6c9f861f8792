use crate::models::error::CaptureError;
use crate::traits::output_sink::OutputSink;

/// Fixed-capacity byte ring holding the trailing window of a capture stream.
///
/// Single writer (the capture callback), single reader (the drain-on-stop
/// handler); the two never run concurrently because capture is fully halted
/// before a drain begins. Wrap in `parking_lot::Mutex` for cross-thread
/// access; the lock is uncontended under that discipline.
///
/// Overflow behavior: oldest bytes are overwritten, so the buffer always
/// retains the most recent `capacity` bytes of the logical stream.
#[derive(Debug)]
pub struct RingBuffer {
    buffer: Vec<u8>,
    cursor: usize,
    wrapped: bool,
}

impl RingBuffer {
    /// `capacity` must be positive; engines derive it from the device's
    /// byte rate and reject zero before construction.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "ring buffer capacity must be positive");
        Self {
            buffer: vec![0; capacity],
            cursor: 0,
            wrapped: false,
        }
    }

    /// Append bytes at the cursor, wrapping to offset 0 whenever the write
    /// reaches the end of the buffer.
    ///
    /// Writes longer than the capacity wrap repeatedly, leaving only their
    /// tail. Zero-length writes are no-ops. Never allocates.
    pub fn write_circular(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let remaining = self.buffer.len() - self.cursor;
            let n = data.len().min(remaining);
            self.buffer[self.cursor..self.cursor + n].copy_from_slice(&data[..n]);
            self.cursor += n;
            if self.cursor == self.buffer.len() {
                // An exact fill counts as a wrap: the cursor returns to 0
                // and the whole buffer is valid history.
                self.cursor = 0;
                self.wrapped = true;
            }
            data = &data[n..];
        }
    }

    /// Write the retained window to `sink` in chronological order.
    ///
    /// Wrapped: bytes `[cursor, capacity)` then `[0, cursor)` — exactly the
    /// last `capacity` bytes of the logical stream. Never wrapped: bytes
    /// `[0, cursor)`. The result is independent of how the original writes
    /// were chunked.
    pub fn drain(&self, sink: &mut dyn OutputSink) -> Result<(), CaptureError> {
        if self.wrapped {
            sink.write(&self.buffer[self.cursor..])?;
        }
        if self.cursor > 0 {
            sink.write(&self.buffer[..self.cursor])?;
        }
        Ok(())
    }

    /// Forget all buffered data. Called only on (re)activation.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.wrapped = false;
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes that a drain would currently produce.
    pub fn buffered_bytes(&self) -> usize {
        if self.wrapped {
            self.buffer.len()
        } else {
            self.cursor
        }
    }

    pub fn is_wrapped(&self) -> bool {
        self.wrapped
    }
}
