//! Fragment sinks for observing a stream as it is reconstructed.

use std::io::Write;
use std::sync::Mutex;

/// Receives each displayed fragment as the listener reconstructs a stream.
pub trait FragmentSink: Send + Sync {
    fn on_fragment(&self, chunk: &str);
}

/// Discards fragments. Useful when only the final text matters.
pub struct NullSink;

impl FragmentSink for NullSink {
    fn on_fragment(&self, _chunk: &str) {}
}

/// Prints fragments to stdout as they arrive, without newlines, so the
/// response renders as one continuous stream.
pub struct ConsoleSink;

impl FragmentSink for ConsoleSink {
    fn on_fragment(&self, chunk: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "{chunk}");
        let _ = stdout.flush();
    }
}

/// Buffers fragments in memory, in arrival order.
pub struct BufferSink {
    chunks: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self {
            chunks: Mutex::new(Vec::new()),
        }
    }

    /// Drain all buffered fragments.
    pub fn drain(&self) -> Vec<String> {
        let mut guard = self.chunks.lock().expect("lock poisoned");
        std::mem::take(&mut *guard)
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BufferSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentSink for BufferSink {
    fn on_fragment(&self, chunk: &str) {
        self.chunks.lock().expect("lock poisoned").push(chunk.to_string());
    }
}
