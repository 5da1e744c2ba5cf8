//! Line buffer that batches progress output.
//!
//! Lines accumulate until `depth` of them are pending, then go out as a single
//! chunk to the flush callback. Everything flushed is also kept so the whole
//! transcript can be saved once the command finishes.

use std::fmt;

/// Default number of pending lines that triggers a flush.
pub const DEFAULT_DEPTH: usize = 5;

type FlushCallback = Box<dyn FnMut(&str) + Send>;

/// Batches progress lines and retains the flushed history.
pub struct LogBuffer {
    pending: Vec<String>,
    flushed: String,
    depth: usize,
    on_flush: Option<FlushCallback>,
}

impl LogBuffer {
    /// Create a buffer with no flush callback.
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self {
            pending: Vec::new(),
            flushed: String::new(),
            depth: depth.max(1),
            on_flush: None,
        }
    }

    /// Create a buffer that hands every flushed chunk to `on_flush`.
    #[must_use]
    pub fn with_callback(depth: usize, on_flush: impl FnMut(&str) + Send + 'static) -> Self {
        Self {
            on_flush: Some(Box::new(on_flush)),
            ..Self::new(depth)
        }
    }

    /// Append one line, flushing when the depth threshold is reached.
    pub fn write(&mut self, line: impl fmt::Display) {
        self.pending.push(format!("{line}\n"));
        if self.pending.len() >= self.depth {
            self.flush();
        }
    }

    /// Flush pending lines as one chunk. Does nothing when nothing is pending.
    pub fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let chunk = self.pending.concat();
        self.pending.clear();
        self.flushed.push_str(&chunk);
        if let Some(on_flush) = self.on_flush.as_mut() {
            on_flush(&chunk);
        }
    }

    /// Everything flushed so far. Pending lines are not included.
    #[must_use]
    pub fn get_all(&self) -> &str {
        &self.flushed
    }

    /// Number of lines waiting for the next flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Configured flush threshold.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH)
    }
}

impl fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBuffer")
            .field("pending", &self.pending.len())
            .field("flushed_bytes", &self.flushed.len())
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}
