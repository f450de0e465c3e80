//! Scoped suppression of program output.
//!
//! Code under test never writes to the process streams directly; it writes
//! through an [`OutputSink`]. Suppression is entered with [`OutputSink::suppress`]
//! and undone when the returned guard drops, so every exit path restores it.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared switch between forwarding and discarding program output.
#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    enabled: bool,
    suppressed: Arc<AtomicBool>,
}

impl OutputSink {
    /// Create a sink. With `enabled == false` suppression requests are ignored
    /// and output is always forwarded.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            suppressed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A sink that discards everything, permanently.
    pub fn muted() -> Self {
        Self {
            enabled: true,
            suppressed: Arc::new(AtomicBool::new(true)),
        }
    }

    /// True while a suppression guard is live.
    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst)
    }

    /// Suppress output until the guard is dropped.
    pub fn suppress(&self) -> OutputGuard {
        let previous = if self.enabled {
            self.suppressed.swap(true, Ordering::SeqCst)
        } else {
            self.suppressed.load(Ordering::SeqCst)
        };
        OutputGuard {
            suppressed: Arc::clone(&self.suppressed),
            previous,
        }
    }

    /// Writer that forwards to stdout unless suppressed.
    pub fn stdout(&self) -> SinkWriter<io::Stdout> {
        SinkWriter {
            sink: self.clone(),
            inner: io::stdout(),
        }
    }

    /// Writer that forwards to stderr unless suppressed.
    pub fn stderr(&self) -> SinkWriter<io::Stderr> {
        SinkWriter {
            sink: self.clone(),
            inner: io::stderr(),
        }
    }
}

/// Restores the previous suppression state on drop.
#[derive(Debug)]
#[must_use = "output is restored as soon as the guard is dropped"]
pub struct OutputGuard {
    suppressed: Arc<AtomicBool>,
    previous: bool,
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        self.suppressed.store(self.previous, Ordering::SeqCst);
    }
}

/// `Write` adapter gated by an [`OutputSink`].
#[derive(Debug)]
pub struct SinkWriter<W> {
    sink: OutputSink,
    inner: W,
}

impl<W: Write> Write for SinkWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.sink.is_suppressed() {
            return Ok(buf.len());
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.sink.is_suppressed() {
            return Ok(());
        }
        self.inner.flush()
    }
}
