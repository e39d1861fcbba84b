//! Output sinks for `print`/`println` and uncaught-error reports.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

pub trait OutputSink: Send + Sync {
    fn write_str(&self, s: &str) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_str(&self, s: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(s.as_bytes())?;
        out.flush()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl OutputSink for StderrSink {
    fn write_str(&self, s: &str) -> io::Result<()> {
        io::stderr().lock().write_all(s.as_bytes())
    }
}

/// In-memory sink; clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct CaptureBuffer(Arc<Mutex<String>>);

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns the captured text and clears the buffer.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl OutputSink for CaptureBuffer {
    fn write_str(&self, s: &str) -> io::Result<()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push_str(s);
        Ok(())
    }
}
