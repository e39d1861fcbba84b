//! Errors propagating out of the interpreter.

use std::fmt::{self, Write};
use std::sync::Arc;

use crate::val::{ErrorValue, Val};

/// One call frame of a captured stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub name: Arc<str>,
    pub location: Arc<str>,
    pub line: u32,
}

/// A thrown value travelling up the stack, together with the trace captured
/// where it was thrown. Any value can be thrown, not only errors.
#[derive(Debug, Clone)]
pub struct Thrown {
    pub value: Val,
    /// Outermost frame first.
    pub trace: Arc<[FrameInfo]>,
}

impl Thrown {
    pub fn new(value: Val, trace: Vec<FrameInfo>) -> Self {
        Self {
            value,
            trace: Arc::from(trace),
        }
    }

    /// A thrown value without trace, for errors raised outside any frame.
    pub fn bare(value: Val) -> Self {
        Self::new(value, Vec::new())
    }

    pub fn is_error_kind(&self, class_name: &str) -> bool {
        self.value.is_instance_of(class_name)
    }

    /// Report written to the error sink for an uncaught value:
    ///
    /// ```text
    /// Stack trace (the most recent call is last)
    ///   0: main.ebr:4, in `<main>`
    ///   1: main.ebr:2, in `boom`
    /// Error! Uncaught thrown value: :foo
    /// ```
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.trace.is_empty() {
            out.push_str("Stack trace (the most recent call is last)\n");
            for (i, frame) in self.trace.iter().enumerate() {
                let _ = writeln!(out, "  {i}: {}:{}, in `{}`", frame.location, frame.line, frame.name);
            }
        }
        let _ = writeln!(out, "{self}");
        out
    }
}

impl From<ErrorValue> for Thrown {
    fn from(err: ErrorValue) -> Self {
        Thrown::bare(err.into_val())
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error! Uncaught thrown value: {}", self.value.inspect())
    }
}

impl std::error::Error for Thrown {}
