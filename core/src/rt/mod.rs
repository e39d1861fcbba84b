//! Coroutine runtime: the worker-pool scheduler and the output sinks.

mod runtime;
mod sink;

pub use runtime::{Scheduler, SchedulerStats, ShutdownMode};
pub use sink::{CaptureBuffer, OutputSink, StderrSink, StdoutSink};
