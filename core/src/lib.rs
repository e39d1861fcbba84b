//! Execution core of the Ember scripting language.
//!
//! The compiler hands this crate [`vm::Function`] chunks; the core runs them
//! on per-coroutine [`vm::Vm`]s, either directly or through the worker-pool
//! [`rt::Scheduler`].

pub mod config;
pub mod error;
pub mod op;
pub mod rt;
pub mod util;
pub mod val;
pub mod vm;

pub use config::VmConfig;
pub use error::{FrameInfo, Thrown};
pub use rt::{Scheduler, ShutdownMode};
pub use val::{ErrorKind, Val};
pub use vm::{Environment, Function, FunctionBuilder, Vm};
