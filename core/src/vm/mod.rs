//! Register bytecode VM
//!
//! Instruction set, assembler, pattern primitives, upvalue cells and the
//! per-coroutine executor.

mod builder;
mod bytecode;
mod context;
mod natives;
pub mod pattern;
mod upvalue;
#[allow(clippy::module_inception)]
mod vm;

pub use builder::{FunctionBuilder, Label, LoopHandle, TryHandle};
pub use bytecode::*;
pub use context::{ANY_CLASS, Environment, Spawn};
pub use upvalue::{CoroutineId, UpvalueCell, UpvalueState};
pub use vm::Vm;

#[cfg(test)]
mod vm_test;
