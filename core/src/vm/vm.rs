mod call;
mod exec;
mod frame;
mod unwind;

use std::sync::Arc;

use crate::config::VmConfig;
use crate::error::Thrown;
use crate::val::{Closure, Val};
use crate::vm::Function;
use crate::vm::context::{Environment, Spawn};
use crate::vm::upvalue::{CoroutineId, UpvalueCell, next_coroutine_id};

use frame::{CallFrame, Handler};

const DEFAULT_MAX_CALL_DEPTH: usize = 10_000;
/// Run loops nested through [`Vm::call`] (natives calling back, user `==`,
/// catch guards, inline `go`).
const MAX_HOST_DEPTH: usize = 200;

/// Executor for one coroutine.
///
/// Owns the register file, the call frames and the handler stack of a
/// single call stack; nothing here is shared with other coroutines except
/// the [`Environment`] and closed upvalue cells. The scheduler creates one
/// `Vm` per coroutine.
pub struct Vm {
    env: Arc<Environment>,
    max_call_depth: usize,
    host_depth: usize,
    coroutine: CoroutineId,
    regs: Vec<Val>,
    frames: Vec<CallFrame>,
    handlers: Vec<Handler>,
    /// Open cells of this coroutine, ascending by absolute slot.
    open_upvalues: Vec<(usize, Arc<UpvalueCell>)>,
    spawner: Option<Arc<dyn Spawn>>,
}

impl Vm {
    pub fn new(env: Arc<Environment>) -> Self {
        Self {
            env,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            host_depth: 0,
            coroutine: next_coroutine_id(),
            regs: Vec::new(),
            frames: Vec::new(),
            handlers: Vec::new(),
            open_upvalues: Vec::new(),
            spawner: None,
        }
    }

    pub fn with_config(env: Arc<Environment>, config: &VmConfig) -> Self {
        let mut vm = Self::new(env);
        vm.max_call_depth = config.max_call_depth;
        vm
    }

    /// Routes `go` to a scheduler instead of running the coroutine inline.
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawn>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn set_max_call_depth(&mut self, depth: usize) {
        self.max_call_depth = depth;
    }

    pub fn env(&self) -> &Arc<Environment> {
        &self.env
    }

    pub fn coroutine_id(&self) -> CoroutineId {
        self.coroutine
    }

    /// Number of active call frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Runs a top-level chunk to completion.
    pub fn run_main(&mut self, func: Arc<Function>) -> Result<Val, Thrown> {
        let main = Val::Closure(Arc::new(Closure::plain(func)));
        self.call(&main, Val::Nil, &[])
    }
}
