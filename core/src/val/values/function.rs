use std::fmt;
use std::sync::Arc;

use crate::error::Thrown;
use crate::vm::{Function, UpvalueCell, Vm};

use super::Val;

/// Native function: receives the executing VM, the receiver (`nil` for plain
/// function calls) and the positional arguments.
pub type RustFunction = fn(vm: &mut Vm, receiver: &Val, args: &[Val]) -> Result<Val, Thrown>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: Arc<str>,
    pub func: RustFunction,
}

impl NativeFunction {
    pub fn new(name: impl Into<Arc<str>>, func: RustFunction) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// A function prototype bound to the upvalue cells it captured.
pub struct Closure {
    pub func: Arc<Function>,
    pub upvalues: Box<[Arc<UpvalueCell>]>,
}

impl Closure {
    pub fn new(func: Arc<Function>, upvalues: Vec<Arc<UpvalueCell>>) -> Self {
        Self {
            func,
            upvalues: upvalues.into_boxed_slice(),
        }
    }

    /// A closure with no captures, used for top-level chunks.
    pub fn plain(func: Arc<Function>) -> Self {
        Self::new(func, Vec::new())
    }
}

// Captured cells can reference the closure itself; print only the name.
impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.func.name)
            .field("arity", &self.func.arity)
            .field("upvalues", &self.upvalues.len())
            .finish()
    }
}
