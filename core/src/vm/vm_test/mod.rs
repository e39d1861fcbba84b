pub(super) use std::sync::Arc;

pub(super) use crate::error::Thrown;
pub(super) use crate::rt::CaptureBuffer;
pub(super) use crate::val::{ErrorKind, Val};
pub(super) use crate::vm::{
    CaptureSpec, Environment, Function, FunctionBuilder, Op, Vm,
    pattern::{Pattern, SeqKind},
};

/// Environment with captured output.
pub(super) struct Harness {
    pub(super) out: CaptureBuffer,
    pub(super) err: CaptureBuffer,
    pub(super) env: Arc<Environment>,
}

pub(super) fn harness() -> Harness {
    let out = CaptureBuffer::new();
    let err = CaptureBuffer::new();
    let env = Arc::new(Environment::with_sinks(Arc::new(out.clone()), Arc::new(err.clone())));
    Harness { out, err, env }
}

impl Harness {
    pub(super) fn vm(&self) -> Vm {
        Vm::new(self.env.clone())
    }

    pub(super) fn run(&self, main: Function) -> Result<Val, Thrown> {
        self.vm().run_main(Arc::new(main))
    }
}

pub(super) fn main_builder() -> FunctionBuilder {
    FunctionBuilder::new("<main>", "main.ebr", 0)
}

/// Asserts an error value of `kind` with `message`.
pub(super) fn assert_error(thrown: &Thrown, kind: ErrorKind, message: &str) {
    match &thrown.value {
        Val::Error(err) => {
            assert_eq!(err.kind, kind, "unexpected error: {}", err);
            assert_eq!(err.message.as_ref(), message);
        }
        other => panic!("expected {kind:?}, got {}", other.inspect()),
    }
}

mod arithmetic;
mod closures;
mod control_flow;
mod exceptions;
mod patterns;
