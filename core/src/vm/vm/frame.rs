use std::sync::Arc;

use crate::error::{FrameInfo, Thrown};
use crate::val::{Closure, ErrorKind, ErrorValue, Symbol, Val};
use crate::vm::upvalue::{UpvalueCell, UpvalueState};
use crate::vm::{Function, Reg};

use super::Vm;

/// Where a frame's return value goes.
#[derive(Debug)]
pub(super) enum ReturnTo {
    /// Absolute register of the caller.
    Register(usize),
    /// Ignore the returned value and store this one instead (`init`).
    Replace(usize, Val),
    /// Hand the value back to the Rust caller of [`Vm::call`].
    Host,
}

#[derive(Debug)]
pub(super) struct CallFrame {
    pub(super) closure: Arc<Closure>,
    pub(super) pc: usize,
    pub(super) base: usize,
    pub(super) ret: ReturnTo,
    pub(super) receiver: Val,
}

/// Pending non-local control action.
#[derive(Debug)]
pub(super) enum Completion {
    Normal,
    Throw(Thrown),
    Return(Val),
    Break { label: Option<Symbol>, value: Val },
    Continue { label: Option<Symbol>, value: Option<Val> },
}

#[derive(Debug)]
pub(super) enum HandlerKind {
    Catch(u16),
    Finally(u16),
    /// A finally body is running; resumes the action when it ends.
    FinallyActive(Completion),
    Loop(u16),
}

#[derive(Debug)]
pub(super) struct Handler {
    pub(super) kind: HandlerKind,
    /// Index of the owning frame.
    pub(super) frame: usize,
}

impl Vm {
    #[inline]
    pub(super) fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no active call frame")
    }

    #[inline]
    pub(super) fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active call frame")
    }

    #[inline]
    pub(super) fn func(&self) -> &Function {
        &self.frame().closure.func
    }

    #[inline]
    pub(super) fn reg(&self, r: Reg) -> &Val {
        &self.regs[self.frame().base + r as usize]
    }

    #[inline]
    pub(super) fn set_reg(&mut self, r: Reg, v: Val) {
        let idx = self.frame().base + r as usize;
        self.regs[idx] = v;
    }

    /// Values of `count` consecutive registers starting at `start`.
    pub(super) fn reg_range(&self, start: Reg, count: usize) -> Vec<Val> {
        let from = self.frame().base + start as usize;
        self.regs[from..from + count].to_vec()
    }

    #[inline]
    pub(super) fn konst(&self, k: u16) -> &Val {
        &self.func().consts[k as usize]
    }

    pub(super) fn konst_symbol(&self, k: u16) -> Symbol {
        match self.konst(k) {
            Val::Symbol(sym) => *sym,
            other => panic!("constant k{k} is not a symbol: {}", other.inspect()),
        }
    }

    #[inline]
    pub(super) fn jump(&mut self, ofs: i32) {
        let frame = self.frame_mut();
        frame.pc = (frame.pc as isize + ofs as isize) as usize;
    }

    /// Pushes a frame for `closure` with its arguments in a fresh register
    /// window above every live register.
    pub(super) fn push_frame(
        &mut self,
        closure: Arc<Closure>,
        receiver: Val,
        args: &[Val],
        ret: ReturnTo,
    ) -> Result<(), Thrown> {
        let func = &closure.func;
        if args.len() != func.arity as usize {
            return Err(ErrorValue::argument_count(args.len(), func.arity as usize).into());
        }
        if self.frames.len() >= self.max_call_depth {
            return Err(ErrorValue::new(
                ErrorKind::StackOverflowError,
                format!("stack level too deep ({} frames)", self.frames.len()),
            )
            .into());
        }
        let base = self.regs.len();
        let n_regs = (func.n_regs as usize).max(args.len());
        self.regs.extend_from_slice(args);
        self.regs.resize(base + n_regs, Val::Nil);
        tracing::trace!(target: "ember::vm", name = %func.name, depth = self.frames.len() + 1, "push frame");
        self.frames.push(CallFrame {
            closure,
            pc: 0,
            base,
            ret,
            receiver,
        });
        Ok(())
    }

    /// Pops the top frame, closing its captured registers first.
    pub(super) fn pop_frame(&mut self) -> CallFrame {
        let frame = self.frames.pop().expect("no active call frame");
        self.close_upvalues(frame.base);
        self.regs.truncate(frame.base);
        tracing::trace!(target: "ember::vm", name = %frame.closure.func.name, depth = self.frames.len(), "pop frame");
        frame
    }

    /// Stack trace of the active frames, outermost first.
    pub(super) fn capture_trace(&self) -> Vec<FrameInfo> {
        self.frames
            .iter()
            .map(|frame| {
                let func = &frame.closure.func;
                FrameInfo {
                    name: func.name.clone(),
                    location: func.location.clone(),
                    line: func.line_at(frame.pc.saturating_sub(1)),
                }
            })
            .collect()
    }

    pub(super) fn attach_trace(&self, mut thrown: Thrown) -> Thrown {
        if thrown.trace.is_empty() {
            thrown.trace = Arc::from(self.capture_trace());
        }
        thrown
    }

    // Upvalues

    /// Cell for an absolute slot of this coroutine, shared by every closure
    /// capturing the slot while it is open.
    pub(super) fn capture_upvalue(&mut self, slot: usize) -> Arc<UpvalueCell> {
        match self.open_upvalues.binary_search_by_key(&slot, |(s, _)| *s) {
            Ok(i) => self.open_upvalues[i].1.clone(),
            Err(i) => {
                let cell = Arc::new(UpvalueCell::open(self.coroutine, slot));
                self.open_upvalues.insert(i, (slot, cell.clone()));
                cell
            }
        }
    }

    /// Closes every open cell at or above absolute slot `from`.
    pub(super) fn close_upvalues(&mut self, from: usize) {
        while let Some((slot, _)) = self.open_upvalues.last() {
            if *slot < from {
                break;
            }
            if let Some((slot, cell)) = self.open_upvalues.pop() {
                cell.close(self.regs[slot].clone());
            }
        }
    }

    pub(super) fn read_upvalue(&self, cell: &UpvalueCell) -> Result<Val, Thrown> {
        match cell.state() {
            UpvalueState::Closed(v) => Ok(v),
            UpvalueState::Open { owner, slot } if owner == self.coroutine => Ok(self.regs[slot].clone()),
            UpvalueState::Open { .. } => Err(foreign_upvalue().into()),
        }
    }

    pub(super) fn write_upvalue(&mut self, cell: &UpvalueCell, v: Val) -> Result<(), Thrown> {
        if let Some(slot) = cell.open_slot(self.coroutine) {
            self.regs[slot] = v;
            return Ok(());
        }
        if cell.set_closed(v) {
            Ok(())
        } else {
            Err(foreign_upvalue().into())
        }
    }

    /// Copy of a closure whose cells still open in this coroutine are
    /// replaced by closed snapshots, so it can run on another stack.
    pub(super) fn detach_closure(&self, closure: &Arc<Closure>) -> Arc<Closure> {
        if !closure.upvalues.iter().any(|cell| cell.open_slot(self.coroutine).is_some()) {
            return closure.clone();
        }
        let cells = closure
            .upvalues
            .iter()
            .map(|cell| match cell.open_slot(self.coroutine) {
                Some(slot) => Arc::new(UpvalueCell::closed(self.regs[slot].clone())),
                None => cell.clone(),
            })
            .collect();
        Arc::new(Closure::new(closure.func.clone(), cells))
    }
}

fn foreign_upvalue() -> ErrorValue {
    ErrorValue::new(
        ErrorKind::Error,
        "captured variable is still live in another coroutine",
    )
}
