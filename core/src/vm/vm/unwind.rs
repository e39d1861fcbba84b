//! Non-local control flow.
//!
//! `throw`, `return`, `break` and `continue` all become a [`Completion`]
//! that walks the handler stack of the current frame from the innermost
//! entry outwards. Catch clauses can stop a throw, loop handlers stop a
//! matching break or continue, and finally handlers suspend the action while
//! their body runs; `EndFinally` resumes it. When a frame runs out of
//! handlers the frame is popped and the walk continues in the caller.

use std::sync::Arc;

use crate::error::Thrown;
use crate::val::{Symbol, Val};
use crate::vm::Reg;
use crate::vm::pattern::match_value;

use super::Vm;
use super::exec::Step;
use super::frame::{Completion, Handler, HandlerKind, ReturnTo};

impl Vm {
    pub(super) fn enter_try(&mut self, t: u16) {
        let frame = self.frames.len() - 1;
        let spec = &self.func().try_blocks[t as usize];
        let (has_finally, has_catch) = (spec.finally.is_some(), !spec.catches.is_empty());
        if has_finally {
            self.handlers.push(Handler {
                kind: HandlerKind::Finally(t),
                frame,
            });
        }
        if has_catch {
            self.handlers.push(Handler {
                kind: HandlerKind::Catch(t),
                frame,
            });
        }
    }

    /// Normal exit from the protected body or a catch clause.
    pub(super) fn leave_try(&mut self, t: u16) {
        let frame = self.frames.len() - 1;
        if matches!(self.handlers.last(), Some(Handler { kind: HandlerKind::Catch(c), frame: f }) if *c == t && *f == frame)
        {
            self.handlers.pop();
        }
        if let Some(target) = self.func().try_blocks[t as usize].finally {
            match self.handlers.pop() {
                Some(Handler {
                    kind: HandlerKind::Finally(f),
                    ..
                }) if f == t => {}
                other => panic!("unbalanced handler stack at LeaveTry t{t}: {other:?}"),
            }
            self.handlers.push(Handler {
                kind: HandlerKind::FinallyActive(Completion::Normal),
                frame,
            });
            self.frame_mut().pc = target;
        }
    }

    pub(super) fn end_finally(&mut self) -> Step {
        match self.handlers.pop() {
            Some(Handler {
                kind: HandlerKind::FinallyActive(Completion::Normal),
                ..
            }) => Step::Next,
            Some(Handler {
                kind: HandlerKind::FinallyActive(pending),
                ..
            }) => Step::Unwind(pending),
            other => panic!("unbalanced handler stack at EndFinally: {other:?}"),
        }
    }

    pub(super) fn enter_loop(&mut self, l: u16) {
        let result = self.func().loops[l as usize].result;
        self.set_reg(result, Val::Nil);
        let frame = self.frames.len() - 1;
        self.handlers.push(Handler {
            kind: HandlerKind::Loop(l),
            frame,
        });
    }

    pub(super) fn leave_loop(&mut self) {
        match self.handlers.pop() {
            Some(Handler {
                kind: HandlerKind::Loop(_),
                ..
            }) => {}
            other => panic!("unbalanced handler stack at LeaveLoop: {other:?}"),
        }
    }

    /// Drives a non-local action until some handler resumes normal
    /// execution, a host frame returns (`Step::Done`) or a throw escapes the
    /// host frame (`Err`).
    pub(super) fn complete(&mut self, mut action: Completion) -> Result<Step, Thrown> {
        loop {
            let frame_idx = self.frames.len() - 1;
            while self.handlers.last().is_some_and(|h| h.frame == frame_idx) {
                let Some(handler) = self.handlers.pop() else {
                    break;
                };
                match handler.kind {
                    HandlerKind::Catch(t) => {
                        if let Completion::Throw(thrown) = action {
                            action = match self.try_catch(t, &thrown) {
                                Ok(true) => return Ok(Step::Next),
                                Ok(false) => Completion::Throw(thrown),
                                // A throwing guard replaces the value in flight.
                                Err(replaced) => Completion::Throw(replaced),
                            };
                        }
                    }
                    HandlerKind::Finally(t) => {
                        let spec = &self.func().try_blocks[t as usize];
                        let (scope_base, target) = (spec.scope_base, spec.finally);
                        let Some(target) = target else {
                            panic!("finally handler without finally body (t{t})");
                        };
                        let base = self.frame().base;
                        self.close_upvalues(base + scope_base as usize);
                        tracing::debug!(target: "ember::vm", pending = ?action_name(&action), "running finally");
                        self.handlers.push(Handler {
                            kind: HandlerKind::FinallyActive(action),
                            frame: frame_idx,
                        });
                        self.frame_mut().pc = target;
                        return Ok(Step::Next);
                    }
                    // Leaving a finally body early: the new action wins.
                    HandlerKind::FinallyActive(_) => {}
                    HandlerKind::Loop(l) => match action {
                        Completion::Break { label, value } if self.loop_matches(l, label) => {
                            let spec = &self.func().loops[l as usize];
                            let (result, body_base, target) = (spec.result, spec.body_base, spec.break_target);
                            let base = self.frame().base;
                            self.close_upvalues(base + body_base as usize);
                            self.set_reg(result, value);
                            self.frame_mut().pc = target;
                            return Ok(Step::Next);
                        }
                        Completion::Continue { label, value } if self.loop_matches(l, label) => {
                            let spec = &self.func().loops[l as usize];
                            let (result, body_base, target) = (spec.result, spec.body_base, spec.continue_target);
                            let base = self.frame().base;
                            self.close_upvalues(base + body_base as usize);
                            if let Some(value) = value {
                                self.set_reg(result, value);
                            }
                            self.handlers.push(handler_for_loop(l, frame_idx));
                            self.frame_mut().pc = target;
                            return Ok(Step::Next);
                        }
                        other => action = other,
                    },
                }
            }

            match action {
                Completion::Normal => unreachable!("normal completion never unwinds"),
                Completion::Return(value) => {
                    let frame = self.pop_frame();
                    return Ok(match frame.ret {
                        ReturnTo::Register(slot) => {
                            self.regs[slot] = value;
                            Step::Next
                        }
                        ReturnTo::Replace(slot, replacement) => {
                            self.regs[slot] = replacement;
                            Step::Next
                        }
                        ReturnTo::Host => Step::Done(value),
                    });
                }
                Completion::Throw(thrown) => {
                    let frame = self.pop_frame();
                    tracing::debug!(
                        target: "ember::vm",
                        frame = %frame.closure.func.name,
                        value = %thrown.value.inspect(),
                        "unwinding frame"
                    );
                    if matches!(frame.ret, ReturnTo::Host) {
                        return Err(thrown);
                    }
                    action = Completion::Throw(thrown);
                }
                Completion::Break { .. } | Completion::Continue { .. } => {
                    panic!("`break`/`continue` outside of a loop in `{}`", self.func().name)
                }
            }
        }
    }

    fn loop_matches(&self, l: u16, label: Option<Symbol>) -> bool {
        match label {
            None => true,
            Some(label) => self.func().loops[l as usize].label == Some(label),
        }
    }

    /// Tries the catch clauses of try block `t` in order. On a match the
    /// bindings are written and execution moves to the clause body.
    fn try_catch(&mut self, t: u16, thrown: &Thrown) -> Result<bool, Thrown> {
        let func = self.frame().closure.func.clone();
        let spec = &func.try_blocks[t as usize];
        for clause in &spec.catches {
            let pattern = &func.patterns[clause.pattern as usize];
            let mut binds = Vec::new();
            let matched = match_value(pattern, &thrown.value, &mut binds, &mut |proto: u16, binds: &[(Reg, Val)]| {
                self.eval_guard(proto, binds)
            })?;
            if matched {
                tracing::debug!(target: "ember::vm", value = %thrown.value.inspect(), "caught");
                let base = self.frame().base;
                self.close_upvalues(base + spec.scope_base as usize);
                self.write_binds(&binds);
                self.frame_mut().pc = clause.target;
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(super) fn write_binds(&mut self, binds: &[(Reg, Val)]) {
        for (reg, value) in binds {
            self.set_reg(*reg, value.clone());
        }
    }

    /// Writes the bindings so far, then calls the guard closure built from
    /// `proto` in the current frame.
    pub(super) fn eval_guard(&mut self, proto: u16, binds: &[(Reg, Val)]) -> Result<bool, Thrown> {
        self.write_binds(binds);
        let guard = self.instantiate(proto);
        let receiver = self.frame().receiver.clone();
        Ok(self.call(&Val::Closure(Arc::new(guard)), receiver, &[])?.is_truthy())
    }
}

fn handler_for_loop(l: u16, frame: usize) -> Handler {
    Handler {
        kind: HandlerKind::Loop(l),
        frame,
    }
}

fn action_name(action: &Completion) -> &'static str {
    match action {
        Completion::Normal => "normal",
        Completion::Throw(_) => "throw",
        Completion::Return(_) => "return",
        Completion::Break { .. } => "break",
        Completion::Continue { .. } => "continue",
    }
}
