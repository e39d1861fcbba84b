use std::sync::Arc;

use crate::error::Thrown;
use crate::op::{BinOp, UnaryOp};
use crate::val::{ClassDef, Closure, ErrorKind, ErrorValue, Symbol, Val, read_lock, write_lock};
use crate::vm::pattern::match_value;
use crate::vm::{CaptureSpec, Op, Reg};

use super::Vm;
use super::frame::Completion;

pub(super) enum Step {
    Next,
    /// Start a non-local action from the current frame.
    Unwind(Completion),
    /// The host frame that started this run loop returned.
    Done(Val),
}

impl Vm {
    /// Fetch/execute loop. Runs until the innermost host frame returns or a
    /// throw escapes it.
    pub(super) fn run(&mut self) -> Result<Val, Thrown> {
        loop {
            let op = {
                let frame = self.frame_mut();
                match frame.closure.func.code.get(frame.pc) {
                    Some(op) => {
                        let op = *op;
                        frame.pc += 1;
                        op
                    }
                    None => Op::ReturnNil,
                }
            };
            let step = match self.dispatch(op) {
                Ok(Step::Unwind(action)) => self.complete(action)?,
                Ok(step) => step,
                Err(thrown) => {
                    let thrown = self.attach_trace(thrown);
                    self.complete(Completion::Throw(thrown))?
                }
            };
            if let Step::Done(value) = step {
                return Ok(value);
            }
        }
    }

    fn dispatch(&mut self, op: Op) -> Result<Step, Thrown> {
        match op {
            Op::LoadK(dst, k) => {
                let v = self.konst(k).clone();
                self.set_reg(dst, v);
            }
            Op::LoadNil(dst) => self.set_reg(dst, Val::Nil),
            Op::LoadBool(dst, b) => self.set_reg(dst, Val::Bool(b)),
            Op::LoadSelf(dst) => {
                let receiver = self.frame().receiver.clone();
                self.set_reg(dst, receiver);
            }
            Op::Move(dst, src) => {
                let v = self.reg(src).clone();
                self.set_reg(dst, v);
            }
            Op::LoadUpvalue { dst, idx } => {
                let cell = self.frame().closure.upvalues[idx as usize].clone();
                let v = self.read_upvalue(&cell)?;
                self.set_reg(dst, v);
            }
            Op::StoreUpvalue { idx, src } => {
                let cell = self.frame().closure.upvalues[idx as usize].clone();
                let v = self.reg(src).clone();
                self.write_upvalue(&cell, v)?;
            }
            Op::CloseUpvalues { from } => {
                let from = self.frame().base + from as usize;
                self.close_upvalues(from);
            }
            Op::LoadGlobal(dst, k) => {
                let name = self.konst_symbol(k);
                let Some(v) = self.env.global(name) else {
                    return Err(
                        ErrorValue::new(ErrorKind::Error, format!("undefined global variable `{}`", name.name())).into(),
                    );
                };
                self.set_reg(dst, v);
            }
            Op::DefineGlobal(k, src) => {
                let name = self.konst_symbol(k);
                self.env.define_global(name, self.reg(src).clone());
            }
            Op::Add(d, a, b) => self.binary(BinOp::Add, d, a, b)?,
            Op::Sub(d, a, b) => self.binary(BinOp::Sub, d, a, b)?,
            Op::Mul(d, a, b) => self.binary(BinOp::Mul, d, a, b)?,
            Op::Div(d, a, b) => self.binary(BinOp::Div, d, a, b)?,
            Op::Mod(d, a, b) => self.binary(BinOp::Mod, d, a, b)?,
            Op::Pow(d, a, b) => self.binary(BinOp::Pow, d, a, b)?,
            Op::BitAnd(d, a, b) => self.binary(BinOp::BitAnd, d, a, b)?,
            Op::BitOr(d, a, b) => self.binary(BinOp::BitOr, d, a, b)?,
            Op::BitXor(d, a, b) => self.binary(BinOp::BitXor, d, a, b)?,
            Op::Shl(d, a, b) => self.binary(BinOp::Shl, d, a, b)?,
            Op::Shr(d, a, b) => self.binary(BinOp::Shr, d, a, b)?,
            Op::LogicShl(d, a, b) => self.binary(BinOp::LogicShl, d, a, b)?,
            Op::LogicShr(d, a, b) => self.binary(BinOp::LogicShr, d, a, b)?,
            Op::CmpEq(d, a, b) => {
                let eq = self.values_equal(a, b)?;
                self.set_reg(d, Val::Bool(eq));
            }
            Op::CmpNe(d, a, b) => {
                let eq = self.values_equal(a, b)?;
                self.set_reg(d, Val::Bool(!eq));
            }
            Op::CmpLt(d, a, b) => self.binary(BinOp::Lt, d, a, b)?,
            Op::CmpLe(d, a, b) => self.binary(BinOp::Le, d, a, b)?,
            Op::CmpGt(d, a, b) => self.binary(BinOp::Gt, d, a, b)?,
            Op::CmpGe(d, a, b) => self.binary(BinOp::Ge, d, a, b)?,
            Op::LaxEq(d, a, b) => self.binary(BinOp::LaxEq, d, a, b)?,
            Op::LaxNe(d, a, b) => self.binary(BinOp::LaxNe, d, a, b)?,
            Op::Neg(d, s) => self.unary(UnaryOp::Neg, d, s)?,
            Op::Not(d, s) => self.unary(UnaryOp::Not, d, s)?,
            Op::BitNot(d, s) => self.unary(UnaryOp::BitNot, d, s)?,
            Op::Jmp(ofs) => self.jump(ofs),
            Op::JmpIf(r, ofs) => {
                if self.reg(r).is_truthy() {
                    self.jump(ofs);
                }
            }
            Op::JmpIfNot(r, ofs) => {
                if !self.reg(r).is_truthy() {
                    self.jump(ofs);
                }
            }
            Op::JmpIfNil(r, ofs) => {
                if self.reg(r).is_nil() {
                    self.jump(ofs);
                }
            }
            Op::NewList { dst, start, count } => {
                let items = self.reg_range(start, count as usize);
                self.set_reg(dst, Val::list(items));
            }
            Op::NewTuple { dst, start, count } => {
                let items = self.reg_range(start, count as usize);
                self.set_reg(dst, Val::tuple(items));
            }
            Op::NewSet { dst, start, count } => {
                let items = self.reg_range(start, count as usize);
                self.set_reg(dst, Val::set(items));
            }
            Op::NewMap { dst, start, pairs } => {
                let pairs = pair_up(self.reg_range(start, pairs as usize * 2));
                self.set_reg(dst, Val::map(pairs));
            }
            Op::NewRecord { dst, start, pairs } => {
                let pairs = pair_up(self.reg_range(start, pairs as usize * 2));
                self.set_reg(dst, Val::record(pairs));
            }
            Op::Append { dst, target, src } => {
                let target = self.reg(target).clone();
                let value = self.reg(src).clone();
                match &target {
                    Val::List(list) => write_lock(list).push(value),
                    Val::Set(set) => {
                        write_lock(set).insert(value);
                    }
                    other => return Err(ErrorValue::no_method("<<", other).into()),
                }
                self.set_reg(dst, target);
            }
            Op::Index { dst, base, idx } => {
                let v = index_value(self.reg(base), self.reg(idx))?;
                self.set_reg(dst, v);
            }
            Op::SetIndex { base, idx, src } => {
                let value = self.reg(src).clone();
                set_index_value(self.reg(base), self.reg(idx), value)?;
            }
            Op::GetIvar { dst, name } => {
                let name = self.konst_symbol(name);
                let v = match &self.frame().receiver {
                    Val::Object(obj) => obj.ivar(name),
                    other => return Err(primitive_ivar(name, other).into()),
                };
                self.set_reg(dst, v);
            }
            Op::SetIvar { name, src } => {
                let name = self.konst_symbol(name);
                let value = self.reg(src).clone();
                match &self.frame().receiver {
                    Val::Object(obj) => obj.set_ivar(name, value),
                    other => return Err(primitive_ivar(name, other).into()),
                }
            }
            Op::DefineClass { dst, name, superclass } => {
                let name = self.konst_symbol(name);
                let superclass = match superclass.map(|r| self.reg(r)) {
                    None => None,
                    Some(Val::Class(class)) => Some(class.clone()),
                    Some(other) => {
                        return Err(ErrorValue::new(
                            ErrorKind::TypeError,
                            format!("superclass must be a class, got `{}`", other.class_name()),
                        )
                        .into());
                    }
                };
                let class = Arc::new(ClassDef::new(name.name(), superclass));
                self.env.register_class(class.clone());
                self.set_reg(dst, Val::Class(class));
            }
            Op::DefineMethod { class, name, proto } => {
                let name = self.konst_symbol(name);
                let Val::Class(class) = self.reg(class).clone() else {
                    panic!("DefineMethod target is not a class");
                };
                let method = self.instantiate(proto);
                class.define_method(name, Val::Closure(Arc::new(method)));
            }
            Op::NewObject { dst, class, argc } => {
                let callee = self.reg(class).clone();
                if !matches!(callee, Val::Class(_)) {
                    return Err(ErrorValue::new(
                        ErrorKind::TypeError,
                        format!("`{}` cannot be instantiated", callee.class_name()),
                    )
                    .into());
                }
                let args = self.reg_range(class + 1, argc as usize);
                let slot = self.frame().base + dst as usize;
                self.invoke(callee, Val::Nil, args, slot)?;
            }
            Op::Closure { dst, proto } => {
                let closure = self.instantiate(proto);
                self.set_reg(dst, Val::Closure(Arc::new(closure)));
            }
            Op::Call { dst, func, argc } => {
                let callee = self.reg(func).clone();
                let args = self.reg_range(func + 1, argc as usize);
                let slot = self.frame().base + dst as usize;
                self.invoke(callee, Val::Nil, args, slot)?;
            }
            Op::CallMethod { dst, recv, name, argc } => {
                let name = self.konst_symbol(name);
                let receiver = self.reg(recv).clone();
                let Some(method) = self.find_method(&receiver, name) else {
                    return Err(ErrorValue::no_method(name.name(), &receiver).into());
                };
                let args = self.reg_range(recv + 1, argc as usize);
                let slot = self.frame().base + dst as usize;
                self.invoke(method, receiver, args, slot)?;
            }
            Op::Return(r) => {
                let v = self.reg(r).clone();
                return Ok(Step::Unwind(Completion::Return(v)));
            }
            Op::ReturnNil => return Ok(Step::Unwind(Completion::Return(Val::Nil))),
            Op::Go { func, argc } => {
                let callee = self.reg(func).clone();
                let args = self.reg_range(func + 1, argc as usize);
                self.go(callee, args)?;
            }
            Op::Throw(r) => {
                let v = self.reg(r).clone();
                return Err(Thrown::new(v, self.capture_trace()));
            }
            Op::EnterTry(t) => self.enter_try(t),
            Op::LeaveTry(t) => self.leave_try(t),
            Op::EndFinally => return Ok(self.end_finally()),
            Op::EnterLoop(l) => self.enter_loop(l),
            Op::LeaveLoop => self.leave_loop(),
            Op::Break { label, src } => {
                let label = label.map(|k| self.konst_symbol(k));
                let value = src.map_or(Val::Nil, |r| self.reg(r).clone());
                return Ok(Step::Unwind(Completion::Break { label, value }));
            }
            Op::Continue { label, src } => {
                let label = label.map(|k| self.konst_symbol(k));
                let value = src.map(|r| self.reg(r).clone());
                return Ok(Step::Unwind(Completion::Continue { label, value }));
            }
            Op::Match { dst, src, pattern } => {
                let func = self.frame().closure.func.clone();
                let value = self.reg(src).clone();
                let mut binds = Vec::new();
                let matched = match_value(
                    &func.patterns[pattern as usize],
                    &value,
                    &mut binds,
                    &mut |proto: u16, binds: &[(Reg, Val)]| self.eval_guard(proto, binds),
                )?;
                if matched {
                    self.write_binds(&binds);
                }
                self.set_reg(dst, Val::Bool(matched));
            }
        }
        Ok(Step::Next)
    }

    #[inline]
    fn binary(&mut self, op: BinOp, dst: Reg, a: Reg, b: Reg) -> Result<(), Thrown> {
        let v = op.eval_vals(self.reg(a), self.reg(b))?;
        self.set_reg(dst, v);
        Ok(())
    }

    #[inline]
    fn unary(&mut self, op: UnaryOp, dst: Reg, src: Reg) -> Result<(), Thrown> {
        let v = op.eval_val(self.reg(src))?;
        self.set_reg(dst, v);
        Ok(())
    }

    /// `==`, honouring a user-defined `==` method on objects.
    fn values_equal(&mut self, a: Reg, b: Reg) -> Result<bool, Thrown> {
        let (l, r) = (self.reg(a).clone(), self.reg(b).clone());
        if let Val::Object(obj) = &l
            && let Some(method) = obj.class.lookup_method(Symbol::intern("=="))
        {
            return Ok(self.call(&method, l.clone(), &[r])?.is_truthy());
        }
        Ok(crate::op::strict_eq(&l, &r))
    }

    /// Closure for prototype `proto` of the running function, capturing from
    /// the current frame.
    pub(super) fn instantiate(&mut self, proto: u16) -> Closure {
        let frame = self.frame();
        let proto = frame.closure.func.protos[proto as usize].clone();
        let base = frame.base;
        let outer = frame.closure.clone();
        let cells = proto
            .captures
            .iter()
            .map(|capture| match *capture {
                CaptureSpec::Local(r) => self.capture_upvalue(base + r as usize),
                CaptureSpec::Upvalue(i) => outer.upvalues[i as usize].clone(),
            })
            .collect();
        Closure::new(proto.func, cells)
    }

    /// Starts a coroutine. Captured variables still live in this coroutine
    /// are passed as snapshots.
    fn go(&mut self, callee: Val, args: Vec<Val>) -> Result<(), Thrown> {
        let callee = match &callee {
            Val::Closure(closure) => Val::Closure(self.detach_closure(closure)),
            _ => callee,
        };
        let args: Vec<Val> = args
            .into_iter()
            .map(|arg| match &arg {
                Val::Closure(closure) => Val::Closure(self.detach_closure(closure)),
                _ => arg,
            })
            .collect();
        match &self.spawner {
            Some(spawner) => spawner.spawn(callee, args)?,
            None => {
                let mut vm = Vm::new(self.env.clone());
                vm.max_call_depth = self.max_call_depth;
                // Runs on this Rust stack, so it counts as a nested call.
                vm.host_depth = self.host_depth;
                if let Err(thrown) = vm.call(&callee, Val::Nil, &args) {
                    tracing::warn!(target: "ember::rt", value = %thrown.value.inspect(), "uncaught error in coroutine");
                    if let Err(err) = self.env.stderr().write_str(&thrown.render()) {
                        tracing::warn!(target: "ember::rt", %err, "cannot write to the error sink");
                    }
                }
            }
        }
        Ok(())
    }
}

fn pair_up(flat: Vec<Val>) -> Vec<(Val, Val)> {
    let mut iter = flat.into_iter();
    let mut pairs = Vec::with_capacity(iter.len() / 2);
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        pairs.push((k, v));
    }
    pairs
}

fn primitive_ivar(name: Symbol, receiver: &Val) -> ErrorValue {
    ErrorValue::new(
        ErrorKind::PrimitiveValueError,
        format!(
            "cannot access instance variable `@{}` of primitive value of class `{}`",
            name.name(),
            receiver.class_name()
        ),
    )
}

/// Resolves a possibly negative index against `len`.
fn resolve_index(idx: &Val, len: usize) -> Result<Option<usize>, ErrorValue> {
    let Some(i) = idx.as_i64() else {
        return Err(ErrorValue::coerce("Std::Int", idx.class_name()));
    };
    let i = if i < 0 { i + len as i64 } else { i };
    Ok((0..len as i64).contains(&i).then_some(i as usize))
}

fn index_value(base: &Val, idx: &Val) -> Result<Val, ErrorValue> {
    Ok(match base {
        Val::List(list) => {
            let list = read_lock(list);
            resolve_index(idx, list.len())?.map_or(Val::Nil, |i| list[i].clone())
        }
        Val::Tuple(items) => resolve_index(idx, items.len())?.map_or(Val::Nil, |i| items[i].clone()),
        Val::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            resolve_index(idx, chars.len())?.map_or(Val::Nil, |i| Val::Char(chars[i]))
        }
        Val::Map(map) => read_lock(map).get(idx).cloned().unwrap_or(Val::Nil),
        Val::Record(pairs) => pairs.iter().find(|(k, _)| k == idx).map_or(Val::Nil, |(_, v)| v.clone()),
        other => return Err(ErrorValue::no_method("[]", other)),
    })
}

fn set_index_value(base: &Val, idx: &Val, value: Val) -> Result<(), ErrorValue> {
    match base {
        Val::List(list) => {
            let mut list = write_lock(list);
            let len = list.len();
            match resolve_index(idx, len)? {
                Some(i) => list[i] = value,
                None => {
                    return Err(ErrorValue::new(
                        ErrorKind::IndexError,
                        format!("index {} out of range for list of length {len}", idx.inspect()),
                    ));
                }
            }
        }
        Val::Map(map) => {
            write_lock(map).insert(idx.clone(), value);
        }
        other => return Err(ErrorValue::no_method("[]=", other)),
    }
    Ok(())
}
