use std::sync::Arc;

use crate::val::{Symbol, Val};
use crate::vm::{CaptureSpec, CatchClause, ClosureProto, Function, LoopSpec, Op, Reg, TrySpec, pattern::Pattern};

/// Forward-referenceable jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// An open `do ... end` block; see [`FunctionBuilder::begin_try`].
#[derive(Debug)]
pub struct TryHandle {
    idx: u16,
    end: Label,
}

/// An open loop; see [`FunctionBuilder::begin_loop`].
#[derive(Debug)]
pub struct LoopHandle {
    idx: u16,
}

/// Assembler for [`Function`] chunks.
///
/// Registers are allocated upwards and never reused, so a register handed
/// out by [`alloc`](Self::alloc) stays owned by whatever declared it.
/// Jumps to labels are patched in [`finish`](Self::finish).
pub struct FunctionBuilder {
    name: Arc<str>,
    location: Arc<str>,
    arity: u16,
    n_regs: u16,
    consts: Vec<Val>,
    code: Vec<Op>,
    lines: Vec<u32>,
    protos: Vec<ClosureProto>,
    try_blocks: Vec<TrySpec>,
    loops: Vec<LoopSpec>,
    patterns: Vec<Pattern>,
    labels: Vec<Option<usize>>,
    jumps: Vec<(usize, Label)>,
    line: u32,
}

impl FunctionBuilder {
    /// Parameters occupy registers `0..arity`.
    pub fn new(name: &str, location: &str, arity: u16) -> Self {
        Self {
            name: Arc::from(name),
            location: Arc::from(location),
            arity,
            n_regs: arity,
            consts: Vec::new(),
            code: Vec::new(),
            lines: Vec::new(),
            protos: Vec::new(),
            try_blocks: Vec::new(),
            loops: Vec::new(),
            patterns: Vec::new(),
            labels: Vec::new(),
            jumps: Vec::new(),
            line: 1,
        }
    }

    /// Register holding parameter `i`.
    pub fn param(&self, i: u16) -> Reg {
        debug_assert!(i < self.arity);
        i
    }

    pub fn alloc(&mut self) -> Reg {
        let r = self.n_regs;
        self.n_regs = self.n_regs.checked_add(1).unwrap_or_else(|| panic!("too many registers in `{}`", self.name));
        r
    }

    /// Consecutive registers, for call arguments and constructors.
    pub fn alloc_n(&mut self, n: u16) -> Reg {
        let start = self.n_regs;
        for _ in 0..n {
            self.alloc();
        }
        start
    }

    /// Next register to be allocated; used as a scope base.
    pub fn next_reg(&self) -> Reg {
        self.n_regs
    }

    pub fn k(&mut self, v: Val) -> u16 {
        // Key equality: 1 and 1.0 stay distinct constants.
        if let Some(i) = self.consts.iter().position(|x| *x == v) {
            i as u16
        } else {
            self.consts.push(v);
            (self.consts.len() - 1) as u16
        }
    }

    pub fn set_line(&mut self, line: u32) {
        self.line = line;
    }

    pub fn pc(&self) -> usize {
        self.code.len()
    }

    pub fn emit(&mut self, op: Op) {
        self.code.push(op);
        self.lines.push(self.line);
    }

    // Convenience emitters

    pub fn load(&mut self, dst: Reg, v: impl Into<Val>) {
        let k = self.k(v.into());
        self.emit(Op::LoadK(dst, k));
    }

    /// Allocates a register and loads `v` into it.
    pub fn konst(&mut self, v: impl Into<Val>) -> Reg {
        let r = self.alloc();
        self.load(r, v);
        r
    }

    pub fn load_global(&mut self, dst: Reg, name: &str) {
        let k = self.k(Val::symbol(name));
        self.emit(Op::LoadGlobal(dst, k));
    }

    pub fn define_global(&mut self, name: &str, src: Reg) {
        let k = self.k(Val::symbol(name));
        self.emit(Op::DefineGlobal(k, src));
    }

    /// `dst = global(args...)`, with `args` copied into a fresh call window.
    pub fn call_global(&mut self, dst: Reg, name: &str, args: &[Reg]) {
        let func = self.alloc_n(args.len() as u16 + 1);
        self.load_global(func, name);
        for (i, &arg) in args.iter().enumerate() {
            self.emit(Op::Move(func + 1 + i as u16, arg));
        }
        self.emit(Op::Call {
            dst,
            func,
            argc: args.len() as u8,
        });
    }

    /// `dst = callee(args...)`
    pub fn call(&mut self, dst: Reg, callee: Reg, args: &[Reg]) {
        let func = self.alloc_n(args.len() as u16 + 1);
        self.emit(Op::Move(func, callee));
        for (i, &arg) in args.iter().enumerate() {
            self.emit(Op::Move(func + 1 + i as u16, arg));
        }
        self.emit(Op::Call {
            dst,
            func,
            argc: args.len() as u8,
        });
    }

    /// `dst = recv.name(args...)`
    pub fn call_method(&mut self, dst: Reg, recv: Reg, name: &str, args: &[Reg]) {
        let window = self.alloc_n(args.len() as u16 + 1);
        self.emit(Op::Move(window, recv));
        for (i, &arg) in args.iter().enumerate() {
            self.emit(Op::Move(window + 1 + i as u16, arg));
        }
        let name = self.k(Val::symbol(name));
        self.emit(Op::CallMethod {
            dst,
            recv: window,
            name,
            argc: args.len() as u8,
        });
    }

    /// `println(src)`
    pub fn println(&mut self, src: Reg) {
        let dst = self.alloc();
        self.call_global(dst, "println", &[src]);
    }

    pub fn closure(&mut self, dst: Reg, func: Function, captures: Vec<CaptureSpec>) {
        let proto = self.proto(func, captures);
        self.emit(Op::Closure { dst, proto });
    }

    pub fn proto(&mut self, func: Function, captures: Vec<CaptureSpec>) -> u16 {
        self.protos.push(ClosureProto {
            func: Arc::new(func),
            captures,
        });
        (self.protos.len() - 1) as u16
    }

    pub fn pattern(&mut self, pattern: Pattern) -> u16 {
        self.patterns.push(pattern);
        (self.patterns.len() - 1) as u16
    }

    // Labels and jumps

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn bind(&mut self, label: Label) {
        debug_assert!(self.labels[label.0].is_none(), "label bound twice");
        self.labels[label.0] = Some(self.code.len());
    }

    fn jump_to(&mut self, op: Op, label: Label) {
        self.jumps.push((self.code.len(), label));
        self.emit(op);
    }

    pub fn jmp(&mut self, label: Label) {
        self.jump_to(Op::Jmp(0), label);
    }

    pub fn jmp_if(&mut self, cond: Reg, label: Label) {
        self.jump_to(Op::JmpIf(cond, 0), label);
    }

    pub fn jmp_if_not(&mut self, cond: Reg, label: Label) {
        self.jump_to(Op::JmpIfNot(cond, 0), label);
    }

    pub fn jmp_if_nil(&mut self, src: Reg, label: Label) {
        self.jump_to(Op::JmpIfNil(src, 0), label);
    }

    // do ... catch ... finally ... end
    //
    //   EnterTry t
    //   <body>
    //   LeaveTry t; Jmp end
    //   <catch body>; LeaveTry t; Jmp end    (per clause)
    //   <finally body>; EndFinally
    // end:

    /// Opens a `do` block whose own locals start at `scope_base`.
    pub fn begin_try(&mut self, scope_base: Reg) -> TryHandle {
        self.try_blocks.push(TrySpec {
            catches: Vec::new(),
            finally: None,
            scope_base,
        });
        let idx = (self.try_blocks.len() - 1) as u16;
        self.emit(Op::EnterTry(idx));
        TryHandle {
            idx,
            end: self.label(),
        }
    }

    /// Ends the protected body or a catch clause body.
    pub fn leave_try(&mut self, t: &TryHandle) {
        self.emit(Op::LeaveTry(t.idx));
        self.jmp(t.end);
    }

    /// Starts a catch clause; the clause body follows.
    pub fn begin_catch(&mut self, t: &TryHandle, pattern: Pattern) {
        let pattern = self.pattern(pattern);
        let target = self.pc();
        self.try_blocks[t.idx as usize].catches.push(CatchClause { pattern, target });
    }

    /// Starts the finally body; must come after every catch clause.
    pub fn begin_finally(&mut self, t: &TryHandle) {
        let pc = self.pc();
        self.try_blocks[t.idx as usize].finally = Some(pc);
    }

    pub fn end_try(&mut self, t: TryHandle) {
        if self.try_blocks[t.idx as usize].finally.is_some() {
            self.emit(Op::EndFinally);
        }
        self.bind(t.end);
    }

    // Loops
    //
    //   LoadNil result; EnterLoop l
    //   <header and body>
    // continue:
    //   CloseUpvalues body_base; <step>; Jmp header
    // exit:
    //   LeaveLoop
    // break:

    /// Opens a loop. Registers from `body_base` up are fresh per iteration.
    pub fn begin_loop(&mut self, label: Option<&str>, result: Reg, body_base: Reg) -> LoopHandle {
        self.loops.push(LoopSpec {
            label: label.map(Symbol::intern),
            break_target: usize::MAX,
            continue_target: usize::MAX,
            result,
            body_base,
        });
        let idx = (self.loops.len() - 1) as u16;
        self.emit(Op::EnterLoop(idx));
        LoopHandle { idx }
    }

    /// Marks the continue point and closes the iteration's captured locals.
    pub fn loop_continue_point(&mut self, l: &LoopHandle) {
        let spec = &mut self.loops[l.idx as usize];
        spec.continue_target = self.code.len();
        let from = spec.body_base;
        self.emit(Op::CloseUpvalues { from });
    }

    /// Emits `LeaveLoop`; the normal exit path must jump here.
    pub fn end_loop(&mut self, l: LoopHandle) {
        self.emit(Op::LeaveLoop);
        let pc = self.pc();
        let spec = &mut self.loops[l.idx as usize];
        spec.break_target = pc;
    }

    pub fn brk(&mut self, label: Option<&str>, src: Option<Reg>) {
        let label = label.map(|l| self.k(Val::symbol(l)));
        self.emit(Op::Break { label, src });
    }

    pub fn cont(&mut self, label: Option<&str>, src: Option<Reg>) {
        let label = label.map(|l| self.k(Val::symbol(l)));
        self.emit(Op::Continue { label, src });
    }

    /// Resolves jumps; panics on a label that was never bound.
    pub fn finish(mut self) -> Function {
        for &(pc, label) in &self.jumps {
            let target = self.labels[label.0].unwrap_or_else(|| panic!("unbound label in `{}`", self.name));
            let ofs = target as i32 - (pc as i32 + 1);
            self.code[pc] = match self.code[pc] {
                Op::Jmp(_) => Op::Jmp(ofs),
                Op::JmpIf(r, _) => Op::JmpIf(r, ofs),
                Op::JmpIfNot(r, _) => Op::JmpIfNot(r, ofs),
                Op::JmpIfNil(r, _) => Op::JmpIfNil(r, ofs),
                other => other,
            };
        }
        for spec in &self.loops {
            assert!(
                spec.break_target != usize::MAX && spec.continue_target != usize::MAX,
                "unterminated loop in `{}`",
                self.name
            );
        }
        Function {
            name: self.name,
            location: self.location,
            arity: self.arity,
            n_regs: self.n_regs,
            consts: std::mem::take(&mut self.consts),
            code: std::mem::take(&mut self.code),
            lines: std::mem::take(&mut self.lines),
            protos: std::mem::take(&mut self.protos),
            try_blocks: std::mem::take(&mut self.try_blocks),
            loops: std::mem::take(&mut self.loops),
            patterns: std::mem::take(&mut self.patterns),
        }
    }
}
