use std::fmt;
use std::sync::Arc;

use crate::val::{Symbol, Val};
use crate::vm::pattern::Pattern;

/// Register index relative to the frame base.
pub type Reg = u16;

/// Compiled function chunk.
///
/// Jump offsets are relative to the instruction after the jump. Try, loop
/// and pattern tables are indexed by the instructions that use them.
#[derive(Debug, Clone, Default)]
pub struct Function {
    pub name: Arc<str>,
    /// Source file or module the chunk was compiled from.
    pub location: Arc<str>,
    pub arity: u16,
    pub n_regs: u16,
    pub consts: Vec<Val>,
    pub code: Vec<Op>,
    /// Source line of each instruction; shorter than `code` when unknown.
    pub lines: Vec<u32>,
    pub protos: Vec<ClosureProto>,
    pub try_blocks: Vec<TrySpec>,
    pub loops: Vec<LoopSpec>,
    pub patterns: Vec<Pattern>,
}

impl Function {
    pub fn line_at(&self, pc: usize) -> u32 {
        self.lines.get(pc).copied().unwrap_or(0)
    }
}

/// Nested function literal together with the outer bindings it closes over.
#[derive(Debug, Clone)]
pub struct ClosureProto {
    pub func: Arc<Function>,
    pub captures: Vec<CaptureSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSpec {
    /// A register of the enclosing frame.
    Local(Reg),
    /// An upvalue of the enclosing closure.
    Upvalue(u16),
}

/// `do ... catch ... finally ... end`
#[derive(Debug, Clone, Default)]
pub struct TrySpec {
    pub catches: Vec<CatchClause>,
    /// Absolute pc of the finally body, which ends with `EndFinally`.
    pub finally: Option<usize>,
    /// First register declared inside the block; captured slots from here up
    /// are closed when the block is left by a non-local exit.
    pub scope_base: Reg,
}

#[derive(Debug, Clone, Copy)]
pub struct CatchClause {
    /// Index into `Function::patterns`.
    pub pattern: u16,
    /// Absolute pc of the clause body.
    pub target: usize,
}

#[derive(Debug, Clone)]
pub struct LoopSpec {
    pub label: Option<Symbol>,
    /// Absolute pc just past `LeaveLoop`.
    pub break_target: usize,
    /// Absolute pc of the next-iteration step.
    pub continue_target: usize,
    /// Register receiving the value of the loop expression.
    pub result: Reg,
    /// First per-iteration register.
    pub body_base: Reg,
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Op {
    LoadK(Reg /*dst*/, u16 /*kidx*/),
    LoadNil(Reg),
    LoadBool(Reg, bool),
    LoadSelf(Reg),
    Move(Reg /*dst*/, Reg /*src*/),
    // Upvalues
    LoadUpvalue {
        dst: Reg,
        idx: u16,
    },
    StoreUpvalue {
        idx: u16,
        src: Reg,
    },
    /// Close every open upvalue at or above `from`.
    CloseUpvalues {
        from: Reg,
    },
    // Globals
    LoadGlobal(Reg /*dst*/, u16 /*name_kidx*/),
    DefineGlobal(u16 /*name_kidx*/, Reg /*src*/),
    // Arithmetic
    Add(Reg /*dst*/, Reg /*a*/, Reg /*b*/),
    Sub(Reg, Reg, Reg),
    Mul(Reg, Reg, Reg),
    Div(Reg, Reg, Reg),
    Mod(Reg, Reg, Reg),
    Pow(Reg, Reg, Reg),
    // Bitwise
    BitAnd(Reg, Reg, Reg),
    BitOr(Reg, Reg, Reg),
    BitXor(Reg, Reg, Reg),
    Shl(Reg, Reg, Reg),
    Shr(Reg, Reg, Reg),
    LogicShl(Reg, Reg, Reg),
    LogicShr(Reg, Reg, Reg),
    // Comparisons -> Bool
    CmpEq(Reg, Reg, Reg),
    CmpNe(Reg, Reg, Reg),
    CmpLt(Reg, Reg, Reg),
    CmpLe(Reg, Reg, Reg),
    CmpGt(Reg, Reg, Reg),
    CmpGe(Reg, Reg, Reg),
    LaxEq(Reg, Reg, Reg),
    LaxNe(Reg, Reg, Reg),
    // Unary
    Neg(Reg /*dst*/, Reg /*src*/),
    Not(Reg, Reg),
    BitNot(Reg, Reg),
    // Branches
    Jmp(i32),
    JmpIf(Reg, i32),
    JmpIfNot(Reg, i32),
    JmpIfNil(Reg, i32),
    // Constructors; elements in consecutive registers from `start`
    NewList {
        dst: Reg,
        start: Reg,
        count: u16,
    },
    NewTuple {
        dst: Reg,
        start: Reg,
        count: u16,
    },
    NewSet {
        dst: Reg,
        start: Reg,
        count: u16,
    },
    NewMap {
        dst: Reg,
        start: Reg,
        pairs: u16,
    }, // start..start+2*pairs as k,v
    NewRecord {
        dst: Reg,
        start: Reg,
        pairs: u16,
    },
    /// `target << src`, result (the target) in `dst`.
    Append {
        dst: Reg,
        target: Reg,
        src: Reg,
    },
    Index {
        dst: Reg,
        base: Reg,
        idx: Reg,
    },
    SetIndex {
        base: Reg,
        idx: Reg,
        src: Reg,
    },
    // Objects
    GetIvar {
        dst: Reg,
        name: u16,
    },
    SetIvar {
        name: u16,
        src: Reg,
    },
    DefineClass {
        dst: Reg,
        name: u16,
        superclass: Option<Reg>,
    },
    DefineMethod {
        class: Reg,
        name: u16,
        proto: u16,
    },
    /// Arguments follow `class`; runs `init` when the class defines it.
    NewObject {
        dst: Reg,
        class: Reg,
        argc: u8,
    },
    // Calls
    Closure {
        dst: Reg,
        proto: u16,
    },
    /// Arguments in `func+1..=func+argc`; the callee frame starts at `func+1`.
    Call {
        dst: Reg,
        func: Reg,
        argc: u8,
    },
    /// Arguments in `recv+1..=recv+argc`.
    CallMethod {
        dst: Reg,
        recv: Reg,
        name: u16,
        argc: u8,
    },
    Return(Reg),
    ReturnNil,
    /// Spawns a coroutine running `func` with the following `argc` registers.
    Go {
        func: Reg,
        argc: u8,
    },
    // Non-local control
    Throw(Reg),
    EnterTry(u16 /*try idx*/),
    LeaveTry(u16 /*try idx*/),
    EndFinally,
    EnterLoop(u16 /*loop idx*/),
    LeaveLoop,
    Break {
        label: Option<u16>, /*kidx of symbol*/
        src: Option<Reg>,
    },
    Continue {
        label: Option<u16>,
        src: Option<Reg>,
    },
    /// `dst = src matches patterns[pattern]`, writing bindings on success.
    Match {
        dst: Reg,
        src: Reg,
        pattern: u16,
    },
}

fn opt_reg(r: &Option<Reg>) -> String {
    r.map_or_else(|| "-".to_string(), |r| format!("r{r}"))
}

fn opt_k(k: &Option<u16>) -> String {
    k.map_or_else(|| "-".to_string(), |k| format!("k{k}"))
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::LoadK(d, k) => write!(f, "LoadK r{}, k{}", d, k),
            Op::LoadNil(d) => write!(f, "LoadNil r{}", d),
            Op::LoadBool(d, b) => write!(f, "LoadBool r{}, {}", d, b),
            Op::LoadSelf(d) => write!(f, "LoadSelf r{}", d),
            Op::Move(d, s) => write!(f, "Move r{}, r{}", d, s),
            Op::LoadUpvalue { dst, idx } => write!(f, "LoadUpvalue r{}, u{}", dst, idx),
            Op::StoreUpvalue { idx, src } => write!(f, "StoreUpvalue u{}, r{}", idx, src),
            Op::CloseUpvalues { from } => write!(f, "CloseUpvalues r{}..", from),
            Op::LoadGlobal(d, k) => write!(f, "LoadGlobal r{}, k{}", d, k),
            Op::DefineGlobal(k, s) => write!(f, "DefineGlobal k{}, r{}", k, s),
            Op::Add(d, a, b) => write!(f, "Add r{}, r{}, r{}", d, a, b),
            Op::Sub(d, a, b) => write!(f, "Sub r{}, r{}, r{}", d, a, b),
            Op::Mul(d, a, b) => write!(f, "Mul r{}, r{}, r{}", d, a, b),
            Op::Div(d, a, b) => write!(f, "Div r{}, r{}, r{}", d, a, b),
            Op::Mod(d, a, b) => write!(f, "Mod r{}, r{}, r{}", d, a, b),
            Op::Pow(d, a, b) => write!(f, "Pow r{}, r{}, r{}", d, a, b),
            Op::BitAnd(d, a, b) => write!(f, "BitAnd r{}, r{}, r{}", d, a, b),
            Op::BitOr(d, a, b) => write!(f, "BitOr r{}, r{}, r{}", d, a, b),
            Op::BitXor(d, a, b) => write!(f, "BitXor r{}, r{}, r{}", d, a, b),
            Op::Shl(d, a, b) => write!(f, "Shl r{}, r{}, r{}", d, a, b),
            Op::Shr(d, a, b) => write!(f, "Shr r{}, r{}, r{}", d, a, b),
            Op::LogicShl(d, a, b) => write!(f, "LogicShl r{}, r{}, r{}", d, a, b),
            Op::LogicShr(d, a, b) => write!(f, "LogicShr r{}, r{}, r{}", d, a, b),
            Op::CmpEq(d, a, b) => write!(f, "CmpEq r{}, r{}, r{}", d, a, b),
            Op::CmpNe(d, a, b) => write!(f, "CmpNe r{}, r{}, r{}", d, a, b),
            Op::CmpLt(d, a, b) => write!(f, "CmpLt r{}, r{}, r{}", d, a, b),
            Op::CmpLe(d, a, b) => write!(f, "CmpLe r{}, r{}, r{}", d, a, b),
            Op::CmpGt(d, a, b) => write!(f, "CmpGt r{}, r{}, r{}", d, a, b),
            Op::CmpGe(d, a, b) => write!(f, "CmpGe r{}, r{}, r{}", d, a, b),
            Op::LaxEq(d, a, b) => write!(f, "LaxEq r{}, r{}, r{}", d, a, b),
            Op::LaxNe(d, a, b) => write!(f, "LaxNe r{}, r{}, r{}", d, a, b),
            Op::Neg(d, s) => write!(f, "Neg r{}, r{}", d, s),
            Op::Not(d, s) => write!(f, "Not r{}, r{}", d, s),
            Op::BitNot(d, s) => write!(f, "BitNot r{}, r{}", d, s),
            Op::Jmp(ofs) => write!(f, "Jmp {}", ofs),
            Op::JmpIf(r, ofs) => write!(f, "JmpIf r{}, {}", r, ofs),
            Op::JmpIfNot(r, ofs) => write!(f, "JmpIfNot r{}, {}", r, ofs),
            Op::JmpIfNil(r, ofs) => write!(f, "JmpIfNil r{}, {}", r, ofs),
            Op::NewList { dst, start, count } => write!(f, "NewList r{}, start=r{}, count={}", dst, start, count),
            Op::NewTuple { dst, start, count } => write!(f, "NewTuple r{}, start=r{}, count={}", dst, start, count),
            Op::NewSet { dst, start, count } => write!(f, "NewSet r{}, start=r{}, count={}", dst, start, count),
            Op::NewMap { dst, start, pairs } => write!(f, "NewMap r{}, start=r{}, pairs={}", dst, start, pairs),
            Op::NewRecord { dst, start, pairs } => {
                write!(f, "NewRecord r{}, start=r{}, pairs={}", dst, start, pairs)
            }
            Op::Append { dst, target, src } => write!(f, "Append r{}, r{}, r{}", dst, target, src),
            Op::Index { dst, base, idx } => write!(f, "Index r{}, r{}, r{}", dst, base, idx),
            Op::SetIndex { base, idx, src } => write!(f, "SetIndex r{}, r{}, r{}", base, idx, src),
            Op::GetIvar { dst, name } => write!(f, "GetIvar r{}, k{}", dst, name),
            Op::SetIvar { name, src } => write!(f, "SetIvar k{}, r{}", name, src),
            Op::DefineClass { dst, name, superclass } => {
                write!(f, "DefineClass r{}, k{}, super={}", dst, name, opt_reg(superclass))
            }
            Op::DefineMethod { class, name, proto } => write!(f, "DefineMethod r{}, k{}, p{}", class, name, proto),
            Op::NewObject { dst, class, argc } => write!(f, "NewObject r{}, r{}, argc={}", dst, class, argc),
            Op::Closure { dst, proto } => write!(f, "Closure r{}, p{}", dst, proto),
            Op::Call { dst, func, argc } => write!(f, "Call r{}, r{}, argc={}", dst, func, argc),
            Op::CallMethod { dst, recv, name, argc } => {
                write!(f, "CallMethod r{}, r{}.k{}, argc={}", dst, recv, name, argc)
            }
            Op::Return(r) => write!(f, "Return r{}", r),
            Op::ReturnNil => write!(f, "ReturnNil"),
            Op::Go { func, argc } => write!(f, "Go r{}, argc={}", func, argc),
            Op::Throw(r) => write!(f, "Throw r{}", r),
            Op::EnterTry(t) => write!(f, "EnterTry t{}", t),
            Op::LeaveTry(t) => write!(f, "LeaveTry t{}", t),
            Op::EndFinally => write!(f, "EndFinally"),
            Op::EnterLoop(l) => write!(f, "EnterLoop l{}", l),
            Op::LeaveLoop => write!(f, "LeaveLoop"),
            Op::Break { label, src } => write!(f, "Break label={}, value={}", opt_k(label), opt_reg(src)),
            Op::Continue { label, src } => write!(f, "Continue label={}, value={}", opt_k(label), opt_reg(src)),
            Op::Match { dst, src, pattern } => write!(f, "Match r{}, r{}, pat{}", dst, src, pattern),
        }
    }
}

impl fmt::Display for Function {
    /// Disassembly listing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn {} (arity={}, regs={})", self.name, self.arity, self.n_regs)?;
        for (pc, op) in self.code.iter().enumerate() {
            writeln!(f, "{pc:>4} {:>4}  {op:?}", self.line_at(pc))?;
        }
        for (i, k) in self.consts.iter().enumerate() {
            writeln!(f, "  k{i} = {}", k.inspect())?;
        }
        Ok(())
    }
}
