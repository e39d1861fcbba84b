//! Operator engine.
//!
//! Every operator the VM special-cases is dispatched here on the runtime
//! classes of its operands. Failures are returned as [`ErrorValue`]s, which
//! the VM throws like any other value.

use std::fmt::{self, Display};

use crate::val::{ErrorValue, Val};

mod bitwise;
mod compare;
mod numeric;

pub(crate) use compare::{lax_eq, strict_eq};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    LogicShl,
    LogicShr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LaxEq,
    LaxNe,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::LogicShl => "<<<",
            BinOp::LogicShr => ">>>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::LaxEq => "=~",
            BinOp::LaxNe => "!~",
        }
    }

    pub fn is_arith(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Pow
        )
    }

    pub fn is_cmp(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::LaxEq | BinOp::LaxNe
        )
    }

    /// Applies the operator to two values.
    pub fn eval_vals(self, l: &Val, r: &Val) -> Result<Val, ErrorValue> {
        match self {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Pow => {
                numeric::arith(self, l, r)
            }
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => bitwise::logic(self, l, r),
            BinOp::Shl | BinOp::Shr | BinOp::LogicShl | BinOp::LogicShr => bitwise::shift(self, l, r),
            BinOp::Eq => Ok(Val::Bool(strict_eq(l, r))),
            BinOp::Ne => Ok(Val::Bool(!strict_eq(l, r))),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => compare::strict_order(self, l, r).map(Val::Bool),
            BinOp::LaxEq => Ok(Val::Bool(lax_eq(l, r))),
            BinOp::LaxNe => Ok(Val::Bool(!lax_eq(l, r))),
        }
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn eval_val(self, val: &Val) -> Result<Val, ErrorValue> {
        match self {
            UnaryOp::Neg => numeric::negate(val),
            UnaryOp::Not => Ok(Val::Bool(!val.is_truthy())),
            UnaryOp::BitNot => bitwise::bit_not(val),
        }
    }
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::BitNot => write!(f, "~"),
        }
    }
}
