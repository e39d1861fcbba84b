//! `& | ^ ~` and the shift family.
//!
//! Shifts take the result class from the left operand and accept any integer
//! class on the right. A negative amount reverses the direction. The logical
//! variants `<<<`/`>>>` exist only for fixed-width classes and reinterpret the
//! value as unsigned of the same width.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};

use crate::val::{ErrorKind, ErrorValue, Val};

use super::BinOp;
use super::numeric::{FixedInt, coerce, to_big};

// Larger left shifts of an `Int` would allocate unbounded memory.
const MAX_INT_SHIFT: u64 = 1 << 24;

/// `& | ^`
pub(crate) fn logic(op: BinOp, l: &Val, r: &Val) -> Result<Val, ErrorValue> {
    macro_rules! same_class {
        ($variant:ident, $a:expr) => {
            match r {
                Val::$variant(b) => Ok(fixed_logic(op, *$a, *b)),
                _ => Err(coerce(l, r)),
            }
        };
    }

    match l {
        Val::SmallInt(a) => match r {
            Val::SmallInt(b) => Ok(Val::SmallInt(match op {
                BinOp::BitAnd => a & b,
                BinOp::BitOr => a | b,
                _ => a ^ b,
            })),
            Val::BigInt(_) => Ok(big_logic(op, BigInt::from(*a), to_big(r))),
            _ => Err(coerce(l, r)),
        },
        Val::BigInt(a) => match r {
            Val::SmallInt(_) | Val::BigInt(_) => Ok(big_logic(op, (**a).clone(), to_big(r))),
            _ => Err(coerce(l, r)),
        },
        Val::Int64(a) => same_class!(Int64, a),
        Val::Int32(a) => same_class!(Int32, a),
        Val::Int16(a) => same_class!(Int16, a),
        Val::Int8(a) => same_class!(Int8, a),
        Val::UInt64(a) => same_class!(UInt64, a),
        Val::UInt32(a) => same_class!(UInt32, a),
        Val::UInt16(a) => same_class!(UInt16, a),
        Val::UInt8(a) => same_class!(UInt8, a),
        _ => Err(ErrorValue::no_method(op.symbol(), l)),
    }
}

fn big_logic(op: BinOp, a: BigInt, b: BigInt) -> Val {
    Val::big_int(match op {
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        _ => a ^ b,
    })
}

fn fixed_logic<T: FixedInt>(op: BinOp, a: T, b: T) -> Val {
    let (x, y) = (a.to_bits(), b.to_bits());
    T::from_bits(match op {
        BinOp::BitAnd => x & y,
        BinOp::BitOr => x | y,
        _ => x ^ y,
    })
    .into_val()
}

/// Unary `~`.
pub(crate) fn bit_not(v: &Val) -> Result<Val, ErrorValue> {
    Ok(match v {
        Val::SmallInt(i) => Val::SmallInt(!i),
        Val::BigInt(b) => Val::big_int(!(**b).clone()),
        Val::Int64(i) => Val::Int64(!i),
        Val::Int32(i) => Val::Int32(!i),
        Val::Int16(i) => Val::Int16(!i),
        Val::Int8(i) => Val::Int8(!i),
        Val::UInt64(i) => Val::UInt64(!i),
        Val::UInt32(i) => Val::UInt32(!i),
        Val::UInt16(i) => Val::UInt16(!i),
        Val::UInt8(i) => Val::UInt8(!i),
        _ => return Err(ErrorValue::no_method("~", v)),
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Dir {
    Left,
    Right,
}

/// `<< >> <<< >>>`
pub(crate) fn shift(op: BinOp, l: &Val, r: &Val) -> Result<Val, ErrorValue> {
    let logical = matches!(op, BinOp::LogicShl | BinOp::LogicShr);
    let is_fixed = matches!(
        l,
        Val::Int64(_)
            | Val::Int32(_)
            | Val::Int16(_)
            | Val::Int8(_)
            | Val::UInt64(_)
            | Val::UInt32(_)
            | Val::UInt16(_)
            | Val::UInt8(_)
    );
    let is_int = matches!(l, Val::SmallInt(_) | Val::BigInt(_));
    if !(is_fixed || (is_int && !logical)) {
        return Err(ErrorValue::no_method(op.symbol(), l));
    }

    let amount = shift_amount(r)?;
    let base = if matches!(op, BinOp::Shl | BinOp::LogicShl) { Dir::Left } else { Dir::Right };
    let dir = match (base, amount < 0) {
        (d, false) => d,
        (Dir::Left, true) => Dir::Right,
        (Dir::Right, true) => Dir::Left,
    };
    let n = amount.unsigned_abs();

    match l {
        Val::SmallInt(_) | Val::BigInt(_) => int_shift(l, dir, n),
        Val::Int64(a) => Ok(fixed_shift(*a, dir, n, logical)),
        Val::Int32(a) => Ok(fixed_shift(*a, dir, n, logical)),
        Val::Int16(a) => Ok(fixed_shift(*a, dir, n, logical)),
        Val::Int8(a) => Ok(fixed_shift(*a, dir, n, logical)),
        Val::UInt64(a) => Ok(fixed_shift(*a, dir, n, logical)),
        Val::UInt32(a) => Ok(fixed_shift(*a, dir, n, logical)),
        Val::UInt16(a) => Ok(fixed_shift(*a, dir, n, logical)),
        Val::UInt8(a) => Ok(fixed_shift(*a, dir, n, logical)),
        _ => Err(ErrorValue::no_method(op.symbol(), l)),
    }
}

/// Any integer class; out-of-range amounts saturate.
fn shift_amount(r: &Val) -> Result<i64, ErrorValue> {
    match r {
        Val::BigInt(b) => Ok(if b.is_negative() { i64::MIN } else { i64::MAX }),
        Val::UInt64(u) => Ok(i64::try_from(*u).unwrap_or(i64::MAX)),
        other => other.as_i64().ok_or_else(|| ErrorValue::shift_operand(r)),
    }
}

fn int_shift(l: &Val, dir: Dir, n: u64) -> Result<Val, ErrorValue> {
    match (dir, l) {
        // Arithmetic right shift floors.
        (Dir::Right, Val::SmallInt(a)) => Ok(Val::SmallInt(a >> n.min(63))),
        (Dir::Right, Val::BigInt(b)) => {
            let bits = b.bits();
            if n >= bits {
                return Ok(Val::SmallInt(if b.is_negative() { -1 } else { 0 }));
            }
            Ok(Val::big_int((**b).clone() >> n))
        }
        (Dir::Left, Val::SmallInt(0)) => Ok(Val::SmallInt(0)),
        (Dir::Left, Val::SmallInt(a)) if n < 63 && (a << n) >> n == *a => Ok(Val::SmallInt(a << n)),
        (Dir::Left, _) => {
            if n > MAX_INT_SHIFT {
                return Err(ErrorValue::new(
                    ErrorKind::ArgumentError,
                    format!("shift amount is too large: {n}"),
                ));
            }
            let shifted = to_big(l) << n.to_usize().unwrap_or(usize::MAX);
            Ok(Val::big_int(shifted))
        }
        _ => Err(ErrorValue::shift_operand(l)),
    }
}

fn fixed_shift<T: FixedInt>(a: T, dir: Dir, n: u64, logical: bool) -> Val {
    let out = match dir {
        Dir::Left => {
            if n >= T::BITS as u64 {
                T::from_bits(0)
            } else {
                T::from_bits(a.to_bits() << n)
            }
        }
        Dir::Right if logical || !T::SIGNED => {
            if n >= T::BITS as u64 {
                T::from_bits(0)
            } else {
                T::from_bits(a.to_bits() >> n)
            }
        }
        // Sign-extending.
        Dir::Right => T::wrap_i128(a.to_i128() >> n.min(T::BITS as u64 - 1)),
    };
    out.into_val()
}
