//! Arithmetic over the numeric tower.
//!
//! The left operand's class picks the implementation and the set of right
//! classes it accepts:
//!
//! | left        | accepted right              | result      |
//! |-------------|-----------------------------|-------------|
//! | `Int`       | `Int` (`Float` for `%` only)| `Int`       |
//! | `Float`     | `Float`, `Int`              | `Float`     |
//! | `BigFloat`  | `BigFloat`, `Float`, `Int`  | `BigFloat`  |
//! | fixed width | exactly the same class      | same class  |
//!
//! `Int` promotes to an arbitrary-precision payload on overflow; fixed widths
//! wrap.

use std::str::FromStr;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Float, FromPrimitive, Signed, ToPrimitive, Zero};
use rust_decimal::{Decimal, MathematicalOps};

use crate::val::{ErrorKind, ErrorValue, Val};

use super::BinOp;

/// Fixed-width integer payload. Arithmetic is carried out in `i128` and
/// truncated back to the class width.
pub(crate) trait FixedInt: Copy {
    const BITS: u32;
    const SIGNED: bool;

    fn to_i128(self) -> i128;
    /// Truncates to the low `BITS` bits of `bits`.
    fn from_bits(bits: u64) -> Self;
    fn into_val(self) -> Val;

    #[inline]
    fn wrap_i128(v: i128) -> Self {
        Self::from_bits(v as u64)
    }

    /// Two's complement bit pattern zero-extended to 64 bits.
    #[inline]
    fn to_bits(self) -> u64 {
        let raw = self.to_i128() as u64;
        if Self::BITS == 64 { raw } else { raw & ((1u64 << Self::BITS) - 1) }
    }
}

macro_rules! fixed_int {
    ($t:ty, $signed:expr, $variant:ident) => {
        impl FixedInt for $t {
            const BITS: u32 = <$t>::BITS;
            const SIGNED: bool = $signed;

            #[inline]
            fn to_i128(self) -> i128 {
                self as i128
            }

            #[inline]
            fn from_bits(bits: u64) -> Self {
                bits as $t
            }

            #[inline]
            fn into_val(self) -> Val {
                Val::$variant(self)
            }
        }
    };
}

fixed_int!(i64, true, Int64);
fixed_int!(i32, true, Int32);
fixed_int!(i16, true, Int16);
fixed_int!(i8, true, Int8);
fixed_int!(u64, false, UInt64);
fixed_int!(u32, false, UInt32);
fixed_int!(u16, false, UInt16);
fixed_int!(u8, false, UInt8);

/// `+ - * / % **`
pub(crate) fn arith(op: BinOp, l: &Val, r: &Val) -> Result<Val, ErrorValue> {
    macro_rules! same_class {
        ($variant:ident, $a:expr) => {
            match r {
                Val::$variant(b) => fixed_arith(op, *$a, *b),
                _ => Err(coerce(l, r)),
            }
        };
    }

    match l {
        Val::SmallInt(_) | Val::BigInt(_) => int_arith(op, l, r),
        Val::Float(a) => {
            let b = match r {
                Val::Float(b) => *b,
                Val::SmallInt(_) | Val::BigInt(_) => int_to_f64(r),
                _ => return Err(coerce(l, r)),
            };
            Ok(Val::Float(float_arith(op, *a, b)))
        }
        Val::BigFloat(a) => {
            let b = match r {
                Val::BigFloat(b) => *b,
                Val::Float(f) => decimal_from_f64(*f).ok_or_else(|| not_representable(r))?,
                Val::SmallInt(_) | Val::BigInt(_) if op == BinOp::Pow => return decimal_powi(*a, r),
                Val::SmallInt(_) | Val::BigInt(_) => decimal_from_int(r).ok_or_else(|| not_representable(r))?,
                _ => return Err(coerce(l, r)),
            };
            decimal_arith(op, *a, b)
        }
        Val::Float64(a) => match r {
            Val::Float64(b) => Ok(Val::Float64(float_arith(op, *a, *b))),
            _ => Err(coerce(l, r)),
        },
        Val::Float32(a) => match r {
            Val::Float32(b) => Ok(Val::Float32(float_arith(op, *a, *b))),
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
        Val::Str(a) if op == BinOp::Add => match r {
            Val::Str(b) => {
                let mut out = String::with_capacity(a.len() + b.len());
                out.push_str(a);
                out.push_str(b);
                Ok(Val::from(out))
            }
            Val::Char(c) => {
                let mut out = String::with_capacity(a.len() + c.len_utf8());
                out.push_str(a);
                out.push(*c);
                Ok(Val::from(out))
            }
            _ => Err(coerce(l, r)),
        },
        _ => Err(ErrorValue::no_method(op.symbol(), l)),
    }
}

pub(crate) fn coerce(l: &Val, r: &Val) -> ErrorValue {
    ErrorValue::coerce(l.class_name(), r.class_name())
}

fn not_representable(r: &Val) -> ErrorValue {
    ErrorValue::new(
        ErrorKind::TypeError,
        format!("{} cannot be coerced into `Std::BigFloat`", r.inspect()),
    )
}

fn overflow(class: &str) -> ErrorValue {
    ErrorValue::new(ErrorKind::Error, format!("arithmetic overflow in `{class}`"))
}

// Int

fn int_arith(op: BinOp, l: &Val, r: &Val) -> Result<Val, ErrorValue> {
    match (l, r) {
        (Val::SmallInt(a), Val::SmallInt(b)) => small_arith(op, *a, *b),
        (Val::SmallInt(_) | Val::BigInt(_), Val::SmallInt(_) | Val::BigInt(_)) => {
            big_arith(op, to_big(l), to_big(r))
        }
        (_, Val::Float(b)) if op == BinOp::Mod => Ok(Val::Float(float_arith(op, int_to_f64(l), *b))),
        _ => Err(coerce(l, r)),
    }
}

fn small_arith(op: BinOp, a: i64, b: i64) -> Result<Val, ErrorValue> {
    let fast = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(ErrorValue::zero_division());
            }
            a.checked_div(b)
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(ErrorValue::zero_division());
            }
            // i64::MIN % -1 overflows
            if b == -1 { Some(0) } else { Some(a.mod_floor(&b)) }
        }
        BinOp::Pow => match u32::try_from(b) {
            Ok(exp) => a.checked_pow(exp),
            Err(_) => None,
        },
        _ => return Err(ErrorValue::no_method(op.symbol(), &Val::SmallInt(a))),
    };
    match fast {
        Some(v) => Ok(Val::SmallInt(v)),
        None => big_arith(op, BigInt::from(a), BigInt::from(b)),
    }
}

fn big_arith(op: BinOp, a: BigInt, b: BigInt) -> Result<Val, ErrorValue> {
    let out = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b.is_zero() {
                return Err(ErrorValue::zero_division());
            }
            a / b
        }
        BinOp::Mod => {
            if b.is_zero() {
                return Err(ErrorValue::zero_division());
            }
            a.mod_floor(&b)
        }
        BinOp::Pow => return int_pow(a, b),
        _ => return Err(ErrorValue::no_method(op.symbol(), &Val::big_int(a))),
    };
    Ok(Val::big_int(out))
}

/// Negative exponents truncate to zero unless the base is `1` or `-1`.
fn int_pow(base: BigInt, exp: BigInt) -> Result<Val, ErrorValue> {
    let one = BigInt::from(1);
    let minus_one = BigInt::from(-1);
    if base == one {
        return Ok(Val::SmallInt(1));
    }
    if base == minus_one {
        return Ok(Val::SmallInt(if exp.is_even() { 1 } else { -1 }));
    }
    if exp.is_negative() {
        if base.is_zero() {
            return Err(ErrorValue::zero_division());
        }
        return Ok(Val::SmallInt(0));
    }
    if base.is_zero() {
        return Ok(Val::SmallInt(if exp.is_zero() { 1 } else { 0 }));
    }
    let Some(exp) = exp.to_u32() else {
        return Err(ErrorValue::new(ErrorKind::ArgumentError, "exponent is too large"));
    };
    Ok(Val::big_int(base.pow(exp)))
}

pub(crate) fn to_big(v: &Val) -> BigInt {
    match v {
        Val::SmallInt(i) => BigInt::from(*i),
        Val::BigInt(b) => (**b).clone(),
        other => other.as_i64().map(BigInt::from).unwrap_or_default(),
    }
}

pub(crate) fn int_to_f64(v: &Val) -> f64 {
    match v {
        Val::SmallInt(i) => *i as f64,
        Val::BigInt(b) => b.to_f64().unwrap_or(if b.is_negative() { f64::NEG_INFINITY } else { f64::INFINITY }),
        _ => f64::NAN,
    }
}

// Float

/// IEEE arithmetic; `%` is floored like the integer version.
fn float_arith<F: Float>(op: BinOp, a: F, b: F) -> F {
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Mod => {
            let m = a % b;
            if !m.is_zero() && (m < F::zero()) != (b < F::zero()) { m + b } else { m }
        }
        BinOp::Pow => a.powf(b),
        _ => F::nan(),
    }
}

// BigFloat

fn decimal_arith(op: BinOp, a: Decimal, b: Decimal) -> Result<Val, ErrorValue> {
    let out = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => {
            if b.is_zero() {
                return Err(ErrorValue::zero_division());
            }
            a.checked_div(b)
        }
        BinOp::Mod => {
            if b.is_zero() {
                return Err(ErrorValue::zero_division());
            }
            a.checked_rem(b).map(|m| {
                if !m.is_zero() && m.is_sign_negative() != b.is_sign_negative() { m + b } else { m }
            })
        }
        BinOp::Pow => a.checked_powd(b),
        _ => return Err(ErrorValue::no_method(op.symbol(), &Val::BigFloat(a))),
    };
    out.map(Val::BigFloat).ok_or_else(|| overflow("Std::BigFloat"))
}

fn decimal_powi(base: Decimal, exp: &Val) -> Result<Val, ErrorValue> {
    let exp = match exp {
        Val::SmallInt(i) => *i,
        _ => return Err(ErrorValue::new(ErrorKind::ArgumentError, "exponent is too large")),
    };
    base.checked_powi(exp)
        .map(Val::BigFloat)
        .ok_or_else(|| overflow("Std::BigFloat"))
}

/// Converts through the shortest round-trip decimal text, so `0.1` becomes
/// exactly `0.1bf`.
pub(crate) fn decimal_from_f64(f: f64) -> Option<Decimal> {
    if !f.is_finite() {
        return None;
    }
    let mut buf = ryu::Buffer::new();
    let text = buf.format_finite(f);
    let parsed = if text.contains('e') {
        Decimal::from_scientific(text).ok()
    } else {
        Decimal::from_str(text).ok()
    };
    parsed.or_else(|| Decimal::from_f64_retain(f))
}

pub(crate) fn decimal_from_int(v: &Val) -> Option<Decimal> {
    match v {
        Val::SmallInt(i) => Some(Decimal::from(*i)),
        Val::BigInt(b) => b.to_i128().and_then(Decimal::from_i128),
        _ => None,
    }
}

// Fixed widths

fn fixed_arith<T: FixedInt>(op: BinOp, a: T, b: T) -> Result<Val, ErrorValue> {
    let (x, y) = (a.to_i128(), b.to_i128());
    let out = match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Mul => x.wrapping_mul(y),
        BinOp::Div => {
            if y == 0 {
                return Err(ErrorValue::zero_division());
            }
            x / y
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(ErrorValue::zero_division());
            }
            let m = x % y;
            if m != 0 && (m < 0) != (y < 0) { m + y } else { m }
        }
        BinOp::Pow => return Ok(fixed_pow(a, y).into_val()),
        _ => return Err(ErrorValue::no_method(op.symbol(), &a.into_val())),
    };
    Ok(T::wrap_i128(out).into_val())
}

fn fixed_pow<T: FixedInt>(base: T, exp: i128) -> T {
    let b = base.to_i128();
    if exp < 0 {
        return match b {
            1 => T::wrap_i128(1),
            -1 => T::wrap_i128(if exp % 2 == 0 { 1 } else { -1 }),
            _ => T::wrap_i128(0),
        };
    }
    // Square-and-multiply in 64-bit wrapping arithmetic; the low BITS bits
    // are exact.
    let mut acc: u64 = 1;
    let mut sq = b as u64;
    let mut e = exp as u64;
    while e > 0 {
        if e & 1 == 1 {
            acc = acc.wrapping_mul(sq);
        }
        sq = sq.wrapping_mul(sq);
        e >>= 1;
    }
    T::from_bits(acc)
}

/// Unary `-`.
pub(crate) fn negate(v: &Val) -> Result<Val, ErrorValue> {
    Ok(match v {
        Val::SmallInt(i) => match i.checked_neg() {
            Some(n) => Val::SmallInt(n),
            None => Val::big_int(-BigInt::from(*i)),
        },
        Val::BigInt(b) => Val::big_int(-(**b).clone()),
        Val::Float(f) => Val::Float(-f),
        Val::Float64(f) => Val::Float64(-f),
        Val::Float32(f) => Val::Float32(-f),
        Val::BigFloat(d) => Val::BigFloat(-*d),
        Val::Int64(i) => Val::Int64(i.wrapping_neg()),
        Val::Int32(i) => Val::Int32(i.wrapping_neg()),
        Val::Int16(i) => Val::Int16(i.wrapping_neg()),
        Val::Int8(i) => Val::Int8(i.wrapping_neg()),
        Val::UInt64(i) => Val::UInt64(i.wrapping_neg()),
        Val::UInt32(i) => Val::UInt32(i.wrapping_neg()),
        Val::UInt16(i) => Val::UInt16(i.wrapping_neg()),
        Val::UInt8(i) => Val::UInt8(i.wrapping_neg()),
        _ => return Err(ErrorValue::no_method("-@", v)),
    })
}

/// Whether the value belongs to one of the numeric classes.
pub(crate) fn is_numeric(v: &Val) -> bool {
    matches!(
        v,
        Val::SmallInt(_)
            | Val::BigInt(_)
            | Val::Float(_)
            | Val::BigFloat(_)
            | Val::Float64(_)
            | Val::Float32(_)
            | Val::Int64(_)
            | Val::Int32(_)
            | Val::Int16(_)
            | Val::Int8(_)
            | Val::UInt64(_)
            | Val::UInt32(_)
            | Val::UInt16(_)
            | Val::UInt8(_)
    )
}

pub(crate) fn is_integer(v: &Val) -> bool {
    matches!(
        v,
        Val::SmallInt(_)
            | Val::BigInt(_)
            | Val::Int64(_)
            | Val::Int32(_)
            | Val::Int16(_)
            | Val::Int8(_)
            | Val::UInt64(_)
            | Val::UInt32(_)
            | Val::UInt16(_)
            | Val::UInt8(_)
    )
}
