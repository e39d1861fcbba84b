//! Strict and lax comparison.
//!
//! Strict operators compare two values of the same class, or a pair from
//! one of the default families: {`Int`, `Float`, `BigFloat`} and
//! {`String`, `Char`}. Ordering across any other pair is an error while
//! `==` is simply false. Lax `=~` never fails and compares numbers by
//! mathematical value regardless of class.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::val::{ErrorValue, Val};

use super::BinOp;
use super::numeric::{coerce, decimal_from_f64, is_numeric};

/// Numeric value projected for cross-class comparison.
#[derive(Debug, Clone)]
pub(crate) enum Exact {
    Int(BigInt),
    Float(f64),
    Decimal(Decimal),
}

impl Exact {
    pub(crate) fn of(v: &Val) -> Option<Exact> {
        Some(match v {
            Val::SmallInt(i) => Exact::Int(BigInt::from(*i)),
            Val::BigInt(b) => Exact::Int((**b).clone()),
            Val::Float(f) | Val::Float64(f) => Exact::Float(*f),
            Val::Float32(f) => Exact::Float(*f as f64),
            Val::BigFloat(d) => Exact::Decimal(*d),
            Val::Int64(i) => Exact::Int(BigInt::from(*i)),
            Val::Int32(i) => Exact::Int(BigInt::from(*i)),
            Val::Int16(i) => Exact::Int(BigInt::from(*i)),
            Val::Int8(i) => Exact::Int(BigInt::from(*i)),
            Val::UInt64(i) => Exact::Int(BigInt::from(*i)),
            Val::UInt32(i) => Exact::Int(BigInt::from(*i)),
            Val::UInt16(i) => Exact::Int(BigInt::from(*i)),
            Val::UInt8(i) => Exact::Int(BigInt::from(*i)),
            _ => return None,
        })
    }

    fn is_nan(&self) -> bool {
        matches!(self, Exact::Float(f) if f.is_nan())
    }
}

/// `None` when either side is NaN.
pub(crate) fn exact_cmp(a: &Exact, b: &Exact) -> Option<Ordering> {
    match (a, b) {
        (Exact::Int(x), Exact::Int(y)) => Some(x.cmp(y)),
        (Exact::Float(x), Exact::Float(y)) => x.partial_cmp(y),
        (Exact::Decimal(x), Exact::Decimal(y)) => Some(x.cmp(y)),
        (Exact::Int(i), Exact::Float(f)) => int_cmp_f64(i, *f),
        (Exact::Float(f), Exact::Int(i)) => int_cmp_f64(i, *f).map(Ordering::reverse),
        (Exact::Decimal(d), Exact::Int(i)) => Some(decimal_cmp_int(d, i)),
        (Exact::Int(i), Exact::Decimal(d)) => Some(decimal_cmp_int(d, i).reverse()),
        (Exact::Decimal(d), Exact::Float(f)) => decimal_cmp_f64(d, *f),
        (Exact::Float(f), Exact::Decimal(d)) => decimal_cmp_f64(d, *f).map(Ordering::reverse),
    }
}

fn int_cmp_f64(i: &BigInt, f: f64) -> Option<Ordering> {
    if f.is_nan() {
        return None;
    }
    if f.is_infinite() {
        return Some(if f > 0.0 { Ordering::Less } else { Ordering::Greater });
    }
    let floor = f.floor();
    let floor_int = BigInt::from_f64(floor)?;
    match i.cmp(&floor_int) {
        Ordering::Equal if f > floor => Some(Ordering::Less),
        other => Some(other),
    }
}

fn decimal_cmp_int(d: &Decimal, i: &BigInt) -> Ordering {
    let trunc = d.trunc();
    let whole = trunc.to_i128().map(BigInt::from).unwrap_or_default();
    match whole.cmp(i) {
        Ordering::Equal => {
            let frac = *d - trunc;
            frac.cmp(&Decimal::ZERO)
        }
        other => other,
    }
}

fn decimal_cmp_f64(d: &Decimal, f: f64) -> Option<Ordering> {
    if f.is_nan() {
        return None;
    }
    match decimal_from_f64(f) {
        Some(g) => Some(d.cmp(&g)),
        // Infinite or beyond the decimal range.
        None => Some(if f.is_sign_positive() { Ordering::Less } else { Ordering::Greater }),
    }
}

fn is_default_numeric(v: &Val) -> bool {
    matches!(v, Val::SmallInt(_) | Val::BigInt(_) | Val::Float(_) | Val::BigFloat(_))
}

fn is_text(v: &Val) -> bool {
    matches!(v, Val::Str(_) | Val::Char(_))
}

fn same_class(l: &Val, r: &Val) -> bool {
    std::mem::discriminant(l) == std::mem::discriminant(r) || l.class_name() == r.class_name()
}

/// Whether the strict operators accept this pair of classes.
pub(crate) fn comparable(l: &Val, r: &Val) -> bool {
    (is_numeric(l) && same_class(l, r))
        || (is_default_numeric(l) && is_default_numeric(r))
        || (is_text(l) && is_text(r))
}

/// Strict `==` for built-in values. Never fails.
pub(crate) fn strict_eq(l: &Val, r: &Val) -> bool {
    match (l, r) {
        (Val::SmallInt(a), Val::SmallInt(b)) => a == b,
        (Val::Float(a), Val::Float(b))
        | (Val::Float64(a), Val::Float64(b)) => a == b,
        (Val::Float32(a), Val::Float32(b)) => a == b,
        (Val::Str(a), Val::Str(b)) => a == b,
        (Val::Str(s), Val::Char(c)) | (Val::Char(c), Val::Str(s)) => is_single_char(s, *c),
        (Val::Tuple(a), Val::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| strict_eq(x, y))
        }
        (Val::Record(a), Val::Record(b)) => {
            a.len() == b.len()
                && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| ka == kb && strict_eq(va, vb))
        }
        _ if is_numeric(l) && is_numeric(r) => {
            comparable(l, r) && numeric_cmp(l, r) == Some(Ordering::Equal)
        }
        _ => l == r,
    }
}

/// `< <= > >=`
pub(crate) fn strict_order(op: BinOp, l: &Val, r: &Val) -> Result<bool, ErrorValue> {
    let ordering = match (l, r) {
        (Val::SmallInt(a), Val::SmallInt(b)) => Some(a.cmp(b)),
        (Val::Float(a), Val::Float(b)) => a.partial_cmp(b),
        (Val::Str(a), Val::Str(b)) => Some(a.as_ref().cmp(b.as_ref())),
        (Val::Str(a), Val::Char(c)) => Some(a.as_ref().cmp(c.encode_utf8(&mut [0; 4]))),
        (Val::Char(c), Val::Str(b)) => Some((*c.encode_utf8(&mut [0; 4])).cmp(b.as_ref())),
        (Val::Char(a), Val::Char(b)) => Some(a.cmp(b)),
        _ if is_numeric(l) => {
            if !comparable(l, r) {
                return Err(coerce(l, r));
            }
            numeric_cmp(l, r)
        }
        (Val::Str(_) | Val::Char(_), _) => return Err(coerce(l, r)),
        _ => return Err(ErrorValue::no_method(op.symbol(), l)),
    };
    // NaN compares false with everything.
    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match op {
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::Le => ordering != Ordering::Greater,
        BinOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

fn numeric_cmp(l: &Val, r: &Val) -> Option<Ordering> {
    let (a, b) = (Exact::of(l)?, Exact::of(r)?);
    exact_cmp(&a, &b)
}

fn is_single_char(s: &str, c: char) -> bool {
    let mut chars = s.chars();
    chars.next() == Some(c) && chars.next().is_none()
}

/// `=~`: total, never fails, reflexive (NaN =~ NaN holds).
pub(crate) fn lax_eq(l: &Val, r: &Val) -> bool {
    if let (Some(a), Some(b)) = (Exact::of(l), Exact::of(r)) {
        if a.is_nan() || b.is_nan() {
            return a.is_nan() && b.is_nan();
        }
        return exact_cmp(&a, &b) == Some(Ordering::Equal);
    }
    match (l, r) {
        (Val::Str(s), Val::Char(c)) | (Val::Char(c), Val::Str(s)) => is_single_char(s, *c),
        (Val::Tuple(a), Val::Tuple(b)) => a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| lax_eq(x, y)),
        (Val::Record(a), Val::Record(b)) => {
            a.len() == b.len()
                && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| lax_eq(ka, kb) && lax_eq(va, vb))
        }
        _ => l.same_ref(r) || strict_eq(l, r),
    }
}
