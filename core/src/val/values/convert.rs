use std::sync::Arc;

use num_bigint::BigInt;
use rust_decimal::Decimal;

use crate::val::Symbol;

use super::{ClassDef, Closure, ErrorValue, NativeFunction, Object, Val};

impl From<String> for Val {
    #[inline]
    fn from(s: String) -> Self {
        Val::Str(Arc::<str>::from(s))
    }
}

impl From<&str> for Val {
    #[inline]
    fn from(s: &str) -> Self {
        Val::Str(Arc::from(s))
    }
}

impl From<Arc<str>> for Val {
    #[inline]
    fn from(s: Arc<str>) -> Self {
        Val::Str(s)
    }
}

impl From<char> for Val {
    #[inline]
    fn from(c: char) -> Self {
        Val::Char(c)
    }
}

impl From<i64> for Val {
    #[inline]
    fn from(i: i64) -> Self {
        Val::SmallInt(i)
    }
}

// Untyped integer literals in host code land here.
impl From<i32> for Val {
    #[inline]
    fn from(i: i32) -> Self {
        Val::SmallInt(i as i64)
    }
}

impl From<usize> for Val {
    #[inline]
    fn from(i: usize) -> Self {
        match i64::try_from(i) {
            Ok(small) => Val::SmallInt(small),
            Err(_) => Val::big_int(BigInt::from(i)),
        }
    }
}

impl From<BigInt> for Val {
    #[inline]
    fn from(i: BigInt) -> Self {
        Val::big_int(i)
    }
}

impl From<f64> for Val {
    #[inline]
    fn from(f: f64) -> Self {
        Val::Float(f)
    }
}

impl From<Decimal> for Val {
    #[inline]
    fn from(d: Decimal) -> Self {
        Val::BigFloat(d)
    }
}

impl From<bool> for Val {
    #[inline]
    fn from(b: bool) -> Self {
        Val::Bool(b)
    }
}

impl From<Symbol> for Val {
    #[inline]
    fn from(s: Symbol) -> Self {
        Val::Symbol(s)
    }
}

impl From<()> for Val {
    #[inline]
    fn from(_: ()) -> Self {
        Val::Nil
    }
}

impl<T: Into<Val>> From<Option<T>> for Val {
    fn from(v: Option<T>) -> Self {
        v.map_or(Val::Nil, Into::into)
    }
}

impl<T: Into<Val>> From<Vec<T>> for Val {
    fn from(items: Vec<T>) -> Self {
        Val::list(items.into_iter().map(Into::into).collect())
    }
}

impl From<ErrorValue> for Val {
    #[inline]
    fn from(err: ErrorValue) -> Self {
        err.into_val()
    }
}

impl From<Arc<Closure>> for Val {
    #[inline]
    fn from(c: Arc<Closure>) -> Self {
        Val::Closure(c)
    }
}

impl From<NativeFunction> for Val {
    #[inline]
    fn from(f: NativeFunction) -> Self {
        Val::Native(Arc::new(f))
    }
}

impl From<Arc<ClassDef>> for Val {
    #[inline]
    fn from(c: Arc<ClassDef>) -> Self {
        Val::Class(c)
    }
}

impl From<Arc<Object>> for Val {
    #[inline]
    fn from(o: Arc<Object>) -> Self {
        Val::Object(o)
    }
}

impl Val {
    /// Integer payload of any integer class when it fits in an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Val::SmallInt(i) | Val::Int64(i) => Some(i),
            Val::Int32(i) => Some(i as i64),
            Val::Int16(i) => Some(i as i64),
            Val::Int8(i) => Some(i as i64),
            Val::UInt64(i) => i64::try_from(i).ok(),
            Val::UInt32(i) => Some(i as i64),
            Val::UInt16(i) => Some(i as i64),
            Val::UInt8(i) => Some(i as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Val::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<Symbol> {
        match self {
            Val::Symbol(s) => Some(*s),
            _ => None,
        }
    }
}
