use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use rust_decimal::Decimal;

use crate::util::fast_map::{FastHashMap, FastHashSet, fast_hash_map_with_capacity, fast_hash_set_with_capacity};
use crate::val::Symbol;

mod convert;
mod display;
mod error;
mod function;
mod object;

pub use error::{ErrorKind, ErrorValue};
pub use function::{Closure, NativeFunction, RustFunction};
pub use object::{ClassDef, Object};

pub type ListRef = Arc<RwLock<Vec<Val>>>;
pub type SetRef = Arc<RwLock<FastHashSet<Val>>>;
pub type MapRef = Arc<RwLock<FastHashMap<Val, Val>>>;

/// Runtime value.
///
/// Scalars are stored inline; reference types are shared handles whose
/// payload lives as long as the longest holder (register, upvalue cell or
/// container). `SmallInt` and `BigInt` are both of class `Std::Int`; a
/// `BigInt` payload never fits in an `i64`.
#[derive(Debug, Clone, Default)]
pub enum Val {
    #[default]
    Nil,
    Bool(bool),
    SmallInt(i64),
    BigInt(Arc<BigInt>),
    Float(f64),
    BigFloat(Decimal),
    Float64(f64),
    Float32(f32),
    Int64(i64),
    Int32(i32),
    Int16(i16),
    Int8(i8),
    UInt64(u64),
    UInt32(u32),
    UInt16(u16),
    UInt8(u8),
    Char(char),
    Str(Arc<str>),
    Symbol(Symbol),
    /// Immutable ordered sequence
    Tuple(Arc<[Val]>),
    /// Mutable ordered sequence
    List(ListRef),
    Set(SetRef),
    Map(MapRef),
    /// Immutable key-value sequence that preserves insertion order
    Record(Arc<[(Val, Val)]>),
    Closure(Arc<Closure>),
    Native(Arc<NativeFunction>),
    Class(Arc<ClassDef>),
    Object(Arc<Object>),
    Error(Arc<ErrorValue>),
}

impl Val {
    /// Runtime class of the value, e.g. `Std::Int`.
    pub fn class_name(&self) -> &str {
        match self {
            Val::Nil => "Std::Nil",
            Val::Bool(_) => "Std::Bool",
            Val::SmallInt(_) | Val::BigInt(_) => "Std::Int",
            Val::Float(_) => "Std::Float",
            Val::BigFloat(_) => "Std::BigFloat",
            Val::Float64(_) => "Std::Float64",
            Val::Float32(_) => "Std::Float32",
            Val::Int64(_) => "Std::Int64",
            Val::Int32(_) => "Std::Int32",
            Val::Int16(_) => "Std::Int16",
            Val::Int8(_) => "Std::Int8",
            Val::UInt64(_) => "Std::UInt64",
            Val::UInt32(_) => "Std::UInt32",
            Val::UInt16(_) => "Std::UInt16",
            Val::UInt8(_) => "Std::UInt8",
            Val::Char(_) => "Std::Char",
            Val::Str(_) => "Std::String",
            Val::Symbol(_) => "Std::Symbol",
            Val::Tuple(_) => "Std::Tuple",
            Val::List(_) => "Std::List",
            Val::Set(_) => "Std::Set",
            Val::Map(_) => "Std::Map",
            Val::Record(_) => "Std::Record",
            Val::Closure(_) => "Std::Closure",
            Val::Native(_) => "Std::Function",
            Val::Class(_) => "Std::Class",
            Val::Object(obj) => obj.class.name.as_ref(),
            Val::Error(err) => err.kind.class_name(),
        }
    }

    /// Whether the value is an instance of `class_name` or one of its
    /// subclasses. Every value is a `Std::Value`.
    pub fn is_instance_of(&self, class_name: &str) -> bool {
        if class_name == "Std::Value" || self.class_name() == class_name {
            return true;
        }
        match self {
            Val::Object(obj) => obj.class.is_subclass_of(class_name),
            Val::Error(err) => err.kind.is_a(class_name),
            _ => false,
        }
    }

    /// Only `nil` and `false` are falsy.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Val::Nil | Val::Bool(false))
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Val::Nil)
    }

    /// Reference-type handles compared by identity.
    pub fn same_ref(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::List(a), Val::List(b)) => Arc::ptr_eq(a, b),
            (Val::Set(a), Val::Set(b)) => Arc::ptr_eq(a, b),
            (Val::Map(a), Val::Map(b)) => Arc::ptr_eq(a, b),
            (Val::Tuple(a), Val::Tuple(b)) => Arc::ptr_eq(a, b),
            (Val::Record(a), Val::Record(b)) => Arc::ptr_eq(a, b),
            (Val::Closure(a), Val::Closure(b)) => Arc::ptr_eq(a, b),
            (Val::Native(a), Val::Native(b)) => Arc::ptr_eq(a, b),
            (Val::Class(a), Val::Class(b)) => Arc::ptr_eq(a, b),
            (Val::Object(a), Val::Object(b)) => Arc::ptr_eq(a, b),
            (Val::Error(a), Val::Error(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn ref_addr(&self) -> Option<usize> {
        let addr = match self {
            Val::List(a) => Arc::as_ptr(a) as *const () as usize,
            Val::Set(a) => Arc::as_ptr(a) as *const () as usize,
            Val::Map(a) => Arc::as_ptr(a) as *const () as usize,
            Val::Closure(a) => Arc::as_ptr(a) as *const () as usize,
            Val::Native(a) => Arc::as_ptr(a) as *const () as usize,
            Val::Class(a) => Arc::as_ptr(a) as *const () as usize,
            Val::Object(a) => Arc::as_ptr(a) as *const () as usize,
            Val::Error(a) => Arc::as_ptr(a) as *const () as usize,
            _ => return None,
        };
        Some(addr)
    }

    // Constructors

    pub fn str(s: impl AsRef<str>) -> Val {
        Val::Str(Arc::from(s.as_ref()))
    }

    pub fn symbol(name: &str) -> Val {
        Val::Symbol(Symbol::intern(name))
    }

    pub fn list(items: Vec<Val>) -> Val {
        Val::List(Arc::new(RwLock::new(items)))
    }

    pub fn tuple(items: Vec<Val>) -> Val {
        Val::Tuple(Arc::from(items))
    }

    pub fn set(items: impl IntoIterator<Item = Val>) -> Val {
        let iter = items.into_iter();
        let mut set = fast_hash_set_with_capacity(iter.size_hint().0);
        set.extend(iter);
        Val::Set(Arc::new(RwLock::new(set)))
    }

    pub fn map(pairs: impl IntoIterator<Item = (Val, Val)>) -> Val {
        let iter = pairs.into_iter();
        let mut map = fast_hash_map_with_capacity(iter.size_hint().0);
        map.extend(iter);
        Val::Map(Arc::new(RwLock::new(map)))
    }

    /// Later duplicates of a key replace the earlier value in place.
    pub fn record(pairs: Vec<(Val, Val)>) -> Val {
        let mut out: Vec<(Val, Val)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            match out.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => out.push((key, value)),
            }
        }
        Val::Record(Arc::from(out))
    }

    /// Wraps an arbitrary-precision integer, demoting to `SmallInt` when it fits.
    pub fn big_int(value: BigInt) -> Val {
        match value.to_i64() {
            Some(small) => Val::SmallInt(small),
            None => Val::BigInt(Arc::new(value)),
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<Arc<str>>) -> Val {
        ErrorValue::new(kind, message).into_val()
    }
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Key equality: same variant and same payload, identity for mutable
/// reference types. Cross-class operator semantics live in `op::compare`.
impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Nil, Val::Nil) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::SmallInt(a), Val::SmallInt(b)) => a == b,
            (Val::BigInt(a), Val::BigInt(b)) => a == b,
            (Val::Float(a), Val::Float(b)) => a.to_bits() == b.to_bits(),
            (Val::BigFloat(a), Val::BigFloat(b)) => a == b,
            (Val::Float64(a), Val::Float64(b)) => a.to_bits() == b.to_bits(),
            (Val::Float32(a), Val::Float32(b)) => a.to_bits() == b.to_bits(),
            (Val::Int64(a), Val::Int64(b)) => a == b,
            (Val::Int32(a), Val::Int32(b)) => a == b,
            (Val::Int16(a), Val::Int16(b)) => a == b,
            (Val::Int8(a), Val::Int8(b)) => a == b,
            (Val::UInt64(a), Val::UInt64(b)) => a == b,
            (Val::UInt32(a), Val::UInt32(b)) => a == b,
            (Val::UInt16(a), Val::UInt16(b)) => a == b,
            (Val::UInt8(a), Val::UInt8(b)) => a == b,
            (Val::Char(a), Val::Char(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::Symbol(a), Val::Symbol(b)) => a == b,
            (Val::Tuple(a), Val::Tuple(b)) => a == b,
            (Val::Record(a), Val::Record(b)) => a == b,
            _ => self.same_ref(other),
        }
    }
}

impl Eq for Val {}

impl Hash for Val {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Val::Nil => {}
            Val::Bool(b) => b.hash(state),
            Val::SmallInt(i) => i.hash(state),
            Val::BigInt(i) => i.hash(state),
            Val::Float(f) | Val::Float64(f) => f.to_bits().hash(state),
            Val::BigFloat(d) => d.normalize().hash(state),
            Val::Float32(f) => f.to_bits().hash(state),
            Val::Int64(i) => i.hash(state),
            Val::Int32(i) => i.hash(state),
            Val::Int16(i) => i.hash(state),
            Val::Int8(i) => i.hash(state),
            Val::UInt64(i) => i.hash(state),
            Val::UInt32(i) => i.hash(state),
            Val::UInt16(i) => i.hash(state),
            Val::UInt8(i) => i.hash(state),
            Val::Char(c) => c.hash(state),
            Val::Str(s) => s.hash(state),
            Val::Symbol(s) => s.hash(state),
            Val::Tuple(items) => items.hash(state),
            Val::Record(pairs) => pairs.hash(state),
            other => other.ref_addr().hash(state),
        }
    }
}
