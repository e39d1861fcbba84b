use std::fmt;
use std::sync::Arc;

use super::Val;

/// Built-in error classes. Every kind except [`ErrorKind::Error`] is a
/// subclass of `Std::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Error,
    TypeError,
    NoMethodError,
    PrimitiveValueError,
    ArgumentError,
    ZeroDivisionError,
    IndexError,
    StackOverflowError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::Error,
        ErrorKind::TypeError,
        ErrorKind::NoMethodError,
        ErrorKind::PrimitiveValueError,
        ErrorKind::ArgumentError,
        ErrorKind::ZeroDivisionError,
        ErrorKind::IndexError,
        ErrorKind::StackOverflowError,
    ];

    pub fn class_name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Std::Error",
            ErrorKind::TypeError => "Std::TypeError",
            ErrorKind::NoMethodError => "Std::NoMethodError",
            ErrorKind::PrimitiveValueError => "Std::PrimitiveValueError",
            ErrorKind::ArgumentError => "Std::ArgumentError",
            ErrorKind::ZeroDivisionError => "Std::ZeroDivisionError",
            ErrorKind::IndexError => "Std::IndexError",
            ErrorKind::StackOverflowError => "Std::StackOverflowError",
        }
    }

    /// Name without the `Std::` namespace, used for the global constructors.
    pub fn short_name(self) -> &'static str {
        let full = self.class_name();
        full.strip_prefix("Std::").unwrap_or(full)
    }

    pub fn is_a(self, class_name: &str) -> bool {
        class_name == self.class_name() || class_name == ErrorKind::Error.class_name()
    }
}

/// Runtime error payload. Operators and natives produce these; the VM wraps
/// them into a thrown value with a stack trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    pub kind: ErrorKind,
    pub message: Arc<str>,
}

impl ErrorValue {
    pub fn new(kind: ErrorKind, message: impl Into<Arc<str>>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// `` `Std::Float` cannot be coerced into `Std::Int` ``
    pub fn coerce(left_class: &str, right_class: &str) -> Self {
        Self::new(
            ErrorKind::TypeError,
            format!("`{right_class}` cannot be coerced into `{left_class}`"),
        )
    }

    /// `` method `&` is not available to value of class `Std::Float`: 2.5 ``
    pub fn no_method(method: impl fmt::Display, receiver: &Val) -> Self {
        Self::new(
            ErrorKind::NoMethodError,
            format!(
                "method `{method}` is not available to value of class `{}`: {}",
                receiver.class_name(),
                receiver.inspect()
            ),
        )
    }

    pub fn shift_operand(right: &Val) -> Self {
        Self::new(
            ErrorKind::TypeError,
            format!("`{}` cannot be used as a bitshift operand", right.class_name()),
        )
    }

    pub fn zero_division() -> Self {
        Self::new(ErrorKind::ZeroDivisionError, "cannot divide by zero")
    }

    pub fn argument_count(given: usize, expected: usize) -> Self {
        Self::new(
            ErrorKind::ArgumentError,
            format!("wrong number of arguments, given: {given}, expected: {expected}"),
        )
    }

    pub fn into_val(self) -> Val {
        Val::Error(Arc::new(self))
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.class_name(), self.message)
    }
}
