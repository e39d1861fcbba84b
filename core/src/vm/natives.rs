//! Kernel natives installed into every [`Environment`].
//!
//! Only what the core itself relies on lives here: console output,
//! `inspect`, `sleep`, the error constructors and a handful of methods
//! that every value or collection answers to. The standard library adds
//! the rest through [`Environment::define_native_method`].

use std::time::Duration;

use crate::error::Thrown;
use crate::val::{ErrorKind, ErrorValue, Val, read_lock};
use crate::vm::Vm;
use crate::vm::context::{ANY_CLASS, Environment};

type NativeResult = Result<Val, Thrown>;

pub(super) fn install(env: &Environment) {
    env.define_native("println", println);
    env.define_native("print", print);
    env.define_native("inspect", inspect);
    env.define_native("sleep", sleep);

    macro_rules! error_constructors {
        ($($kind:ident => $fn_name:ident),* $(,)?) => {
            $(
                fn $fn_name(_vm: &mut Vm, _receiver: &Val, args: &[Val]) -> NativeResult {
                    new_error(ErrorKind::$kind, args)
                }
                env.define_native(ErrorKind::$kind.short_name(), $fn_name);
                env.define_native_method(ErrorKind::$kind.class_name(), "message", error_message);
            )*
        };
    }
    error_constructors! {
        Error => error,
        TypeError => type_error,
        NoMethodError => no_method_error,
        PrimitiveValueError => primitive_value_error,
        ArgumentError => argument_error,
        ZeroDivisionError => zero_division_error,
        IndexError => index_error,
        StackOverflowError => stack_overflow_error,
    }

    env.define_native_method(ANY_CLASS, "inspect", value_inspect);
    env.define_native_method(ANY_CLASS, "to_string", value_to_string);
    env.define_native_method(ANY_CLASS, "class", value_class);
    for class in [
        "Std::String",
        "Std::List",
        "Std::Tuple",
        "Std::Set",
        "Std::Map",
        "Std::Record",
    ] {
        env.define_native_method(class, "length", length);
    }
    env.define_native_method("Std::Closure", "call", call);
    env.define_native_method("Std::Function", "call", call);
}

fn expect_args(args: &[Val], n: usize) -> Result<(), Thrown> {
    if args.len() == n {
        Ok(())
    } else {
        Err(ErrorValue::argument_count(args.len(), n).into())
    }
}

fn write_out(vm: &Vm, text: &str) -> Result<(), Thrown> {
    vm.env()
        .stdout()
        .write_str(text)
        .map_err(|e| ErrorValue::new(ErrorKind::Error, format!("cannot write to stdout: {e}")).into())
}

fn print(vm: &mut Vm, _receiver: &Val, args: &[Val]) -> NativeResult {
    let mut text = String::new();
    for arg in args {
        text.push_str(&arg.to_string());
    }
    write_out(vm, &text)?;
    Ok(Val::Nil)
}

fn println(vm: &mut Vm, _receiver: &Val, args: &[Val]) -> NativeResult {
    let mut text = String::new();
    for arg in args {
        text.push_str(&arg.to_string());
    }
    text.push('\n');
    write_out(vm, &text)?;
    Ok(Val::Nil)
}

fn inspect(_vm: &mut Vm, _receiver: &Val, args: &[Val]) -> NativeResult {
    expect_args(args, 1)?;
    Ok(Val::str(args[0].inspect()))
}

/// Blocks the worker running this coroutine; others keep running.
fn sleep(_vm: &mut Vm, _receiver: &Val, args: &[Val]) -> NativeResult {
    expect_args(args, 1)?;
    let secs = match &args[0] {
        Val::SmallInt(n) => *n as f64,
        Val::Float(f) => *f,
        other => return Err(ErrorValue::coerce("Std::Float", other.class_name()).into()),
    };
    let duration = Duration::try_from_secs_f64(secs).map_err(|_| {
        ErrorValue::new(
            ErrorKind::ArgumentError,
            format!("sleep duration must be a non-negative number, got: {}", args[0].inspect()),
        )
    })?;
    std::thread::sleep(duration);
    Ok(Val::Nil)
}

fn new_error(kind: ErrorKind, args: &[Val]) -> NativeResult {
    let message = match args {
        [] => kind.class_name().to_string(),
        [Val::Str(s)] => s.to_string(),
        [other] => other.to_string(),
        _ => return Err(ErrorValue::argument_count(args.len(), 1).into()),
    };
    Ok(Val::error(kind, message))
}

fn error_message(_vm: &mut Vm, receiver: &Val, _args: &[Val]) -> NativeResult {
    match receiver {
        Val::Error(err) => Ok(Val::Str(err.message.clone())),
        other => Err(ErrorValue::no_method("message", other).into()),
    }
}

fn value_inspect(_vm: &mut Vm, receiver: &Val, args: &[Val]) -> NativeResult {
    expect_args(args, 0)?;
    Ok(Val::str(receiver.inspect()))
}

fn value_to_string(_vm: &mut Vm, receiver: &Val, args: &[Val]) -> NativeResult {
    expect_args(args, 0)?;
    Ok(Val::str(receiver.to_string()))
}

fn value_class(_vm: &mut Vm, receiver: &Val, args: &[Val]) -> NativeResult {
    expect_args(args, 0)?;
    Ok(match receiver {
        Val::Object(obj) => Val::Class(obj.class.clone()),
        other => Val::str(other.class_name()),
    })
}

fn length(_vm: &mut Vm, receiver: &Val, args: &[Val]) -> NativeResult {
    expect_args(args, 0)?;
    let len = match receiver {
        Val::Str(s) => s.chars().count(),
        Val::List(list) => read_lock(list).len(),
        Val::Tuple(items) => items.len(),
        Val::Set(set) => read_lock(set).len(),
        Val::Map(map) => read_lock(map).len(),
        Val::Record(pairs) => pairs.len(),
        other => return Err(ErrorValue::no_method("length", other).into()),
    };
    Ok(Val::from(len))
}

fn call(vm: &mut Vm, receiver: &Val, args: &[Val]) -> NativeResult {
    vm.call(receiver, Val::Nil, args)
}
