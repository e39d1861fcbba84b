use super::*;

fn eval_binary(op: fn(u16, u16, u16) -> Op, l: Val, r: Val) -> Result<Val, Thrown> {
    let h = harness();
    let mut b = main_builder();
    let a = b.konst(l);
    let c = b.konst(r);
    let dst = b.alloc();
    b.emit(op(dst, a, c));
    b.emit(Op::Return(dst));
    h.run(b.finish())
}

#[test]
fn test_vm_fixed_width_pow() {
    assert_eq!(eval_binary(Op::Pow, Val::Int64(2), Val::Int64(10)).unwrap(), Val::Int64(1024));
    let err = eval_binary(Op::Pow, Val::Int64(2), Val::Int32(10)).unwrap_err();
    assert_error(&err, ErrorKind::TypeError, "`Std::Int32` cannot be coerced into `Std::Int64`");
}

#[test]
fn test_vm_int_float_modulo() {
    assert_eq!(eval_binary(Op::Mod, Val::SmallInt(250), Val::Float(4.5)).unwrap(), Val::Float(2.5));
}

#[test]
fn test_vm_shifts() {
    assert_eq!(eval_binary(Op::Shr, Val::SmallInt(16), Val::SmallInt(-2)).unwrap(), Val::SmallInt(64));
    assert_eq!(eval_binary(Op::LogicShr, Val::Int8(-16), Val::Int8(2)).unwrap(), Val::Int8(60));
    // The left operand decides the result class.
    assert_eq!(eval_binary(Op::Shl, Val::UInt8(1), Val::SmallInt(3)).unwrap(), Val::UInt8(8));
    let err = eval_binary(Op::Shl, Val::SmallInt(1), Val::Float(1.0)).unwrap_err();
    assert_error(&err, ErrorKind::TypeError, "`Std::Float` cannot be used as a bitshift operand");
}

#[test]
fn test_vm_comparisons() {
    assert_eq!(eval_binary(Op::CmpLt, Val::SmallInt(1), Val::Float(1.5)).unwrap(), Val::Bool(true));
    assert_eq!(eval_binary(Op::CmpEq, Val::Int8(1), Val::SmallInt(1)).unwrap(), Val::Bool(false));
    assert_eq!(eval_binary(Op::LaxEq, Val::SmallInt(25), Val::Float(25.0)).unwrap(), Val::Bool(true));
    assert_eq!(eval_binary(Op::LaxNe, Val::str("a"), Val::Char('a')).unwrap(), Val::Bool(false));
    let err = eval_binary(Op::CmpGt, Val::Int8(1), Val::Int16(1)).unwrap_err();
    assert!(err.is_error_kind("Std::TypeError"));
}

#[test]
fn test_vm_unary_ops() {
    let h = harness();
    let mut b = main_builder();
    let x = b.konst(i64::MIN);
    let neg = b.alloc();
    b.emit(Op::Neg(neg, x));
    let not = b.alloc();
    b.emit(Op::Not(not, x));
    let bits = b.alloc();
    let five = b.konst(Val::UInt8(5));
    b.emit(Op::BitNot(bits, five));
    let out = b.alloc();
    b.emit(Op::NewTuple {
        dst: out,
        start: neg,
        count: 3,
    });
    b.emit(Op::Return(out));
    // neg, not and bits are consecutive; `five` was allocated after bits.
    let result = h.run(b.finish());
    let Ok(Val::Tuple(items)) = result else {
        panic!("unexpected result {result:?}");
    };
    assert_eq!(items[0].inspect(), "9223372036854775808");
    assert_eq!(items[1], Val::Bool(false));
    assert_eq!(items[2], Val::UInt8(250));
}

#[test]
fn test_vm_error_trace_points_at_operator() {
    let h = harness();
    let mut b = main_builder();
    let one = b.konst(1);
    let s = b.konst("a");
    let dst = b.alloc();
    b.set_line(7);
    b.emit(Op::Add(dst, one, s));
    b.emit(Op::Return(dst));
    let err = h.run(b.finish()).unwrap_err();
    assert_error(&err, ErrorKind::TypeError, "`Std::String` cannot be coerced into `Std::Int`");
    assert_eq!(err.trace.len(), 1);
    assert_eq!(err.trace[0].line, 7);
    assert_eq!(err.trace[0].name.as_ref(), "<main>");
}
