use super::*;

use regex::Regex;

#[test]
fn test_vm_match_sequence_binds_rest() {
    // [first, *rest] := [1, 2, 3]
    let h = harness();
    let mut b = main_builder();
    let items = b.alloc_n(3);
    for i in 0..3 {
        b.load(items + i, i as i64 + 1);
    }
    let list = b.alloc();
    b.emit(Op::NewList {
        dst: list,
        start: items,
        count: 3,
    });
    let out = b.alloc_n(3);
    let (ok, first, rest) = (out, out + 1, out + 2);
    let pattern = b.pattern(Pattern::Sequence {
        kind: SeqKind::List,
        prefix: vec![Pattern::Bind(first)],
        rest: Some(Some(rest)),
        suffix: vec![],
    });
    b.emit(Op::Match {
        dst: ok,
        src: list,
        pattern,
    });
    let tuple = b.alloc();
    b.emit(Op::NewTuple {
        dst: tuple,
        start: out,
        count: 3,
    });
    b.emit(Op::Return(tuple));
    assert_eq!(h.run(b.finish()).unwrap().inspect(), "%[true, 1, [2, 3]]");
}

#[test]
fn test_vm_failed_match_binds_nothing() {
    // %[a, 2] := %[1, 3]
    let h = harness();
    let mut b = main_builder();
    let out = b.alloc_n(2);
    let (ok, a) = (out, out + 1);
    b.load(a, Val::symbol("untouched"));
    let items = b.alloc_n(2);
    b.load(items, 1);
    b.load(items + 1, 3);
    let tuple = b.alloc();
    b.emit(Op::NewTuple {
        dst: tuple,
        start: items,
        count: 2,
    });
    let pattern = b.pattern(Pattern::Sequence {
        kind: SeqKind::Tuple,
        prefix: vec![Pattern::Bind(a), Pattern::Literal(Val::SmallInt(2))],
        rest: None,
        suffix: vec![],
    });
    b.emit(Op::Match {
        dst: ok,
        src: tuple,
        pattern,
    });
    let result = b.alloc();
    b.emit(Op::NewTuple {
        dst: result,
        start: out,
        count: 2,
    });
    b.emit(Op::Return(result));
    assert_eq!(h.run(b.finish()).unwrap().inspect(), "%[false, :untouched]");
}

#[test]
fn test_vm_match_regex() {
    let h = harness();
    let mut b = main_builder();
    let s = b.konst("v1.2.3");
    let out = b.alloc_n(2);
    let version = b.pattern(Pattern::Regex(Regex::new(r"^v\d+\.\d+\.\d+$").unwrap()));
    b.emit(Op::Match {
        dst: out,
        src: s,
        pattern: version,
    });
    let other = b.konst(Val::symbol("v1"));
    b.emit(Op::Match {
        dst: out + 1,
        src: other,
        pattern: version,
    });
    let result = b.alloc();
    b.emit(Op::NewTuple {
        dst: result,
        start: out,
        count: 2,
    });
    b.emit(Op::Return(result));
    assert_eq!(h.run(b.finish()).unwrap().inspect(), "%[true, false]");
}

#[test]
fn test_vm_match_guard_sees_bindings() {
    // n if n > 10 := 42
    let h = harness();
    let mut b = main_builder();
    let out = b.alloc_n(2);
    let (ok, n) = (out, out + 1);
    let guard = {
        let mut g = FunctionBuilder::new("<guard>", "main.ebr", 0);
        let v = g.alloc();
        g.emit(Op::LoadUpvalue { dst: v, idx: 0 });
        let ten = g.konst(10);
        g.emit(Op::CmpGt(v, v, ten));
        g.emit(Op::Return(v));
        g.finish()
    };
    let guard = b.proto(guard, vec![CaptureSpec::Local(n)]);
    let pattern = b.pattern(Pattern::Guard(Box::new(Pattern::Bind(n)), guard));
    let value = b.konst(42);
    b.emit(Op::Match {
        dst: ok,
        src: value,
        pattern,
    });
    let result = b.alloc();
    b.emit(Op::NewTuple {
        dst: result,
        start: out,
        count: 2,
    });
    b.emit(Op::Return(result));
    assert_eq!(h.run(b.finish()).unwrap().inspect(), "%[true, 42]");
}
