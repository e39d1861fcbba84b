use super::*;

fn say(b: &mut FunctionBuilder, text: &str) {
    let r = b.konst(text);
    b.println(r);
}

fn throw_symbol(b: &mut FunctionBuilder, name: &str) {
    let r = b.konst(Val::symbol(name));
    b.emit(Op::Throw(r));
}

#[test]
fn test_vm_catch_then_finally() {
    // do
    //   println "body"; throw :foo
    // catch :foo
    //   println "caught"; out = :handled
    // finally
    //   println "finally"
    // end
    let h = harness();
    let mut b = main_builder();
    let out = b.alloc();
    let t = b.begin_try(b.next_reg());
    say(&mut b, "body");
    throw_symbol(&mut b, "foo");
    b.leave_try(&t);
    b.begin_catch(&t, Pattern::Literal(Val::symbol("foo")));
    say(&mut b, "caught");
    b.load(out, Val::symbol("handled"));
    b.leave_try(&t);
    b.begin_finally(&t);
    say(&mut b, "finally");
    b.end_try(t);
    b.emit(Op::Return(out));

    assert_eq!(h.run(b.finish()).unwrap(), Val::symbol("handled"));
    assert_eq!(h.out.contents(), "body\ncaught\nfinally\n");
}

#[test]
fn test_vm_return_runs_finally() {
    // fn f = do; return 1; finally; println "fin"; end
    let f = {
        let mut b = FunctionBuilder::new("f", "main.ebr", 0);
        let t = b.begin_try(0);
        let one = b.konst(1);
        b.emit(Op::Return(one));
        b.leave_try(&t);
        b.begin_finally(&t);
        say(&mut b, "fin");
        b.end_try(t);
        b.emit(Op::ReturnNil);
        b.finish()
    };
    let h = harness();
    let mut b = main_builder();
    let fr = b.alloc();
    b.closure(fr, f, vec![]);
    let r = b.alloc();
    b.call(r, fr, &[]);
    b.emit(Op::Return(r));

    let mut vm = h.vm();
    assert_eq!(vm.run_main(Arc::new(b.finish())).unwrap(), Val::SmallInt(1));
    assert_eq!(h.out.contents(), "fin\n");
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_vm_break_through_finally() {
    // loop; do; break 7; finally; println "fin"; end; end
    let h = harness();
    let mut b = main_builder();
    let result = b.alloc();
    let l = b.begin_loop(None, result, b.next_reg());
    let top = b.label();
    b.bind(top);
    let t = b.begin_try(b.next_reg());
    let seven = b.konst(7);
    b.brk(None, Some(seven));
    b.leave_try(&t);
    b.begin_finally(&t);
    say(&mut b, "fin");
    b.end_try(t);
    b.loop_continue_point(&l);
    b.jmp(top);
    b.end_loop(l);
    b.emit(Op::Return(result));

    assert_eq!(h.run(b.finish()).unwrap(), Val::SmallInt(7));
    assert_eq!(h.out.contents(), "fin\n");
}

#[test]
fn test_vm_continue_through_finally() {
    // i = 0
    // loop; i += 1; exit if i > 2; do; continue; finally; println i; end; end
    let h = harness();
    let mut b = main_builder();
    let i = b.konst(0);
    let (one, two) = (b.konst(1), b.konst(2));
    let (cond, result) = (b.alloc(), b.alloc());
    let l = b.begin_loop(None, result, b.next_reg());
    let (top, exit) = (b.label(), b.label());
    b.bind(top);
    b.emit(Op::Add(i, i, one));
    b.emit(Op::CmpGt(cond, i, two));
    b.jmp_if(cond, exit);
    let t = b.begin_try(b.next_reg());
    b.cont(None, None);
    b.leave_try(&t);
    b.begin_finally(&t);
    b.println(i);
    b.end_try(t);
    b.loop_continue_point(&l);
    b.jmp(top);
    b.bind(exit);
    b.end_loop(l);
    b.emit(Op::ReturnNil);

    h.run(b.finish()).unwrap();
    assert_eq!(h.out.contents(), "1\n2\n");
}

#[test]
fn test_vm_labeled_continue_through_finally() {
    // i = 0
    // outer: loop
    //   i += 1; exit if i > 2
    //   loop; do; continue :outer; finally; println i; end; println "unreached"; end
    // end
    let h = harness();
    let mut b = main_builder();
    let i = b.konst(0);
    let (one, two) = (b.konst(1), b.konst(2));
    let (cond, res_outer, res_inner) = (b.alloc(), b.alloc(), b.alloc());
    let lo = b.begin_loop(Some("outer"), res_outer, b.next_reg());
    let (top_o, exit_o) = (b.label(), b.label());
    b.bind(top_o);
    b.emit(Op::Add(i, i, one));
    b.emit(Op::CmpGt(cond, i, two));
    b.jmp_if(cond, exit_o);
    let li = b.begin_loop(None, res_inner, b.next_reg());
    let top_i = b.label();
    b.bind(top_i);
    let t = b.begin_try(b.next_reg());
    b.cont(Some("outer"), None);
    b.leave_try(&t);
    b.begin_finally(&t);
    b.println(i);
    b.end_try(t);
    say(&mut b, "unreached");
    b.loop_continue_point(&li);
    b.jmp(top_i);
    b.end_loop(li);
    b.loop_continue_point(&lo);
    b.jmp(top_o);
    b.bind(exit_o);
    b.end_loop(lo);
    b.emit(Op::ReturnNil);

    let mut vm = h.vm();
    vm.run_main(Arc::new(b.finish())).unwrap();
    assert_eq!(h.out.contents(), "1\n2\n");
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_vm_throw_in_finally_replaces_original() {
    // do
    //   do; throw :a; finally; throw :b; end
    // catch e
    // end
    let h = harness();
    let mut b = main_builder();
    let e = b.alloc();
    let outer = b.begin_try(b.next_reg());
    let inner = b.begin_try(b.next_reg());
    throw_symbol(&mut b, "a");
    b.leave_try(&inner);
    b.begin_finally(&inner);
    throw_symbol(&mut b, "b");
    b.end_try(inner);
    b.leave_try(&outer);
    b.begin_catch(&outer, Pattern::Bind(e));
    b.leave_try(&outer);
    b.end_try(outer);
    b.emit(Op::Return(e));

    assert_eq!(h.run(b.finish()).unwrap(), Val::symbol("b"));
}

#[test]
fn test_vm_return_in_finally_discards_throw() {
    let f = {
        let mut b = FunctionBuilder::new("f", "main.ebr", 0);
        let t = b.begin_try(0);
        throw_symbol(&mut b, "a");
        b.leave_try(&t);
        b.begin_finally(&t);
        let nine = b.konst(9);
        b.emit(Op::Return(nine));
        b.end_try(t);
        b.emit(Op::ReturnNil);
        b.finish()
    };
    let h = harness();
    let mut b = main_builder();
    let fr = b.alloc();
    b.closure(fr, f, vec![]);
    let r = b.alloc();
    b.call(r, fr, &[]);
    b.emit(Op::Return(r));
    assert_eq!(h.run(b.finish()).unwrap(), Val::SmallInt(9));
}

#[test]
fn test_vm_uncaught_throw_renders_trace() {
    let boom = {
        let mut b = FunctionBuilder::new("boom", "main.ebr", 0);
        b.set_line(2);
        throw_symbol(&mut b, "foo");
        b.finish()
    };
    let h = harness();
    let mut b = main_builder();
    b.set_line(1);
    let f = b.alloc();
    b.closure(f, boom, vec![]);
    b.set_line(4);
    let r = b.alloc();
    b.call(r, f, &[]);
    b.emit(Op::Return(r));

    let mut vm = h.vm();
    let thrown = vm.run_main(Arc::new(b.finish())).unwrap_err();
    assert_eq!(thrown.value, Val::symbol("foo"));
    assert_eq!(
        thrown.render(),
        "Stack trace (the most recent call is last)\n  0: main.ebr:4, in `<main>`\n  1: main.ebr:2, in `boom`\nError! Uncaught thrown value: :foo\n"
    );
    assert_eq!(vm.depth(), 0);
}

/// `do; throw value; catch n if n > 100; :big; catch _; :small; end`
fn classify(value: i64) -> Val {
    let h = harness();
    let mut b = main_builder();
    let out = b.alloc();
    let n = b.alloc();
    let guard = {
        let mut g = FunctionBuilder::new("<guard>", "main.ebr", 0);
        let v = g.alloc();
        g.emit(Op::LoadUpvalue { dst: v, idx: 0 });
        let limit = g.konst(100);
        g.emit(Op::CmpGt(v, v, limit));
        g.emit(Op::Return(v));
        g.finish()
    };
    let guard = b.proto(guard, vec![CaptureSpec::Local(n)]);
    let t = b.begin_try(b.next_reg());
    let v = b.konst(value);
    b.emit(Op::Throw(v));
    b.leave_try(&t);
    b.begin_catch(&t, Pattern::Guard(Box::new(Pattern::Bind(n)), guard));
    b.load(out, Val::symbol("big"));
    b.leave_try(&t);
    b.begin_catch(&t, Pattern::Any);
    b.load(out, Val::symbol("small"));
    b.leave_try(&t);
    b.end_try(t);
    b.emit(Op::Return(out));
    h.run(b.finish()).unwrap()
}

#[test]
fn test_vm_catch_guard() {
    assert_eq!(classify(500), Val::symbol("big"));
    assert_eq!(classify(5), Val::symbol("small"));
}

#[test]
fn test_vm_operator_error_is_catchable() {
    // do; 1 + "a"; catch e: Std::TypeError; e.message; end
    let h = harness();
    let mut b = main_builder();
    let (e, msg) = (b.alloc(), b.alloc());
    let t = b.begin_try(b.next_reg());
    let (one, s) = (b.konst(1), b.konst("a"));
    let sum = b.alloc();
    b.emit(Op::Add(sum, one, s));
    b.leave_try(&t);
    b.begin_catch(
        &t,
        Pattern::Capture(e, Box::new(Pattern::Instance("Std::TypeError".into()))),
    );
    b.call_method(msg, e, "message", &[]);
    b.leave_try(&t);
    b.end_try(t);
    b.emit(Op::Return(msg));

    assert_eq!(
        h.run(b.finish()).unwrap(),
        Val::str("`Std::String` cannot be coerced into `Std::Int`")
    );
}

#[test]
fn test_vm_callee_finally_runs_before_caller_catch() {
    let f = {
        let mut b = FunctionBuilder::new("f", "main.ebr", 0);
        let t = b.begin_try(0);
        throw_symbol(&mut b, "x");
        b.leave_try(&t);
        b.begin_finally(&t);
        say(&mut b, "cleanup");
        b.end_try(t);
        b.emit(Op::ReturnNil);
        b.finish()
    };
    let h = harness();
    let mut b = main_builder();
    let fr = b.alloc();
    b.closure(fr, f, vec![]);
    let t = b.begin_try(b.next_reg());
    let r = b.alloc();
    b.call(r, fr, &[]);
    say(&mut b, "unreachable");
    b.leave_try(&t);
    b.begin_catch(&t, Pattern::Literal(Val::symbol("x")));
    say(&mut b, "caught");
    b.leave_try(&t);
    b.end_try(t);
    b.emit(Op::ReturnNil);

    let mut vm = h.vm();
    vm.run_main(Arc::new(b.finish())).unwrap();
    assert_eq!(h.out.contents(), "cleanup\ncaught\n");
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_vm_uncaught_error_from_native_callback() {
    // A throw inside a closure called by a native propagates through it.
    let h = harness();
    let thrower = {
        let mut b = FunctionBuilder::new("thrower", "main.ebr", 0);
        throw_symbol(&mut b, "deep");
        b.finish()
    };
    let mut b = main_builder();
    let f = b.alloc();
    b.closure(f, thrower, vec![]);
    let e = b.alloc();
    let t = b.begin_try(b.next_reg());
    let r = b.alloc();
    b.call_method(r, f, "call", &[]);
    b.leave_try(&t);
    b.begin_catch(&t, Pattern::Bind(e));
    b.leave_try(&t);
    b.end_try(t);
    b.emit(Op::Return(e));
    assert_eq!(h.run(b.finish()).unwrap(), Val::symbol("deep"));
}
