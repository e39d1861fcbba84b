use super::*;

#[test]
fn test_vm_labeled_break_leaves_outer_loop() {
    // outer: loop; inner: loop; break :outer 42; end; end
    let h = harness();
    let mut b = main_builder();
    let v = b.konst(42);
    let (res_outer, res_inner) = (b.alloc(), b.alloc());
    let lo = b.begin_loop(Some("outer"), res_outer, b.next_reg());
    let top_o = b.label();
    b.bind(top_o);
    let li = b.begin_loop(Some("inner"), res_inner, b.next_reg());
    let top_i = b.label();
    b.bind(top_i);
    b.brk(Some("outer"), Some(v));
    b.loop_continue_point(&li);
    b.jmp(top_i);
    b.end_loop(li);
    b.loop_continue_point(&lo);
    b.jmp(top_o);
    b.end_loop(lo);
    b.emit(Op::Return(res_outer));

    let mut vm = h.vm();
    assert_eq!(vm.run_main(Arc::new(b.finish())).unwrap(), Val::SmallInt(42));
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_vm_continue_skips_rest_of_body() {
    // i = 0; sum = 0
    // loop; i += 1; break if i > 5; continue if i % 2 == 0; sum += i; end
    let h = harness();
    let mut b = main_builder();
    let (i, sum) = (b.konst(0), b.konst(0));
    let (one, two, five, zero) = (b.konst(1), b.konst(2), b.konst(5), b.konst(0));
    let (tmp, result) = (b.alloc(), b.alloc());
    let l = b.begin_loop(None, result, b.next_reg());
    let (top, skip_break, skip_continue) = (b.label(), b.label(), b.label());
    b.bind(top);
    b.emit(Op::Add(i, i, one));
    b.emit(Op::CmpGt(tmp, i, five));
    b.jmp_if_not(tmp, skip_break);
    b.brk(None, None);
    b.bind(skip_break);
    b.emit(Op::Mod(tmp, i, two));
    b.emit(Op::CmpEq(tmp, tmp, zero));
    b.jmp_if_not(tmp, skip_continue);
    b.cont(None, None);
    b.bind(skip_continue);
    b.emit(Op::Add(sum, sum, i));
    b.loop_continue_point(&l);
    b.jmp(top);
    b.end_loop(l);
    let out = b.alloc_n(2);
    b.emit(Op::Move(out, sum));
    b.emit(Op::Move(out + 1, result));
    let tuple = b.alloc();
    b.emit(Op::NewTuple {
        dst: tuple,
        start: out,
        count: 2,
    });
    b.emit(Op::Return(tuple));
    // Value-less break yields nil.
    assert_eq!(h.run(b.finish()).unwrap().inspect(), "%[9, nil]");
}

#[test]
fn test_vm_labeled_continue_resumes_outer_loop() {
    // i = 0
    // outer: loop
    //   i += 1; exit if i > 3
    //   inner: loop; continue :outer if i % 2 == 0; println "inner rest"; break; end
    //   println i
    // end
    let h = harness();
    let mut b = main_builder();
    let i = b.konst(0);
    let (one, two, three, zero) = (b.konst(1), b.konst(2), b.konst(3), b.konst(0));
    let (tmp, res_outer, res_inner) = (b.alloc(), b.alloc(), b.alloc());
    let lo = b.begin_loop(Some("outer"), res_outer, b.next_reg());
    let (top_o, exit_o) = (b.label(), b.label());
    b.bind(top_o);
    b.emit(Op::Add(i, i, one));
    b.emit(Op::CmpGt(tmp, i, three));
    b.jmp_if(tmp, exit_o);
    let li = b.begin_loop(Some("inner"), res_inner, b.next_reg());
    let (top_i, odd) = (b.label(), b.label());
    b.bind(top_i);
    b.emit(Op::Mod(tmp, i, two));
    b.emit(Op::CmpEq(tmp, tmp, zero));
    b.jmp_if_not(tmp, odd);
    b.cont(Some("outer"), None);
    b.bind(odd);
    let rest = b.konst("inner rest");
    b.println(rest);
    b.brk(None, None);
    b.loop_continue_point(&li);
    b.jmp(top_i);
    b.end_loop(li);
    b.println(i);
    b.loop_continue_point(&lo);
    b.jmp(top_o);
    b.bind(exit_o);
    b.end_loop(lo);
    b.emit(Op::Return(i));

    let mut vm = h.vm();
    assert_eq!(vm.run_main(Arc::new(b.finish())).unwrap(), Val::SmallInt(4));
    assert_eq!(h.out.contents(), "inner rest\n1\ninner rest\n3\n");
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_vm_loop_without_iterations_is_nil() {
    let h = harness();
    let mut b = main_builder();
    let result = b.konst(5);
    let f = b.konst(false);
    let l = b.begin_loop(None, result, b.next_reg());
    let (top, exit) = (b.label(), b.label());
    b.bind(top);
    b.jmp_if_not(f, exit);
    b.loop_continue_point(&l);
    b.jmp(top);
    b.bind(exit);
    b.end_loop(l);
    b.emit(Op::Return(result));
    assert_eq!(h.run(b.finish()).unwrap(), Val::Nil);
}

#[test]
fn test_vm_continue_with_value_sets_loop_result() {
    // i = 0; loop; i += 1; exit if i > 2; continue i * 10; end
    let h = harness();
    let mut b = main_builder();
    let i = b.konst(0);
    let (one, two, ten) = (b.konst(1), b.konst(2), b.konst(10));
    let (tmp, result) = (b.alloc(), b.alloc());
    let l = b.begin_loop(None, result, b.next_reg());
    let (top, exit) = (b.label(), b.label());
    b.bind(top);
    b.emit(Op::Add(i, i, one));
    b.emit(Op::CmpGt(tmp, i, two));
    b.jmp_if(tmp, exit);
    b.emit(Op::Mul(tmp, i, ten));
    b.cont(None, Some(tmp));
    b.loop_continue_point(&l);
    b.jmp(top);
    b.bind(exit);
    b.end_loop(l);
    b.emit(Op::Return(result));
    assert_eq!(h.run(b.finish()).unwrap(), Val::SmallInt(20));
}

#[test]
fn test_vm_if_else_and_nil_jump() {
    let h = harness();
    let mut b = main_builder();
    let n = b.alloc();
    let out = b.alloc();
    let (is_nil, end) = (b.label(), b.label());
    b.jmp_if_nil(n, is_nil);
    b.load(out, "not nil");
    b.jmp(end);
    b.bind(is_nil);
    b.load(out, "nil");
    b.bind(end);
    b.emit(Op::Return(out));
    assert_eq!(h.run(b.finish()).unwrap(), Val::str("nil"));
}

#[test]
fn test_vm_recursion_hits_stack_limit() {
    // fn f() = f()
    let h = harness();
    let f = {
        let mut b = FunctionBuilder::new("f", "main.ebr", 0);
        let r = b.alloc();
        b.call_global(r, "f", &[]);
        b.emit(Op::Return(r));
        b.finish()
    };
    let mut b = main_builder();
    let fr = b.alloc();
    b.closure(fr, f, vec![]);
    b.define_global("f", fr);
    let r = b.alloc();
    b.call(r, fr, &[]);
    b.emit(Op::Return(r));

    let mut vm = h.vm();
    vm.set_max_call_depth(64);
    let err = vm.run_main(Arc::new(b.finish())).unwrap_err();
    assert!(err.is_error_kind("Std::StackOverflowError"));
    assert_eq!(err.trace.len(), 64);
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_vm_arity_mismatch() {
    let h = harness();
    let id = {
        let mut b = FunctionBuilder::new("id", "main.ebr", 1);
        b.emit(Op::Return(0));
        b.finish()
    };
    let mut b = main_builder();
    let f = b.alloc();
    b.closure(f, id, vec![]);
    let r = b.alloc();
    b.call(r, f, &[]);
    b.emit(Op::Return(r));
    let err = h.run(b.finish()).unwrap_err();
    assert_error(&err, ErrorKind::ArgumentError, "wrong number of arguments, given: 0, expected: 1");
}

#[test]
fn test_vm_globals_and_collections() {
    let h = harness();
    let mut b = main_builder();
    let items = b.alloc_n(4);
    b.load(items, Val::symbol("a"));
    b.load(items + 1, 1);
    b.load(items + 2, Val::symbol("b"));
    b.load(items + 3, 2);
    let rec = b.alloc();
    b.emit(Op::NewRecord {
        dst: rec,
        start: items,
        pairs: 2,
    });
    b.define_global("rec", rec);
    let list = b.alloc();
    b.emit(Op::NewList {
        dst: list,
        start: items + 1,
        count: 3,
    });
    let (neg, far) = (b.konst(-1), b.konst(10));
    let (last, missing) = (b.alloc(), b.alloc());
    b.emit(Op::Index {
        dst: last,
        base: list,
        idx: neg,
    });
    b.emit(Op::Index {
        dst: missing,
        base: list,
        idx: far,
    });
    let loaded = b.alloc();
    b.load_global(loaded, "rec");
    let len = b.alloc();
    b.call_method(len, list, "length", &[]);
    let out = b.alloc_n(4);
    b.emit(Op::Move(out, loaded));
    b.emit(Op::Move(out + 1, last));
    b.emit(Op::Move(out + 2, missing));
    b.emit(Op::Move(out + 3, len));
    let tuple = b.alloc();
    b.emit(Op::NewTuple {
        dst: tuple,
        start: out,
        count: 4,
    });
    b.emit(Op::Return(tuple));
    assert_eq!(h.run(b.finish()).unwrap().inspect(), "%[%{a: 1, b: 2}, 2, nil, 3]");
}

#[test]
fn test_vm_list_write_out_of_range() {
    let h = harness();
    let mut b = main_builder();
    let list = b.alloc();
    b.emit(Op::NewList {
        dst: list,
        start: 0,
        count: 0,
    });
    let (idx, v) = (b.konst(3), b.konst(1));
    b.emit(Op::SetIndex { base: list, idx, src: v });
    b.emit(Op::ReturnNil);
    let err = h.run(b.finish()).unwrap_err();
    assert_error(&err, ErrorKind::IndexError, "index 3 out of range for list of length 0");
}

#[test]
fn test_vm_undefined_global() {
    let h = harness();
    let mut b = main_builder();
    let r = b.alloc();
    b.load_global(r, "nope");
    b.emit(Op::Return(r));
    let err = h.run(b.finish()).unwrap_err();
    assert_error(&err, ErrorKind::Error, "undefined global variable `nope`");
}
