use super::*;

/// `-> x = 5` over upvalue 0.
fn setter() -> Function {
    let mut b = FunctionBuilder::new("set", "main.ebr", 0);
    let five = b.konst(5);
    b.emit(Op::StoreUpvalue { idx: 0, src: five });
    b.emit(Op::ReturnNil);
    b.finish()
}

/// `-> x` over upvalue 0.
fn getter() -> Function {
    let mut b = FunctionBuilder::new("get", "main.ebr", 0);
    let v = b.alloc();
    b.emit(Op::LoadUpvalue { dst: v, idx: 0 });
    b.emit(Op::Return(v));
    b.finish()
}

/// `-> println x` over upvalue 0.
fn printer() -> Function {
    let mut b = FunctionBuilder::new("print_it", "main.ebr", 0);
    let v = b.alloc();
    b.emit(Op::LoadUpvalue { dst: v, idx: 0 });
    b.println(v);
    b.emit(Op::ReturnNil);
    b.finish()
}

#[test]
fn test_vm_closures_share_open_upvalue() {
    let h = harness();
    let mut b = main_builder();
    let x = b.konst(1);
    let set = b.alloc();
    b.closure(set, setter(), vec![CaptureSpec::Local(x)]);
    let get = b.alloc();
    b.closure(get, getter(), vec![CaptureSpec::Local(x)]);
    let ignored = b.alloc();
    b.call(ignored, set, &[]);
    let seen = b.alloc_n(2);
    b.call(seen, get, &[]);
    b.load(x, 7);
    b.call(seen + 1, get, &[]);
    let out = b.alloc();
    b.emit(Op::NewTuple {
        dst: out,
        start: seen,
        count: 2,
    });
    b.emit(Op::Return(out));
    assert_eq!(h.run(b.finish()).unwrap().inspect(), "%[5, 7]");
}

#[test]
fn test_vm_counter_survives_frame_exit() {
    // make_counter = -> count = 0; -> count = count + 1 end
    let inc = {
        let mut b = FunctionBuilder::new("inc", "main.ebr", 0);
        let v = b.alloc();
        b.emit(Op::LoadUpvalue { dst: v, idx: 0 });
        let one = b.konst(1);
        b.emit(Op::Add(v, v, one));
        b.emit(Op::StoreUpvalue { idx: 0, src: v });
        b.emit(Op::Return(v));
        b.finish()
    };
    let make_counter = {
        let mut b = FunctionBuilder::new("make_counter", "main.ebr", 0);
        let count = b.konst(0);
        let f = b.alloc();
        b.closure(f, inc, vec![CaptureSpec::Local(count)]);
        b.emit(Op::Return(f));
        b.finish()
    };

    let h = harness();
    let mut b = main_builder();
    let mk = b.alloc();
    b.closure(mk, make_counter, vec![]);
    let (c1, c2) = (b.alloc(), b.alloc());
    b.call(c1, mk, &[]);
    b.call(c2, mk, &[]);
    let (r1, r2) = (b.alloc(), b.alloc());
    b.call(r1, c1, &[]);
    b.call(r1, c1, &[]);
    b.call(r1, c1, &[]);
    b.call(r2, c2, &[]);
    let out = b.alloc();
    b.emit(Op::NewTuple {
        dst: out,
        start: r1,
        count: 2,
    });
    b.emit(Op::Return(out));
    assert_eq!(h.run(b.finish()).unwrap().inspect(), "%[3, 1]");
}

#[test]
fn test_vm_upvalue_in_loop_is_per_iteration() {
    // closures = []
    // i = 1
    // while i <= 2; j = i; closures << -> println j; i = i + 1; end
    // closures[0](); closures[1]()
    let h = harness();
    let mut b = main_builder();
    let closures = b.alloc();
    b.emit(Op::NewList {
        dst: closures,
        start: 0,
        count: 0,
    });
    let i = b.konst(1);
    let two = b.konst(2);
    let one = b.konst(1);
    let cond = b.alloc();
    let result = b.alloc();
    let body_base = b.next_reg();
    let l = b.begin_loop(None, result, body_base);
    let j = b.alloc();
    let f = b.alloc();
    let (top, exit) = (b.label(), b.label());
    b.bind(top);
    b.emit(Op::CmpLe(cond, i, two));
    b.jmp_if_not(cond, exit);
    b.emit(Op::Move(j, i));
    b.closure(f, printer(), vec![CaptureSpec::Local(j)]);
    b.emit(Op::Append {
        dst: closures,
        target: closures,
        src: f,
    });
    b.loop_continue_point(&l);
    b.emit(Op::Add(i, i, one));
    b.jmp(top);
    b.bind(exit);
    b.end_loop(l);

    let (first, second) = (b.konst(0), b.konst(1));
    let callee = b.alloc();
    let ignored = b.alloc();
    b.emit(Op::Index {
        dst: callee,
        base: closures,
        idx: first,
    });
    b.call(ignored, callee, &[]);
    b.emit(Op::Index {
        dst: callee,
        base: closures,
        idx: second,
    });
    b.call(ignored, callee, &[]);
    b.emit(Op::ReturnNil);

    assert_eq!(h.run(b.finish()).unwrap(), Val::Nil);
    assert_eq!(h.out.contents(), "1\n2\n");
}

#[test]
fn test_vm_nested_capture_through_upvalue() {
    // x = 10; outer = -> (-> x); outer()() == 10
    let inner = getter();
    let outer = {
        let mut b = FunctionBuilder::new("outer", "main.ebr", 0);
        let f = b.alloc();
        b.closure(f, inner, vec![CaptureSpec::Upvalue(0)]);
        b.emit(Op::Return(f));
        b.finish()
    };
    let h = harness();
    let mut b = main_builder();
    let x = b.konst(10);
    let o = b.alloc();
    b.closure(o, outer, vec![CaptureSpec::Local(x)]);
    let f = b.alloc();
    b.call(f, o, &[]);
    let v = b.alloc();
    b.call(v, f, &[]);
    b.emit(Op::Return(v));
    assert_eq!(h.run(b.finish()).unwrap(), Val::SmallInt(10));
}

#[test]
fn test_vm_go_snapshots_open_upvalues() {
    // x = 1; go -> println x; x = 2; (-> println x)()
    let h = harness();
    let mut b = main_builder();
    let x = b.konst(1);
    let f = b.alloc();
    b.closure(f, printer(), vec![CaptureSpec::Local(x)]);
    let window = b.alloc();
    b.emit(Op::Move(window, f));
    b.emit(Op::Go { func: window, argc: 0 });
    b.load(x, 2);
    let ignored = b.alloc();
    b.call(ignored, f, &[]);
    b.emit(Op::ReturnNil);
    h.run(b.finish()).unwrap();
    // Without a scheduler the coroutine runs to completion inline.
    assert_eq!(h.out.contents(), "1\n2\n");
}

#[test]
fn test_vm_inline_go_with_broken_error_sink() {
    // go -> throw 5; println "after"
    struct Closed;
    impl crate::rt::OutputSink for Closed {
        fn write_str(&self, _s: &str) -> std::io::Result<()> {
            Err(std::io::Error::other("sink closed"))
        }
    }
    let out = CaptureBuffer::new();
    let env = Arc::new(Environment::with_sinks(Arc::new(out.clone()), Arc::new(Closed)));
    let thrower = {
        let mut b = FunctionBuilder::new("boom", "main.ebr", 0);
        let v = b.konst(5);
        b.emit(Op::Throw(v));
        b.finish()
    };
    let mut b = main_builder();
    let f = b.alloc();
    b.closure(f, thrower, vec![]);
    b.emit(Op::Go { func: f, argc: 0 });
    let after = b.konst("after");
    b.println(after);
    b.emit(Op::ReturnNil);

    // The lost report does not disturb the spawning coroutine.
    Vm::new(env).run_main(Arc::new(b.finish())).unwrap();
    assert_eq!(out.contents(), "after\n");
}

#[test]
fn test_vm_foreign_open_upvalue_is_an_error() {
    let h = harness();
    let mut owner = h.vm();
    let mut b = main_builder();
    let x = b.konst(1);
    let f = b.alloc();
    b.closure(f, getter(), vec![CaptureSpec::Local(x)]);
    // Hand the closure out while `x` is still open, then keep the frame alive
    // by calling a native that returns it.
    b.define_global("leaked", f);
    let v = b.alloc();
    b.call_global(v, "escape_hatch", &[]);
    b.emit(Op::Return(v));

    fn escape_hatch(vm: &mut Vm, _receiver: &Val, _args: &[Val]) -> Result<Val, Thrown> {
        let leaked = vm.env().global(crate::val::Symbol::intern("leaked")).unwrap_or_default();
        let mut other = Vm::new(vm.env().clone());
        match other.call(&leaked, Val::Nil, &[]) {
            Ok(v) => Ok(v),
            Err(thrown) => Ok(thrown.value),
        }
    }
    h.env.define_native("escape_hatch", escape_hatch);

    let result = owner.run_main(Arc::new(b.finish())).unwrap();
    let Val::Error(err) = result else {
        panic!("expected an error, got {}", result.inspect());
    };
    assert_eq!(err.kind, ErrorKind::Error);
}
