//! The acceptance scenarios: each mirrors a small script, hand-assembled
//! into a program image, with stdout and termination status asserted
//! exactly.

use derkjs::{CollectStringPrint, DerkRun, JsValue, ProgramBuilder, VmErrCode};

fn run(b: ProgramBuilder) -> (JsValue, String) {
    let mut out = CollectStringPrint::new();
    let value = DerkRun::new(b.finish()).run(&mut out).expect("program failed");
    (value, out.into_output())
}

/// Emits the `[this, callee]` prefix for a `console.log(...)` call; the
/// caller emits the arguments and the `call`.
fn console_log_prefix(b: &mut ProgramBuilder) {
    let console = b.key("console");
    let log = b.key("log");
    b.put_global();
    b.get_prop(console);
    b.put_global();
    b.get_prop(console);
    b.get_prop(log);
}

/// `if (<cond already on stack>) { emit_then(b) }`
fn emit_if(b: &mut ProgramBuilder, emit_then: impl FnOnce(&mut ProgramBuilder)) {
    let l_else = b.new_label();
    let l_end = b.new_label();
    b.jump_else(l_else);
    emit_then(b);
    b.jump(l_end);
    b.bind(l_else);
    b.discard();
    b.bind(l_end);
}

fn emit_increment_local(b: &mut ProgramBuilder, slot: u16) {
    b.get_local(slot);
    b.put_imm(1);
    b.op(derkjs::Opcode::Add);
    b.put_local_ref(slot);
    b.emplace();
    b.discard();
}

/// `var ok=0; if (typeof undefined==="undefined") ++ok; if (typeof
/// null==="object") ++ok; if (typeof function(){return 0}==="function")
/// ++ok; console.log("PASS:", ok===3);`
#[test]
fn typeof_primitives_and_functions() {
    let mut b = ProgramBuilder::new();

    let anon = b.begin_function("anon", 0, 0, 0);
    b.push_num(0.0);
    b.ret();
    b.end_function();

    let main = b.begin_function("<main>", 0, 1, 0);
    b.push_num(0.0);
    b.put_local_ref(0);
    b.emplace();
    b.discard();

    b.push_undefined();
    b.op(derkjs::Opcode::TypeOf);
    b.push_str("undefined");
    b.op(derkjs::Opcode::EqStrict);
    emit_if(&mut b, |b| emit_increment_local(b, 0));

    let null = b.null_const();
    b.put_const(null);
    b.op(derkjs::Opcode::TypeOf);
    b.push_str("object");
    b.op(derkjs::Opcode::EqStrict);
    emit_if(&mut b, |b| emit_increment_local(b, 0));

    b.make_lambda(anon, false);
    b.op(derkjs::Opcode::TypeOf);
    b.push_str("function");
    b.op(derkjs::Opcode::EqStrict);
    emit_if(&mut b, |b| emit_increment_local(b, 0));

    console_log_prefix(&mut b);
    b.push_str("PASS:");
    b.get_local(0);
    b.push_num(3.0);
    b.op(derkjs::Opcode::EqStrict);
    b.call(2, false);
    b.discard();

    b.push_undefined();
    b.ret();
    b.end_function();
    b.set_entry(main);

    let (_, output) = run(b);
    assert_eq!(output, "PASS: true\n");
}

/// `function f(n,s){ if(n<2) return n; return s(n-1,s)+s(n-2,s);}
/// console.log(f(10,f));`
#[test]
fn fibonacci_through_a_function_argument() {
    let mut b = ProgramBuilder::new();
    let f_key = b.key("f");

    let f = b.begin_function("f", 2, 0, 0);
    b.get_local(0);
    b.push_num(2.0);
    b.op(derkjs::Opcode::Lt);
    let l_recurse = b.new_label();
    b.jump_else(l_recurse);
    b.get_local(0);
    b.ret();
    b.bind(l_recurse);
    b.discard();
    // s(n-1, s)
    b.push_undefined();
    b.get_local(1);
    b.get_local(0);
    b.put_imm(1);
    b.op(derkjs::Opcode::Sub);
    b.get_local(1);
    b.call(2, false);
    // s(n-2, s)
    b.push_undefined();
    b.get_local(1);
    b.get_local(0);
    b.put_imm(2);
    b.op(derkjs::Opcode::Sub);
    b.get_local(1);
    b.call(2, false);
    b.op(derkjs::Opcode::Add);
    b.ret();
    b.end_function();
    b.preload_lambda("f", f);

    let main = b.begin_function("<main>", 0, 0, 0);
    console_log_prefix(&mut b);
    b.push_undefined();
    b.put_global();
    b.get_prop(f_key);
    b.push_num(10.0);
    b.put_global();
    b.get_prop(f_key);
    b.call(2, false);
    b.call(1, false);
    b.discard();
    b.push_undefined();
    b.ret();
    b.end_function();
    b.set_entry(main);

    let (_, output) = run(b);
    assert_eq!(output, "55\n");
}

/// `var a=[1,2,3]; a.reverse(); console.log(a.join());`
#[test]
fn array_reverse_and_join() {
    let mut b = ProgramBuilder::new();
    let reverse = b.key("reverse");
    let join = b.key("join");

    let main = b.begin_function("<main>", 0, 1, 0);
    b.push_num(1.0);
    b.push_num(2.0);
    b.push_num(3.0);
    b.make_array(3);
    b.put_local_ref(0);
    b.emplace();
    b.discard();

    b.get_local(0);
    b.get_local(0);
    b.get_prop(reverse);
    b.call(0, false);
    b.discard();

    console_log_prefix(&mut b);
    b.get_local(0);
    b.get_local(0);
    b.get_prop(join);
    b.call(0, false);
    b.call(1, false);
    b.discard();
    b.push_undefined();
    b.ret();
    b.end_function();
    b.set_entry(main);

    let (_, output) = run(b);
    assert_eq!(output, "3,2,1\n");
}

/// `var o={x:1}; Object.freeze(o); o.x=2; console.log(o.x);`
#[test]
fn frozen_object_ignores_writes() {
    let mut b = ProgramBuilder::new();
    let object_key = b.key("Object");
    let freeze = b.key("freeze");
    let x = b.key("x");

    let main = b.begin_function("<main>", 0, 1, 0);
    b.push_str("x");
    b.push_num(1.0);
    b.make_object(1);
    b.put_local_ref(0);
    b.emplace();
    b.discard();

    b.put_global();
    b.get_prop(object_key);
    b.put_global();
    b.get_prop(object_key);
    b.get_prop(freeze);
    b.get_local(0);
    b.call(1, false);
    b.discard();

    b.get_local(0);
    b.push_num(2.0);
    b.set_prop(x);

    console_log_prefix(&mut b);
    b.get_local(0);
    b.get_prop(x);
    b.call(1, false);
    b.discard();
    b.push_undefined();
    b.ret();
    b.end_function();
    b.set_entry(main);

    let (_, output) = run(b);
    assert_eq!(output, "1\n");
}

/// `function C(){this.v=7;} var c=new C(); console.log(c.v);`
#[test]
fn constructor_binds_fresh_this() {
    let mut b = ProgramBuilder::new();
    let c_key = b.key("C");
    let v = b.key("v");

    let ctor = b.begin_function("C", 0, 0, 0);
    b.get_this();
    b.push_num(7.0);
    b.set_prop(v);
    b.push_undefined();
    b.ret();
    b.end_function();
    b.preload_lambda("C", ctor);

    let main = b.begin_function("<main>", 0, 1, 0);
    b.push_undefined();
    b.put_global();
    b.get_prop(c_key);
    b.construct(0);
    b.put_local_ref(0);
    b.emplace();
    b.discard();

    console_log_prefix(&mut b);
    b.get_local(0);
    b.get_prop(v);
    b.call(1, false);
    b.discard();
    b.push_undefined();
    b.ret();
    b.end_function();
    b.set_entry(main);

    let (_, output) = run(b);
    assert_eq!(output, "7\n");
}

/// `throw new Error("boom");` → `uncaught_error`, message `boom`, exit 1.
#[test]
fn uncaught_error_reports_message() {
    let mut b = ProgramBuilder::new();
    let error_key = b.key("Error");

    let main = b.begin_function("<main>", 0, 0, 0);
    b.push_undefined();
    b.put_global();
    b.get_prop(error_key);
    b.push_str("boom");
    b.construct(1);
    b.throw();
    b.end_function();
    b.set_entry(main);

    let mut out = CollectStringPrint::new();
    let err = DerkRun::new(b.finish()).run(&mut out).expect_err("must not succeed");
    assert_eq!(err.code(), VmErrCode::UncaughtError);
    assert!(err.message().contains("boom"), "message was {:?}", err.message());
    assert_eq!(err.code().exit_code(), 1);
}
