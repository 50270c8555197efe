//! Throw/catch across frames, the pending-error slot, and the split between
//! catchable script errors and fatal envelope errors.

use derkjs::{CollectStringPrint, DerkRun, JsValue, Opcode, ProgramBuilder, RunConfig, VmErrCode};

fn eval(b: ProgramBuilder) -> JsValue {
    let mut out = CollectStringPrint::new();
    DerkRun::new(b.finish()).run(&mut out).expect("program failed")
}

fn emit_new_error(b: &mut ProgramBuilder, message: &str) {
    let error_key = b.key("Error");
    b.push_undefined();
    b.put_global();
    b.get_prop(error_key);
    b.push_str(message);
    b.construct(1);
}

#[test]
fn catch_in_the_same_frame() {
    // var r; try { throw new Error("x"); r="no"; } catch (e) { r=e.message; } r
    let mut b = ProgramBuilder::new();
    let message = b.key("message");
    let main = b.begin_function("<main>", 0, 2, 0);
    emit_new_error(&mut b, "x");
    b.throw();
    b.push_str("no");
    b.put_local_ref(0);
    b.emplace();
    b.discard();
    let l_end = b.new_label();
    b.jump(l_end);
    b.catch_into(1);
    b.get_local(1);
    b.get_prop(message);
    b.put_local_ref(0);
    b.emplace();
    b.discard();
    b.bind(l_end);
    b.get_local(0);
    b.ret();
    b.end_function();
    b.set_entry(main);

    assert_eq!(eval(b), JsValue::Str("x".to_owned()));
}

#[test]
fn catch_across_frames_unwinds_the_callee() {
    // function f() { throw new Error("deep"); }
    // try { f(); } catch (e) { return e.message; }
    let mut b = ProgramBuilder::new();
    let f_key = b.key("f");
    let message = b.key("message");

    let f = b.begin_function("f", 0, 0, 0);
    emit_new_error(&mut b, "deep");
    b.throw();
    b.end_function();
    b.preload_lambda("f", f);

    let main = b.begin_function("<main>", 0, 1, 0);
    b.push_undefined();
    b.put_global();
    b.get_prop(f_key);
    b.call(0, false);
    b.discard();
    let l_end = b.new_label();
    b.jump(l_end);
    b.catch_into(0);
    b.get_local(0);
    b.get_prop(message);
    b.ret();
    b.bind(l_end);
    b.push_str("no-throw");
    b.ret();
    b.end_function();
    b.set_entry(main);

    assert_eq!(eval(b), JsValue::Str("deep".to_owned()));
}

#[test]
fn execution_resumes_after_a_catch() {
    // var r; try { throw new Error("e1"); } catch (e) { r = 1; }
    // r = r + 10; r
    let mut b = ProgramBuilder::new();
    let main = b.begin_function("<main>", 0, 2, 0);
    emit_new_error(&mut b, "e1");
    b.throw();
    let l_end = b.new_label();
    b.jump(l_end);
    b.catch_into(1);
    b.push_num(1.0);
    b.put_local_ref(0);
    b.emplace();
    b.discard();
    b.bind(l_end);
    b.get_local(0);
    b.push_num(10.0);
    b.op(Opcode::Add);
    b.put_local_ref(0);
    b.emplace();
    b.discard();
    b.get_local(0);
    b.ret();
    b.end_function();
    b.set_entry(main);

    assert_eq!(eval(b), JsValue::Number(11.0));
}

#[test]
fn nested_handlers_catch_innermost_first() {
    // Inner protected region throws; its handler rethrows a new error that
    // the outer handler receives.
    let mut b = ProgramBuilder::new();
    let message = b.key("message");
    let main = b.begin_function("<main>", 0, 2, 0);
    emit_new_error(&mut b, "inner");
    b.throw();
    let l_after_inner = b.new_label();
    b.jump(l_after_inner);
    // inner handler: rethrow with a combined message
    b.catch_into(0);
    let error_key = b.key("Error");
    b.push_undefined();
    b.put_global();
    b.get_prop(error_key);
    b.get_local(0);
    b.get_prop(message);
    b.push_str("-wrapped");
    b.op(Opcode::Add);
    b.construct(1);
    b.throw();
    b.bind(l_after_inner);
    let l_end = b.new_label();
    b.jump(l_end);
    // outer handler
    b.catch_into(1);
    b.get_local(1);
    b.get_prop(message);
    b.ret();
    b.bind(l_end);
    b.push_str("unreachable");
    b.ret();
    b.end_function();
    b.set_entry(main);

    assert_eq!(eval(b), JsValue::Str("inner-wrapped".to_owned()));
}

#[test]
fn thrown_primitives_report_their_string_form() {
    let mut b = ProgramBuilder::new();
    let main = b.begin_function("<main>", 0, 0, 0);
    b.push_num(42.0);
    b.throw();
    b.end_function();
    b.set_entry(main);

    let mut out = CollectStringPrint::new();
    let err = DerkRun::new(b.finish()).run(&mut out).expect_err("must fail");
    assert_eq!(err.code(), VmErrCode::UncaughtError);
    assert_eq!(err.message(), "42");
}

#[test]
fn halt_aborts_with_vm_abort() {
    let mut b = ProgramBuilder::new();
    let main = b.begin_function("<main>", 0, 0, 0);
    b.halt();
    b.end_function();
    b.set_entry(main);

    let mut out = CollectStringPrint::new();
    let err = DerkRun::new(b.finish()).run(&mut out).expect_err("must abort");
    assert_eq!(err.code(), VmErrCode::VmAbort);
    assert_eq!(err.code().exit_code(), 1);
}

#[test]
fn property_access_on_undefined_is_fatal_not_catchable() {
    // try { undefined.x } catch (e) { "caught" }
    // The envelope error must
    // NOT be caught.
    let mut b = ProgramBuilder::new();
    let x = b.key("x");
    let main = b.begin_function("<main>", 0, 1, 0);
    b.push_undefined();
    b.get_prop(x);
    b.discard();
    let l_end = b.new_label();
    b.jump(l_end);
    b.catch_into(0);
    b.push_str("caught");
    b.ret();
    b.bind(l_end);
    b.push_str("no-throw");
    b.ret();
    b.end_function();
    b.set_entry(main);

    let mut out = CollectStringPrint::new();
    let err = DerkRun::new(b.finish()).run(&mut out).expect_err("must be fatal");
    assert_eq!(err.code(), VmErrCode::BadPropertyAccess);
}

#[test]
fn strict_frozen_writes_throw_a_catchable_type_error() {
    // var o={x:1}; Object.freeze(o);
    // try { o.x=2; } catch (e) { return e.name; }
    let mut b = ProgramBuilder::new();
    let object_key = b.key("Object");
    let freeze = b.key("freeze");
    let x = b.key("x");
    let name = b.key("name");
    let main = b.begin_function("<main>", 0, 2, 0);
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
    let l_end = b.new_label();
    b.jump(l_end);
    b.catch_into(1);
    b.get_local(1);
    b.get_prop(name);
    b.ret();
    b.bind(l_end);
    b.push_str("silent");
    b.ret();
    b.end_function();
    b.set_entry(main);

    let mut out = CollectStringPrint::new();
    let program = b.finish();

    // Default semantics: the write fails silently.
    let silent = DerkRun::new(program.clone()).run(&mut out).expect("silent mode");
    assert_eq!(silent, JsValue::Str("silent".to_owned()));

    // Strict mode: the rejected write throws a TypeError value.
    let strict = DerkRun::new(program)
        .with_config(RunConfig::new().strict_frozen_writes(true))
        .run(&mut out)
        .expect("strict mode");
    assert_eq!(strict, JsValue::Str("TypeError".to_owned()));
}

#[test]
fn error_to_string_joins_name_and_message() {
    // new Error("boom").toString()
    let mut b = ProgramBuilder::new();
    let to_string = b.key("toString");
    let main = b.begin_function("<main>", 0, 1, 0);
    emit_new_error(&mut b, "boom");
    b.put_local_ref(0);
    b.emplace();
    b.discard();
    b.get_local(0);
    b.get_local(0);
    b.get_prop(to_string);
    b.call(0, false);
    b.ret();
    b.end_function();
    b.set_entry(main);

    assert_eq!(eval(b), JsValue::Str("Error: boom".to_owned()));
}
