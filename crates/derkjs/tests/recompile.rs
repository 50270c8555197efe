//! The two users of the append-only image path: the snippet-recompile
//! callback (through the `Error` constructor) and polyfill merging.

use derkjs::{
    CollectStringPrint, DerkRun, JsValue, ProgramBuilder, ProgramDelta, SnippetCompiler,
};

fn catch_stack_program() -> ProgramBuilder {
    // try { throw new Error("x"); } catch (e) { return e.stack; }
    let mut b = ProgramBuilder::new();
    let error_key = b.key("Error");
    let stack = b.key("stack");
    let main = b.begin_function("<main>", 0, 1, 0);
    b.push_undefined();
    b.put_global();
    b.get_prop(error_key);
    b.push_str("x");
    b.construct(1);
    b.throw();
    let l_end = b.new_label();
    b.jump(l_end);
    b.catch_into(0);
    b.get_local(0);
    b.get_prop(stack);
    b.ret();
    b.bind(l_end);
    b.push_str("no-throw");
    b.ret();
    b.end_function();
    b.set_entry(main);
    b
}

/// Compiles every snippet to a thunk returning a fixed string, recording
/// what it was asked to compile.
struct FixedTraceCompiler {
    requests: Vec<String>,
}

impl SnippetCompiler for FixedTraceCompiler {
    fn compile(&mut self, source: &str) -> Result<ProgramDelta, String> {
        self.requests.push(source.to_owned());
        let mut b = ProgramBuilder::new();
        let thunk = b.begin_function("<stack>", 0, 0, 0);
        b.push_str("at <compiled snippet>");
        b.ret();
        b.end_function();
        Ok(b.finish_delta(thunk))
    }
}

#[test]
fn error_constructor_uses_the_snippet_compiler() {
    let b = catch_stack_program();
    let mut out = CollectStringPrint::new();
    let mut compiler = FixedTraceCompiler { requests: Vec::new() };
    let value = DerkRun::new(b.finish())
        .run_with_compiler(&mut out, &mut compiler)
        .expect("program failed");
    assert_eq!(value, JsValue::Str("at <compiled snippet>".to_owned()));
    assert_eq!(compiler.requests.len(), 1);
}

#[test]
fn without_a_compiler_the_stack_records_the_throw_site() {
    // Same shape as `catch_stack_program`, with a source-map entry covering
    // the whole body so the fallback has a span to report.
    let mut b = ProgramBuilder::new();
    let error_key = b.key("Error");
    let stack = b.key("stack");
    let source = b.source("boom.js");
    let main = b.begin_function("<main>", 0, 1, 0);
    b.at(source, 0, 20);
    b.push_undefined();
    b.put_global();
    b.get_prop(error_key);
    b.push_str("x");
    b.construct(1);
    b.throw();
    let l_end = b.new_label();
    b.jump(l_end);
    b.catch_into(0);
    b.get_local(0);
    b.get_prop(stack);
    b.ret();
    b.bind(l_end);
    b.push_str("no-throw");
    b.ret();
    b.end_function();
    b.set_entry(main);

    let mut out = CollectStringPrint::new();
    let value = DerkRun::new(b.finish()).run(&mut out).expect("program failed");
    match value {
        JsValue::Str(stack) => {
            assert!(stack.starts_with("Error: x"), "stack was {stack:?}");
            assert!(stack.contains("boom.js"), "stack was {stack:?}");
        }
        other => panic!("expected a stack string, got {other:?}"),
    }
}

/// A compiler that always fails; the constructor must fall back to the
/// span-based stack text rather than propagate the failure.
struct BrokenCompiler;

impl SnippetCompiler for BrokenCompiler {
    fn compile(&mut self, _source: &str) -> Result<ProgramDelta, String> {
        Err("no parser available".to_owned())
    }
}

#[test]
fn a_failing_compiler_degrades_to_the_fallback() {
    let b = catch_stack_program();
    let mut out = CollectStringPrint::new();
    let value = DerkRun::new(b.finish())
        .run_with_compiler(&mut out, &mut BrokenCompiler)
        .expect("program failed");
    match value {
        JsValue::Str(stack) => assert!(stack.starts_with("Error: x"), "stack was {stack:?}"),
        other => panic!("expected a stack string, got {other:?}"),
    }
}

#[test]
fn polyfill_globals_are_visible_to_the_script() {
    // polyfill: globalThis.polyfilled = "yes"
    let mut poly = ProgramBuilder::new();
    let flag = poly.key("polyfilled");
    let thunk = poly.begin_function("<polyfill>", 0, 0, 0);
    poly.put_global();
    poly.push_str("yes");
    poly.set_prop(flag);
    poly.push_undefined();
    poly.ret();
    poly.end_function();
    poly.set_entry(thunk);

    // script: return globalThis.polyfilled
    let mut script = ProgramBuilder::new();
    let flag = script.key("polyfilled");
    let main = script.begin_function("<main>", 0, 0, 0);
    script.put_global();
    script.get_prop(flag);
    script.ret();
    script.end_function();
    script.set_entry(main);

    let mut out = CollectStringPrint::new();
    let value = DerkRun::new(script.finish())
        .with_polyfill(poly.finish())
        .run(&mut out)
        .expect("program failed");
    assert_eq!(value, JsValue::Str("yes".to_owned()));
}

#[test]
fn polyfill_functions_survive_the_merge() {
    // polyfill: function five() { return 5; }
    let mut poly = ProgramBuilder::new();
    let five = poly.begin_function("five", 0, 0, 0);
    poly.push_num(5.0);
    poly.ret();
    poly.end_function();
    poly.preload_lambda("five", five);
    let thunk = poly.begin_function("<polyfill>", 0, 0, 0);
    poly.push_undefined();
    poly.ret();
    poly.end_function();
    poly.set_entry(thunk);

    // script: five() + 1
    let mut script = ProgramBuilder::new();
    let five_key = script.key("five");
    let main = script.begin_function("<main>", 0, 0, 0);
    script.push_undefined();
    script.put_global();
    script.get_prop(five_key);
    script.call(0, false);
    script.push_num(1.0);
    script.op(derkjs::Opcode::Add);
    script.ret();
    script.end_function();
    script.set_entry(main);

    let mut out = CollectStringPrint::new();
    let value = DerkRun::new(script.finish())
        .with_polyfill(poly.finish())
        .run(&mut out)
        .expect("program failed");
    assert_eq!(value, JsValue::Number(6.0));
}

#[test]
fn script_result_wins_over_polyfill_result() {
    let mut poly = ProgramBuilder::new();
    let thunk = poly.begin_function("<polyfill>", 0, 0, 0);
    poly.push_str("from polyfill");
    poly.ret();
    poly.end_function();
    poly.set_entry(thunk);

    let mut script = ProgramBuilder::new();
    let main = script.begin_function("<main>", 0, 0, 0);
    script.push_str("from script");
    script.ret();
    script.end_function();
    script.set_entry(main);

    let mut out = CollectStringPrint::new();
    let value = DerkRun::new(script.finish())
        .with_polyfill(poly.finish())
        .run(&mut out)
        .expect("program failed");
    assert_eq!(value, JsValue::Str("from script".to_owned()));
}
