//! Operator semantics, short-circuit jumps, calls, closures, and tail-call
//! frame replacement.

use derkjs::{
    CollectStringPrint, DerkRun, FuncId, JsValue, Opcode, ProgramBuilder, RunConfig, VmErrCode,
};

fn eval(b: ProgramBuilder) -> JsValue {
    let mut out = CollectStringPrint::new();
    DerkRun::new(b.finish()).run(&mut out).expect("program failed")
}

/// Builds a single-thunk image whose body is produced by `emit`; the thunk
/// returns whatever `emit` leaves on the stack.
fn expr(locals: u16, emit: impl FnOnce(&mut ProgramBuilder)) -> JsValue {
    let mut b = ProgramBuilder::new();
    let main = b.begin_function("<main>", 0, locals, 0);
    emit(&mut b);
    b.ret();
    b.end_function();
    b.set_entry(main);
    eval(b)
}

mod operators {
    use super::*;

    #[test]
    fn precedence_is_stack_order() {
        // 1 + 2 * 3
        let result = expr(0, |b| {
            b.push_num(1.0);
            b.push_num(2.0);
            b.push_num(3.0);
            b.op(Opcode::Mul);
            b.op(Opcode::Add);
        });
        assert_eq!(result, JsValue::Number(7.0));
    }

    #[test]
    fn plus_concatenates_when_either_side_is_a_string() {
        let result = expr(0, |b| {
            b.push_str("a");
            b.push_num(1.0);
            b.op(Opcode::Add);
        });
        assert_eq!(result, JsValue::Str("a1".to_owned()));

        let result = expr(0, |b| {
            b.push_num(1.0);
            b.push_str("a");
            b.op(Opcode::Add);
        });
        assert_eq!(result, JsValue::Str("1a".to_owned()));
    }

    #[test]
    fn undefined_in_arithmetic_is_nan() {
        let result = expr(0, |b| {
            b.push_undefined();
            b.push_num(1.0);
            b.op(Opcode::Add);
        });
        assert!(matches!(result, JsValue::Number(n) if n.is_nan()));
    }

    #[test]
    fn concatenation_with_undefined_spells_it_out() {
        let result = expr(0, |b| {
            b.push_str("x=");
            b.push_undefined();
            b.op(Opcode::Add);
        });
        assert_eq!(result, JsValue::Str("x=undefined".to_owned()));
    }

    #[test]
    fn division_by_zero_follows_ieee() {
        let result = expr(0, |b| {
            b.push_num(1.0);
            b.push_num(0.0);
            b.op(Opcode::Div);
        });
        assert_eq!(result, JsValue::Number(f64::INFINITY));

        let result = expr(0, |b| {
            b.push_num(-1.0);
            b.push_num(0.0);
            b.op(Opcode::Div);
        });
        assert_eq!(result, JsValue::Number(f64::NEG_INFINITY));

        let result = expr(0, |b| {
            b.push_num(0.0);
            b.push_num(0.0);
            b.op(Opcode::Div);
        });
        assert!(matches!(result, JsValue::Number(n) if n.is_nan()));
    }

    #[test]
    fn modulo_takes_the_dividend_sign() {
        let result = expr(0, |b| {
            b.push_num(5.0);
            b.push_num(3.0);
            b.op(Opcode::Mod);
        });
        assert_eq!(result, JsValue::Number(2.0));

        let result = expr(0, |b| {
            b.push_num(-5.0);
            b.push_num(3.0);
            b.op(Opcode::Mod);
        });
        assert_eq!(result, JsValue::Number(-2.0));
    }

    #[test]
    fn string_comparison_is_lexicographic() {
        let result = expr(0, |b| {
            b.push_str("apple");
            b.push_str("banana");
            b.op(Opcode::Lt);
        });
        assert_eq!(result, JsValue::Bool(true));

        // Mixed operands coerce to number: "10" < 9 is false.
        let result = expr(0, |b| {
            b.push_str("10");
            b.push_num(9.0);
            b.op(Opcode::Lt);
        });
        assert_eq!(result, JsValue::Bool(false));
    }

    #[test]
    fn nan_never_equals_itself() {
        let nan = f64::NAN;
        let result = expr(0, move |b| {
            b.push_num(nan);
            b.push_num(nan);
            b.op(Opcode::EqStrict);
        });
        assert_eq!(result, JsValue::Bool(false));
    }

    #[test]
    fn loose_equality_bridges_types() {
        fn push_null(b: &mut ProgramBuilder) {
            let c = b.null_const();
            b.put_const(c);
        }
        let result = expr(0, |b| {
            push_null(b);
            b.push_undefined();
            b.op(Opcode::EqLoose);
        });
        assert_eq!(result, JsValue::Bool(true));

        let result = expr(0, |b| {
            push_null(b);
            b.push_undefined();
            b.op(Opcode::EqStrict);
        });
        assert_eq!(result, JsValue::Bool(false));

        let result = expr(0, |b| {
            b.push_str("1");
            b.push_num(1.0);
            b.op(Opcode::EqLoose);
        });
        assert_eq!(result, JsValue::Bool(true));
    }

    #[test]
    fn strcat_stringifies_both_sides() {
        let result = expr(0, |b| {
            b.push_num(1.0);
            b.push_num(2.0);
            b.op(Opcode::Strcat);
        });
        assert_eq!(result, JsValue::Str("12".to_owned()));
    }

    #[test]
    fn typeof_classifies_heap_objects() {
        let result = expr(0, |b| {
            b.make_array(0);
            b.op(Opcode::TypeOf);
        });
        assert_eq!(result, JsValue::Str("object".to_owned()));

        let result = expr(0, |b| {
            b.push_str("s");
            b.op(Opcode::TypeOf);
        });
        assert_eq!(result, JsValue::Str("string".to_owned()));
    }
}

mod short_circuit {
    use super::*;

    #[test]
    fn or_keeps_a_truthy_left_operand() {
        // "L" || "R"
        let result = expr(0, |b| {
            let end = b.new_label();
            b.push_str("L");
            b.jump_if(end);
            b.push_str("R");
            b.bind(end);
        });
        assert_eq!(result, JsValue::Str("L".to_owned()));
    }

    #[test]
    fn or_falls_through_to_the_right_operand() {
        // 0 || "R"
        let result = expr(0, |b| {
            let end = b.new_label();
            b.push_num(0.0);
            b.jump_if(end);
            b.push_str("R");
            b.bind(end);
        });
        assert_eq!(result, JsValue::Str("R".to_owned()));
    }

    #[test]
    fn and_keeps_a_falsy_left_operand() {
        // 0 && "R"
        let result = expr(0, |b| {
            let end = b.new_label();
            b.push_num(0.0);
            b.jump_else(end);
            b.push_str("R");
            b.bind(end);
        });
        assert_eq!(result, JsValue::Number(0.0));
    }

    #[test]
    fn and_falls_through_when_truthy() {
        // 1 && "R"
        let result = expr(0, |b| {
            let end = b.new_label();
            b.push_num(1.0);
            b.jump_else(end);
            b.push_str("R");
            b.bind(end);
        });
        assert_eq!(result, JsValue::Str("R".to_owned()));
    }
}

mod lvalues {
    use super::*;

    #[test]
    fn emplace_leaves_the_value_as_expression_result() {
        // var x; (x = 41) + 1
        let result = expr(1, |b| {
            b.push_num(41.0);
            b.put_local_ref(0);
            b.emplace();
            b.push_num(1.0);
            b.op(Opcode::Add);
        });
        assert_eq!(result, JsValue::Number(42.0));
    }

    #[test]
    fn prefix_increment_writes_back() {
        // var x = 5; ++x
        let result = expr(1, |b| {
            b.push_num(5.0);
            b.put_local_ref(0);
            b.emplace();
            b.discard();
            b.get_local(0);
            b.put_imm(1);
            b.op(Opcode::Add);
            b.put_local_ref(0);
            b.emplace();
        });
        assert_eq!(result, JsValue::Number(6.0));
    }

    #[test]
    fn property_reference_emplace_writes_through() {
        // var o = {}; (o.x = 9); o.x
        let mut b = ProgramBuilder::new();
        let x = b.key("x");
        let main = b.begin_function("<main>", 0, 1, 0);
        b.make_object(0);
        b.put_local_ref(0);
        b.emplace();
        b.discard();
        b.push_num(9.0);
        b.get_local(0);
        b.ref_prop(x);
        b.emplace();
        b.discard();
        b.get_local(0);
        b.get_prop(x);
        b.ret();
        b.end_function();
        b.set_entry(main);
        assert_eq!(eval(b), JsValue::Number(9.0));
    }
}

mod calls {
    use super::*;

    #[test]
    fn extra_arguments_are_dropped_and_missing_read_undefined() {
        // function two(a, b) { return "" + a + b; } two(1) and two(1, 2, 3)
        let mut b = ProgramBuilder::new();
        let two_key = b.key("two");
        let two = b.begin_function("two", 2, 0, 0);
        b.push_str("");
        b.get_local(0);
        b.op(Opcode::Add);
        b.get_local(1);
        b.op(Opcode::Add);
        b.ret();
        b.end_function();
        b.preload_lambda("two", two);

        let main = b.begin_function("<main>", 0, 0, 0);
        b.push_undefined();
        b.put_global();
        b.get_prop(two_key);
        b.push_num(1.0);
        b.call(1, false);
        b.push_undefined();
        b.put_global();
        b.get_prop(two_key);
        b.push_num(1.0);
        b.push_num(2.0);
        b.push_num(3.0);
        b.call(3, false);
        b.op(Opcode::Strcat);
        b.ret();
        b.end_function();
        b.set_entry(main);

        assert_eq!(eval(b), JsValue::Str("1undefined12".to_owned()));
    }

    #[test]
    fn function_prototype_call_rebinds_this() {
        // function getv() { return this.v; } getv.call({v: 42})
        let mut b = ProgramBuilder::new();
        let getv_key = b.key("getv");
        let call_key = b.key("call");
        let v = b.key("v");

        let getv = b.begin_function("getv", 0, 0, 0);
        b.get_this();
        b.get_prop(v);
        b.ret();
        b.end_function();
        b.preload_lambda("getv", getv);

        let main = b.begin_function("<main>", 0, 0, 0);
        b.put_global();
        b.get_prop(getv_key);
        b.put_global();
        b.get_prop(getv_key);
        b.get_prop(call_key);
        b.push_str("v");
        b.push_num(42.0);
        b.make_object(1);
        b.call(1, false);
        b.ret();
        b.end_function();
        b.set_entry(main);

        assert_eq!(eval(b), JsValue::Number(42.0));
    }

    #[test]
    fn constructor_returning_object_overrides_this() {
        // function C() { this.v = 1; return {w: 2}; } new C().w
        let mut b = ProgramBuilder::new();
        let c_key = b.key("C");
        let v = b.key("v");
        let w = b.key("w");

        let ctor = b.begin_function("C", 0, 0, 0);
        b.get_this();
        b.push_num(1.0);
        b.set_prop(v);
        b.push_str("w");
        b.push_num(2.0);
        b.make_object(1);
        b.ret();
        b.end_function();
        b.preload_lambda("C", ctor);

        let main = b.begin_function("<main>", 0, 0, 0);
        b.push_undefined();
        b.put_global();
        b.get_prop(c_key);
        b.construct(0);
        b.get_prop(w);
        b.ret();
        b.end_function();
        b.set_entry(main);

        assert_eq!(eval(b), JsValue::Number(2.0));
    }

    #[test]
    fn parse_int_round_trips_to_string() {
        // parseInt((12345).toString()) === 12345
        let mut b = ProgramBuilder::new();
        let parse_int = b.key("parseInt");
        let to_string = b.key("toString");

        let main = b.begin_function("<main>", 0, 0, 0);
        b.push_undefined();
        b.put_global();
        b.get_prop(parse_int);
        b.push_num(12345.0);
        b.push_num(12345.0);
        b.get_prop(to_string);
        b.call(0, false);
        b.call(1, false);
        b.push_num(12345.0);
        b.op(Opcode::EqStrict);
        b.ret();
        b.end_function();
        b.set_entry(main);

        assert_eq!(eval(b), JsValue::Bool(true));
    }

    #[test]
    fn is_nan_sees_through_coercion() {
        let mut b = ProgramBuilder::new();
        let is_nan = b.key("isNaN");
        let main = b.begin_function("<main>", 0, 0, 0);
        b.push_undefined();
        b.put_global();
        b.get_prop(is_nan);
        b.push_num(f64::NAN);
        b.call(1, false);
        b.ret();
        b.end_function();
        b.set_entry(main);
        assert_eq!(eval(b), JsValue::Bool(true));
    }

    #[test]
    fn calling_a_non_callable_is_a_bad_operation() {
        let mut b = ProgramBuilder::new();
        let main = b.begin_function("<main>", 0, 0, 0);
        b.push_undefined();
        b.make_object(0);
        b.call(0, false);
        b.push_undefined();
        b.ret();
        b.end_function();
        b.set_entry(main);

        let mut out = CollectStringPrint::new();
        let err = DerkRun::new(b.finish()).run(&mut out).expect_err("must fail");
        assert_eq!(err.code(), VmErrCode::BadOperation);
    }
}

mod closures {
    use super::*;

    /// `function mk(x){ return function(){ return x; }; }`
    fn build_mk(b: &mut ProgramBuilder) -> FuncId {
        let inner = b.begin_function("anon", 0, 0, 0);
        b.get_upvalue(0, 0);
        b.ret();
        b.end_function();

        let mk = b.begin_function("mk", 1, 0, 1);
        b.get_local(0);
        b.ref_upvalue(0, 0);
        b.emplace();
        b.discard();
        b.make_lambda(inner, true);
        b.ret();
        b.end_function();
        mk
    }

    #[test]
    fn closure_reads_its_captured_slot() {
        let mut b = ProgramBuilder::new();
        let mk_key = b.key("mk");
        let mk = build_mk(&mut b);
        b.preload_lambda("mk", mk);

        let main = b.begin_function("<main>", 0, 1, 0);
        b.push_undefined();
        b.put_global();
        b.get_prop(mk_key);
        b.push_num(7.0);
        b.call(1, false);
        b.put_local_ref(0);
        b.emplace();
        b.discard();
        b.push_undefined();
        b.get_local(0);
        b.call(0, false);
        b.ret();
        b.end_function();
        b.set_entry(main);

        assert_eq!(eval(b), JsValue::Number(7.0));
    }

    #[test]
    fn separate_calls_capture_separately() {
        // mk(1)() + mk(2)()
        let mut b = ProgramBuilder::new();
        let mk_key = b.key("mk");
        let mk = build_mk(&mut b);
        b.preload_lambda("mk", mk);

        let main = b.begin_function("<main>", 0, 0, 0);
        for n in [1.0, 2.0] {
            b.push_undefined();
            b.push_undefined();
            b.put_global();
            b.get_prop(mk_key);
            b.push_num(n);
            b.call(1, false);
            b.call(0, false);
        }
        b.op(Opcode::Add);
        b.ret();
        b.end_function();
        b.set_entry(main);

        assert_eq!(eval(b), JsValue::Number(3.0));
    }
}

mod tail_calls {
    use super::*;

    /// `function loop(n){ if (n===0) return "done"; return loop(n-1); }`
    /// with the recursive call in tail position.
    fn build_countdown(b: &mut ProgramBuilder, iterations: f64) {
        let loop_key = b.key("loop");
        let f = b.begin_function("loop", 1, 0, 0);
        b.get_local(0);
        b.put_imm(0);
        b.op(Opcode::EqStrict);
        let recurse = b.new_label();
        b.jump_else(recurse);
        b.push_str("done");
        b.ret();
        b.bind(recurse);
        b.discard();
        b.push_undefined();
        b.put_global();
        b.get_prop(loop_key);
        b.get_local(0);
        b.put_imm(1);
        b.op(Opcode::Sub);
        b.call(1, true);
        b.end_function();
        b.preload_lambda("loop", f);

        let main = b.begin_function("<main>", 0, 0, 0);
        b.push_undefined();
        b.put_global();
        b.get_prop(loop_key);
        b.push_num(iterations);
        b.call(1, false);
        b.ret();
        b.end_function();
        b.set_entry(main);
    }

    #[test]
    fn tail_recursion_runs_in_constant_frames() {
        let mut b = ProgramBuilder::new();
        // Far deeper than the frame limit; only frame replacement gets here.
        build_countdown(&mut b, 50_000.0);
        let mut out = CollectStringPrint::new();
        let value = DerkRun::new(b.finish())
            .with_config(RunConfig::new().call_depth_limit(32))
            .run(&mut out)
            .expect("tail calls must not grow the frame stack");
        assert_eq!(value, JsValue::Str("done".to_owned()));
    }

    #[test]
    fn non_tail_recursion_hits_the_depth_limit() {
        let mut b = ProgramBuilder::new();
        let down_key = b.key("down");
        let f = b.begin_function("down", 1, 0, 0);
        b.push_undefined();
        b.put_global();
        b.get_prop(down_key);
        b.get_local(0);
        b.put_imm(1);
        b.op(Opcode::Sub);
        b.call(1, false);
        b.ret();
        b.end_function();
        b.preload_lambda("down", f);

        let main = b.begin_function("<main>", 0, 0, 0);
        b.push_undefined();
        b.put_global();
        b.get_prop(down_key);
        b.push_num(10_000.0);
        b.call(1, false);
        b.ret();
        b.end_function();
        b.set_entry(main);

        let mut out = CollectStringPrint::new();
        let err = DerkRun::new(b.finish()).run(&mut out).expect_err("must overflow");
        assert_eq!(err.code(), VmErrCode::BadOperation);
        assert!(err.message().contains("call depth"));
    }
}
