//! `Error`, `TypeError`, `RangeError`, and `Error.prototype.toString`.
//!
//! The constructors always build and return a fresh error object, so they
//! behave identically with and without `new`. When a snippet compiler is
//! registered, the constructor asks it for a stack-trace thunk, the one
//! runtime consumer of the snippet-recompile path; otherwise the throw
//! site's source span is recorded directly.

use crate::error::RunResult;
use crate::property::Property;
use crate::value::Value;
use crate::vm::Vm;

pub(crate) fn error(vm: &mut Vm<'_>, _this: Value, args: &[Value]) -> RunResult<Value> {
    construct(vm, "Error", args)
}

pub(crate) fn type_error(vm: &mut Vm<'_>, _this: Value, args: &[Value]) -> RunResult<Value> {
    construct(vm, "TypeError", args)
}

pub(crate) fn range_error(vm: &mut Vm<'_>, _this: Value, args: &[Value]) -> RunResult<Value> {
    construct(vm, "RangeError", args)
}

fn construct(vm: &mut Vm<'_>, name: &str, args: &[Value]) -> RunResult<Value> {
    let message = match args.first() {
        Some(Value::Undefined) | None => String::new(),
        Some(value) => value.js_to_string(&vm.heap),
    };
    let error = vm.new_error(name, &message)?;
    // Keep the error rooted while the stack string is produced; building it
    // may compile and run a snippet, which can allocate and collect.
    vm.push_scratch(error)?;
    let stack_text = build_stack_text(vm, name, &message)?;
    let stack_value = vm.alloc_string(stack_text)?;
    if let Value::Ref(id) = error {
        let key = vm.realm.wk.stack;
        vm.heap.get_mut(id).props.insert(key, Property::new(stack_value));
    }
    vm.pop_scratch()?;
    Ok(error)
}

/// Stack text via the registered snippet compiler, or the throw site's
/// source span when none is registered.
fn build_stack_text(vm: &mut Vm<'_>, name: &str, message: &str) -> RunResult<String> {
    let delta = match vm.snippet.as_mut() {
        Some(compiler) => compiler.compile("__derkjs_stack_trace()").ok(),
        None => None,
    };
    if let Some(delta) = delta {
        let thunk = vm.program.apply_delta(delta);
        let trace = vm.call_chunk(thunk)?;
        return Ok(trace.js_to_string(&vm.heap));
    }
    let header = if message.is_empty() {
        name.to_owned()
    } else {
        format!("{name}: {message}")
    };
    match vm.current_span() {
        Some(span) => {
            let source = vm.program.source(span.source).unwrap_or("<unknown>");
            Ok(format!("{header}\n    at {source}:{}..{}", span.start, span.end))
        }
        None => Ok(header),
    }
}

/// `Error.prototype.toString`: `"name: message"`, eliding the colon when
/// the message is empty.
pub(crate) fn to_string(vm: &mut Vm<'_>, this: Value, _args: &[Value]) -> RunResult<Value> {
    let Value::Ref(id) = this else {
        return Err(vm.throw_type_error("Error.prototype.toString called on non-object"));
    };
    let name = crate::vm::props::chain_lookup(&vm.heap, id, vm.realm.wk.name)
        .map_or_else(|| "Error".to_owned(), |v| v.js_to_string(&vm.heap));
    let message = crate::vm::props::chain_lookup(&vm.heap, id, vm.realm.wk.message)
        .map_or_else(String::new, |v| v.js_to_string(&vm.heap));
    let text = if message.is_empty() {
        name
    } else {
        format!("{name}: {message}")
    };
    vm.alloc_string(text)
}
