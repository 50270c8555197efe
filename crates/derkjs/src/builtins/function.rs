//! `Function.prototype` and its `call` method.

use crate::error::RunResult;
use crate::value::Value;
use crate::vm::Vm;

/// `Function.prototype` is itself a callable: zero-arity, returns
/// `undefined`.
pub(crate) fn function_proto_self(_vm: &mut Vm<'_>, _this: Value, _args: &[Value]) -> RunResult<Value> {
    Ok(Value::Undefined)
}

/// `f.call(thisArg, …args)`: re-enters the VM at a new frame with the
/// receiver patched to `thisArg`.
pub(crate) fn call(vm: &mut Vm<'_>, this: Value, args: &[Value]) -> RunResult<Value> {
    let this_arg = args.first().copied().unwrap_or(Value::Undefined);
    let rest = if args.is_empty() { &[] } else { &args[1..] };
    vm.call_value(this, this_arg, rest)
}
