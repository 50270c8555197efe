//! `console.log` and `console.readln`.

use crate::error::RunResult;
use crate::value::Value;
use crate::vm::Vm;

/// Variadic, space-joined, newline-terminated print.
pub(crate) fn log(vm: &mut Vm<'_>, _this: Value, args: &[Value]) -> RunResult<Value> {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            vm.print.stdout_push(' ');
        }
        let text = arg.js_to_string(&vm.heap);
        vm.print.stdout_write(&text);
    }
    vm.print.stdout_push('\n');
    Ok(Value::Undefined)
}

/// Blocking line read; yields `null` at EOF.
pub(crate) fn readln(vm: &mut Vm<'_>, _this: Value, args: &[Value]) -> RunResult<Value> {
    let prompt = match args.first() {
        Some(Value::Undefined) | None => String::new(),
        Some(value) => value.js_to_string(&vm.heap),
    };
    match vm.print.stdin_readln(&prompt) {
        Some(line) => vm.alloc_string(line),
        None => Ok(Value::Null),
    }
}
