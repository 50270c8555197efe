//! The `clock` host namespace.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::RunResult;
use crate::value::Value;
use crate::vm::Vm;

/// Milliseconds since the Unix epoch.
pub(crate) fn now(_vm: &mut Vm<'_>, _this: Value, _args: &[Value]) -> RunResult<Value> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0);
    Ok(Value::Number(millis))
}
