//! `Array`, `Array.isArray`, and `Array.prototype`.

use crate::error::RunResult;
use crate::object::{JsObject, ObjectKind};
use crate::value::Value;
use crate::vm::Vm;

/// `Array(n)` preallocates `n` holes; any other argument list becomes the
/// element list.
pub(crate) fn constructor(vm: &mut Vm<'_>, _this: Value, args: &[Value]) -> RunResult<Value> {
    let elements = match args {
        [Value::Number(n)] => {
            if n.fract() != 0.0 || *n < 0.0 || *n >= f64::from(u32::MAX) {
                return Err(vm.throw_range_error("invalid array length"));
            }
            vec![Value::Undefined; *n as usize]
        }
        _ => args.to_vec(),
    };
    let proto = Some(vm.realm.array_proto);
    Ok(Value::Ref(vm.alloc(JsObject::array(proto, elements))?))
}

pub(crate) fn is_array(vm: &mut Vm<'_>, _this: Value, args: &[Value]) -> RunResult<Value> {
    let result = match args.first() {
        Some(Value::Ref(id)) => matches!(vm.heap.get(*id).kind, ObjectKind::Array { .. }),
        _ => false,
    };
    Ok(Value::Bool(result))
}

fn this_array(vm: &mut Vm<'_>, this: Value, method: &str) -> RunResult<crate::heap::HeapId> {
    match this {
        Value::Ref(id) if matches!(vm.heap.get(id).kind, ObjectKind::Array { .. }) => Ok(id),
        _ => Err(vm.throw_type_error(&format!("Array.prototype.{method} called on non-array"))),
    }
}

/// Appends every argument; returns the new length. Appending creates new
/// index properties, so frozen and sealed receivers both reject.
pub(crate) fn push(vm: &mut Vm<'_>, this: Value, args: &[Value]) -> RunResult<Value> {
    let id = this_array(vm, this, "push")?;
    let len = vm.heap.get(id).array_length().unwrap_or(0);
    if vm.heap.get(id).array_frozen() || !vm.heap.get(id).extensible {
        vm.rejected_write(&len.to_string())?;
        return Ok(Value::Number(len as f64));
    }
    if let ObjectKind::Array { elements, .. } = &mut vm.heap.get_mut(id).kind {
        elements.extend_from_slice(args);
        Ok(Value::Number(elements.len() as f64))
    } else {
        Ok(Value::Number(0.0))
    }
}

/// Removing the last index deletes a property, which neither frozen nor
/// sealed receivers permit.
pub(crate) fn pop(vm: &mut Vm<'_>, this: Value, _args: &[Value]) -> RunResult<Value> {
    let id = this_array(vm, this, "pop")?;
    if vm.heap.get(id).array_frozen() || !vm.heap.get(id).extensible {
        let at = vm.heap.get(id).array_length().unwrap_or(0).saturating_sub(1);
        vm.rejected_write(&at.to_string())?;
        return Ok(Value::Undefined);
    }
    if let ObjectKind::Array { elements, .. } = &mut vm.heap.get_mut(id).kind {
        Ok(elements.pop().unwrap_or(Value::Undefined))
    } else {
        Ok(Value::Undefined)
    }
}

/// Separator defaults to `","`; holes, `undefined`, and `null` join as the
/// empty string.
pub(crate) fn join(vm: &mut Vm<'_>, this: Value, args: &[Value]) -> RunResult<Value> {
    let id = this_array(vm, this, "join")?;
    let separator = match args.first() {
        Some(Value::Undefined) | None => ",".to_owned(),
        Some(value) => value.js_to_string(&vm.heap),
    };
    let parts: Vec<String> = match &vm.heap.get(id).kind {
        ObjectKind::Array { elements, .. } => elements
            .iter()
            .map(|e| match e {
                Value::Undefined | Value::Null => String::new(),
                other => other.js_to_string(&vm.heap),
            })
            .collect(),
        _ => Vec::new(),
    };
    vm.alloc_string(parts.join(&separator))
}

/// In-place reversal; returns the receiver. Rewrites every element, so a
/// frozen receiver rejects (sealed ones keep writable elements and may).
pub(crate) fn reverse(vm: &mut Vm<'_>, this: Value, _args: &[Value]) -> RunResult<Value> {
    let id = this_array(vm, this, "reverse")?;
    if vm.heap.get(id).array_frozen() {
        vm.rejected_write("0")?;
        return Ok(this);
    }
    if let ObjectKind::Array { elements, .. } = &mut vm.heap.get_mut(id).kind {
        elements.reverse();
    }
    Ok(this)
}

/// Strict-equality search; `-1` when absent.
pub(crate) fn index_of(vm: &mut Vm<'_>, this: Value, args: &[Value]) -> RunResult<Value> {
    let id = this_array(vm, this, "indexOf")?;
    let needle = args.first().copied().unwrap_or(Value::Undefined);
    let elements = match &vm.heap.get(id).kind {
        ObjectKind::Array { elements, .. } => elements.clone(),
        _ => Vec::new(),
    };
    for (index, element) in elements.iter().enumerate() {
        if element.strict_eq(needle, &vm.heap) {
            return Ok(Value::Number(index as f64));
        }
    }
    Ok(Value::Number(-1.0))
}

/// `slice(begin, end)` with negative indices counted from the end.
pub(crate) fn slice(vm: &mut Vm<'_>, this: Value, args: &[Value]) -> RunResult<Value> {
    let id = this_array(vm, this, "slice")?;
    let len = vm.heap.get(id).array_length().unwrap_or(0) as i64;
    let begin = clamp_index(args.first(), 0, len, vm);
    let end = clamp_index(args.get(1), len, len, vm);
    let copied: Vec<Value> = match &vm.heap.get(id).kind {
        ObjectKind::Array { elements, .. } => {
            if begin < end {
                elements[begin as usize..end as usize].to_vec()
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    };
    // `this` keeps every copied element alive across this allocation.
    let proto = Some(vm.realm.array_proto);
    Ok(Value::Ref(vm.alloc(JsObject::array(proto, copied))?))
}

fn clamp_index(arg: Option<&Value>, default: i64, len: i64, vm: &Vm<'_>) -> i64 {
    let raw = match arg {
        Some(Value::Undefined) | None => return default,
        Some(value) => value.to_number(&vm.heap),
    };
    if raw.is_nan() {
        return 0;
    }
    let raw = raw as i64;
    if raw < 0 {
        (len + raw).max(0)
    } else {
        raw.min(len)
    }
}
