//! `String` and `String.prototype`. Positions and lengths are in UTF-16
//! code units, per the ES5 string model.

use crate::error::RunResult;
use crate::object::{JsObject, ObjectKind};
use crate::value::Value;
use crate::vm::Vm;

/// `String(x)`: ToString for any argument.
pub(crate) fn constructor(vm: &mut Vm<'_>, _this: Value, args: &[Value]) -> RunResult<Value> {
    let text = match args.first() {
        Some(value) => value.js_to_string(&vm.heap),
        None => String::new(),
    };
    vm.alloc_string(text)
}

fn this_units(vm: &mut Vm<'_>, this: Value, method: &str) -> RunResult<Vec<u16>> {
    match this {
        Value::Ref(id) => {
            if let ObjectKind::Str(content) = &vm.heap.get(id).kind {
                return Ok(content.encode_utf16().collect());
            }
            Err(vm.throw_type_error(&format!("String.prototype.{method} called on non-string")))
        }
        _ => Err(vm.throw_type_error(&format!("String.prototype.{method} called on non-string"))),
    }
}

fn arg_index(vm: &Vm<'_>, args: &[Value], at: usize) -> f64 {
    match args.get(at) {
        Some(Value::Undefined) | None => 0.0,
        Some(value) => value.to_number(&vm.heap),
    }
}

pub(crate) fn char_at(vm: &mut Vm<'_>, this: Value, args: &[Value]) -> RunResult<Value> {
    let units = this_units(vm, this, "charAt")?;
    let index = arg_index(vm, args, 0);
    let text = if index.fract() == 0.0 && index >= 0.0 && (index as usize) < units.len() {
        String::from_utf16_lossy(&units[index as usize..=index as usize])
    } else {
        String::new()
    };
    vm.alloc_string(text)
}

pub(crate) fn char_code_at(vm: &mut Vm<'_>, this: Value, args: &[Value]) -> RunResult<Value> {
    let units = this_units(vm, this, "charCodeAt")?;
    let index = arg_index(vm, args, 0);
    if index.fract() == 0.0 && index >= 0.0 && (index as usize) < units.len() {
        Ok(Value::Number(f64::from(units[index as usize])))
    } else {
        Ok(Value::Number(f64::NAN))
    }
}

pub(crate) fn index_of(vm: &mut Vm<'_>, this: Value, args: &[Value]) -> RunResult<Value> {
    let haystack = this_units(vm, this, "indexOf")?;
    let needle: Vec<u16> = args
        .first()
        .copied()
        .unwrap_or(Value::Undefined)
        .js_to_string(&vm.heap)
        .encode_utf16()
        .collect();
    if needle.is_empty() {
        return Ok(Value::Number(0.0));
    }
    if needle.len() <= haystack.len() {
        for start in 0..=haystack.len() - needle.len() {
            if haystack[start..start + needle.len()] == needle[..] {
                return Ok(Value::Number(start as f64));
            }
        }
    }
    Ok(Value::Number(-1.0))
}

/// Negative positions count from the end.
pub(crate) fn slice(vm: &mut Vm<'_>, this: Value, args: &[Value]) -> RunResult<Value> {
    let units = this_units(vm, this, "slice")?;
    let len = units.len() as i64;
    let begin = resolve_position(vm, args.first(), 0, len, true);
    let end = resolve_position(vm, args.get(1), len, len, true);
    let text = if begin < end {
        String::from_utf16_lossy(&units[begin as usize..end as usize])
    } else {
        String::new()
    };
    vm.alloc_string(text)
}

/// Clamps both positions to the string and swaps them when reversed.
pub(crate) fn substring(vm: &mut Vm<'_>, this: Value, args: &[Value]) -> RunResult<Value> {
    let units = this_units(vm, this, "substring")?;
    let len = units.len() as i64;
    let a = resolve_position(vm, args.first(), 0, len, false);
    let b = resolve_position(vm, args.get(1), len, len, false);
    let (begin, end) = if a <= b { (a, b) } else { (b, a) };
    let text = String::from_utf16_lossy(&units[begin as usize..end as usize]);
    vm.alloc_string(text)
}

/// `split(sep)`: no separator wraps the whole string, the empty separator
/// splits into single code units.
pub(crate) fn split(vm: &mut Vm<'_>, this: Value, args: &[Value]) -> RunResult<Value> {
    let units = this_units(vm, this, "split")?;
    let pieces: Vec<String> = match args.first() {
        Some(Value::Undefined) | None => vec![String::from_utf16_lossy(&units)],
        Some(separator) => {
            let sep: Vec<u16> = separator.js_to_string(&vm.heap).encode_utf16().collect();
            if sep.is_empty() {
                units.iter().map(|&u| String::from_utf16_lossy(&[u])).collect()
            } else {
                let mut out = Vec::new();
                let mut start = 0usize;
                let mut i = 0usize;
                while i + sep.len() <= units.len() {
                    if units[i..i + sep.len()] == sep[..] {
                        out.push(String::from_utf16_lossy(&units[start..i]));
                        i += sep.len();
                        start = i;
                    } else {
                        i += 1;
                    }
                }
                out.push(String::from_utf16_lossy(&units[start..]));
                out
            }
        }
    };
    let proto = Some(vm.realm.array_proto);
    let result = vm.alloc(JsObject::array(proto, Vec::new()))?;
    vm.push_scratch(Value::Ref(result))?;
    for piece in pieces {
        let value = vm.alloc_string(piece)?;
        if let ObjectKind::Array { elements, .. } = &mut vm.heap.get_mut(result).kind {
            elements.push(value);
        }
    }
    vm.pop_scratch()?;
    Ok(Value::Ref(result))
}

pub(crate) fn to_upper_case(vm: &mut Vm<'_>, this: Value, _args: &[Value]) -> RunResult<Value> {
    let units = this_units(vm, this, "toUpperCase")?;
    let text = String::from_utf16_lossy(&units).to_uppercase();
    vm.alloc_string(text)
}

pub(crate) fn to_lower_case(vm: &mut Vm<'_>, this: Value, _args: &[Value]) -> RunResult<Value> {
    let units = this_units(vm, this, "toLowerCase")?;
    let text = String::from_utf16_lossy(&units).to_lowercase();
    vm.alloc_string(text)
}

fn resolve_position(vm: &Vm<'_>, arg: Option<&Value>, default: i64, len: i64, from_end: bool) -> i64 {
    let raw = match arg {
        Some(Value::Undefined) | None => return default,
        Some(value) => value.to_number(&vm.heap),
    };
    if raw.is_nan() {
        return 0;
    }
    let raw = raw as i64;
    if raw < 0 {
        if from_end {
            (len + raw).max(0)
        } else {
            0
        }
    } else {
        raw.min(len)
    }
}
