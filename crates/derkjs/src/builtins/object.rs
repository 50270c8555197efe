//! `Object`, its static methods, and `Object.prototype`.

use crate::error::RunResult;
use crate::object::{JsObject, ObjectKind};
use crate::value::Value;
use crate::vm::props::proto_chain_contains;
use crate::vm::Vm;

/// `Object(x)`: returns object arguments unchanged, otherwise a fresh plain
/// object (the ToObject boxing this subset needs).
pub(crate) fn constructor(vm: &mut Vm<'_>, _this: Value, args: &[Value]) -> RunResult<Value> {
    match args.first() {
        Some(Value::Ref(id)) => Ok(Value::Ref(*id)),
        _ => {
            let proto = Some(vm.realm.object_proto);
            Ok(Value::Ref(vm.alloc(JsObject::plain(proto))?))
        }
    }
}

/// `Object.freeze(o)`: all descriptors cleared, object non-extensible.
/// Idempotent; returns its argument.
pub(crate) fn freeze(vm: &mut Vm<'_>, _this: Value, args: &[Value]) -> RunResult<Value> {
    let target = args.first().copied().unwrap_or(Value::Undefined);
    if let Value::Ref(id) = target {
        vm.heap.get_mut(id).freeze();
    }
    Ok(target)
}

/// `Object.seal(o)`: properties non-configurable, object non-extensible.
pub(crate) fn seal(vm: &mut Vm<'_>, _this: Value, args: &[Value]) -> RunResult<Value> {
    let target = args.first().copied().unwrap_or(Value::Undefined);
    if let Value::Ref(id) = target {
        vm.heap.get_mut(id).seal();
    }
    Ok(target)
}

/// `Object.create(p)`: fresh plain object with prototype `p`.
pub(crate) fn create(vm: &mut Vm<'_>, _this: Value, args: &[Value]) -> RunResult<Value> {
    let proto = match args.first() {
        Some(Value::Ref(id)) => Some(*id),
        Some(Value::Null) => None,
        _ => {
            return Err(vm.throw_type_error("Object prototype may only be an Object or null"));
        }
    };
    Ok(Value::Ref(vm.alloc(JsObject::plain(proto))?))
}

/// `Object.keys(o)`: own enumerable property names in insertion order;
/// array indices lead for dense arrays.
pub(crate) fn keys(vm: &mut Vm<'_>, _this: Value, args: &[Value]) -> RunResult<Value> {
    let Some(Value::Ref(id)) = args.first() else {
        return Err(vm.throw_type_error("Object.keys called on non-object"));
    };
    let id = *id;
    let proto = Some(vm.realm.array_proto);
    let result = vm.alloc(JsObject::array(proto, Vec::new()))?;
    // Root the result while the index strings are allocated into it.
    vm.push_scratch(Value::Ref(result))?;
    if let Some(len) = vm.heap.get(id).array_length() {
        for index in 0..len {
            let text = vm.alloc_string(index.to_string())?;
            if let ObjectKind::Array { elements, .. } = &mut vm.heap.get_mut(result).kind {
                elements.push(text);
            }
        }
    }
    let names: Vec<Value> = vm
        .heap
        .get(id)
        .props
        .iter()
        .filter(|(_, prop)| prop.enumerable)
        .map(|(key, _)| Value::Ref(key.heap_id()))
        .collect();
    if let ObjectKind::Array { elements, .. } = &mut vm.heap.get_mut(result).kind {
        elements.extend(names);
    }
    vm.pop_scratch()?;
    Ok(Value::Ref(result))
}

pub(crate) fn get_prototype_of(vm: &mut Vm<'_>, _this: Value, args: &[Value]) -> RunResult<Value> {
    match args.first() {
        Some(Value::Ref(id)) => Ok(match vm.heap.get(*id).proto {
            Some(proto) => Value::Ref(proto),
            None => Value::Null,
        }),
        _ => Err(vm.throw_type_error("Object.getPrototypeOf called on non-object")),
    }
}

/// `o.hasOwnProperty(k)`: own properties only, including intercepted array
/// `length` and live indices.
pub(crate) fn has_own_property(vm: &mut Vm<'_>, this: Value, args: &[Value]) -> RunResult<Value> {
    let Value::Ref(id) = this else {
        return Ok(Value::Bool(false));
    };
    let key_value = args.first().copied().unwrap_or(Value::Undefined);
    let name = key_value.js_to_string(&vm.heap);
    if let Some(len) = vm.heap.get(id).array_length() {
        if name == "length" {
            return Ok(Value::Bool(true));
        }
        if let Some(index) = crate::object::parse_array_index(&name) {
            return Ok(Value::Bool((index as usize) < len));
        }
    }
    let key = vm.value_to_key(key_value)?;
    Ok(Value::Bool(vm.heap.get(id).props.contains(key)))
}

/// `p.isPrototypeOf(o)`.
pub(crate) fn is_prototype_of(vm: &mut Vm<'_>, this: Value, args: &[Value]) -> RunResult<Value> {
    let (Value::Ref(this_id), Some(Value::Ref(target))) = (this, args.first()) else {
        return Ok(Value::Bool(false));
    };
    Ok(Value::Bool(proto_chain_contains(&vm.heap, *target, this_id)))
}

pub(crate) fn to_string(vm: &mut Vm<'_>, this: Value, _args: &[Value]) -> RunResult<Value> {
    let text = this.js_to_string(&vm.heap);
    vm.alloc_string(text)
}
