//! The preloaded native surface: global functions, namespace objects, and
//! prototype methods.
//!
//! Each builtin family has its own submodule; [`install`] wires the whole
//! surface into a freshly built realm. Natives observe the same calling
//! convention as lambdas and may re-enter the VM only through
//! `Vm::call_value`.

pub(crate) mod array;
pub(crate) mod clock;
pub(crate) mod console;
pub(crate) mod error;
pub(crate) mod function;
pub(crate) mod globals;
pub(crate) mod math;
pub(crate) mod number;
pub(crate) mod object;
pub(crate) mod string;

use crate::error::VmError;
use crate::heap::{Heap, HeapId};
use crate::intern::Interner;
use crate::object::JsObject;
use crate::property::Property;
use crate::value::Value;
use crate::vm::{NativeFn, Realm};

/// Installs every builtin binding into the realm.
pub(crate) fn install(heap: &mut Heap, interner: &mut Interner, realm: &Realm) -> Result<(), VmError> {
    // console
    let console = namespace(heap, interner, realm, "console")?;
    set_native(heap, interner, realm, console, "log", console::log)?;
    set_native(heap, interner, realm, console, "readln", console::readln)?;

    // clock
    let clock = namespace(heap, interner, realm, "clock")?;
    set_native(heap, interner, realm, clock, "now", clock::now)?;

    // global functions
    global_native(heap, interner, realm, "isNaN", globals::is_nan)?;
    global_native(heap, interner, realm, "parseInt", globals::parse_int)?;
    global_native(heap, interner, realm, "parseFloat", globals::parse_float)?;

    // Object
    let object_ctor = global_native(heap, interner, realm, "Object", object::constructor)?;
    wire_ctor(heap, realm, object_ctor, realm.object_proto)?;
    set_native(heap, interner, realm, object_ctor, "freeze", object::freeze)?;
    set_native(heap, interner, realm, object_ctor, "seal", object::seal)?;
    set_native(heap, interner, realm, object_ctor, "create", object::create)?;
    set_native(heap, interner, realm, object_ctor, "keys", object::keys)?;
    set_native(heap, interner, realm, object_ctor, "getPrototypeOf", object::get_prototype_of)?;
    set_native(
        heap,
        interner,
        realm,
        realm.object_proto,
        "hasOwnProperty",
        object::has_own_property,
    )?;
    set_native(
        heap,
        interner,
        realm,
        realm.object_proto,
        "isPrototypeOf",
        object::is_prototype_of,
    )?;
    set_native(heap, interner, realm, realm.object_proto, "toString", object::to_string)?;

    // Function.prototype: zero-arity callable with a pinned `length === 0`.
    let length_key = interner.intern(heap, Some(realm.string_proto), "length")?;
    heap.get_mut(realm.function_proto)
        .props
        .insert(length_key, Property::frozen(Value::Number(0.0)));
    set_native(heap, interner, realm, realm.function_proto, "call", function::call)?;

    // Array
    let array_ctor = global_native(heap, interner, realm, "Array", array::constructor)?;
    wire_ctor(heap, realm, array_ctor, realm.array_proto)?;
    set_native(heap, interner, realm, array_ctor, "isArray", array::is_array)?;
    set_native(heap, interner, realm, realm.array_proto, "push", array::push)?;
    set_native(heap, interner, realm, realm.array_proto, "pop", array::pop)?;
    set_native(heap, interner, realm, realm.array_proto, "join", array::join)?;
    set_native(heap, interner, realm, realm.array_proto, "reverse", array::reverse)?;
    set_native(heap, interner, realm, realm.array_proto, "indexOf", array::index_of)?;
    set_native(heap, interner, realm, realm.array_proto, "slice", array::slice)?;

    // String
    let string_ctor = global_native(heap, interner, realm, "String", string::constructor)?;
    wire_ctor(heap, realm, string_ctor, realm.string_proto)?;
    set_native(heap, interner, realm, realm.string_proto, "charAt", string::char_at)?;
    set_native(heap, interner, realm, realm.string_proto, "charCodeAt", string::char_code_at)?;
    set_native(heap, interner, realm, realm.string_proto, "indexOf", string::index_of)?;
    set_native(heap, interner, realm, realm.string_proto, "slice", string::slice)?;
    set_native(heap, interner, realm, realm.string_proto, "substring", string::substring)?;
    set_native(heap, interner, realm, realm.string_proto, "split", string::split)?;
    set_native(heap, interner, realm, realm.string_proto, "toUpperCase", string::to_upper_case)?;
    set_native(heap, interner, realm, realm.string_proto, "toLowerCase", string::to_lower_case)?;

    // Number and Boolean
    let number_ctor = global_native(heap, interner, realm, "Number", number::number_constructor)?;
    wire_ctor(heap, realm, number_ctor, realm.number_proto)?;
    set_native(heap, interner, realm, realm.number_proto, "toString", number::to_string)?;
    set_native(heap, interner, realm, realm.number_proto, "toFixed", number::to_fixed)?;
    let boolean_ctor = global_native(heap, interner, realm, "Boolean", number::boolean_constructor)?;
    wire_ctor(heap, realm, boolean_ctor, realm.boolean_proto)?;
    set_native(heap, interner, realm, realm.boolean_proto, "toString", number::boolean_to_string)?;

    // Error constructors share one prototype; `name` tells them apart and
    // only `Error` provides the `constructor` backreference.
    let error_ctor = global_native(heap, interner, realm, "Error", error::error)?;
    wire_ctor(heap, realm, error_ctor, realm.error_proto)?;
    let type_error_ctor = global_native(heap, interner, realm, "TypeError", error::type_error)?;
    set_value(
        heap,
        interner,
        realm,
        type_error_ctor,
        "prototype",
        Value::Ref(realm.error_proto),
    )?;
    let range_error_ctor = global_native(heap, interner, realm, "RangeError", error::range_error)?;
    set_value(
        heap,
        interner,
        realm,
        range_error_ctor,
        "prototype",
        Value::Ref(realm.error_proto),
    )?;
    let name = string_value(heap, interner, realm, "Error")?;
    set_value(heap, interner, realm, realm.error_proto, "name", name)?;
    let message = string_value(heap, interner, realm, "")?;
    set_value(heap, interner, realm, realm.error_proto, "message", message)?;
    set_native(heap, interner, realm, realm.error_proto, "toString", error::to_string)?;

    // Math
    let math = namespace(heap, interner, realm, "Math")?;
    set_native(heap, interner, realm, math, "floor", math::floor)?;
    set_native(heap, interner, realm, math, "ceil", math::ceil)?;
    set_native(heap, interner, realm, math, "abs", math::abs)?;
    set_native(heap, interner, realm, math, "sqrt", math::sqrt)?;
    set_native(heap, interner, realm, math, "pow", math::pow)?;
    set_native(heap, interner, realm, math, "min", math::min)?;
    set_native(heap, interner, realm, math, "max", math::max)?;

    Ok(())
}

/// Allocates a namespace object (`console`, `clock`, `Math`) and binds it as
/// a global property.
fn namespace(heap: &mut Heap, interner: &mut Interner, realm: &Realm, name: &str) -> Result<HeapId, VmError> {
    let object = heap.allocate(JsObject::plain(Some(realm.object_proto)))?;
    set_value(heap, interner, realm, realm.global, name, Value::Ref(object))?;
    Ok(object)
}

/// Allocates a native function and installs it as a property of `target`.
fn set_native(
    heap: &mut Heap,
    interner: &mut Interner,
    realm: &Realm,
    target: HeapId,
    name: &'static str,
    func: NativeFn,
) -> Result<HeapId, VmError> {
    let native = heap.allocate(JsObject::native(Some(realm.function_proto), name, func))?;
    set_value(heap, interner, realm, target, name, Value::Ref(native))?;
    Ok(native)
}

/// Installs a native function as a global binding.
fn global_native(
    heap: &mut Heap,
    interner: &mut Interner,
    realm: &Realm,
    name: &'static str,
    func: NativeFn,
) -> Result<HeapId, VmError> {
    set_native(heap, interner, realm, realm.global, name, func)
}

fn set_value(
    heap: &mut Heap,
    interner: &mut Interner,
    realm: &Realm,
    target: HeapId,
    name: &str,
    value: Value,
) -> Result<(), VmError> {
    let key = interner.intern(heap, Some(realm.string_proto), name)?;
    heap.get_mut(target).props.insert(key, Property::new(value));
    Ok(())
}

fn string_value(heap: &mut Heap, interner: &mut Interner, realm: &Realm, text: &str) -> Result<Value, VmError> {
    let key = interner.intern(heap, Some(realm.string_proto), text)?;
    Ok(Value::Ref(key.heap_id()))
}

/// Links a constructor and its prototype object both ways.
fn wire_ctor(heap: &mut Heap, realm: &Realm, ctor: HeapId, proto: HeapId) -> Result<(), VmError> {
    heap.get_mut(ctor)
        .props
        .insert(realm.wk.prototype, Property::new(Value::Ref(proto)));
    heap.get_mut(proto)
        .props
        .insert(realm.wk.constructor, Property::new(Value::Ref(ctor)));
    Ok(())
}
