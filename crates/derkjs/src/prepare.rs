//! Program loading: realm construction, constant and key resolution, and
//! preload installation.
//!
//! The loader runs before the first instruction and never collects: roots
//! do not exist yet, and everything it allocates is reachable from the
//! realm, the constant pool, or the preload handle list it returns.

use crate::builtins;
use crate::bytecode::program::{ImageConst, PreloadEntity, Program};
use crate::bytecode::FuncId;
use crate::config::RunConfig;
use crate::error::VmError;
use crate::heap::{Heap, HeapId};
use crate::intern::{Interner, KeyId, WellKnown};
use crate::object::JsObject;
use crate::property::Property;
use crate::value::Value;
use crate::vm::Realm;

/// Everything [`prepare`] hands to the VM.
pub(crate) struct Loaded {
    pub heap: Heap,
    pub interner: Interner,
    pub realm: Realm,
    pub consts: Vec<Value>,
    pub keys: Vec<KeyId>,
    pub handles: Vec<HeapId>,
}

/// Builds the realm, installs the builtin surface, resolves the image's
/// constant pool and key table, and materializes the preload list.
pub(crate) fn prepare(program: &Program, config: &RunConfig) -> Result<Loaded, VmError> {
    let mut heap = Heap::new(config.gc_threshold, config.max_heap_objects);
    let mut interner = Interner::new();

    // Prototype spine. `String.prototype` must exist before any interning so
    // key strings behave as ordinary script strings.
    let object_proto = heap.allocate(JsObject::plain(None))?;
    let string_proto = heap.allocate(JsObject::plain(Some(object_proto)))?;
    let wk = WellKnown::install(&mut interner, &mut heap, Some(string_proto))?;

    // `Function.prototype` is itself callable: zero-arity, yields undefined.
    let function_proto = heap.allocate(JsObject::native(
        Some(object_proto),
        "",
        builtins::function::function_proto_self,
    ))?;
    let array_proto = heap.allocate(JsObject::plain(Some(object_proto)))?;
    let number_proto = heap.allocate(JsObject::plain(Some(object_proto)))?;
    let boolean_proto = heap.allocate(JsObject::plain(Some(object_proto)))?;
    let error_proto = heap.allocate(JsObject::plain(Some(object_proto)))?;
    let global = heap.allocate(JsObject::plain(Some(object_proto)))?;

    let realm = Realm {
        global,
        object_proto,
        function_proto,
        array_proto,
        string_proto,
        number_proto,
        boolean_proto,
        error_proto,
        wk,
    };

    builtins::install(&mut heap, &mut interner, &realm)?;

    // Constant pool: string constants are interned at load, so equal literals
    // share a handle and are valid property keys as-is.
    let mut consts = Vec::with_capacity(program.consts.len());
    for image_const in &program.consts {
        let value = match image_const {
            ImageConst::Undefined => Value::Undefined,
            ImageConst::Null => Value::Null,
            ImageConst::Bool(b) => Value::Bool(*b),
            ImageConst::Num(n) => Value::Number(*n),
            ImageConst::Str(s) => {
                let key = interner.intern(&mut heap, Some(string_proto), s)?;
                Value::Ref(key.heap_id())
            }
        };
        consts.push(value);
    }

    let mut keys = Vec::with_capacity(program.keys.len());
    for name in &program.keys {
        keys.push(interner.intern(&mut heap, Some(string_proto), name)?);
    }

    // Preload list: establishes identity for the global object and installs
    // compiler-declared top-level bindings.
    let mut handles = Vec::with_capacity(program.preloads.len());
    for item in &program.preloads {
        match &item.entity {
            PreloadEntity::GlobalObject => handles.push(global),
            PreloadEntity::Lambda { func } => {
                let lambda = instantiate_lambda(&mut heap, &realm, FuncId::new(*func as usize))?;
                bind_global(&mut heap, &mut interner, &realm, &item.lexeme, Value::Ref(lambda))?;
                handles.push(lambda);
            }
            PreloadEntity::PlainObject => {
                let object = heap.allocate(JsObject::plain(Some(object_proto)))?;
                bind_global(&mut heap, &mut interner, &realm, &item.lexeme, Value::Ref(object))?;
                handles.push(object);
            }
        }
    }

    Ok(Loaded {
        heap,
        interner,
        realm,
        consts,
        keys,
        handles,
    })
}

/// Allocates a lambda over `func` with no capture, wiring the fresh
/// `prototype` object and its `constructor` backreference.
pub(crate) fn instantiate_lambda(heap: &mut Heap, realm: &Realm, func: FuncId) -> Result<HeapId, VmError> {
    let lambda = heap.allocate(JsObject::lambda(Some(realm.function_proto), func, None))?;
    let prototype = heap.allocate(JsObject::plain(Some(realm.object_proto)))?;
    heap.get_mut(prototype)
        .props
        .insert(realm.wk.constructor, Property::new(Value::Ref(lambda)));
    heap.get_mut(lambda)
        .props
        .insert(realm.wk.prototype, Property::new(Value::Ref(prototype)));
    Ok(lambda)
}

fn bind_global(
    heap: &mut Heap,
    interner: &mut Interner,
    realm: &Realm,
    name: &str,
    value: Value,
) -> Result<(), VmError> {
    let key = interner.intern(heap, Some(realm.string_proto), name)?;
    heap.get_mut(realm.global).props.insert(key, Property::new(value));
    Ok(())
}
