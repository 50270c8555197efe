//! Property access: prototype-chain reads, intercepted writes, deletes.

use super::Vm;
use crate::error::{RunResult, VmError};
use crate::heap::{Heap, HeapId};
use crate::intern::{key_str, KeyId};
use crate::object::{parse_array_index, AccessorMut, ObjectKind};
use crate::property::Property;
use crate::value::Value;

/// Walks the prototype chain from `start` and returns the first own
/// descriptor value for `key`. An own property wins even when its value is
/// `undefined`; absence across the whole chain reads as `undefined`.
pub(crate) fn chain_lookup(heap: &Heap, start: HeapId, key: KeyId) -> Option<Value> {
    let mut current = Some(start);
    while let Some(id) = current {
        let object = heap.get(id);
        if let Some(prop) = object.props.get(key) {
            return Some(prop.value);
        }
        current = object.proto;
    }
    None
}

/// True when `candidate` appears on `start`'s prototype chain.
pub(crate) fn proto_chain_contains(heap: &Heap, start: HeapId, candidate: HeapId) -> bool {
    let mut current = heap.get(start).proto;
    while let Some(id) = current {
        if id == candidate {
            return true;
        }
        current = heap.get(id).proto;
    }
    false
}

impl Vm<'_> {
    /// `obj[key]` with the full lookup order: class intercepts (array and
    /// string `length`, dense indices, string characters), then own
    /// properties, then the prototype chain. Number and boolean receivers
    /// look up through their wrapper prototypes without boxing.
    pub(crate) fn get_property(&mut self, object: Value, key: KeyId) -> RunResult<Value> {
        match object {
            Value::Undefined | Value::Null => {
                let name = key_str(&self.heap, key).to_owned();
                Err(VmError::bad_property_access(format!(
                    "cannot read property '{name}' of {}",
                    object.js_to_string(&self.heap)
                ))
                .into())
            }
            Value::Number(_) => Ok(chain_lookup(&self.heap, self.realm.number_proto, key).unwrap_or(Value::Undefined)),
            Value::Bool(_) => Ok(chain_lookup(&self.heap, self.realm.boolean_proto, key).unwrap_or(Value::Undefined)),
            Value::Ref(id) => {
                // Class intercepts. The string-character read is staged so
                // the fresh one-character string is allocated only after the
                // heap borrow ends.
                let mut string_char: Option<Option<String>> = None;
                match &self.heap.get(id).kind {
                    ObjectKind::Str(content) => {
                        if key == self.realm.wk.length {
                            return Ok(Value::Number(content.encode_utf16().count() as f64));
                        }
                        if let Some(index) = parse_array_index(key_str(&self.heap, key)) {
                            string_char = Some(
                                content
                                    .encode_utf16()
                                    .nth(index as usize)
                                    .map(|unit| String::from_utf16_lossy(&[unit])),
                            );
                        }
                    }
                    ObjectKind::Array { .. } => {
                        if key == self.realm.wk.length {
                            let len = self.heap.get(id).array_length().unwrap_or(0);
                            return Ok(Value::Number(len as f64));
                        }
                        if let Some(index) = parse_array_index(key_str(&self.heap, key)) {
                            return Ok(self.heap.get(id).array_get_index(index).unwrap_or(Value::Undefined));
                        }
                    }
                    _ => {}
                }
                if let Some(char_text) = string_char {
                    return match char_text {
                        Some(text) => self.alloc_string(text),
                        None => Ok(Value::Undefined),
                    };
                }
                if key == self.realm.wk.proto {
                    return Ok(match self.heap.get(id).proto {
                        Some(proto) => Value::Ref(proto),
                        None => Value::Null,
                    });
                }
                Ok(chain_lookup(&self.heap, id, key).unwrap_or(Value::Undefined))
            }
            Value::Slot(_) => Err(VmError::bad_operation("property read on lvalue reference").into()),
        }
    }

    /// `obj[key] = value` with the write order: class intercept hook first
    /// (keyed, so arrays route `length` and indices), then the descriptor
    /// rules: overwrite a writable own property, fail on a non-writable
    /// own or inherited one, create an own property when extensible.
    ///
    /// Rejected writes are silent by default; `strict_frozen_writes` turns
    /// them into thrown `TypeError` values.
    pub(crate) fn set_property(&mut self, object: Value, key: KeyId, value: Value) -> RunResult<()> {
        let id = match object {
            Value::Undefined | Value::Null => {
                let name = key_str(&self.heap, key).to_owned();
                return Err(VmError::bad_property_access(format!(
                    "cannot write property '{name}' of {}",
                    object.js_to_string(&self.heap)
                ))
                .into());
            }
            // Writes to primitive receivers vanish, as their transient
            // wrapper object would in ES5.
            Value::Number(_) | Value::Bool(_) => return Ok(()),
            Value::Ref(id) => id,
            Value::Slot(_) => return Err(VmError::bad_operation("property write on lvalue reference").into()),
        };

        let key_text = key_str(&self.heap, key).to_owned();
        match self.heap.get(id).on_accessor_mut(&key_text) {
            // Index and length writes are specializations of ordinary
            // property writes, not exemptions: frozen elements reject like
            // non-writable descriptors, and a write past the end of a
            // non-extensible array rejects like a new property would.
            AccessorMut::ArrayIndex(index) => {
                let object = self.heap.get(id);
                let frozen = object.array_frozen();
                let appends = (index as usize) >= object.array_length().unwrap_or(0);
                if frozen || (appends && !object.extensible) {
                    return self.rejected_write(&key_text);
                }
                self.heap.get_mut(id).array_set_index(index, value);
                Ok(())
            }
            AccessorMut::ArrayLength => {
                if self.heap.get(id).array_frozen() {
                    return self.rejected_write(&key_text);
                }
                let requested = value.to_number(&self.heap);
                if requested.fract() != 0.0 || requested < 0.0 || requested >= f64::from(u32::MAX) {
                    return Err(self.throw_range_error("invalid array length"));
                }
                self.heap.get_mut(id).array_set_length(requested as usize);
                Ok(())
            }
            AccessorMut::Reject => self.rejected_write(&key_text),
            AccessorMut::Store => {
                if key == self.realm.wk.proto {
                    self.heap.get_mut(id).proto = value.as_ref_id();
                    return Ok(());
                }
                match self.heap.get(id).props.get(key).map(|prop| prop.writable) {
                    Some(true) => {
                        if let Some(own) = self.heap.get_mut(id).props.get_mut(key) {
                            own.value = value;
                        }
                        return Ok(());
                    }
                    Some(false) => return self.rejected_write(&key_text),
                    None => {}
                }
                // A non-writable property anywhere on the chain shadows the
                // write; a writable inherited one still creates an own
                // property on the original receiver.
                let mut cursor = self.heap.get(id).proto;
                while let Some(ancestor) = cursor {
                    let found = {
                        let object = self.heap.get(ancestor);
                        match object.props.get(key) {
                            Some(prop) => Some(prop.writable),
                            None => {
                                cursor = object.proto;
                                None
                            }
                        }
                    };
                    match found {
                        Some(false) => return self.rejected_write(&key_text),
                        Some(true) => break,
                        None => {}
                    }
                }
                if !self.heap.get(id).extensible {
                    return self.rejected_write(&key_text);
                }
                self.heap.get_mut(id).props.insert(key, Property::new(value));
                Ok(())
            }
        }
    }

    /// Removes an own property if it is configurable; reports success.
    pub(crate) fn delete_property(&mut self, id: HeapId, key: KeyId) -> bool {
        let object = self.heap.get_mut(id);
        match object.props.get(key) {
            Some(prop) if prop.configurable => {
                object.props.remove(key);
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    /// Outcome of a write the descriptor rules (or the array freeze lock)
    /// refused: silent by default, a thrown `TypeError` value under
    /// `strict_frozen_writes`. Array builtins that mutate elements share it.
    pub(crate) fn rejected_write(&mut self, key_text: &str) -> RunResult<()> {
        if self.config.strict_frozen_writes {
            Err(self.throw_type_error(&format!("cannot assign to read-only property '{key_text}'")))
        } else {
            Ok(())
        }
    }
}
