//! The polymorphic heap object.
//!
//! Inheritance is replaced by a tagged variant plus a small capability
//! surface: every heap resident carries the same prototype pointer and
//! ordered property store, while the class-specific payload (array elements,
//! string content, lambda code, native entry point, capture slots) lives in
//! [`ObjectKind`]. Stringification is in `value.rs`; callability and the
//! mutation-intercept hook are here.

use strum::Display;

use crate::bytecode::FuncId;
use crate::heap::HeapId;
use crate::property::PropertyMap;
use crate::value::Value;
use crate::vm::NativeFn;

/// Class tag, used in error messages and by `typeof`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum ClassTag {
    Plain,
    Array,
    Str,
    Lambda,
    Native,
    Capture,
}

/// Class-specific payload.
#[derive(Debug, Clone)]
pub(crate) enum ObjectKind {
    Plain,
    /// Dense element storage; holes read as `undefined`. Non-integer keys
    /// fall through to the shared property store. `frozen` is the
    /// element-level analogue of clearing every descriptor: elements live
    /// outside the property map, so `Object.freeze` records the lock here.
    Array { elements: Vec<Value>, frozen: bool },
    /// Immutable code-unit sequence. Interned instances are canonical.
    Str(String),
    /// Bytecode callable: an entry in the image's function table plus the
    /// lexical environment it closed over.
    Lambda {
        func: FuncId,
        capture: Option<HeapId>,
    },
    /// Host callable bridged into the VM calling convention.
    Native { name: &'static str, func: NativeFn },
    /// First-class lexical environment: captured slots plus the enclosing
    /// environment.
    Capture {
        parent: Option<HeapId>,
        slots: Vec<Value>,
    },
}

/// How a class intercepts a property write, keyed by the property name so
/// arrays can tell `length` from index writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessorMut {
    /// No interception: the ordinary descriptor-store write applies.
    Store,
    /// Write to a dense array slot.
    ArrayIndex(u32),
    /// Write to the array `length` accessor (truncate or pad).
    ArrayLength,
    /// The class is immutable; the write is dropped.
    Reject,
}

#[derive(Debug, Clone)]
pub(crate) struct JsObject {
    pub kind: ObjectKind,
    pub proto: Option<HeapId>,
    pub props: PropertyMap,
    pub extensible: bool,
}

impl JsObject {
    pub fn plain(proto: Option<HeapId>) -> Self {
        Self {
            kind: ObjectKind::Plain,
            proto,
            props: PropertyMap::new(),
            extensible: true,
        }
    }

    pub fn array(proto: Option<HeapId>, elements: Vec<Value>) -> Self {
        Self {
            kind: ObjectKind::Array {
                elements,
                frozen: false,
            },
            proto,
            props: PropertyMap::new(),
            extensible: true,
        }
    }

    pub fn string(proto: Option<HeapId>, content: String) -> Self {
        Self {
            kind: ObjectKind::Str(content),
            proto,
            props: PropertyMap::new(),
            extensible: false,
        }
    }

    pub fn lambda(proto: Option<HeapId>, func: FuncId, capture: Option<HeapId>) -> Self {
        Self {
            kind: ObjectKind::Lambda { func, capture },
            proto,
            props: PropertyMap::new(),
            extensible: true,
        }
    }

    pub fn native(proto: Option<HeapId>, name: &'static str, func: NativeFn) -> Self {
        Self {
            kind: ObjectKind::Native { name, func },
            proto,
            props: PropertyMap::new(),
            extensible: true,
        }
    }

    pub fn capture(parent: Option<HeapId>, slot_count: usize) -> Self {
        Self {
            kind: ObjectKind::Capture {
                parent,
                slots: vec![Value::Undefined; slot_count],
            },
            proto: None,
            props: PropertyMap::new(),
            extensible: false,
        }
    }

    pub fn class_tag(&self) -> ClassTag {
        match self.kind {
            ObjectKind::Plain => ClassTag::Plain,
            ObjectKind::Array { .. } => ClassTag::Array,
            ObjectKind::Str(_) => ClassTag::Str,
            ObjectKind::Lambda { .. } => ClassTag::Lambda,
            ObjectKind::Native { .. } => ClassTag::Native,
            ObjectKind::Capture { .. } => ClassTag::Capture,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Lambda { .. } | ObjectKind::Native { .. })
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ObjectKind::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Write-intercept hook. Receives the key so arrays can disambiguate
    /// `length` writes from index writes; strings reject every write.
    pub fn on_accessor_mut(&self, key: &str) -> AccessorMut {
        match &self.kind {
            ObjectKind::Array { .. } => {
                if key == "length" {
                    AccessorMut::ArrayLength
                } else if let Some(index) = parse_array_index(key) {
                    AccessorMut::ArrayIndex(index)
                } else {
                    AccessorMut::Store
                }
            }
            ObjectKind::Str(_) => AccessorMut::Reject,
            _ => AccessorMut::Store,
        }
    }

    /// `length` invariant: one more than the greatest integer-key index, or
    /// 0 when empty. Dense storage makes that the element count.
    pub fn array_length(&self) -> Option<usize> {
        match &self.kind {
            ObjectKind::Array { elements, .. } => Some(elements.len()),
            _ => None,
        }
    }

    /// True for arrays whose element storage has been frozen.
    pub fn array_frozen(&self) -> bool {
        matches!(self.kind, ObjectKind::Array { frozen: true, .. })
    }

    /// Reads a dense slot; out-of-range and holes both yield `undefined`.
    pub fn array_get_index(&self, index: u32) -> Option<Value> {
        match &self.kind {
            ObjectKind::Array { elements, .. } => {
                Some(elements.get(index as usize).copied().unwrap_or(Value::Undefined))
            }
            _ => None,
        }
    }

    /// Writes a dense slot, padding any gap with holes. Callers enforce the
    /// freeze/extensibility rules before reaching this.
    pub fn array_set_index(&mut self, index: u32, value: Value) {
        if let ObjectKind::Array { elements, .. } = &mut self.kind {
            let index = index as usize;
            if index >= elements.len() {
                elements.resize(index + 1, Value::Undefined);
            }
            elements[index] = value;
        }
    }

    /// Applies a `length` write: smaller truncates in index order, equal is
    /// a no-op, larger pads with holes.
    pub fn array_set_length(&mut self, new_len: usize) {
        if let ObjectKind::Array { elements, .. } = &mut self.kind {
            if new_len <= elements.len() {
                elements.truncate(new_len);
            } else {
                elements.resize(new_len, Value::Undefined);
            }
        }
    }

    /// Marks every property non-writable and non-configurable (and
    /// non-enumerable, matching the descriptor reset this runtime applies),
    /// locks dense array elements, and makes the object non-extensible.
    /// Idempotent.
    pub fn freeze(&mut self) {
        for prop in self.props.values_mut() {
            prop.writable = false;
            prop.enumerable = false;
            prop.configurable = false;
        }
        if let ObjectKind::Array { frozen, .. } = &mut self.kind {
            *frozen = true;
        }
        self.extensible = false;
    }

    /// Marks every property non-configurable and the object non-extensible,
    /// leaving writability intact. Idempotent.
    pub fn seal(&mut self) {
        for prop in self.props.values_mut() {
            prop.configurable = false;
        }
        self.extensible = false;
    }
}

/// Canonical array-index parse: digits only, no superfluous leading zero,
/// below 2^32-1.
pub(crate) fn parse_array_index(key: &str) -> Option<u32> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>().ok().filter(|&n| n < u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_index_parsing() {
        assert_eq!(parse_array_index("0"), Some(0));
        assert_eq!(parse_array_index("42"), Some(42));
        assert_eq!(parse_array_index("01"), None);
        assert_eq!(parse_array_index(""), None);
        assert_eq!(parse_array_index("-1"), None);
        assert_eq!(parse_array_index("x"), None);
        assert_eq!(parse_array_index("4294967295"), None);
    }

    #[test]
    fn length_write_truncates_and_pads() {
        let mut arr = JsObject::array(None, vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]);
        arr.array_set_length(1);
        assert_eq!(arr.array_length(), Some(1));
        arr.array_set_length(4);
        assert_eq!(arr.array_length(), Some(4));
        assert!(matches!(arr.array_get_index(3), Some(Value::Undefined)));
    }

    #[test]
    fn freeze_locks_array_elements() {
        let mut arr = JsObject::array(None, vec![Value::Number(1.0)]);
        assert!(!arr.array_frozen());
        arr.freeze();
        assert!(arr.array_frozen());
        assert!(!arr.extensible);
    }

    #[test]
    fn accessor_hook_distinguishes_length_from_indices() {
        let arr = JsObject::array(None, vec![]);
        assert_eq!(arr.on_accessor_mut("length"), AccessorMut::ArrayLength);
        assert_eq!(arr.on_accessor_mut("3"), AccessorMut::ArrayIndex(3));
        assert_eq!(arr.on_accessor_mut("name"), AccessorMut::Store);
        let s = JsObject::string(None, "abc".to_owned());
        assert_eq!(s.on_accessor_mut("0"), AccessorMut::Reject);
    }
}
