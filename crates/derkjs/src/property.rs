//! Ordered property storage shared by every object class.

use indexmap::IndexMap;

use crate::intern::KeyId;
use crate::value::Value;

/// Per-property descriptor record.
///
/// Fresh properties default to `{writable, enumerable, configurable} = true`;
/// `Object.freeze` clears all three, `Object.seal` clears `configurable`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Property {
    pub value: Value,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl Property {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Non-writable, non-enumerable, non-configurable slot used for builtin
    /// constants such as `Function.prototype.length`.
    pub fn frozen(value: Value) -> Self {
        Self {
            value,
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }
}

/// Insertion-ordered map from interned key handle to descriptor.
///
/// Key identity is handle identity: the interner guarantees equal code-unit
/// sequences share one handle, so lookups never touch string content.
#[derive(Debug, Clone, Default)]
pub(crate) struct PropertyMap {
    entries: IndexMap<KeyId, Property, ahash::RandomState>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: KeyId) -> Option<&Property> {
        self.entries.get(&key)
    }

    pub fn get_mut(&mut self, key: KeyId) -> Option<&mut Property> {
        self.entries.get_mut(&key)
    }

    pub fn insert(&mut self, key: KeyId, prop: Property) {
        self.entries.insert(key, prop);
    }

    /// Removes the property while preserving the order of the remainder.
    pub fn remove(&mut self, key: KeyId) -> Option<Property> {
        self.entries.shift_remove(&key)
    }

    pub fn contains(&self, key: KeyId) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, &Property)> + '_ {
        self.entries.iter().map(|(k, p)| (*k, p))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Property> + '_ {
        self.entries.values_mut()
    }
}
