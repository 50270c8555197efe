//! String interning for property-key identity.
//!
//! Property names are canonicalized: any two keys with equal code-unit
//! sequences resolve to the same heap string, so key comparison inside the
//! property store is handle equality. The interner is global to one VM
//! instance, owns its entries for the lifetime of the run (interned handles
//! are GC roots and never move), and is populated from the image's key table
//! at load plus on demand for computed keys.

use ahash::AHashMap;

use crate::error::VmError;
use crate::heap::{Heap, HeapId};
use crate::object::JsObject;

/// Identity of an interned heap string used as a property key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct KeyId(HeapId);

impl KeyId {
    #[inline]
    pub fn heap_id(self) -> HeapId {
        self.0
    }
}

/// Content-to-handle canonicalizer.
#[derive(Debug, Default)]
pub(crate) struct Interner {
    map: AHashMap<String, KeyId>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `text`, allocating the backing heap string on first sight.
    ///
    /// `str_proto` becomes the new string's prototype so interned keys behave
    /// as ordinary script strings when they appear as values.
    pub fn intern(&mut self, heap: &mut Heap, str_proto: Option<HeapId>, text: &str) -> Result<KeyId, VmError> {
        if let Some(&key) = self.map.get(text) {
            return Ok(key);
        }
        let id = heap.allocate(JsObject::string(str_proto, text.to_owned()))?;
        let key = KeyId(id);
        self.map.insert(text.to_owned(), key);
        Ok(key)
    }

    /// Canonical handle for `text`, if it has been interned.
    pub fn lookup(&self, text: &str) -> Option<KeyId> {
        self.map.get(text).copied()
    }

    /// Every interned handle; the GC treats these as roots so key identity
    /// outlives any particular referencing object.
    pub fn iter_handles(&self) -> impl Iterator<Item = HeapId> + '_ {
        self.map.values().map(|k| k.0)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

/// Content of an interned key.
pub(crate) fn key_str(heap: &Heap, key: KeyId) -> &str {
    heap.get(key.heap_id())
        .as_str()
        .expect("interned key is not a string")
}

/// Pre-resolved handles for the property names the runtime itself consults.
///
/// Installed once at load; keeps hot paths (array `length`, prototype
/// plumbing, error reporting) free of content hashing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WellKnown {
    pub length: KeyId,
    pub prototype: KeyId,
    pub proto: KeyId,
    pub constructor: KeyId,
    pub message: KeyId,
    pub name: KeyId,
    pub stack: KeyId,
}

impl WellKnown {
    pub fn install(interner: &mut Interner, heap: &mut Heap, str_proto: Option<HeapId>) -> Result<Self, VmError> {
        Ok(Self {
            length: interner.intern(heap, str_proto, "length")?,
            prototype: interner.intern(heap, str_proto, "prototype")?,
            proto: interner.intern(heap, str_proto, "__proto__")?,
            constructor: interner.intern(heap, str_proto, "constructor")?,
            message: interner.intern(heap, str_proto, "message")?,
            name: interner.intern(heap, str_proto, "name")?,
            stack: interner.intern(heap, str_proto, "stack")?,
        })
    }
}
