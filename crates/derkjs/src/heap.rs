//! Arena heap and mark-and-sweep garbage collector.
//!
//! Every heap-resident entity is a [`JsObject`] stored in a slot arena and
//! addressed by a stable [`HeapId`]. Slots are appended, never reused within
//! a run, so object identity survives collection cycles and handle
//! comparisons stay trivial.
//!
//! Collection is stop-the-world: the VM gathers roots (operand stack, frames,
//! preloaded globals, the intern table, the pending error) and calls
//! [`Heap::collect`] *before* reserving a new slot, never mid-allocation.

use std::collections::VecDeque;

use crate::error::VmError;
use crate::object::{JsObject, ObjectKind};

/// Stable, non-owning reference to a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct HeapId(u32);

impl HeapId {
    pub fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("heap id overflow"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Per-object mark state. `Unknown` entries at sweep time are dead; their
/// slot is emptied, which is the third state of the tri-state mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unknown,
    Live,
}

#[derive(Debug)]
struct HeapEntry {
    mark: Mark,
    object: JsObject,
}

/// Typed arena owning every runtime object.
#[derive(Debug)]
pub(crate) struct Heap {
    slots: Vec<Option<HeapEntry>>,
    live: usize,
    gc_threshold: usize,
    max_objects: usize,
    collections: usize,
}

impl Heap {
    pub fn new(gc_threshold: usize, max_objects: usize) -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
            gc_threshold,
            max_objects,
            collections: 0,
        }
    }

    /// Constructs an object in place and returns its handle.
    ///
    /// Fails with `bad_heap_alloc` when the live count has reached the
    /// configured cap; callers that can see roots are expected to have run
    /// [`Self::collect`] first when [`Self::wants_gc`] said so.
    pub fn allocate(&mut self, object: JsObject) -> Result<HeapId, VmError> {
        if self.live >= self.max_objects {
            return Err(VmError::heap_exhausted(self.live, self.max_objects));
        }
        let id = HeapId::new(self.slots.len());
        self.slots.push(Some(HeapEntry {
            mark: Mark::Unknown,
            object,
        }));
        self.live += 1;
        Ok(id)
    }

    /// True once the live count has crossed the collection threshold.
    pub fn wants_gc(&self) -> bool {
        self.live >= self.gc_threshold
    }

    /// # Panics
    /// Panics if the handle is dangling. Reaching a swept object is a GC
    /// invariant violation, not a recoverable condition.
    pub fn get(&self, id: HeapId) -> &JsObject {
        &self
            .slots
            .get(id.index())
            .expect("Heap::get: slot missing")
            .as_ref()
            .expect("Heap::get: object already swept")
            .object
    }

    /// # Panics
    /// Panics if the handle is dangling, as [`Self::get`].
    pub fn get_mut(&mut self, id: HeapId) -> &mut JsObject {
        &mut self
            .slots
            .get_mut(id.index())
            .expect("Heap::get_mut: slot missing")
            .as_mut()
            .expect("Heap::get_mut: object already swept")
            .object
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn collections(&self) -> usize {
        self.collections
    }

    /// Stop-the-world mark and sweep from the given roots.
    ///
    /// Marking is a breadth-first traversal; each object contributes its
    /// prototype, every property key and value, and its class-specific
    /// children (array elements, lambda captures, capture parents). Captures
    /// are reachable only through live lambdas and frames, so a capture whose
    /// lambdas all died is swept with them.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = HeapId>) {
        for slot in &mut self.slots {
            if let Some(entry) = slot.as_mut() {
                entry.mark = Mark::Unknown;
            }
        }

        let mut queue: VecDeque<HeapId> = VecDeque::new();
        for root in roots {
            self.enqueue(&mut queue, root);
        }

        let mut children: Vec<HeapId> = Vec::new();
        while let Some(id) = queue.pop_front() {
            children.clear();
            trace_children(self.get(id), &mut children);
            for &child in &children {
                self.enqueue(&mut queue, child);
            }
        }

        for slot in &mut self.slots {
            if let Some(entry) = slot.as_ref() {
                if entry.mark == Mark::Unknown {
                    *slot = None;
                    self.live -= 1;
                }
            }
        }
        self.collections += 1;
    }

    fn enqueue(&mut self, queue: &mut VecDeque<HeapId>, id: HeapId) {
        let entry = self
            .slots
            .get_mut(id.index())
            .expect("Heap::collect: root slot missing")
            .as_mut()
            .expect("Heap::collect: root already swept");
        if entry.mark == Mark::Unknown {
            entry.mark = Mark::Live;
            queue.push_back(id);
        }
    }
}

/// Pushes every handle directly reachable from `object`.
fn trace_children(object: &JsObject, out: &mut Vec<HeapId>) {
    if let Some(proto) = object.proto {
        out.push(proto);
    }
    for (key, prop) in object.props.iter() {
        out.push(key.heap_id());
        prop.value.heap_ids(out);
    }
    match &object.kind {
        ObjectKind::Array { elements, .. } => {
            for element in elements {
                element.heap_ids(out);
            }
        }
        ObjectKind::Lambda { capture, .. } => {
            if let Some(capture) = capture {
                out.push(*capture);
            }
        }
        ObjectKind::Capture { parent, slots } => {
            if let Some(parent) = parent {
                out.push(*parent);
            }
            for slot in slots {
                slot.heap_ids(out);
            }
        }
        ObjectKind::Plain | ObjectKind::Str(_) | ObjectKind::Native { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::JsObject;
    use crate::value::Value;

    #[test]
    fn allocate_and_read_back() {
        let mut heap = Heap::new(16, 64);
        let id = heap.allocate(JsObject::plain(None)).unwrap();
        assert_eq!(heap.live_count(), 1);
        assert!(matches!(heap.get(id).kind, ObjectKind::Plain));
    }

    #[test]
    fn unrooted_objects_are_swept() {
        let mut heap = Heap::new(1, 64);
        let keep = heap.allocate(JsObject::plain(None)).unwrap();
        for _ in 0..10 {
            heap.allocate(JsObject::plain(None)).unwrap();
        }
        assert_eq!(heap.live_count(), 11);
        heap.collect([keep]);
        assert_eq!(heap.live_count(), 1);
        assert!(matches!(heap.get(keep).kind, ObjectKind::Plain));
    }

    #[test]
    fn cycles_are_collected_when_unrooted() {
        let mut heap = Heap::new(1, 64);
        let a = heap.allocate(JsObject::plain(None)).unwrap();
        let b = heap.allocate(JsObject::plain(Some(a))).unwrap();
        heap.get_mut(a).proto = Some(b);
        heap.collect([]);
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn array_elements_are_roots_of_their_referents() {
        let mut heap = Heap::new(1, 64);
        let inner = heap.allocate(JsObject::plain(None)).unwrap();
        let arr = heap
            .allocate(JsObject::array(None, vec![Value::Ref(inner), Value::Number(1.0)]))
            .unwrap();
        heap.collect([arr]);
        assert_eq!(heap.live_count(), 2);
    }

    #[test]
    fn allocation_fails_at_cap() {
        let mut heap = Heap::new(1024, 2);
        heap.allocate(JsObject::plain(None)).unwrap();
        heap.allocate(JsObject::plain(None)).unwrap();
        let err = heap.allocate(JsObject::plain(None)).unwrap_err();
        assert_eq!(err.code(), crate::error::VmErrCode::BadHeapAlloc);
    }
}
