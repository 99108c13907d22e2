//! `Heap<T>`: the `GarbageCollector` and the intern table for one
//! leaf object type bundled together, since every caller that owns
//! one owns the other — the intern table is purged as part of every
//! collection cycle, not on its own schedule.

use std::cell::RefCell;

use crate::collector::GarbageCollector;
use crate::header::GcHeader;
use crate::intern::InternTable;
use crate::marker::Marker;
use crate::object::{GcObject, GcRef};

pub struct Heap<T: GcObject> {
    gc: GarbageCollector,
    interned: RefCell<InternTable<T>>,
}

impl<T: GcObject> Heap<T> {
    pub fn new() -> Self {
        Self {
            gc: GarbageCollector::new(),
            interned: RefCell::new(InternTable::new()),
        }
    }

    pub fn gc(&self) -> &GarbageCollector {
        &self.gc
    }

    /// Allocate any heap object of this kind, stamping its header
    /// with the collector's current allocation colour.
    pub fn alloc<U: GcObject>(&self, make: impl FnOnce(GcHeader) -> U) -> GcRef<U> {
        let header = GcHeader::for_type::<U>(self.gc.alloc_colour());
        self.gc.alloc(make(header))
    }

    /// Canonicalize `bytes` to a single `GcRef<T>`: returns the
    /// existing interned object if one already has these bytes,
    /// otherwise allocates a fresh one via `make` and records it.
    /// Interning is injective on content: two equal-bytes lookups
    /// always resolve to the same object.
    pub fn intern(&self, bytes: &[u8], make: impl FnOnce(GcHeader) -> T) -> GcRef<T> {
        if let Some(existing) = self.interned.borrow().get(bytes) {
            return existing;
        }
        let header = GcHeader::for_type::<T>(self.gc.alloc_colour());
        let obj = self.gc.alloc(make(header));
        self.interned.borrow_mut().insert(bytes.to_vec().into_boxed_slice(), obj);
        obj
    }

    pub fn intern_len(&self) -> usize {
        self.interned.borrow().len()
    }

    /// Run one collection cycle: mark from `mark_roots`, purge
    /// intern-table entries left white, sweep.
    pub fn collect(&self, mark_roots: impl FnOnce(&mut Marker)) {
        let interned = &self.interned;
        self.gc.collect(mark_roots, |white| interned.borrow_mut().purge_white(white));
    }

    pub fn should_collect(&self) -> bool {
        self.gc.should_collect()
    }
}

impl<T: GcObject> Default for Heap<T> {
    fn default() -> Self {
        Self::new()
    }
}
