//! The collector: an intrusive singly linked list of every live heap
//! object, walked by `collect` in three steps — mark roots, purge the
//! intern table of anything not reached, sweep what's left white.

use std::cell::Cell;
use std::ptr::NonNull;

use log::{debug, trace};

use crate::header::{Colour, GcHeader};
use crate::marker::Marker;
use crate::object::{GcObject, GcRef};

/// Bytes allocated since the last cycle before a collection is
/// suggested. Flat rather than adaptive: the counter resets to zero
/// every cycle regardless of how much survived, so this is
/// deliberately not a heap-size tracker.
const INITIAL_THRESHOLD: usize = 1 << 20;

#[derive(Default, Clone, Copy, Debug)]
pub struct GcStats {
    pub cycles: u64,
    pub objects_freed_last_cycle: u64,
    pub bytes_allocated: usize,
}

pub struct GarbageCollector {
    head: Cell<Option<NonNull<GcHeader>>>,
    /// This cycle's condemned colour: objects still carrying it after
    /// marking are garbage.
    white: Cell<Colour>,
    bytes_allocated: Cell<usize>,
    collect_threshold: Cell<usize>,
    cycles: Cell<u64>,
    objects_freed_last_cycle: Cell<u64>,
}

impl GarbageCollector {
    pub fn new() -> Self {
        Self {
            head: Cell::new(None),
            white: Cell::new(Colour(false)),
            bytes_allocated: Cell::new(0),
            collect_threshold: Cell::new(INITIAL_THRESHOLD),
            cycles: Cell::new(0),
            objects_freed_last_cycle: Cell::new(0),
        }
    }

    /// The colour a freshly allocated object should be stamped with.
    ///
    /// This is the *current* white, not its flip: collection is
    /// atomic relative to the mutator (no allocation happens during
    /// `collect`), so a new object is always reached for the first
    /// time by the marker of the next cycle that runs after it was
    /// allocated. Stamping it with next cycle's live colour up front
    /// would make `Marker::mark` treat it as already-visited on that
    /// first reach and skip `trace`, silently dropping everything it
    /// points to that isn't reachable some other way. Stamping it
    /// with the current white instead means the marker sees an
    /// unvisited object, traces it, and only then flips it live.
    pub fn alloc_colour(&self) -> Colour {
        self.white.get()
    }

    pub fn should_collect(&self) -> bool {
        self.bytes_allocated.get() >= self.collect_threshold.get()
    }

    pub fn stats(&self) -> GcStats {
        GcStats {
            cycles: self.cycles.get(),
            objects_freed_last_cycle: self.objects_freed_last_cycle.get(),
            bytes_allocated: self.bytes_allocated.get(),
        }
    }

    /// Register a freshly boxed object with the collector and hand
    /// back a reference to it. `value`'s header must already carry
    /// `self.alloc_colour()` (built via `GcHeader::for_type`).
    pub fn alloc<T: GcObject>(&self, value: T) -> GcRef<T> {
        let size = std::mem::size_of::<T>();
        let boxed = Box::into_raw(Box::new(value));
        // SAFETY: `boxed` just came from `Box::into_raw`, so it's
        // non-null and uniquely owned by the collector from here on.
        let obj_ptr = unsafe { NonNull::new_unchecked(boxed) };
        let header_ptr = obj_ptr.cast::<GcHeader>();
        // SAFETY: T is #[repr(C)] with GcHeader as its first field.
        unsafe {
            header_ptr.as_ref().next.set(self.head.get());
        }
        self.head.set(Some(header_ptr));
        self.bytes_allocated.set(self.bytes_allocated.get() + size);
        GcRef::new(obj_ptr)
    }

    /// Run one full collection cycle: mark roots, purge the intern
    /// table of anything not reached, sweep the rest.
    ///
    /// `purge_intern` is handed this cycle's condemned colour and is
    /// expected to drop any intern-table entry whose target string
    /// still carries it. Purging must happen before `sweep`, or a
    /// dead string's slot in the intern table would dangle once its
    /// backing allocation is freed.
    pub fn collect(
        &self,
        mark_roots: impl FnOnce(&mut Marker),
        purge_intern: impl FnOnce(Colour),
    ) {
        let condemned = self.white.get();
        let live = condemned.flip();

        let mut marker = Marker::new(live);
        mark_roots(&mut marker);

        purge_intern(condemned);

        let freed = self.sweep(condemned);

        self.white.set(live);
        self.bytes_allocated.set(0);
        self.cycles.set(self.cycles.get() + 1);
        self.objects_freed_last_cycle.set(freed);

        debug!(
            "gc cycle {} complete: {} objects freed",
            self.cycles.get(),
            freed
        );
    }

    fn sweep(&self, condemned: Colour) -> u64 {
        let mut freed = 0u64;
        let mut prev_next: *const Cell<Option<NonNull<GcHeader>>> = &self.head;
        let mut current = self.head.get();

        while let Some(node) = current {
            // SAFETY: every node in the list was registered by
            // `alloc` and only ever freed by this loop, which unlinks
            // a node before freeing it.
            let header = unsafe { node.as_ref() };
            let next = header.next.get();

            if header.colour.get() == condemned {
                unsafe {
                    (*prev_next).set(next);
                    (header.free_fn)(node);
                }
                freed += 1;
            } else {
                prev_next = &header.next;
            }
            current = next;
        }

        trace!("gc sweep: {} objects freed", freed);
        freed
    }
}

impl Default for GarbageCollector {
    fn default() -> Self {
        Self::new()
    }
}
