//! Generic, byte-content-keyed string intern table. The collector
//! calls `purge_white` before every sweep (see
//! `GarbageCollector::collect`) so a string's intern-table entry never
//! outlives the string itself.
//!
//! Generic over `T: GcObject` so this crate never needs to name
//! `NuaStr` concretely; `nua-value` instantiates `InternTable<NuaStr>`.

use rustc_hash::FxHashMap;

use crate::header::Colour;
use crate::object::{GcObject, GcRef};

pub struct InternTable<T> {
    entries: FxHashMap<Box<[u8]>, GcRef<T>>,
}

impl<T: GcObject> InternTable<T> {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    pub fn get(&self, bytes: &[u8]) -> Option<GcRef<T>> {
        self.entries.get(bytes).copied()
    }

    /// Record a freshly interned string. Callers must check `get`
    /// first; this never overwrites an existing entry for the same
    /// bytes (interning is meant to be injective).
    pub fn insert(&mut self, bytes: Box<[u8]>, obj: GcRef<T>) {
        self.entries.insert(bytes, obj);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry whose target is still `condemned` (i.e. was
    /// not reached by the mark phase just completed). Entries that
    /// survive only because the intern table itself held a reference
    /// would otherwise keep genuinely dead strings alive forever.
    pub fn purge_white(&mut self, condemned: Colour) {
        self.entries
            .retain(|_, obj| unsafe { obj.as_ptr().as_ref().header().colour.get() != condemned });
    }
}

impl<T: GcObject> Default for InternTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::GarbageCollector;
    use crate::header::GcHeader;

    /// A leaf object with no outgoing references, standing in for
    /// `nua_value::NuaStr` without pulling that crate in as a dev-dep.
    struct Leaf {
        header: GcHeader,
    }

    impl GcObject for Leaf {
        fn header(&self) -> &GcHeader {
            &self.header
        }

        fn trace(&self, _marker: &mut crate::marker::Marker) {}
    }

    fn leaf(gc: &GarbageCollector) -> GcRef<Leaf> {
        gc.alloc(Leaf {
            header: GcHeader::for_type::<Leaf>(gc.alloc_colour()),
        })
    }

    #[test]
    fn insert_then_get_is_injective() {
        let gc = GarbageCollector::new();
        let mut table: InternTable<Leaf> = InternTable::new();
        let a = leaf(&gc);
        let b = leaf(&gc);
        table.insert(b"hello".to_vec().into_boxed_slice(), a);
        table.insert(b"world".to_vec().into_boxed_slice(), b);
        assert_eq!(table.get(b"hello"), Some(a));
        assert_eq!(table.get(b"world"), Some(b));
        assert_eq!(table.get(b"missing"), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn purge_white_drops_only_condemned_entries() {
        let gc = GarbageCollector::new();
        let mut table: InternTable<Leaf> = InternTable::new();
        let condemned = gc.alloc_colour();
        let survivor = leaf(&gc);
        table.insert(b"dead".to_vec().into_boxed_slice(), leaf(&gc));
        table.insert(b"alive".to_vec().into_boxed_slice(), survivor);
        survivor.header().colour.set(condemned.flip());

        table.purge_white(condemned);

        assert_eq!(table.get(b"dead"), None);
        assert_eq!(table.get(b"alive"), Some(survivor));
        assert_eq!(table.len(), 1);
    }

    #[quickcheck_macros::quickcheck]
    fn lookup_after_insert_returns_the_same_object(bytes: Vec<u8>) -> bool {
        let gc = GarbageCollector::new();
        let mut table: InternTable<Leaf> = InternTable::new();
        let obj = leaf(&gc);
        table.insert(bytes.clone().into_boxed_slice(), obj);
        table.get(&bytes) == Some(obj) && table.get(&bytes) == table.get(&bytes)
    }
}
