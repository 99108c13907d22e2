//! The table type: a dense 1-indexed sequence plus a robin-hood hash,
//! built on `nua_collections::{SeqVec, RobinHoodMap}`.

use std::cell::RefCell;

use nua_collections::{RobinHoodMap, SeqVec};
use nua_gc::{GcHeader, GcObject, Marker};

use crate::value::Value;

#[repr(C)]
pub struct Table {
    header: GcHeader,
    seq: RefCell<SeqVec<Value>>,
    hash: RefCell<RobinHoodMap<Value, Value>>,
}

/// A positive-integer key is eligible for the sequence fast path.
fn sequence_index(key: Value) -> Option<usize> {
    match key {
        Value::Number(n) if n.is_finite() && n == n.floor() && n > 0.0 && n <= usize::MAX as f64 => {
            Some(n as usize)
        }
        _ => None,
    }
}

impl Table {
    pub fn new(header: GcHeader) -> Self {
        Self {
            header,
            seq: RefCell::new(SeqVec::new()),
            hash: RefCell::new(RobinHoodMap::new()),
        }
    }

    /// Presize per the `TAB` instruction's hints: the hash to
    /// `hash_hint` entries, the sequence to a power-of-two capacity
    /// derived from `seq_hint`. Shift is clamped well below `usize`
    /// width since both hints arrive as 8-bit instruction payload
    /// bytes.
    pub fn with_hints(header: GcHeader, hash_hint: u8, seq_hint: u8) -> Self {
        let seq_capacity = 1usize << (seq_hint.min(20) as u32);
        Self {
            header,
            seq: RefCell::new(SeqVec::with_capacity(seq_capacity)),
            hash: RefCell::new(RobinHoodMap::with_capacity(hash_hint as usize)),
        }
    }

    /// Sequence fast path for positive-integer keys within bounds,
    /// hash lookup otherwise. Absent keys read as `Nil`.
    pub fn get(&self, key: Value) -> Value {
        if let Some(idx) = sequence_index(key) {
            let seq = self.seq.borrow();
            if idx <= seq.len() {
                return seq[idx - 1];
            }
        }
        self.hash.borrow().get(&key).copied().unwrap_or(Value::Nil)
    }

    /// Append when the key is exactly `len+1`, overwrite in place when
    /// it already addresses the sequence, otherwise store in the
    /// hash. This keeps the invariant that a key live in the sequence
    /// never also appears in the hash.
    pub fn set(&self, key: Value, value: Value) {
        if let Some(idx) = sequence_index(key) {
            let mut seq = self.seq.borrow_mut();
            if idx == seq.len() + 1 {
                seq.push(value);
                return;
            } else if idx <= seq.len() {
                seq.set(idx - 1, value);
                return;
            }
        }
        self.hash.borrow_mut().insert(key, value);
    }

    /// Unconditional sequence append, used by `PTAB` for
    /// table-constructor elements.
    pub fn push(&self, value: Value) {
        self.seq.borrow_mut().push(value);
    }

    pub fn seq_len(&self) -> usize {
        self.seq.borrow().len()
    }

    /// Deep-clone both parts: used by `SETL` when a table literal is
    /// loaded, so each activation gets its own independent table
    /// rather than sharing the literal pool's copy.
    pub fn deep_clone(&self, header: GcHeader) -> Self {
        Self {
            header,
            seq: RefCell::new(self.seq.borrow().clone()),
            hash: RefCell::new(self.hash.borrow().clone()),
        }
    }
}

impl GcObject for Table {
    fn header(&self) -> &GcHeader {
        &self.header
    }

    fn trace(&self, marker: &mut Marker) {
        for v in self.seq.borrow().iter() {
            v.trace(marker);
        }
        for (k, v) in self.hash.borrow().iter() {
            k.trace(marker);
            v.trace(marker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nua_gc::GarbageCollector;

    fn fresh_table(gc: &GarbageCollector) -> Table {
        Table::new(GcHeader::for_type::<Table>(gc.alloc_colour()))
    }

    #[test]
    fn positive_integer_key_uses_sequence() {
        let gc = GarbageCollector::new();
        let t = fresh_table(&gc);
        t.push(Value::Number(10.0));
        t.push(Value::Number(20.0));
        t.push(Value::Number(30.0));
        assert_eq!(t.get(Value::Number(2.0)), Value::Number(20.0));
        assert_eq!(t.seq_len(), 3);
    }

    #[test]
    fn non_sequence_key_uses_hash() {
        let gc = GarbageCollector::new();
        let t = fresh_table(&gc);
        t.push(Value::Number(10.0));
        t.set(Value::Number(99.0), Value::Number(1.0));
        assert_eq!(t.get(Value::Number(99.0)), Value::Number(1.0));
        assert_eq!(t.seq_len(), 1);
    }

    #[test]
    fn set_at_len_plus_one_appends() {
        let gc = GarbageCollector::new();
        let t = fresh_table(&gc);
        t.push(Value::Number(1.0));
        t.set(Value::Number(2.0), Value::Number(2.0));
        assert_eq!(t.seq_len(), 2);
        assert_eq!(t.get(Value::Number(2.0)), Value::Number(2.0));
    }

    #[test]
    fn missing_key_is_nil() {
        let gc = GarbageCollector::new();
        let t = fresh_table(&gc);
        assert_eq!(t.get(Value::Number(5.0)), Value::Nil);
    }

    #[quickcheck_macros::quickcheck]
    fn sequence_and_hash_are_mutually_exclusive(keys: Vec<u8>) -> bool {
        let gc = GarbageCollector::new();
        let t = fresh_table(&gc);
        for _ in 0..keys.len() {
            t.push(Value::Nil);
        }
        let len = t.seq_len();
        for &k in &keys {
            let idx = (k as usize % (len + 1)) + 1;
            if idx <= len {
                t.set(Value::Number(idx as f64), Value::Number(1.0));
            }
        }
        keys.iter().all(|&k| {
            let idx = (k as usize % (len + 1)) + 1;
            idx > len || t.hash.borrow().get(&Value::Number(idx as f64)).is_none()
        })
    }
}
