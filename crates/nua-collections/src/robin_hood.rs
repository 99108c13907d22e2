//! Open-addressing hash map with robin-hood displacement.
//!
//! Probe sequence is linear; an insertion that has probed further than
//! the entry currently occupying a slot steals that slot and continues
//! inserting the displaced entry (robin-hood: the rich give to the poor).
//! Grows (doubling) once the load factor would exceed 0.9.

use rustc_hash::FxHasher;
use std::hash::{BuildHasherDefault, Hash, Hasher};

const MAX_LOAD_FACTOR: f64 = 0.9;
const INITIAL_CAPACITY: usize = 8;

#[derive(Clone)]
struct Slot<K, V> {
    key: K,
    value: V,
    /// Distance this entry currently sits from its ideal bucket.
    probe_len: u32,
}

/// An open-addressing, robin-hood-displacement hash map.
#[derive(Clone)]
pub struct RobinHoodMap<K, V> {
    slots: Vec<Option<Slot<K, V>>>,
    len: usize,
}

impl<K: Hash + Eq, V> RobinHoodMap<K, V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            len: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let cap = capacity.next_power_of_two().max(INITIAL_CAPACITY);
        Self {
            slots: (0..cap).map(|_| None).collect(),
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn hash_of(key: &K) -> u64 {
        let mut hasher = BuildHasherDefault::<FxHasher>::default().build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn bucket_for(&self, hash: u64) -> usize {
        (hash as usize) & (self.slots.len() - 1)
    }

    fn grow(&mut self) {
        let new_cap = (self.slots.len() * 2).max(INITIAL_CAPACITY);
        let old_slots = std::mem::replace(&mut self.slots, (0..new_cap).map(|_| None).collect());
        self.len = 0;
        for slot in old_slots.into_iter().flatten() {
            self.insert(slot.key, slot.value);
        }
    }

    /// Insert a key/value pair, returning the previous value if the key
    /// was already present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if self.slots.is_empty()
            || (self.len + 1) as f64 / self.slots.len() as f64 > MAX_LOAD_FACTOR
        {
            self.grow();
        }

        let hash = Self::hash_of(&key);
        let mut pos = self.bucket_for(hash);
        let mut incoming = Slot {
            key,
            value,
            probe_len: 0,
        };

        loop {
            match &mut self.slots[pos] {
                None => {
                    self.slots[pos] = Some(incoming);
                    self.len += 1;
                    return None;
                }
                Some(existing) if existing.key == incoming.key => {
                    return Some(std::mem::replace(&mut existing.value, incoming.value));
                }
                Some(existing) if existing.probe_len < incoming.probe_len => {
                    std::mem::swap(existing, &mut incoming);
                    pos = (pos + 1) & (self.slots.len() - 1);
                    incoming.probe_len += 1;
                }
                Some(_) => {
                    pos = (pos + 1) & (self.slots.len() - 1);
                    incoming.probe_len += 1;
                }
            }
        }
    }

    fn find_slot(&self, key: &K) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        let hash = Self::hash_of(key);
        let mut pos = self.bucket_for(hash);
        let mut probe_len = 0u32;
        loop {
            match &self.slots[pos] {
                None => return None,
                Some(slot) if &slot.key == key => return Some(pos),
                Some(slot) if slot.probe_len < probe_len => return None,
                _ => {
                    pos = (pos + 1) & (self.slots.len() - 1);
                    probe_len += 1;
                }
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.find_slot(key).map(|pos| &self.slots[pos].as_ref().unwrap().value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let pos = self.find_slot(key)?;
        Some(&mut self.slots[pos].as_mut().unwrap().value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find_slot(key).is_some()
    }

    /// Remove a key, backward-shifting subsequent entries in the probe
    /// chain to preserve robin-hood invariants.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let mut pos = self.find_slot(key)?;
        let removed = self.slots[pos].take().unwrap();
        self.len -= 1;

        let mut next = (pos + 1) & (self.slots.len() - 1);
        loop {
            let should_shift = matches!(&self.slots[next], Some(s) if s.probe_len > 0);
            if !should_shift {
                break;
            }
            let mut moved = self.slots[next].take().unwrap();
            moved.probe_len -= 1;
            self.slots[pos] = Some(moved);
            pos = next;
            next = (next + 1) & (self.slots.len() - 1);
        }
        Some(removed.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref().map(|s| (&s.key, &s.value)))
    }
}

impl<K: Hash + Eq, V> Default for RobinHoodMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get() {
        let mut m: RobinHoodMap<&str, i32> = RobinHoodMap::new();
        m.insert("a", 1);
        m.insert("b", 2);
        assert_eq!(m.get(&"a"), Some(&1));
        assert_eq!(m.get(&"b"), Some(&2));
        assert_eq!(m.get(&"c"), None);
    }

    #[test]
    fn insert_overwrites_existing_key() {
        let mut m: RobinHoodMap<&str, i32> = RobinHoodMap::new();
        assert_eq!(m.insert("a", 1), None);
        assert_eq!(m.insert("a", 2), Some(1));
        assert_eq!(m.get(&"a"), Some(&2));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn remove_then_lookup_fails() {
        let mut m: RobinHoodMap<i32, i32> = RobinHoodMap::new();
        for i in 0..32 {
            m.insert(i, i * 10);
        }
        for i in 0..32 {
            assert_eq!(m.remove(&i), Some(i * 10));
        }
        assert!(m.is_empty());
        for i in 0..32 {
            assert_eq!(m.get(&i), None);
        }
    }

    #[test]
    fn grows_past_load_factor() {
        let mut m: RobinHoodMap<i32, i32> = RobinHoodMap::new();
        for i in 0..200 {
            m.insert(i, i);
        }
        assert_eq!(m.len(), 200);
        for i in 0..200 {
            assert_eq!(m.get(&i), Some(&i));
        }
    }

    #[quickcheck_macros::quickcheck]
    fn every_inserted_key_is_found(pairs: Vec<(i32, i32)>) -> bool {
        let mut m: RobinHoodMap<i32, i32> = RobinHoodMap::new();
        for &(k, v) in &pairs {
            m.insert(k, v);
        }
        pairs.iter().all(|&(k, _)| m.contains_key(&k))
    }
}
