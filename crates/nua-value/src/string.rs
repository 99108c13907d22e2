//! Interned strings: a GC header plus an owned byte buffer. Two
//! slices with equal bytes always resolve to the same `GcRef<NuaStr>`,
//! enforced by `nua_gc::InternTable`, not by this type.

use nua_gc::{GcHeader, GcObject, Marker};

#[repr(C)]
pub struct NuaStr {
    header: GcHeader,
    bytes: Box<[u8]>,
}

impl NuaStr {
    pub fn new(header: GcHeader, bytes: Box<[u8]>) -> Self {
        Self { header, bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Best-effort display form; nua has no string escaping rules for
    /// output, only for literals, so non-UTF-8 content is shown
    /// lossily rather than rejected.
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

impl GcObject for NuaStr {
    fn header(&self) -> &GcHeader {
        &self.header
    }

    fn trace(&self, _marker: &mut Marker) {
        // Leaf object: interned strings carry no outgoing references.
    }
}
