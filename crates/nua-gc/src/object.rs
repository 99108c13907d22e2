//! `GcObject` trait and the type-erasing trampolines that let the
//! collector trace and free concrete types through nothing more than
//! a `GcHeader` pointer. Each header carries a pair of plain function
//! pointers rather than a class-metadata table, since this collector
//! never relocates objects and has no need to recover more than "how
//! do I trace/free this".

use std::ptr::NonNull;

use crate::header::GcHeader;
use crate::marker::Marker;

/// A heap object the collector can allocate, trace and free.
///
/// Every implementor must place its `GcHeader` as the first field and
/// be `#[repr(C)]`, so `NonNull<GcHeader>` and `NonNull<Self>` share an
/// address.
pub trait GcObject {
    fn header(&self) -> &GcHeader;

    /// Mark every `GcRef` this object holds, recursively, via
    /// `marker.mark(..)`.
    fn trace(&self, marker: &mut Marker);
}

pub(crate) unsafe fn free_trampoline<T: GcObject>(header_ptr: NonNull<GcHeader>) {
    drop(Box::from_raw(header_ptr.cast::<T>().as_ptr()));
}

/// A reference to a GC-managed `T`, valid for as long as `T` stays
/// reachable from the collector's roots.
pub struct GcRef<T> {
    ptr: NonNull<T>,
}

impl<T> GcRef<T> {
    pub(crate) fn new(ptr: NonNull<T>) -> Self {
        Self { ptr }
    }

    pub fn as_ptr(&self) -> NonNull<T> {
        self.ptr
    }
}

impl<T> Clone for GcRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for GcRef<T> {}

impl<T> PartialEq for GcRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T> Eq for GcRef<T> {}

impl<T> std::hash::Hash for GcRef<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ptr.as_ptr().hash(state);
    }
}

impl<T> std::ops::Deref for GcRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: a GcRef only ever outlives a collection if the
        // referent was reachable from a root at the last collect();
        // the interpreter never holds one across a collect() that
        // doesn't re-mark it.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> std::fmt::Debug for GcRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GcRef({:p})", self.ptr.as_ptr())
    }
}
