//! Mark phase bookkeeping: one object at a time, with recursion
//! through `GcObject::trace` standing in for an explicit work queue
//! since marking never runs on more than one thread.

use crate::header::Colour;
use crate::object::{GcObject, GcRef};

/// Carries this cycle's "live" colour while roots and their
/// transitive references are walked.
pub struct Marker {
    pub(crate) live_colour: Colour,
}

impl Marker {
    pub(crate) fn new(live_colour: Colour) -> Self {
        Self { live_colour }
    }

    /// Mark `obj` and, if this is the first time it's been reached
    /// this cycle, recursively trace what it points to.
    pub fn mark<T: GcObject>(&mut self, obj: GcRef<T>) {
        let header = obj.header();
        if header.colour.get() == self.live_colour {
            return;
        }
        header.colour.set(self.live_colour);
        obj.trace(self);
    }

    /// Mark an optional reference; a no-op for `None`.
    pub fn mark_opt<T: GcObject>(&mut self, obj: Option<GcRef<T>>) {
        if let Some(obj) = obj {
            self.mark(obj);
        }
    }
}
