//! nua-gc - mark-and-sweep collector and intern table.
//!
//! A single mutator, stop-the-world, two-colour mark-sweep collector
//! over an intrusive linked list of heap objects, plus a generic
//! string intern table that cooperates with collection (weak entries
//! purged before sweep).
//!
//! There is exactly one mutator thread and collection always runs to
//! completion before it resumes, so there is no concurrent marker, no
//! relocator, no write barrier, and no generational heap: none of
//! that machinery has a job to do here.

mod collector;
mod header;
mod heap;
mod intern;
mod marker;
mod object;

pub use collector::{GarbageCollector, GcStats};
pub use header::{Colour, GcHeader};
pub use heap::Heap;
pub use intern::InternTable;
pub use marker::Marker;
pub use object::{GcObject, GcRef};
