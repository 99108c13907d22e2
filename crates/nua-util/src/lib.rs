//! nua-util - Core Utilities and Foundation Types
//!
//! Shared infrastructure used by every stage of the nua toolchain: source
//! spans and source maps for locating bytes in the original program text,
//! and a fluent diagnostic builder for error reporting.
//!
//! String interning lives in `nua-gc` rather than here, since interned
//! strings are garbage-collected heap objects and the intern table must be
//! purged of dead entries on every sweep.

pub mod diagnostic;
pub mod span;

pub use diagnostic::{Diagnostic, DiagnosticBuilder, DiagnosticCode, Handler, Level};
pub use span::{FileId, Span, SourceFile, SourceMap};

pub use rustc_hash::FxHashMap;
pub use rustc_hash::FxHashSet;
