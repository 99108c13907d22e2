//! nua-value - tagged value model, heap object shapes, and the
//! packed bytecode instruction encoding shared by the compiler and
//! the VM.

mod function;
mod instruction;
mod string;
mod table;
mod value;

pub use function::{Function, FunctionDef, FunctionKind, NativeFn};
pub use instruction::{Instruction, Opcode};
pub use string::NuaStr;
pub use table::Table;
pub use value::Value;

/// The GC heap specialized to nua's one interned leaf type. Bundles
/// the collector with the string intern table it must purge on every
/// cycle.
pub type NuaHeap = nua_gc::Heap<NuaStr>;

