//! Host bindings and the lex-compile-execute pipeline.
//!
//! Ties `nua_compiler::compile` and `nua_vm::Vm` together around one
//! [`NuaHeap`], seeding the initial environment table with the native
//! bindings in [`builtins`] before handing control to the VM.

mod builtins;
mod error;

use std::path::Path;

use nua_value::{Function, NuaHeap, NuaStr, Table, Value};
use nua_vm::Vm;

pub use error::RuntimeError;
pub use nua_util::Handler;

/// Build a fresh environment table with every host binding installed.
pub fn initial_env(heap: &NuaHeap) -> nua_gc::GcRef<Table> {
    let env = heap.alloc::<Table>(Table::new);
    bind_native(heap, env, b"print", builtins::print);
    env
}

fn bind_native(heap: &NuaHeap, env: nua_gc::GcRef<Table>, name: &[u8], f: nua_value::NativeFn) {
    let key = Value::Str(intern(heap, name));
    let func = heap.alloc::<Function>(|header| Function::native(header, f));
    env.set(key, Value::Function(func));
}

fn intern(heap: &NuaHeap, bytes: &[u8]) -> nua_gc::GcRef<NuaStr> {
    heap.intern(bytes, |header| NuaStr::new(header, bytes.to_vec().into_boxed_slice()))
}

/// Compile and run one source buffer to completion, discarding its
/// top-level return values. `file` names the buffer for diagnostics
/// and for the VM's runtime-error messages.
pub fn run_source(source: &[u8], file: impl Into<Box<str>>, handler: &Handler) -> Result<(), RuntimeError> {
    let heap = NuaHeap::new();
    let file = file.into();
    let def = nua_compiler::compile(source, file, handler, &heap).map_err(|_| RuntimeError::Compile)?;

    let env = initial_env(&heap);
    let entry = heap.alloc::<Function>(|header| Function::bytecode(header, def, env));

    let mut vm = Vm::new(&heap);
    vm.call_function(entry, &[], 0)?;
    Ok(())
}

/// Read `path` and run it. The file's own path becomes the `file`
/// name threaded through every diagnostic and runtime error.
pub fn run_file(path: impl AsRef<Path>, handler: &Handler) -> Result<(), RuntimeError> {
    let path = path.as_ref();
    let source = std::fs::read(path).map_err(|source| RuntimeError::FileLoad {
        path: path.display().to_string(),
        source,
    })?;
    run_source(&source, path.display().to_string(), handler)
}
