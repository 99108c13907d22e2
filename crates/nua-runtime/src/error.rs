//! Errors that can abort a run before or during execution: file-load,
//! lexical/syntactic, and runtime errors are each a distinct,
//! non-recoverable failure mode.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("could not read `{path}`: {source}")]
    FileLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Compilation stopped at its first error; the diagnostics
    /// themselves were already pushed to the `Handler` the caller
    /// passed to [`crate::run_source`] and should be rendered from
    /// there.
    #[error("compilation failed")]
    Compile,

    #[error(transparent)]
    Vm(#[from] nua_vm::VmError),
}
