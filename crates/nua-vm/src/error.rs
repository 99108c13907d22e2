//! Runtime errors the interpreter can raise. Every variant carries
//! the file and source line of the instruction that failed, the
//! one-line diagnostic printed when the process aborts.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("{file}:{line}: attempt to call a non-function value")]
    NotCallable { file: Box<str>, line: u32 },

    #[error("{file}:{line}: attempt to perform arithmetic on a non-number value")]
    NotANumber { file: Box<str>, line: u32 },

    #[error("{file}:{line}: attempt to index a non-table value")]
    NotATable { file: Box<str>, line: u32 },
}
