//! Function definitions and function values.
//!
//! A definition's instruction vector and its per-instruction metadata
//! vectors (`lines`, `gc_height`) are kept in lockstep by index.

use nua_gc::{GcHeader, GcObject, GcRef, Marker};

use crate::instruction::Instruction;
use crate::table::Table;
use crate::value::Value;

/// Immutable once compilation finishes: code, literal pool, and
/// per-instruction debug/GC metadata kept in lockstep with the
/// instruction vector.
#[repr(C)]
pub struct FunctionDef {
    header: GcHeader,
    pub instructions: Vec<Instruction>,
    pub literals: Vec<Value>,
    pub max_reg: u8,
    pub param_count: u8,
    /// Source line of each instruction, 1-based.
    pub lines: Vec<u32>,
    /// Highest live register index at each instruction's program
    /// counter: registers at or above this are dead and need not be
    /// traced as GC roots.
    pub gc_height: Vec<u8>,
    pub file: Box<str>,
}

impl FunctionDef {
    pub fn new(header: GcHeader, file: impl Into<Box<str>>) -> Self {
        Self {
            header,
            instructions: Vec::new(),
            literals: Vec::new(),
            max_reg: 0,
            param_count: 0,
            lines: Vec::new(),
            gc_height: Vec::new(),
            file: file.into(),
        }
    }
}

impl GcObject for FunctionDef {
    fn header(&self) -> &GcHeader {
        &self.header
    }

    fn trace(&self, marker: &mut Marker) {
        for literal in &self.literals {
            literal.trace(marker);
        }
    }
}

/// A native function pointer, the host-binding mechanism: no
/// environment, no definition, called directly with the arguments the
/// VM collected for it. Returns its result values.
pub type NativeFn = fn(&[Value]) -> Vec<Value>;

pub enum FunctionKind {
    Bytecode {
        def: GcRef<FunctionDef>,
        env: GcRef<Table>,
    },
    Native(NativeFn),
}

/// A callable value. Both kinds share a `GcHeader` since both are
/// heap-allocated and reachable the same way as any other `Value`.
#[repr(C)]
pub struct Function {
    header: GcHeader,
    pub kind: FunctionKind,
}

impl Function {
    pub fn bytecode(header: GcHeader, def: GcRef<FunctionDef>, env: GcRef<Table>) -> Self {
        Self {
            header,
            kind: FunctionKind::Bytecode { def, env },
        }
    }

    pub fn native(header: GcHeader, f: NativeFn) -> Self {
        Self {
            header,
            kind: FunctionKind::Native(f),
        }
    }
}

impl GcObject for Function {
    fn header(&self) -> &GcHeader {
        &self.header
    }

    fn trace(&self, marker: &mut Marker) {
        if let FunctionKind::Bytecode { def, env } = &self.kind {
            marker.mark(*def);
            marker.mark(*env);
        }
    }
}
