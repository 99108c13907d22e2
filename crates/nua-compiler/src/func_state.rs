//! Per-function compiler state: the register file, the scope stack,
//! the instruction/literal buffers being built, and the enclosing
//! loop contexts for `break`/`continue`. One instance exists per
//! function currently being compiled, including nested function
//! literals.

use rustc_hash::FxHashMap;

use nua_value::{Instruction, Value};

/// A pending `while` loop: where `continue` jumps back to, and the
/// head of the singly linked chain of not-yet-patched `break` jumps
/// (each one's own offset field stores the index of the previous link,
/// or `-1` for the end of the chain).
pub(crate) struct LoopCtx {
    pub cond_pc: usize,
    pub break_chain: Option<usize>,
}

/// Registers below `reg` are locals bound by the active scopes;
/// `reg..reg+temp` is the temporary stack used while evaluating the
/// expression currently being compiled. Outside of statement
/// compilation `temp` is always zero.
pub(crate) struct FuncState {
    scopes: Vec<FxHashMap<Box<[u8]>, u8>>,
    pub reg: u8,
    pub temp: u8,
    pub max_reg: u8,
    pub param_count: u8,
    pub instructions: Vec<Instruction>,
    pub lines: Vec<u32>,
    pub gc_height: Vec<u8>,
    pub literals: Vec<Value>,
    pub loops: Vec<LoopCtx>,
}

impl FuncState {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            reg: 0,
            temp: 0,
            max_reg: 0,
            param_count: 0,
            instructions: Vec::new(),
            lines: Vec::new(),
            gc_height: Vec::new(),
            literals: Vec::new(),
            loops: Vec::new(),
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    /// Scope exit returns its registers to the free pool.
    pub fn pop_scope(&mut self) {
        let scope = self.scopes.pop().expect("scope stack underflow");
        self.reg -= scope.len() as u8;
    }

    pub fn declare_local(&mut self, name: Box<[u8]>) -> u8 {
        let reg = self.reg;
        self.reg += 1;
        self.bump_max();
        self.scopes
            .last_mut()
            .expect("declare_local outside any scope")
            .insert(name, reg);
        reg
    }

    pub fn find_local(&self, name: &[u8]) -> Option<u8> {
        for scope in self.scopes.iter().rev() {
            if let Some(&reg) = scope.get(name) {
                return Some(reg);
            }
        }
        None
    }

    pub fn is_temp(&self, reg: u8) -> bool {
        reg >= self.reg
    }

    pub fn alloc_temp(&mut self) -> u8 {
        let reg = self.reg + self.temp;
        self.temp += 1;
        self.bump_max();
        reg
    }

    pub fn free_temp(&mut self) {
        debug_assert!(self.temp > 0, "temporary stack underflow");
        self.temp -= 1;
    }

    pub fn free_temps(&mut self, n: u8) {
        for _ in 0..n {
            self.free_temp();
        }
    }

    fn bump_max(&mut self) {
        let height = self.reg + self.temp;
        if height > self.max_reg {
            self.max_reg = height;
        }
    }

    pub fn emit(&mut self, instr: Instruction, line: u32) -> usize {
        let idx = self.instructions.len();
        self.instructions.push(instr);
        self.lines.push(line);
        self.gc_height.push(self.reg + self.temp);
        idx
    }

    pub fn pc(&self) -> usize {
        self.instructions.len()
    }

    pub fn patch_jump(&mut self, jmp_idx: usize, target_pc: usize) {
        let off = target_pc as i32 - (jmp_idx as i32 + 1);
        self.instructions[jmp_idx].set_offset(off);
    }

    /// The retargetable-instruction peephole: if the last emitted
    /// instruction computed `value_reg` and its opcode is
    /// retargetable, rewrite its destination to `new_dst` in place
    /// instead of emitting a separate `MOV`. Only ever applies to a
    /// temporary about to be retired, never to an existing local, so
    /// callers must check `is_temp(value_reg)` before calling this.
    pub fn try_retarget(&mut self, value_reg: u8, new_dst: u8) -> bool {
        match self.instructions.last_mut() {
            Some(last) if last.op().is_retargetable() && last.dst() == value_reg => {
                last.set_dst(new_dst);
                true
            }
            _ => false,
        }
    }

    /// Raising a `CALL`'s declared return count after the fact means
    /// the caller now keeps more result registers alive across every
    /// instruction emitted since the call; recompute their recorded
    /// heights conservatively rather than track this precisely.
    pub fn bump_gc_height_from(&mut self, from_idx: usize) {
        let height = self.reg + self.temp;
        for h in &mut self.gc_height[from_idx..] {
            if height > *h {
                *h = height;
            }
        }
    }
}
