//! Register-based bytecode interpreter.
//!
//! A `Vm` owns a flat value stack plus a `match`-over-opcode step
//! function, one call frame per active invocation.
//!
//! Unlike a raw-pointer register window into a C stack, every access
//! here re-derives its absolute stack index from the frame's `base`
//! and a register number on every instruction: nothing holds a
//! pointer or slice across a stack resize, so there is no separate
//! "re-derive the window pointer" step to forget when a nested call
//! grows the stack under a running frame.

mod error;

use std::cell::Cell;

use nua_gc::GcRef;
use nua_value::{Function, FunctionKind, FunctionDef, Instruction, NuaHeap, Opcode, Table, Value};

pub use error::VmError;

type VResult<T> = Result<T, VmError>;

/// Bookkeeping for one active call, threaded through `Vm::frames` so
/// a GC cycle triggered from any depth of nested calls can still walk
/// every ancestor frame's live registers.
struct Frame {
    /// Absolute stack index of this frame's register-window offset 0
    /// (the slot holding the callee function itself).
    base: usize,
    def: GcRef<FunctionDef>,
    env: GcRef<Table>,
    /// Index of the next instruction to fetch. A `Cell` so the mark
    /// routine can read it without needing `&mut` through a shared
    /// frame reference while a nested call is executing.
    pc: Cell<usize>,
}

/// One interpreter instance, executing against a single GC heap and
/// its own value stack: exactly one execution state is live at a
/// time.
pub struct Vm<'h> {
    heap: &'h NuaHeap,
    stack: Vec<Value>,
    frames: Vec<Frame>,
}

impl<'h> Vm<'h> {
    pub fn new(heap: &'h NuaHeap) -> Self {
        Self {
            heap,
            stack: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Call a bytecode or native function value from outside any
    /// running frame (the driver's top-level entry point). Returns
    /// the values the callee produced, whatever its `RET`/native
    /// return actually wrote — the caller asks for as many as it
    /// wants via `nret`, same as a `CALL` instruction would.
    pub fn call_function(&mut self, func: GcRef<Function>, args: &[Value], nret: u8) -> VResult<Vec<Value>> {
        let base = self.stack.len();
        self.stack.push(Value::Function(func));
        for &a in args {
            self.stack.push(a);
        }
        let nargs = args.len() as u8;
        self.invoke(base, nargs, nret)?;
        let mut out = Vec::with_capacity(nret as usize);
        for i in 0..nret as usize {
            out.push(self.stack.get(base + i).copied().unwrap_or(Value::Nil));
        }
        self.stack.truncate(base);
        Ok(out)
    }

    #[inline]
    fn reg(&self, base: usize, r: u8) -> Value {
        self.stack[base + 1 + r as usize]
    }

    #[inline]
    fn set_reg(&mut self, base: usize, r: u8, v: Value) {
        self.stack[base + 1 + r as usize] = v;
    }

    /// Run a GC cycle if the heap's allocation heuristic asks for
    /// one, marking every active frame's live registers as roots.
    fn maybe_collect(&self) {
        if !self.heap.should_collect() {
            return;
        }
        self.heap.collect(|marker| {
            for frame in &self.frames {
                let pc = frame.pc.get().min(frame.def.gc_height.len().saturating_sub(1));
                let height = frame.def.gc_height.get(pc).copied().unwrap_or(frame.def.max_reg) as usize;
                if frame.base < self.stack.len() {
                    self.stack[frame.base].trace(marker);
                }
                for i in 0..height {
                    if let Some(v) = self.stack.get(frame.base + 1 + i) {
                        v.trace(marker);
                    }
                }
                marker.mark(frame.env);
            }
        });
    }

    fn current_diag_site(&self) -> (Box<str>, u32) {
        let frame = self.frames.last().expect("diagnostics raised inside a running frame");
        let pc = frame.pc.get().saturating_sub(1).min(frame.def.lines.len().saturating_sub(1));
        let line = frame.def.lines.get(pc).copied().unwrap_or(0);
        (frame.def.file.clone(), line)
    }

    /// Perform a `CALL`: register `f_reg` (relative to `base`) must
    /// hold a `Function`, `f_reg+1..f_reg+nargs` its arguments.
    /// Dispatches to a nested bytecode frame or a native call and
    /// leaves up to `nret` result values starting at `f_reg`.
    fn call(&mut self, base: usize, f_reg: u8, nargs: u8, nret: u8) -> VResult<()> {
        let abs_f = base + 1 + f_reg as usize;
        self.invoke(abs_f, nargs, nret)
    }

    /// Shared by top-level calls and nested `CALL`s: `call_base` is
    /// the absolute stack index that will become the callee's window
    /// offset 0, with `nargs` argument values already sitting right
    /// after it.
    fn invoke(&mut self, call_base: usize, nargs: u8, nret: u8) -> VResult<()> {
        let callee = self.stack[call_base];
        let Value::Function(func) = callee else {
            let (file, line) = self.diag_site_for_call(call_base);
            return Err(VmError::NotCallable { file, line });
        };

        match func.kind {
            FunctionKind::Bytecode { def, env } => {
                let saved_len = self.stack.len();
                let needed = call_base + 1 + def.max_reg as usize;
                if self.stack.len() < needed {
                    self.stack.resize(needed, Value::Nil);
                }
                let param_count = def.param_count as usize;
                for i in (nargs as usize)..param_count {
                    self.stack[call_base + 1 + i] = Value::Nil;
                }

                let produced = self.exec_frame(call_base, def, env)?;

                for i in (produced as usize)..(nret as usize) {
                    self.stack[call_base + i] = Value::Nil;
                }
                let keep = saved_len.max(call_base + nret as usize);
                self.stack.truncate(keep);
            }
            FunctionKind::Native(native) => {
                let args: Vec<Value> = self.stack[call_base + 1..call_base + 1 + nargs as usize].to_vec();
                let results = native(&args);
                for i in 0..nret as usize {
                    let v = results.get(i).copied().unwrap_or(Value::Nil);
                    self.stack[call_base + i] = v;
                }
            }
        }
        Ok(())
    }

    /// `call_base` has no enclosing frame the first time `invoke` is
    /// reached from `call_function`; fall back to the caller's own
    /// site when one exists, else a synthetic top-level location.
    fn diag_site_for_call(&self, _call_base: usize) -> (Box<str>, u32) {
        if self.frames.is_empty() {
            (Box::from("<top-level>"), 0)
        } else {
            self.current_diag_site()
        }
    }

    /// Execute `def`'s instructions with register window based at
    /// `base`, returning the number of values its `RET` produced.
    fn exec_frame(&mut self, base: usize, def: GcRef<FunctionDef>, env: GcRef<Table>) -> VResult<u8> {
        self.frames.push(Frame { base, def, env, pc: Cell::new(0) });
        let result = self.run();
        self.frames.pop();
        result
    }

    fn run(&mut self) -> VResult<u8> {
        loop {
            self.maybe_collect();

            let frame_idx = self.frames.len() - 1;
            let (def, env, base, pc) = {
                let f = &self.frames[frame_idx];
                (f.def, f.env, f.base, f.pc.get())
            };
            let instr = def.instructions[pc];
            self.frames[frame_idx].pc.set(pc + 1);

            match instr.op() {
                Opcode::Nop => {}

                Opcode::Setl => {
                    let dst = instr.reg_operand();
                    let value = def.literals[instr.lit_operand() as usize];
                    let fresh = self.instantiate_literal(value, env);
                    self.set_reg(base, dst, fresh);
                }

                Opcode::Nil => {
                    self.set_reg(base, instr.reg_operand(), Value::Nil);
                }

                Opcode::Mov => {
                    let v = self.reg(base, instr.src_a());
                    self.set_reg(base, instr.dst(), v);
                }

                Opcode::Add | Opcode::Sub | Opcode::Mul => {
                    let a = self.reg(base, instr.src_a());
                    let b = self.reg(base, instr.src_b());
                    let (Value::Number(x), Value::Number(y)) = (a, b) else {
                        let (file, line) = (def.file.clone(), def.lines[pc]);
                        return Err(VmError::NotANumber { file, line });
                    };
                    let result = match instr.op() {
                        Opcode::Add => x + y,
                        Opcode::Sub => x - y,
                        Opcode::Mul => x * y,
                        _ => unreachable!(),
                    };
                    self.set_reg(base, instr.dst(), Value::Number(result));
                }

                Opcode::Gt | Opcode::Ge => {
                    let a = self.reg(base, instr.src_a());
                    let b = self.reg(base, instr.src_b());
                    let result = match (a, b) {
                        (Value::Number(x), Value::Number(y)) => {
                            let holds = if matches!(instr.op(), Opcode::Gt) { x > y } else { x >= y };
                            if holds { b } else { Value::Nil }
                        }
                        _ => Value::Nil,
                    };
                    self.set_reg(base, instr.dst(), result);
                }

                Opcode::Cover => {
                    let v = self.reg(base, instr.reg_operand());
                    if v.is_truthy() {
                        let p = self.frames[frame_idx].pc.get();
                        self.frames[frame_idx].pc.set(p + 1);
                    }
                }

                Opcode::Jmp => {
                    let after = self.frames[frame_idx].pc.get();
                    let target = (after as i64 + instr.offset_operand() as i64) as usize;
                    self.frames[frame_idx].pc.set(target);
                }

                Opcode::Tab => {
                    let dst = instr.dst();
                    let (hash_hint, seq_hint) = (instr.src_a(), instr.src_b());
                    let t = self.heap.alloc::<Table>(|header| Table::with_hints(header, hash_hint, seq_hint));
                    self.set_reg(base, dst, Value::Table(t));
                }

                Opcode::Ptab => {
                    let tab_val = self.reg(base, instr.dst());
                    let elem = self.reg(base, instr.src_a());
                    let Value::Table(t) = tab_val else {
                        let (file, line) = (def.file.clone(), def.lines[pc]);
                        return Err(VmError::NotATable { file, line });
                    };
                    t.push(elem);
                }

                Opcode::Gtab => {
                    let tab_val = self.reg(base, instr.src_a());
                    let key_val = self.reg(base, instr.src_b());
                    let Value::Table(t) = tab_val else {
                        let (file, line) = (def.file.clone(), def.lines[pc]);
                        return Err(VmError::NotATable { file, line });
                    };
                    let v = t.get(key_val);
                    self.set_reg(base, instr.dst(), v);
                }

                Opcode::Stab => {
                    let tab_val = self.reg(base, instr.dst());
                    let key_val = self.reg(base, instr.src_a());
                    let value_val = self.reg(base, instr.src_b());
                    let Value::Table(t) = tab_val else {
                        let (file, line) = (def.file.clone(), def.lines[pc]);
                        return Err(VmError::NotATable { file, line });
                    };
                    t.set(key_val, value_val);
                }

                Opcode::Genv => {
                    let key = def.literals[instr.lit_operand() as usize];
                    let v = env.get(key);
                    self.set_reg(base, instr.reg_operand(), v);
                }

                Opcode::Senv => {
                    let key = def.literals[instr.lit_operand() as usize];
                    let v = self.reg(base, instr.reg_operand());
                    env.set(key, v);
                }

                Opcode::Call => {
                    let f_reg = instr.dst();
                    let nargs = instr.src_a();
                    let nret = instr.src_b();
                    self.call(base, f_reg, nargs, nret)?;
                }

                Opcode::Ret => {
                    let base_reg = instr.dst();
                    let n = instr.src_a();
                    let src0 = base + 1 + base_reg as usize;
                    for i in 0..n as usize {
                        let v = self.stack[src0 + i];
                        self.stack[base + i] = v;
                    }
                    return Ok(n);
                }
            }
        }
    }

    /// `SETL`'s load semantics: numbers and strings
    /// copy as-is (strings are already canonical, interned
    /// references); tables deep-clone so each activation of the
    /// enclosing function gets an independent table rather than
    /// sharing the literal pool's template; function literals produce
    /// a fresh closure sharing the template's `FunctionDef` but bound
    /// to the *currently executing* frame's environment.
    fn instantiate_literal(&self, value: Value, current_env: GcRef<Table>) -> Value {
        match value {
            Value::Table(t) => {
                let cloned = self.heap.alloc::<Table>(|header| t.deep_clone(header));
                Value::Table(cloned)
            }
            Value::Function(f) => match f.kind {
                FunctionKind::Bytecode { def, .. } => {
                    let fresh = self.heap.alloc::<Function>(|header| Function::bytecode(header, def, current_env));
                    Value::Function(fresh)
                }
                FunctionKind::Native(native) => {
                    let fresh = self.heap.alloc::<Function>(|header| Function::native(header, native));
                    Value::Function(fresh)
                }
            },
            other => other,
        }
    }
}
