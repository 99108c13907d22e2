//! Single-pass, register-based bytecode compiler.
//!
//! There is no intermediate AST: each grammar production emits its
//! instructions directly as it is recognized. [`FuncState`] holds one
//! function's register file and instruction buffer; [`Compiler`]
//! holds the shared lexer, diagnostic handler and heap that every
//! nested function literal's `FuncState` is compiled against.

mod func_state;

use nua_gc::GcRef;
use nua_lex::{Lexer, Token, TokenKind};
use nua_util::diagnostic::{DiagnosticCode, Level};
use nua_util::{Diagnostic, Handler};
use nua_value::{Function, FunctionDef, Instruction, NuaHeap, NuaStr, Opcode, Table, Value};

use func_state::{FuncState, LoopCtx};

/// First-error-abort sentinel: the actual message has already been
/// pushed to the `Handler`.
#[derive(Debug)]
pub struct CompileError;

type CResult<T> = Result<T, CompileError>;

#[derive(Clone, Copy)]
struct ExprResult {
    reg: u8,
    /// Set only when this expression is exactly a bare call with
    /// nothing chained after it, so a multi-assign can still raise its
    /// declared return count.
    call_idx: Option<usize>,
}

/// How to re-store into the place an already-parsed expression read
/// from, used when that expression turns out to be an assignment
/// target rather than a value being read.
enum Lvalue {
    Local(u8),
    Env(u16),
    Table { tab_reg: u8, key_reg: u8 },
    /// The parsed expression cannot be an assignment target (a
    /// literal, a table constructor, a bare call, ...).
    Invalid,
}

#[derive(Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Gt,
    Ge,
    Lt,
    Le,
}

fn binop_info(kind: &TokenKind) -> Option<(BinOp, u8)> {
    match kind {
        TokenKind::Plus => Some((BinOp::Add, 4)),
        TokenKind::Minus => Some((BinOp::Sub, 4)),
        TokenKind::Star => Some((BinOp::Mul, 6)),
        TokenKind::Gt => Some((BinOp::Gt, 1)),
        TokenKind::Ge => Some((BinOp::Ge, 1)),
        TokenKind::Lt => Some((BinOp::Lt, 1)),
        TokenKind::Le => Some((BinOp::Le, 1)),
        _ => None,
    }
}

/// `TAB`'s sequence-size hint: smallest power-of-two exponent covering
/// `count` elements (clamped the same way `Table::with_hints` clamps
/// it on the read side).
fn seq_hint_for(count: u32) -> u8 {
    let mut bits = 0u8;
    while (1u32 << bits) < count && bits < 20 {
        bits += 1;
    }
    bits
}

pub struct Compiler<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    handler: &'a Handler,
    heap: &'a NuaHeap,
    file: Box<str>,
}

/// Compile one source file to a callable top-level function. Returns
/// `Err` after pushing at least one diagnostic to `handler`; the
/// function stops at the first error rather than trying to recover.
pub fn compile(
    source: &[u8],
    file: impl Into<Box<str>>,
    handler: &Handler,
    heap: &NuaHeap,
) -> CResult<GcRef<FunctionDef>> {
    let file = file.into();
    let mut lexer = Lexer::new(source);
    let first = lexer.next_token(handler);
    let mut compiler = Compiler {
        lexer,
        cur: first,
        handler,
        heap,
        file: file.clone(),
    };

    let mut fs = FuncState::new();
    fs.push_scope();
    compiler.compile_block(&mut fs, &[TokenKind::Eof])?;
    compiler.ensure_trailing_return(&mut fs);
    fs.pop_scope();
    if fs.temp != 0 {
        return Err(compiler.bail_bug(
            DiagnosticCode::E_COMPILER_TEMP_IMBALANCE,
            "internal error: temporary register stack imbalance at top level",
        ));
    }

    let def_ref = heap.alloc::<FunctionDef>(|header| {
        let mut def = FunctionDef::new(header, file);
        def.instructions = fs.instructions;
        def.literals = fs.literals;
        def.max_reg = fs.max_reg;
        def.param_count = fs.param_count;
        def.lines = fs.lines;
        def.gc_height = fs.gc_height;
        def
    });

    if handler.has_errors() {
        return Err(CompileError);
    }
    Ok(def_ref)
}

impl<'a> Compiler<'a> {
    fn line(&self) -> u32 {
        self.cur.span.line
    }

    fn advance(&mut self) -> Token {
        let next = self.lexer.next_token(self.handler);
        std::mem::replace(&mut self.cur, next)
    }

    fn at(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.cur.kind) == std::mem::discriminant(kind)
    }

    fn bail(&self, code: DiagnosticCode, message: impl Into<String>) -> CompileError {
        self.handler
            .emit_diagnostic(Diagnostic::error(message, self.cur.span).with_code(code));
        CompileError
    }

    /// Report an internal-compiler-invariant violation: a
    /// `Level::Bug` diagnostic rather than `Level::Error`, so the
    /// driver can tell "your program is malformed" apart from "this
    /// compiler has a bug" when rendering the failure.
    fn bail_bug(&self, code: DiagnosticCode, message: impl Into<String>) -> CompileError {
        self.handler
            .emit_diagnostic(Diagnostic::new(Level::Bug, message, self.cur.span).with_code(code));
        CompileError
    }

    fn expect(&mut self, want: TokenKind, what: &str) -> CResult<()> {
        if self.at(&want) {
            self.advance();
            Ok(())
        } else {
            Err(self.bail(
                DiagnosticCode::E_PARSER_EXPECTED_TOKEN,
                format!("expected {what}"),
            ))
        }
    }

    fn expect_ident(&mut self) -> CResult<Box<[u8]>> {
        match self.cur.kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.bail(
                DiagnosticCode::E_PARSER_EXPECTED_TOKEN,
                "expected an identifier",
            )),
        }
    }

    fn starts_expr(&self) -> bool {
        matches!(
            self.cur.kind,
            TokenKind::Nil
                | TokenKind::Number(_)
                | TokenKind::Str(_)
                | TokenKind::Ident(_)
                | TokenKind::LBrace
                | TokenKind::LParen
        )
    }

    // -- literal pool -----------------------------------------------

    fn intern_str(&self, bytes: &[u8]) -> GcRef<NuaStr> {
        self.heap
            .intern(bytes, |header| NuaStr::new(header, bytes.to_vec().into_boxed_slice()))
    }

    fn alloc_str_literal(&self, fs: &mut FuncState, bytes: &[u8]) -> u16 {
        let value = Value::Str(self.intern_str(bytes));
        if let Some(idx) = fs.literals.iter().position(|v| *v == value) {
            return idx as u16;
        }
        fs.literals.push(value);
        (fs.literals.len() - 1) as u16
    }

    fn alloc_number_literal(&self, fs: &mut FuncState, n: f64) -> u16 {
        let value = Value::Number(n);
        if let Some(idx) = fs.literals.iter().position(|v| *v == value) {
            return idx as u16;
        }
        fs.literals.push(value);
        (fs.literals.len() - 1) as u16
    }

    fn push_function_literal(&self, fs: &mut FuncState, value: Value) -> u16 {
        fs.literals.push(value);
        (fs.literals.len() - 1) as u16
    }

    // -- blocks and statements ---------------------------------------

    fn compile_block(&mut self, fs: &mut FuncState, terminators: &[TokenKind]) -> CResult<()> {
        loop {
            if terminators.iter().any(|t| self.at(t)) {
                return Ok(());
            }
            if self.cur.kind.is_eof() {
                return Err(self.bail(
                    DiagnosticCode::E_PARSER_UNEXPECTED_EOF,
                    "unexpected end of file",
                ));
            }
            self.statement(fs)?;
        }
    }

    fn ensure_trailing_return(&mut self, fs: &mut FuncState) {
        let has_ret = matches!(fs.instructions.last().map(|i| i.op()), Some(Opcode::Ret));
        if !has_ret {
            let base = fs.reg + fs.temp;
            fs.emit(Instruction::rrr(Opcode::Ret, base, 0, 0), self.line());
        }
    }

    fn statement(&mut self, fs: &mut FuncState) -> CResult<()> {
        match &self.cur.kind {
            TokenKind::Local => self.local_stmt(fs),
            TokenKind::If => self.if_stmt(fs),
            TokenKind::While => self.while_stmt(fs),
            TokenKind::Break => self.break_stmt(fs),
            TokenKind::Continue => self.continue_stmt(fs),
            TokenKind::Return => self.return_stmt(fs),
            TokenKind::Function => self.function_decl_stmt(fs),
            _ => self.expr_or_assignment_stmt(fs),
        }
    }

    fn local_stmt(&mut self, fs: &mut FuncState) -> CResult<()> {
        self.advance(); // 'local'
        let before = fs.temp;

        let mut names = vec![self.expect_ident()?];
        while self.at(&TokenKind::Comma) {
            self.advance();
            names.push(self.expect_ident()?);
        }
        self.expect(TokenKind::Assign, "'='")?;

        let mut rhs = vec![self.expr(fs)?];
        while self.at(&TokenKind::Comma) {
            self.advance();
            rhs.push(self.expr(fs)?);
        }

        let values = self.spread_values(fs, &rhs, names.len())?;
        for (name, value_reg) in names.into_iter().zip(values) {
            let dest = fs.reg;
            if value_reg != dest && !(fs.is_temp(value_reg) && fs.try_retarget(value_reg, dest)) {
                fs.emit(Instruction::rrr(Opcode::Mov, dest, value_reg, 0), self.line());
            }
            if fs.is_temp(value_reg) {
                fs.free_temp();
            }
            fs.declare_local(name);
        }

        fs.free_temps(fs.temp.saturating_sub(before));
        Ok(())
    }

    fn expr_or_assignment_stmt(&mut self, fs: &mut FuncState) -> CResult<()> {
        let before = fs.temp;
        let (first_value, first_target) = self.primary_with_continuations(fs)?;

        if self.at(&TokenKind::Comma) || self.at(&TokenKind::Assign) {
            let mut targets = vec![first_target];
            while self.at(&TokenKind::Comma) {
                self.advance();
                let (_, target) = self.primary_with_continuations(fs)?;
                targets.push(target);
            }
            self.expect(TokenKind::Assign, "'='")?;

            let mut rhs = vec![self.expr(fs)?];
            while self.at(&TokenKind::Comma) {
                self.advance();
                rhs.push(self.expr(fs)?);
            }

            let want = targets.len();
            let values = self.spread_values(fs, &rhs, want)?;
            for (target, value_reg) in targets.into_iter().zip(values) {
                self.emit_store(fs, target, value_reg)?;
            }
        } else {
            // A bare expression statement (typically a call); its
            // value, if any, is simply discarded. Still allow a
            // trailing binary-operator chain for robustness.
            self.continue_binary(fs, first_value, 0)?;
        }

        fs.free_temps(fs.temp.saturating_sub(before));
        Ok(())
    }

    fn emit_store(&mut self, fs: &mut FuncState, target: Lvalue, value_reg: u8) -> CResult<()> {
        let line = self.line();
        match target {
            Lvalue::Local(reg) => {
                if value_reg != reg && !(fs.is_temp(value_reg) && fs.try_retarget(value_reg, reg)) {
                    fs.emit(Instruction::rrr(Opcode::Mov, reg, value_reg, 0), line);
                }
            }
            Lvalue::Env(key) => {
                fs.emit(Instruction::reg_lit(Opcode::Senv, value_reg, key), line);
            }
            Lvalue::Table { tab_reg, key_reg } => {
                fs.emit(Instruction::rrr(Opcode::Stab, tab_reg, key_reg, value_reg), line);
            }
            Lvalue::Invalid => {
                return Err(self.bail(
                    DiagnosticCode::E_PARSER_UNEXPECTED_TOKEN,
                    "invalid assignment target",
                ));
            }
        }
        Ok(())
    }

    /// Reconcile `rhs.len()` computed values against `want` identifiers
    /// or assignment targets: an exact match passes through, a short
    /// list raises the trailing call's
    /// declared return count (or pads with `nil` if the last
    /// expression isn't a call), and a long list discards the extras.
    fn spread_values(&mut self, fs: &mut FuncState, rhs: &[ExprResult], want: usize) -> CResult<Vec<u8>> {
        if rhs.len() == want {
            return Ok(rhs.iter().map(|r| r.reg).collect());
        }

        if rhs.len() < want {
            if let Some(last) = rhs.last() {
                if let Some(call_idx) = last.call_idx {
                    let new_nret = (want - rhs.len() + 1) as u8;
                    let mut regs: Vec<u8> = rhs[..rhs.len() - 1].iter().map(|r| r.reg).collect();
                    regs.extend(self.raise_call_returns(fs, call_idx, last.reg, new_nret));
                    return Ok(regs);
                }
            }
            let mut regs: Vec<u8> = rhs.iter().map(|r| r.reg).collect();
            while regs.len() < want {
                let t = fs.alloc_temp();
                fs.emit(Instruction::reg(Opcode::Nil, t), self.line());
                regs.push(t);
            }
            return Ok(regs);
        }

        let mut regs: Vec<u8> = rhs.iter().map(|r| r.reg).collect();
        while regs.len() > want {
            let extra = regs.pop().expect("checked len above");
            if fs.is_temp(extra) {
                fs.free_temp();
            }
        }
        Ok(regs)
    }

    /// Bump a `CALL`'s requested-return-count operand and claim the
    /// extra contiguous registers the caller now expects to read
    /// results out of.
    fn raise_call_returns(&mut self, fs: &mut FuncState, call_idx: usize, call_base: u8, new_nret: u8) -> Vec<u8> {
        let old_nret = fs.instructions[call_idx].src_b();
        fs.instructions[call_idx].set_src_b(new_nret);
        let mut regs = vec![call_base];
        for i in 1..old_nret {
            regs.push(call_base + i);
        }
        for _ in old_nret..new_nret {
            regs.push(fs.alloc_temp());
        }
        fs.bump_gc_height_from(call_idx);
        regs
    }

    fn if_stmt(&mut self, fs: &mut FuncState) -> CResult<()> {
        self.advance(); // 'if'
        let before = fs.temp;
        let cond = self.expr(fs)?;
        let line = self.line();
        fs.emit(Instruction::reg(Opcode::Cover, cond.reg), line);
        fs.free_temps(fs.temp.saturating_sub(before));

        let jmp_false = fs.emit(Instruction::offset(Opcode::Jmp, 0), line);
        self.expect(TokenKind::Then, "'then'")?;

        fs.push_scope();
        self.compile_block(fs, &[TokenKind::Else, TokenKind::End])?;
        fs.pop_scope();

        if self.at(&TokenKind::Else) {
            let jmp_end = fs.emit(Instruction::offset(Opcode::Jmp, 0), line);
            fs.patch_jump(jmp_false, fs.pc());
            self.advance(); // 'else'
            fs.push_scope();
            self.compile_block(fs, &[TokenKind::End])?;
            fs.pop_scope();
            fs.patch_jump(jmp_end, fs.pc());
        } else {
            fs.patch_jump(jmp_false, fs.pc());
        }

        self.expect(TokenKind::End, "'end'")
    }

    fn while_stmt(&mut self, fs: &mut FuncState) -> CResult<()> {
        self.advance(); // 'while'
        let cond_pc = fs.pc();
        fs.loops.push(LoopCtx { cond_pc, break_chain: None });

        let before = fs.temp;
        let cond = self.expr(fs)?;
        let line = self.line();
        fs.emit(Instruction::reg(Opcode::Cover, cond.reg), line);
        fs.free_temps(fs.temp.saturating_sub(before));

        let jmp_false = fs.emit(Instruction::offset(Opcode::Jmp, 0), line);
        self.expect(TokenKind::Do, "'do'")?;

        fs.push_scope();
        self.compile_block(fs, &[TokenKind::End])?;
        fs.pop_scope();

        let back_idx = fs.emit(Instruction::offset(Opcode::Jmp, 0), line);
        fs.patch_jump(back_idx, cond_pc);
        let post_pc = fs.pc();
        fs.patch_jump(jmp_false, post_pc);

        let ctx = fs.loops.pop().expect("just pushed");
        let mut cur = ctx.break_chain;
        while let Some(idx) = cur {
            let next_link = fs.instructions[idx].offset_operand();
            fs.patch_jump(idx, post_pc);
            cur = if next_link == -1 { None } else { Some(next_link as usize) };
        }

        self.expect(TokenKind::End, "'end'")
    }

    fn break_stmt(&mut self, fs: &mut FuncState) -> CResult<()> {
        let line = self.line();
        self.advance();
        if fs.loops.is_empty() {
            return Err(self.bail(DiagnosticCode::E_PARSER_NOT_IN_LOOP, "'break' outside a loop"));
        }
        let prev = fs.loops.last().expect("checked non-empty").break_chain;
        let link = prev.map(|i| i as i32).unwrap_or(-1);
        let idx = fs.emit(Instruction::offset(Opcode::Jmp, link), line);
        fs.loops.last_mut().expect("checked non-empty").break_chain = Some(idx);
        Ok(())
    }

    fn continue_stmt(&mut self, fs: &mut FuncState) -> CResult<()> {
        let line = self.line();
        self.advance();
        let Some(ctx) = fs.loops.last() else {
            return Err(self.bail(DiagnosticCode::E_PARSER_NOT_IN_LOOP, "'continue' outside a loop"));
        };
        let cond_pc = ctx.cond_pc;
        let idx = fs.emit(Instruction::offset(Opcode::Jmp, 0), line);
        fs.patch_jump(idx, cond_pc);
        Ok(())
    }

    fn return_stmt(&mut self, fs: &mut FuncState) -> CResult<()> {
        let line = self.line();
        self.advance(); // 'return'
        let base = fs.reg + fs.temp;
        let mut n: u8 = 0;
        if self.starts_expr() {
            loop {
                let v = self.expr(fs)?;
                self.to_temp(fs, v);
                n += 1;
                if self.at(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        fs.emit(Instruction::rrr(Opcode::Ret, base, n, 0), line);
        Ok(())
    }

    /// `function NAME (params) body end` desugars to an assignment of
    /// a function literal to `NAME`: the surface grammar has no
    /// separate function-declaration statement.
    fn function_decl_stmt(&mut self, fs: &mut FuncState) -> CResult<()> {
        let line = self.line();
        self.advance(); // 'function'
        let name = self.expect_ident()?;
        let before = fs.temp;
        let d = self.function_literal(fs)?;
        if let Some(reg) = fs.find_local(&name) {
            if reg != d && !(fs.is_temp(d) && fs.try_retarget(d, reg)) {
                fs.emit(Instruction::rrr(Opcode::Mov, reg, d, 0), line);
            }
        } else {
            let key = self.alloc_str_literal(fs, &name);
            fs.emit(Instruction::reg_lit(Opcode::Senv, d, key), line);
        }
        fs.free_temps(fs.temp.saturating_sub(before));
        Ok(())
    }

    // -- expressions ---------------------------------------------------

    fn expr(&mut self, fs: &mut FuncState) -> CResult<ExprResult> {
        let (left, _) = self.primary_with_continuations(fs)?;
        self.continue_binary(fs, left, 0)
    }

    fn continue_binary(&mut self, fs: &mut FuncState, mut left: ExprResult, min_prec: u8) -> CResult<ExprResult> {
        loop {
            let Some((op, prec)) = binop_info(&self.cur.kind) else {
                return Ok(left);
            };
            if prec < min_prec {
                return Ok(left);
            }
            let line = self.line();
            self.advance();
            let (rhs_primary, _) = self.primary_with_continuations(fs)?;
            let right = self.continue_binary(fs, rhs_primary, prec + 1)?;

            let a = left.reg;
            let b = right.reg;
            let dst = if fs.is_temp(a) {
                a
            } else if fs.is_temp(b) {
                b
            } else {
                fs.alloc_temp()
            };
            let instr = match op {
                BinOp::Add => Instruction::rrr(Opcode::Add, dst, a, b),
                BinOp::Sub => Instruction::rrr(Opcode::Sub, dst, a, b),
                BinOp::Mul => Instruction::rrr(Opcode::Mul, dst, a, b),
                BinOp::Gt => Instruction::rrr(Opcode::Gt, dst, a, b),
                BinOp::Ge => Instruction::rrr(Opcode::Ge, dst, a, b),
                // `<`/`<=` are encoded as `>`/`>=` with swapped operands.
                BinOp::Lt => Instruction::rrr(Opcode::Gt, dst, b, a),
                BinOp::Le => Instruction::rrr(Opcode::Ge, dst, b, a),
            };
            fs.emit(instr, line);
            left = ExprResult { reg: dst, call_idx: None };
        }
    }

    /// Ensure `v` lives in a register at the top of the temporary
    /// stack, for contexts that pack several values into consecutive
    /// registers (`CALL` arguments, `RET` values).
    fn to_temp(&mut self, fs: &mut FuncState, v: ExprResult) -> u8 {
        if fs.is_temp(v.reg) {
            v.reg
        } else {
            let t = fs.alloc_temp();
            fs.emit(Instruction::rrr(Opcode::Mov, t, v.reg, 0), self.line());
            t
        }
    }

    fn primary(&mut self, fs: &mut FuncState) -> CResult<(ExprResult, Lvalue)> {
        let line = self.line();
        if self.cur.kind.is_eof() {
            return Err(self.bail(DiagnosticCode::E_PARSER_UNEXPECTED_EOF, "unexpected end of file"));
        }
        match self.cur.kind.clone() {
            TokenKind::Nil => {
                self.advance();
                let d = fs.alloc_temp();
                fs.emit(Instruction::reg(Opcode::Nil, d), line);
                Ok((ExprResult { reg: d, call_idx: None }, Lvalue::Invalid))
            }
            TokenKind::Number(n) => {
                self.advance();
                let lit = self.alloc_number_literal(fs, n);
                let d = fs.alloc_temp();
                fs.emit(Instruction::reg_lit(Opcode::Setl, d, lit), line);
                Ok((ExprResult { reg: d, call_idx: None }, Lvalue::Invalid))
            }
            TokenKind::Str(bytes) => {
                self.advance();
                let lit = self.alloc_str_literal(fs, &bytes);
                let d = fs.alloc_temp();
                fs.emit(Instruction::reg_lit(Opcode::Setl, d, lit), line);
                Ok((ExprResult { reg: d, call_idx: None }, Lvalue::Invalid))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if let Some(reg) = fs.find_local(&name) {
                    Ok((ExprResult { reg, call_idx: None }, Lvalue::Local(reg)))
                } else {
                    let key = self.alloc_str_literal(fs, &name);
                    let d = fs.alloc_temp();
                    fs.emit(Instruction::reg_lit(Opcode::Genv, d, key), line);
                    Ok((ExprResult { reg: d, call_idx: None }, Lvalue::Env(key)))
                }
            }
            TokenKind::LBrace => {
                let v = self.table_constructor(fs)?;
                Ok((v, Lvalue::Invalid))
            }
            TokenKind::LParen => {
                self.advance();
                self.expect(TokenKind::Function, "'function'")?;
                let d = self.function_literal(fs)?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok((ExprResult { reg: d, call_idx: None }, Lvalue::Invalid))
            }
            _ => Err(self.bail(
                DiagnosticCode::E_PARSER_UNEXPECTED_TOKEN,
                "unexpected token in expression",
            )),
        }
    }

    /// Parse a primary expression plus any trailing `.field`,
    /// `[expr]` and `(args)` continuations, returning both its value
    /// and (for the last continuation seen) how to re-target it as an
    /// assignment destination.
    fn primary_with_continuations(&mut self, fs: &mut FuncState) -> CResult<(ExprResult, Lvalue)> {
        let (mut value, mut target) = self.primary(fs)?;
        loop {
            match self.cur.kind.clone() {
                TokenKind::Dot => {
                    let line = self.line();
                    self.advance();
                    let field = self.expect_ident()?;
                    let lit = self.alloc_str_literal(fs, &field);
                    let key_reg = fs.alloc_temp();
                    fs.emit(Instruction::reg_lit(Opcode::Setl, key_reg, lit), line);
                    let tab_reg = value.reg;
                    // GTAB reads its key before writing dst, so the key
                    // register can double as the result register.
                    fs.emit(Instruction::rrr(Opcode::Gtab, key_reg, tab_reg, key_reg), line);
                    target = Lvalue::Table { tab_reg, key_reg };
                    value = ExprResult { reg: key_reg, call_idx: None };
                }
                TokenKind::LBracket => {
                    let line = self.line();
                    self.advance();
                    let key = self.expr(fs)?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    let tab_reg = value.reg;
                    let dst = if fs.is_temp(key.reg) { key.reg } else { fs.alloc_temp() };
                    fs.emit(Instruction::rrr(Opcode::Gtab, dst, tab_reg, key.reg), line);
                    target = Lvalue::Table { tab_reg, key_reg: key.reg };
                    value = ExprResult { reg: dst, call_idx: None };
                }
                TokenKind::LParen => {
                    let line = self.line();
                    self.advance();
                    let call_base = if fs.is_temp(value.reg) {
                        value.reg
                    } else {
                        let t = fs.alloc_temp();
                        fs.emit(Instruction::rrr(Opcode::Mov, t, value.reg, 0), line);
                        t
                    };
                    let mut nargs: u8 = 0;
                    if !self.at(&TokenKind::RParen) {
                        loop {
                            let v = self.expr(fs)?;
                            self.to_temp(fs, v);
                            nargs += 1;
                            if self.at(&TokenKind::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, "')'")?;
                    let call_idx = fs.emit(Instruction::rrr(Opcode::Call, call_base, nargs, 1), line);
                    fs.free_temps(nargs);
                    target = Lvalue::Invalid;
                    value = ExprResult { reg: call_base, call_idx: Some(call_idx) };
                }
                _ => return Ok((value, target)),
            }
        }
    }

    fn table_constructor(&mut self, fs: &mut FuncState) -> CResult<ExprResult> {
        let line = self.line();
        self.advance(); // '{'
        let mut elems = Vec::new();
        if !self.at(&TokenKind::RBrace) {
            loop {
                elems.push(self.expr(fs)?);
                if self.at(&TokenKind::Comma) {
                    self.advance();
                    if self.at(&TokenKind::RBrace) {
                        break;
                    }
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;

        let seq_hint = seq_hint_for(elems.len() as u32);
        let dst = fs.alloc_temp();
        fs.emit(Instruction::rrr(Opcode::Tab, dst, 0, seq_hint), line);
        for e in elems {
            fs.emit(Instruction::rrr(Opcode::Ptab, dst, e.reg, 0), line);
        }
        Ok(ExprResult { reg: dst, call_idx: None })
    }

    /// Parses `'(' params ')' block 'end'`, the `'function'` keyword
    /// itself already consumed by the caller. Returns the register in
    /// the *enclosing* function holding the freshly loaded closure
    /// value.
    fn function_literal(&mut self, outer_fs: &mut FuncState) -> CResult<u8> {
        let line = self.line();
        self.expect(TokenKind::LParen, "'('")?;

        let mut fs = FuncState::new();
        fs.push_scope();
        if !self.at(&TokenKind::RParen) {
            loop {
                let name = self.expect_ident()?;
                fs.declare_local(name);
                fs.param_count += 1;
                if self.at(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        self.compile_block(&mut fs, &[TokenKind::End])?;
        self.ensure_trailing_return(&mut fs);
        fs.pop_scope();
        self.expect(TokenKind::End, "'end'")?;
        if fs.temp != 0 {
            return Err(self.bail_bug(
                DiagnosticCode::E_COMPILER_TEMP_IMBALANCE,
                "internal error: temporary register stack imbalance at function end",
            ));
        }

        let file = self.file.clone();
        let def_ref = self.heap.alloc::<FunctionDef>(|header| {
            let mut def = FunctionDef::new(header, file);
            def.instructions = fs.instructions;
            def.literals = fs.literals;
            def.max_reg = fs.max_reg;
            def.param_count = fs.param_count;
            def.lines = fs.lines;
            def.gc_height = fs.gc_height;
            def
        });
        // The environment a closure actually runs against is the
        // calling frame's environment at the moment it's created, not
        // a captured lexical upvalue; `SETL`/`CALL` replace this
        // placeholder each time the literal is loaded.
        let placeholder_env = self.heap.alloc::<Table>(|header| Table::new(header));
        let func_ref = self
            .heap
            .alloc::<Function>(|header| Function::bytecode(header, def_ref, placeholder_env));

        let lit = self.push_function_literal(outer_fs, Value::Function(func_ref));
        let d = outer_fs.alloc_temp();
        outer_fs.emit(Instruction::reg_lit(Opcode::Setl, d, lit), line);
        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(src: &str) -> GcRef<FunctionDef> {
        let handler = Handler::new();
        let heap = NuaHeap::new();
        compile(src.as_bytes(), "test.nua", &handler, &heap).expect("source should compile")
    }

    /// Every register operand an instruction reads or writes, given
    /// its payload shape.
    fn register_operands(instr: &Instruction) -> Vec<u8> {
        match instr.op() {
            Opcode::Nop | Opcode::Jmp => vec![],
            Opcode::Nil | Opcode::Cover => vec![instr.reg_operand()],
            Opcode::Setl | Opcode::Genv | Opcode::Senv => vec![instr.reg_operand()],
            Opcode::Mov | Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Gt | Opcode::Ge | Opcode::Gtab | Opcode::Stab => {
                vec![instr.dst(), instr.src_a(), instr.src_b()]
            }
            // `PTAB`'s src_b is unused padding, not a register.
            Opcode::Ptab => vec![instr.dst(), instr.src_a()],
            // `TAB`'s src_a/src_b are presizing hints, not registers.
            Opcode::Tab => vec![instr.dst()],
            // `CALL`'s src_a/src_b are argument/return counts, not registers.
            Opcode::Call => vec![instr.dst()],
            // `RET`'s src_a is the count of values returned, not a register.
            Opcode::Ret => vec![instr.dst()],
        }
    }

    fn assert_registers_and_jumps_in_bounds(def: &FunctionDef) {
        let len = def.instructions.len();
        for (pc, instr) in def.instructions.iter().enumerate() {
            // A zero-value `RET` reads no registers at all: its `dst`
            // is a base pointer the VM never dereferences when `n`
            // (src_a) is zero, so it may legally sit one past the
            // last valid register.
            if instr.op() == Opcode::Ret && instr.src_a() == 0 {
                continue;
            }
            for reg in register_operands(instr) {
                assert!(
                    reg < def.max_reg,
                    "register {reg} at pc {pc} is not < max_reg {}",
                    def.max_reg
                );
            }
            if instr.op() == Opcode::Jmp {
                let target = pc as i64 + 1 + instr.offset_operand() as i64;
                assert!(
                    target >= 0 && (target as usize) <= len,
                    "jump at pc {pc} targets {target}, out of [0, {len}]"
                );
            }
        }
    }

    #[test]
    fn arithmetic_program_keeps_registers_and_jumps_in_bounds() {
        let def = compile_ok("local x = 1 + 2 * 0 + 3");
        assert_registers_and_jumps_in_bounds(&def);
    }

    #[test]
    fn control_flow_program_keeps_registers_and_jumps_in_bounds() {
        let def = compile_ok("local i = 0 while i < 3 do i = i + 1 end if i then i = i end");
        assert_registers_and_jumps_in_bounds(&def);
    }

    #[test]
    fn functions_and_tables_keep_registers_and_jumps_in_bounds() {
        let def = compile_ok(
            "function add(a, b) return a + b end \
             local t = {1, 2, 3} \
             t[\"k\"] = add(1, 2)",
        );
        assert_registers_and_jumps_in_bounds(&def);
    }

    #[test]
    fn multi_assign_raises_call_return_count() {
        let def = compile_ok("function pair() return 1, 2 end local a, b = pair()");
        let call = def
            .instructions
            .iter()
            .find(|i| i.op() == Opcode::Call)
            .expect("a CALL was emitted");
        assert_eq!(call.src_b(), 2, "CALL's declared return count should be raised to 2");
        assert_registers_and_jumps_in_bounds(&def);
    }

    /// `max_reg` for a program of only scalar locals equals the
    /// deepest simultaneous live-local count, since each `local`
    /// declaration's single temporary is retargeted into its binding
    /// register rather than left allocated alongside it.
    #[quickcheck_macros::quickcheck]
    fn max_reg_matches_sequential_local_count(n: u8) -> bool {
        let n = (n % 20) + 1;
        let mut src = String::new();
        for i in 0..n {
            src.push_str(&format!("local v{i} = {i} "));
        }
        let def = compile_ok(&src);
        def.max_reg == n
    }

    #[test]
    fn break_outside_loop_is_a_compile_error() {
        let handler = Handler::new();
        let heap = NuaHeap::new();
        let result = compile(b"break", "test.nua", &handler, &heap);
        assert!(result.is_err());
        assert!(handler.has_errors());
    }

    #[test]
    fn continue_outside_loop_is_a_compile_error() {
        let handler = Handler::new();
        let heap = NuaHeap::new();
        let result = compile(b"continue", "test.nua", &handler, &heap);
        assert!(result.is_err());
    }
}
