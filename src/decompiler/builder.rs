//! Backward expression recovery.
//!
//! A statement span is decompiled back to front: the builder reads the
//! instruction before its cursor, moves the cursor back, and dispatches on
//! the opcode. Operators recurse once per popped operand, so the recursion
//! tree mirrors the VM's evaluation tree exactly; a span that does not
//! consume cleanly down to the statement's first instruction is a structural
//! error, not a guess.

use crate::bytecode::{Addr, ArgKind, DataKind, Instruction, Opcode, ResolvedNative, Script, ScriptKind};
use crate::error::DecompileError;

use super::expr::{format_float, Expr, Literal, Priority};
use super::natives_fmt;
use super::state::{FileCtx, ScriptPass, VarRef};
use super::types::{Type, TypeKind, VarId};

/// Backward builder over one statement span `[start..=end]`.
pub struct StmtBuilder<'a, 'b> {
    ctx: &'a mut FileCtx<'b>,
    pass: &'a mut ScriptPass<'b>,
    /// One past the next instruction to consume (walks down to `start`).
    cursor: Addr,
    start: Addr,
    /// Store target of the enclosing assignment, for compound-assignment
    /// recognition and literal typing.
    store_target: Option<VarId>,
    /// Current operand recursion depth; 1 = direct value of the statement.
    depth: usize,
    /// Operands re-ordered by a stack-reorder opcode, waiting to be consumed.
    pending: Vec<Expr>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry points
// ─────────────────────────────────────────────────────────────────────────────

/// Decompile a full statement span into its printed form.
pub fn build_statement<'b>(
    ctx: &mut FileCtx<'b>,
    pass: &mut ScriptPass<'b>,
    start: Addr,
    end: Addr,
) -> Result<String, DecompileError> {
    let fin = *pass.instr(end)?;
    let mut b = StmtBuilder::new(ctx, pass, start, end);
    let text = match fin.opcode {
        Opcode::PopI | Opcode::PopF | Opcode::PopB | Opcode::PopO | Opcode::PopC => {
            b.build_assignment(&fin, end)?
        }
        Opcode::Discard => {
            let e = b.build_expr()?;
            e.text
        }
        Opcode::Sleep => {
            let e = b.build_expr()?;
            format!("wait {}", e.text)
        }
        Opcode::Ret => {
            let e = b.build_expr()?;
            format!("return {}", e.text)
        }
        Opcode::Sys => b.build_native_statement(&fin, end)?,
        Opcode::Call => b.build_run_statement(&fin, end)?,
        _ => return Err(pass.err_unsupported(end)),
    };
    b.finish()?;
    Ok(text)
}

/// Decompile the guard of a conditional span ending in the jump at `end`.
pub fn build_guard<'b>(
    ctx: &mut FileCtx<'b>,
    pass: &mut ScriptPass<'b>,
    start: Addr,
    end: Addr,
) -> Result<Expr, DecompileError> {
    let mut b = StmtBuilder::new(ctx, pass, start, end);
    let cond = b.build_expr()?;
    b.finish()?;
    Ok(cond)
}

/// Decompile an `until` guard: the compiler negates the condition before the
/// conditional jump into the handler range, so a `Not` must sit on top.
pub fn build_until<'b>(
    ctx: &mut FileCtx<'b>,
    pass: &mut ScriptPass<'b>,
    start: Addr,
    end: Addr,
) -> Result<Expr, DecompileError> {
    let mut b = StmtBuilder::new(ctx, pass, start, end);
    let not_addr = b.cursor.wrapping_sub(1);
    let top = b.prev()?;
    if top.opcode != Opcode::Not {
        return Err(b.pass.err_unexpected(not_addr, "negated until guard"));
    }
    let cond = b.build_expr()?;
    b.finish()?;
    Ok(cond)
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder internals
// ─────────────────────────────────────────────────────────────────────────────

impl<'a, 'b> StmtBuilder<'a, 'b> {
    fn new(
        ctx: &'a mut FileCtx<'b>,
        pass: &'a mut ScriptPass<'b>,
        start: Addr,
        end: Addr,
    ) -> Self {
        Self {
            ctx,
            pass,
            cursor: end,
            start,
            store_target: None,
            depth: 0,
            pending: Vec::new(),
        }
    }

    /// Consume and return the instruction before the cursor.
    fn prev(&mut self) -> Result<Instruction, DecompileError> {
        if self.cursor == self.start {
            return Err(self
                .pass
                .err_unexpected(self.start, "more instructions in statement"));
        }
        self.cursor -= 1;
        Ok(*self.pass.instr(self.cursor)?)
    }

    /// The whole span must be consumed; leftovers mean the statement had a
    /// shape the builder did not understand.
    fn finish(self) -> Result<(), DecompileError> {
        if self.cursor != self.start {
            return Err(self
                .pass
                .err_unexpected(self.cursor - 1, "statement span fully consumed"));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────

    fn build_assignment(&mut self, fin: &Instruction, end: Addr) -> Result<String, DecompileError> {
        let target = self.expect_store_target(fin.opcode == Opcode::PopC)?;
        self.store_target = Some(target.id);

        let value = self.build_expr()?;
        let want = if fin.opcode == Opcode::PopC { 3 } else { 1 };
        if value.width != want {
            return Err(self.pass.err_unexpected(end, "value of the stored width"));
        }

        if self.ctx.track_types() {
            if let Some(src) = value.var {
                self.ctx.vars.add_assign_edge(src, target.id);
            }
            if let Some(ty) = value.ty.clone() {
                self.set_type_noticed(end, target.id, ty);
            }
        }

        if let Some(op) = value.compound {
            if value.lit.is_some_and(|l| l.is_one()) && (op == "+" || op == "-") {
                return Ok(format!("{}{}{}", target.display, op, op));
            }
            return Ok(format!("{} {}= {}", target.display, op, value.text));
        }

        let mut text = value.text;
        // An enum-typed target prints a bare integer value symbolically.
        if let (Some(Literal::Int(v)), Some(ty)) =
            (value.lit, self.ctx.vars.type_of(target.id).cloned())
        {
            if let Some(sym) = natives_fmt::typed_int_symbol(self.ctx, &ty, v) {
                text = sym;
            }
        }
        Ok(format!("{} = {}", target.display, text))
    }

    /// The instruction before a store must push the target's reference.
    fn expect_store_target(&mut self, whole: bool) -> Result<VarRef, DecompileError> {
        let addr = self.cursor.wrapping_sub(1);
        let instr = self.prev()?;
        if instr.opcode != Opcode::PushV || !instr.flags.is_ref() {
            return Err(self.pass.err_unexpected(addr, "store target reference"));
        }
        let raw = instr.payload.as_int().unwrap_or(-1);
        let script = self.pass.script;
        self.ctx
            .resolve_var(script, &self.pass.slots, raw, whole)
            .ok_or_else(|| self.pass.err_bad_var(addr, raw))
    }

    fn build_native_statement(
        &mut self,
        fin: &Instruction,
        end: Addr,
    ) -> Result<String, DecompileError> {
        let native = self.resolve_native(fin, end)?;
        let (args, extras) = self.decode_native_args(end, native)?;
        self.check_context(native, end);
        Ok(natives_fmt::render_native(
            self.ctx,
            &self.pass.script.name,
            end,
            native,
            &args,
            &extras,
        ))
    }

    fn build_run_statement(
        &mut self,
        fin: &Instruction,
        end: Addr,
    ) -> Result<String, DecompileError> {
        let (callee, args) = self.decode_call(fin, end)?;
        let name = callee.name.clone();
        if args.is_empty() {
            Ok(format!("run script {name}"))
        } else {
            let list: Vec<String> = args.iter().map(|a| a.text.clone()).collect();
            Ok(format!("run script {}({})", name, list.join(", ")))
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────

    fn build_expr(&mut self) -> Result<Expr, DecompileError> {
        if let Some(e) = self.pending.pop() {
            return Ok(e);
        }
        self.depth += 1;
        let result = self.build_expr_inner();
        self.depth -= 1;
        result
    }

    fn build_expr_inner(&mut self) -> Result<Expr, DecompileError> {
        let addr = self.cursor.wrapping_sub(1);
        let instr = self.prev()?;
        use Opcode::*;
        match instr.opcode {
            PushI => {
                let v = instr
                    .payload
                    .as_int()
                    .ok_or_else(|| self.pass.err_unexpected(addr, "integer payload"))?;
                Ok(Expr::atom(v.to_string())
                    .with_lit(Literal::Int(v))
                    .with_type(Type::new(TypeKind::Int)))
            }
            PushF => {
                let v = instr
                    .payload
                    .as_float()
                    .ok_or_else(|| self.pass.err_unexpected(addr, "float payload"))?;
                Ok(Expr::atom(format_float(v))
                    .with_lit(Literal::Float(v))
                    .with_type(Type::new(TypeKind::Float)))
            }
            PushB => {
                let v = instr
                    .payload
                    .as_bool()
                    .ok_or_else(|| self.pass.err_unexpected(addr, "bool payload"))?;
                Ok(Expr::atom(if v { "true" } else { "false" })
                    .with_lit(Literal::Bool(v))
                    .with_type(Type::new(TypeKind::Bool)))
            }
            PushO => {
                let v = instr.payload.as_int().unwrap_or(0);
                Ok(Expr::atom(v.to_string())
                    .with_lit(Literal::Int(v))
                    .with_type(Type::new(TypeKind::Object)))
            }
            PushV => {
                if instr.flags.is_ref() {
                    return Err(self.pass.err_unexpected(addr, "value operand"));
                }
                let raw = instr.payload.as_int().unwrap_or(-1);
                let width = instr.data_kind.width();
                let var = self
                    .ctx
                    .resolve_var(self.pass.script, &self.pass.slots, raw, width > 1)
                    .ok_or_else(|| self.pass.err_bad_var(addr, raw))?;
                let mut e = Expr::atom(var.display.clone())
                    .with_var(var.id)
                    .with_width(width);
                if let Some(ty) = self.ctx.vars.type_of(var.id) {
                    e = e.with_type(ty.clone());
                }
                Ok(e)
            }

            Add | Sub | Mul | Div | Mod | CAdd | CSub | CMul | CDiv => {
                self.build_binary_arith(&instr)
            }
            Neg | CNeg => {
                let operand = self.build_expr()?;
                Ok(Expr::unary("-", Priority::Unary, &operand))
            }
            Not => {
                let operand = self.build_expr()?;
                Ok(Expr::unary("not ", Priority::Not, &operand))
            }
            Eq | Ne | Lt | Le | Gt | Ge => self.build_comparison(&instr, addr),
            And | Or => {
                let prio = if instr.opcode == And {
                    Priority::And
                } else {
                    Priority::Or
                };
                let op = instr.opcode.operator_text().unwrap_or("and");
                let rhs = self.build_expr()?;
                let lhs = self.build_expr()?;
                Ok(Expr::binary(op, prio, &lhs, &rhs).with_type(Type::new(TypeKind::Bool)))
            }

            Cast => self.build_cast(&instr),

            Swap => {
                // The reorder swaps the two values beneath it; hand the
                // consumer the new top first, keep the other pending.
                let below = self.build_expr()?;
                let top = self.build_expr()?;
                self.pending.push(below);
                Ok(top)
            }

            Sys => {
                let native = self.resolve_native(&instr, addr)?;
                if !native.spec.has_return() {
                    return Err(self.pass.err_unexpected(addr, "value-returning native"));
                }
                let (args, extras) = self.decode_native_args(addr, native)?;
                self.check_context(native, addr);
                let width = if native.spec.ret == "coord" { 3 } else { 1 };
                let text = natives_fmt::render_native(
                    self.ctx,
                    &self.pass.script.name,
                    addr,
                    native,
                    &args,
                    &extras,
                );
                let mut e = Expr::atom(text).with_width(width);
                if let Some(ty) = natives_fmt::return_type(native.spec.ret) {
                    e = e.with_type(ty);
                }
                Ok(e)
            }

            Call => {
                let (callee, args) = self.decode_call(&instr, addr)?;
                if callee.kind != ScriptKind::Function {
                    return Err(self.pass.err_unexpected(addr, "function script"));
                }
                let list: Vec<String> = args.iter().map(|a| a.text.clone()).collect();
                Ok(Expr::atom(format!("{}({})", callee.name, list.join(", "))))
            }

            _ => Err(self.pass.err_unsupported(addr)),
        }
    }

    fn build_binary_arith(&mut self, instr: &Instruction) -> Result<Expr, DecompileError> {
        use Opcode::*;
        let at_top = self.depth == 1;
        let prio = match instr.opcode {
            Mul | Div | Mod | CMul | CDiv => Priority::MulDiv,
            _ => Priority::AddSub,
        };
        let op = instr.opcode.operator_text().unwrap_or("+");
        let rhs = self.build_expr()?;
        let lhs = self.build_expr()?;

        // The self-reference idiom: a read of the store target as the first
        // operand of the statement's top-level operator renders as compound
        // assignment instead of repeating the lvalue.
        if at_top && lhs.var.is_some() && lhs.var == self.store_target {
            let mut e = Expr::atom(rhs.text.clone()).with_width(lhs.width.max(rhs.width));
            e.lit = rhs.lit;
            e.ty = rhs.ty.clone();
            e.compound = Some(op);
            return Ok(e);
        }
        Ok(Expr::binary(op, prio, &lhs, &rhs))
    }

    fn build_comparison(
        &mut self,
        instr: &Instruction,
        addr: Addr,
    ) -> Result<Expr, DecompileError> {
        let op = instr.opcode.operator_text().unwrap_or("==");
        let mut rhs = self.build_expr()?;
        let mut lhs = self.build_expr()?;

        if self.ctx.track_types() {
            if let (Some(a), Some(b)) = (lhs.var, rhs.var) {
                // Equality and inequality tie the two variables' types.
                if matches!(instr.opcode, Opcode::Eq | Opcode::Ne) {
                    self.ctx.vars.add_equal_edge(a, b);
                }
            }
            // A typed side re-renders a bare integer on the other side.
            self.retype_literal_side(addr, &lhs.clone(), &mut rhs);
            self.retype_literal_side(addr, &rhs.clone(), &mut lhs);
        }

        Ok(Expr::binary(op, Priority::Compare, &lhs, &rhs).with_type(Type::new(TypeKind::Bool)))
    }

    /// When one side of a comparison has a known enum-like type, print the
    /// other side's integer literal symbolically and record the type on the
    /// literal's variable-free expression.
    fn retype_literal_side(&mut self, addr: Addr, typed: &Expr, lit_side: &mut Expr) {
        let Some(ty) = typed.ty.clone().or_else(|| {
            typed
                .var
                .and_then(|v| self.ctx.vars.type_of(v).cloned())
        }) else {
            return;
        };
        if let Some(var) = lit_side.var {
            // Comparing a typed value against another variable types it too.
            self.set_type_noticed(addr, var, ty);
            return;
        }
        if let Some(Literal::Int(v)) = lit_side.lit {
            if let Some(sym) = natives_fmt::typed_int_symbol(self.ctx, &ty, v) {
                lit_side.text = sym;
            }
        }
    }

    fn build_cast(&mut self, instr: &Instruction) -> Result<Expr, DecompileError> {
        if instr.data_kind == DataKind::Coord {
            // Three scalars aggregate into a coordinate literal.
            let z = self.build_expr()?;
            let y = self.build_expr()?;
            let x = self.build_expr()?;
            Ok(
                Expr::atom(format!("[{}, {}, {}]", x.text, y.text, z.text))
                    .with_width(3)
                    .with_type(Type::new(TypeKind::Coord)),
            )
        } else {
            // Scalar reinterpretation is invisible in the surface grammar.
            let mut e = self.build_expr()?;
            e.ty = match instr.data_kind {
                DataKind::Int => Some(Type::new(TypeKind::Int)),
                DataKind::Bool => Some(Type::new(TypeKind::Bool)),
                DataKind::Object => Some(Type::new(TypeKind::Object)),
                _ => e.ty,
            };
            Ok(e)
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Calls
    // ─────────────────────────────────────────────────────────────────────

    fn resolve_native(
        &self,
        instr: &Instruction,
        addr: Addr,
    ) -> Result<ResolvedNative<'b>, DecompileError> {
        let code = instr.payload.as_int().unwrap_or(-1);
        usize::try_from(code)
            .ok()
            .and_then(|id| self.ctx.bank.natives.lookup(id))
            .ok_or_else(|| DecompileError::InvalidNativeFunction {
                script: self.pass.script.name.clone(),
                address: addr,
                instruction: *instr,
                code,
            })
    }

    /// Decode a native's arguments backward: the variable-arity tail first
    /// (its pushed count, then that many cells), then the declared slots
    /// right to left.
    fn decode_native_args(
        &mut self,
        addr: Addr,
        native: ResolvedNative<'b>,
    ) -> Result<(Vec<Expr>, Vec<Expr>), DecompileError> {
        let specs = native.spec.arg_specs();

        let mut extras = Vec::new();
        if native.spec.varargs {
            let count_addr = self.cursor.wrapping_sub(1);
            let count_instr = self.prev()?;
            let n = match (count_instr.opcode, count_instr.payload.as_int()) {
                (Opcode::PushI, Some(n)) if n >= 0 => n as usize,
                _ => {
                    return Err(self
                        .pass
                        .err_unexpected(count_addr, "pushed integer argument count"))
                }
            };
            for _ in 0..n {
                extras.push(self.build_expr()?);
            }
            extras.reverse();
        }

        let mut args: Vec<Option<Expr>> = specs.iter().map(|_| None).collect();
        for i in (0..specs.len()).rev() {
            let e = self.build_expr()?;
            if e.width != specs[i].kind.width() {
                return Err(self.pass.err_unexpected(addr, "argument of declared width"));
            }
            args[i] = Some(e);
        }
        let args: Vec<Expr> = args.into_iter().flatten().collect();

        if self.ctx.track_types() {
            for (spec, e) in specs.iter().zip(args.iter()) {
                if let (Some(var), Some(ty)) = (e.var, natives_fmt::slot_type(spec)) {
                    if spec.kind != ArgKind::Float {
                        self.set_type_noticed(addr, var, ty);
                    }
                }
            }
        }
        Ok((args, extras))
    }

    /// Decode a user-script call: the callee's parameter count fixes the pop
    /// count. Argument variables flow into the callee's formals.
    fn decode_call(
        &mut self,
        instr: &Instruction,
        addr: Addr,
    ) -> Result<(&'b Script, Vec<Expr>), DecompileError> {
        let id = instr.payload.as_int().unwrap_or(-1);
        let callee = u32::try_from(id)
            .ok()
            .and_then(|id| self.ctx.bank.script_by_id(id))
            .ok_or_else(|| DecompileError::InvalidScriptId {
                script: self.pass.script.name.clone(),
                address: addr,
                instruction: *instr,
                id,
            })?;

        let count = callee.param_count as usize;
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            args.push(self.build_expr()?);
        }
        args.reverse();

        if self.ctx.track_types() {
            for (index, arg) in args.iter().enumerate() {
                if let (Some(src), Some(param)) = (arg.var, self.ctx.param_var(callee, index)) {
                    self.ctx.vars.add_assign_edge(src, param);
                }
            }
        }
        Ok((callee, args))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────

    fn check_context(&mut self, native: ResolvedNative<'_>, addr: Addr) {
        let ok = match native.spec.context {
            "camera" => self.pass.inside_camera,
            "dialogue" => self.pass.inside_dialogue,
            "either" => self.pass.inside_camera || self.pass.inside_dialogue,
            _ => true,
        };
        if !ok {
            let message = format!(
                "{} requires a {} block",
                native.name, native.spec.context
            );
            let script = self.pass.script.name.clone();
            self.ctx.warn(&script, Some(addr), message);
        }
    }

    fn set_type_noticed(&mut self, addr: Addr, var: VarId, ty: Type) {
        use super::types::MergeOutcome;
        if let MergeOutcome::Conflict { old, new } = self.ctx.vars.set_var_type(var, ty) {
            let name = self.ctx.vars.get(var).name.clone();
            let script = self.pass.script.name.clone();
            self.ctx.warn(
                &script,
                Some(addr),
                format!("conflicting types for '{name}' ({old:?} vs {new:?}); treating as unknown"),
            );
        }
    }
}
