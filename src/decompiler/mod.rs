//! Decompiler for reconstructing SceneScript source from scene-bank bytecode.
//!
//! One script is decompiled at a time, start to finish. The driver loop
//! alternates two walks over the instruction stream: the stack simulator
//! runs forward to find where the next statement ends, then the expression
//! builder runs backward across that span, folding jump idioms into
//! structured blocks and recording type edges as it goes.
//!
//! # Module Structure
//!
//! - `stack`: operand-stack simulation and statement-end scanning
//! - `builder`: backward recursive-descent expression recovery
//! - `blocks`: open-construct records matched against jump geometry
//! - `types`: the type lattice and the variable value-flow graph
//! - `natives_fmt`: template-driven native-call formatting, pseudo-blocks
//! - `state`: the explicit per-file and per-script context values

mod blocks;
mod builder;
mod expr;
mod natives_fmt;
mod stack;
mod state;
mod types;

pub use blocks::{innermost_handler, Block, BlockKind};
pub use expr::{format_float, Expr, Literal, Priority};
pub use stack::{ends_statement, find_statement_end, SimError, SimStack, StackVal};
pub use state::{Checkpoint, FileCtx, Notice, NoticeSeverity, ScriptPass, VarRef};
pub use types::{MergeOutcome, Type, TypeKind, TypeSlot, Var, VarId, VarOwner, VarStore};

use crate::bytecode::{Addr, GlobalInit, Opcode, Script, ScriptBank};
use crate::error::DecompileError;
use crate::tables::GameTables;
use crate::writer::{render_global, render_script, ScriptSource, WriterOptions};
use crate::{DecompilerOptions, Effort};

/// Sweep budget of the global type-resolution fixpoint.
const MAX_TYPE_SWEEPS: usize = 8;

/// Everything recovered from one bank.
#[derive(Debug, Clone)]
pub struct BankOutput {
    pub scripts: Vec<ScriptSource>,
    pub globals: Vec<GlobalInit>,
    pub notices: Vec<Notice>,
}

impl BankOutput {
    /// Render globals and scripts into one source text.
    pub fn render(&self, opts: &WriterOptions) -> String {
        let mut out = String::new();
        for global in &self.globals {
            out.push_str(&render_global(global));
            out.push('\n');
        }
        for src in &self.scripts {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&render_script(src, opts));
        }
        out
    }

    /// Lines of the named script, for tests and tools.
    pub fn script_lines(&self, name: &str) -> Vec<&str> {
        self.scripts
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.lines.iter().map(|l| l.text.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Decompile every script of a bank.
///
/// Errors unwind one script at a time: a failed script contributes its
/// partial output plus a warning, and the driver moves on to the next.
pub fn decompile_bank(
    bank: &ScriptBank,
    tables: &GameTables,
    options: &DecompilerOptions,
) -> BankOutput {
    let mut ctx = FileCtx::new(bank, tables, options);

    // Optional seeding pre-pass: walk everything with output suppressed so
    // cross-script type edges exist before anything is printed.
    if options.effort >= Effort::Full {
        ctx.suppress_notices = true;
        for script in &bank.scripts {
            let _ = run_script(&mut ctx, script, true);
        }
        ctx.suppress_notices = false;
        resolve_types_noticed(&mut ctx);
    }

    let mut scripts = Vec::with_capacity(bank.scripts.len());
    for script in &bank.scripts {
        let (src, error) = run_script(&mut ctx, script, false);
        if let Some(e) = error {
            let message = format!("decompilation aborted: {e}");
            ctx.warn(&script.name, None, message);
        }
        scripts.push(src);
    }

    if options.effort >= Effort::Standard {
        resolve_types_noticed(&mut ctx);
    }

    tracing::info!(
        scripts = scripts.len(),
        notices = ctx.notices.len(),
        "bank decompiled"
    );
    BankOutput {
        scripts,
        globals: bank.globals.clone(),
        notices: ctx.notices,
    }
}

fn resolve_types_noticed(ctx: &mut FileCtx<'_>) {
    for (id, old, new) in ctx.vars.resolve_types(MAX_TYPE_SWEEPS) {
        let name = ctx.vars.get(id).name.clone();
        ctx.warn(
            "",
            None,
            format!("conflicting types for '{name}' ({old:?} vs {new:?}); treating as unknown"),
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Per-script driver
// ═══════════════════════════════════════════════════════════════════════════

enum Flow {
    Continue,
    Done,
}

/// Decompile one script. Returns its (possibly partial) source and the error
/// that stopped it, if any.
fn run_script<'a>(
    ctx: &mut FileCtx<'a>,
    script: &'a Script,
    suppress: bool,
) -> (ScriptSource, Option<DecompileError>) {
    let source_of = |lines| ScriptSource {
        name: script.name.clone(),
        kind: script.kind,
        params: script.param_names().to_vec(),
        locals: script
            .slots()
            .into_iter()
            .filter(|d| d.slot >= script.param_count as usize)
            .collect(),
        lines,
    };

    let Some(mut pass) = ScriptPass::new(ctx.bank, script, suppress) else {
        ctx.warn(&script.name, None, "script has no terminating End");
        return (source_of(Vec::new()), None);
    };

    let mut error = None;
    loop {
        match step(ctx, &mut pass) {
            Ok(Flow::Continue) => {
                if pass.cursor > pass.last {
                    // Ran off the end without the terminating End.
                    error = Some(pass.err_unsupported(pass.last));
                    break;
                }
            }
            Ok(Flow::Done) => break,
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }

    if error.is_none() {
        if pass.blocks.len() > 1 {
            ctx.warn(
                &script.name,
                Some(pass.cursor),
                format!("{} block(s) still open at script end", pass.blocks.len() - 1),
            );
        }
        if pass.stack.depth() != 0 {
            ctx.warn(
                &script.name,
                Some(pass.cursor),
                format!("operand stack depth {} at script end", pass.stack.depth()),
            );
        }
    }
    (source_of(pass.lines), error)
}

/// Process one boundary event or one statement.
fn step<'b>(ctx: &mut FileCtx<'b>, pass: &mut ScriptPass<'b>) -> Result<Flow, DecompileError> {
    if handle_boundary(ctx, pass)? {
        return Ok(Flow::Continue);
    }

    let instr = *pass.instr(pass.cursor)?;
    match instr.opcode {
        Opcode::End => {
            if pass.cursor == pass.last {
                Ok(Flow::Done)
            } else {
                Err(pass.err_unsupported(pass.cursor))
            }
        }
        Opcode::Except => {
            open_except(ctx, pass)?;
            Ok(Flow::Continue)
        }
        Opcode::IterExcept => {
            close_while(pass)?;
            Ok(Flow::Continue)
        }
        Opcode::Jmp => {
            clause_exit_jump(pass)?;
            Ok(Flow::Continue)
        }
        _ => generic_statement(ctx, pass),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Block boundaries
// ─────────────────────────────────────────────────────────────────────────────

/// Close or transition the top block when the cursor sits on its boundary.
fn handle_boundary<'b>(
    ctx: &mut FileCtx<'b>,
    pass: &mut ScriptPass<'b>,
) -> Result<bool, DecompileError> {
    let top = pass.current_block().clone();
    match top.kind {
        BlockKind::If | BlockKind::Elsif if pass.cursor == top.end => {
            if top.end == top.far_end {
                pass.indent -= 1;
                pass.emit(pass.indent, "end if", 0);
                pass.blocks.pop();
            } else {
                clause_transition(ctx, pass, &top)?;
            }
            Ok(true)
        }
        BlockKind::Else if pass.cursor == top.end => {
            pass.indent -= 1;
            pass.emit(pass.indent, "end if", 0);
            pass.blocks.pop();
            Ok(true)
        }
        BlockKind::Loop if pass.cursor == top.end => {
            close_loop(pass, &top)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Reinterpret the clause boundary of an if-chain as `elsif` or `else`.
///
/// The compiler leaves a synthetic always-true guard on an `else` clause;
/// its conditional jump lands on the chain's merge point.
fn clause_transition<'b>(
    ctx: &mut FileCtx<'b>,
    pass: &mut ScriptPass<'b>,
    top: &Block,
) -> Result<(), DecompileError> {
    let start = pass.cursor;
    let end = scan_statement(pass, start)?;
    let jz = *pass.instr(end)?;
    if jz.opcode != Opcode::Jz || !jz.flags.is_forward() {
        return Err(pass.err_unexpected(end, "clause guard jump"));
    }
    let target = jz
        .target()
        .ok_or_else(|| pass.err_unexpected(end, "jump target"))?;
    let first = *pass.instr(start)?;

    let synthetic = end == start + 1
        && first.opcode == Opcode::PushB
        && first.flags.is_synthetic()
        && first.payload.as_bool() == Some(true);

    let idx = pass.blocks.len() - 1;
    if synthetic {
        if target != top.far_end {
            return Err(pass.err_unexpected(end, "jump to the chain merge point"));
        }
        pass.emit(pass.indent - 1, "else", first.line);
        pass.blocks[idx].kind = BlockKind::Else;
        pass.blocks[idx].end = target;
    } else {
        let cond = builder::build_guard(ctx, pass, start, end)?;
        pass.emit(pass.indent - 1, format!("elsif {}", cond.text), first.line);
        pass.blocks[idx].kind = BlockKind::Elsif;
        pass.blocks[idx].end = target;
    }
    pass.cursor = end + 1;
    Ok(())
}

/// A forward jump just before an if/elsif clause boundary exits the clause
/// to the chain's merge point. Discover or verify the merge point, then step
/// over it.
fn clause_exit_jump(pass: &mut ScriptPass<'_>) -> Result<(), DecompileError> {
    let instr = *pass.instr(pass.cursor)?;
    let top = pass.current_block().clone();
    let at_clause_end = matches!(top.kind, BlockKind::If | BlockKind::Elsif)
        && instr.flags.is_forward()
        && pass.cursor + 1 == top.end;
    if !at_clause_end {
        return Err(pass.err_unsupported(pass.cursor));
    }
    let far = instr
        .target()
        .ok_or_else(|| pass.err_unexpected(pass.cursor, "jump target"))?;
    let idx = pass.blocks.len() - 1;
    if top.far_end == top.end {
        pass.blocks[idx].far_end = far;
    } else if top.far_end != far {
        return Err(pass.err_unexpected(pass.cursor, "jump to the chain merge point"));
    }
    pass.cursor += 1;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Exception-built loops
// ─────────────────────────────────────────────────────────────────────────────

/// An exception-start opens a loop when its handler target sits right after
/// an unconditional backward jump to the construct's own begin; otherwise it
/// opens a while whose guard follows immediately.
fn open_except<'b>(ctx: &mut FileCtx<'b>, pass: &mut ScriptPass<'b>) -> Result<(), DecompileError> {
    let begin = pass.cursor;
    let instr = *pass.instr(begin)?;
    let handler = instr
        .target()
        .ok_or_else(|| pass.err_unexpected(begin, "handler address"))?;

    let loop_idiom = handler >= 1
        && pass.bank.instruction(handler - 1).is_some_and(|j| {
            j.opcode == Opcode::Jmp && !j.flags.is_forward() && j.target() == Some(begin)
        });

    if loop_idiom {
        pass.emit(pass.indent, "begin loop", instr.line);
        pass.blocks.push(Block::open_loop(begin, handler - 1, handler));
        pass.indent += 1;
        pass.cursor = begin + 1;
        return Ok(());
    }

    let start = begin + 1;
    let end = scan_statement(pass, start)?;
    let jz = *pass.instr(end)?;
    if jz.opcode != Opcode::Jz || !jz.flags.is_forward() {
        return Err(pass.err_unexpected(end, "loop exit jump"));
    }
    let exit = jz
        .target()
        .ok_or_else(|| pass.err_unexpected(end, "jump target"))?;
    if exit > pass.last {
        return Err(pass.err_unsupported(end));
    }
    let cond = builder::build_guard(ctx, pass, start, end)?;
    pass.emit(pass.indent, format!("while {}", cond.text), instr.line);
    pass.blocks.push(Block::open_while(begin, exit, handler));
    pass.indent += 1;
    pass.cursor = end + 1;
    Ok(())
}

/// Close a loop at its backward jump, then step over the handler: the
/// iterate-exception and any until stubs are subsumed by `end loop`.
fn close_loop(pass: &mut ScriptPass<'_>, top: &Block) -> Result<(), DecompileError> {
    let jmp = *pass.instr(pass.cursor)?;
    if jmp.opcode != Opcode::Jmp || jmp.flags.is_forward() || jmp.target() != Some(top.begin) {
        return Err(pass.err_unexpected(pass.cursor, "backward jump to loop begin"));
    }
    let handler = top
        .handler_begin
        .ok_or_else(|| pass.err_unsupported(pass.cursor))?;
    let iter = *pass.instr(handler)?;
    if iter.opcode != Opcode::IterExcept {
        return Err(pass.err_unexpected(handler, "iterate-exception in loop handler"));
    }
    pass.indent -= 1;
    pass.emit(pass.indent, "end loop", 0);
    pass.blocks.pop();
    pass.cursor = skip_handler_stubs(pass, handler + 1);
    Ok(())
}

/// An iterate-exception in normal flow closes the current while: verify the
/// release sequence behind it and resume past the handler.
fn close_while(pass: &mut ScriptPass<'_>) -> Result<(), DecompileError> {
    let iter_addr = pass.cursor;
    let top = pass.current_block().clone();
    if top.kind != BlockKind::While {
        return Err(pass.err_unsupported(iter_addr));
    }
    if iter_addr + 1 != top.end {
        return Err(pass.err_unexpected(iter_addr, "loop exit right after iterate-exception"));
    }
    let release = *pass.instr(top.end)?;
    if release.opcode != Opcode::EndExcept || !release.flags.frees_handler() {
        return Err(pass.err_unexpected(top.end, "handler release"));
    }
    let jmp = *pass.instr(top.end + 1)?;
    if jmp.opcode != Opcode::Jmp || !jmp.flags.is_forward() {
        return Err(pass.err_unexpected(top.end + 1, "jump past the handler"));
    }
    let after = jmp
        .target()
        .ok_or_else(|| pass.err_unexpected(top.end + 1, "jump target"))?;
    pass.indent -= 1;
    pass.emit(pass.indent, "end while", 0);
    pass.blocks.pop();
    pass.cursor = after;
    Ok(())
}

/// Until stubs are `BrkExcept; Jmp` pairs inside the handler range.
fn skip_handler_stubs(pass: &ScriptPass<'_>, mut addr: Addr) -> Addr {
    while pass
        .bank
        .instruction(addr)
        .is_some_and(|i| i.opcode == Opcode::BrkExcept)
        && pass
            .bank
            .instruction(addr + 1)
            .is_some_and(|i| i.opcode == Opcode::Jmp && i.flags.is_forward())
    {
        addr += 2;
    }
    addr
}

// ─────────────────────────────────────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────────────────────────────────────

fn scan_statement(pass: &mut ScriptPass<'_>, start: Addr) -> Result<Addr, DecompileError> {
    let result = find_statement_end(&mut pass.stack, pass.bank, start, pass.last);
    result.map_err(|(addr, e)| pass.err_sim(addr, e))
}

fn generic_statement<'b>(
    ctx: &mut FileCtx<'b>,
    pass: &mut ScriptPass<'b>,
) -> Result<Flow, DecompileError> {
    let start = pass.cursor;
    let end = scan_statement(pass, start)?;
    let fin = *pass.instr(end)?;

    match fin.opcode {
        Opcode::Jz => handle_jz(ctx, pass, start, end),
        Opcode::Sys => handle_sys(ctx, pass, start, end),
        _ => {
            let text = builder::build_statement(ctx, pass, start, end)?;
            pass.emit(pass.indent, text, fin.line);
            pass.cursor = end + 1;
            Ok(Flow::Continue)
        }
    }
}

/// A conditional jump at statement level is a pseudo-block opener (busy
/// retry), an `until` clause (target inside the registered handler range),
/// or a fresh `if`.
fn handle_jz<'b>(
    ctx: &mut FileCtx<'b>,
    pass: &mut ScriptPass<'b>,
    start: Addr,
    end: Addr,
) -> Result<Flow, DecompileError> {
    let fin = *pass.instr(end)?;
    let target = fin
        .target()
        .ok_or_else(|| pass.err_unexpected(end, "jump target"))?;

    if !fin.flags.is_forward() && target == start {
        if let Some((kind, resume)) = natives_fmt::match_pseudo_open(ctx, pass, start, end)? {
            let first = *pass.instr(start)?;
            pass.emit(pass.indent, natives_fmt::pseudo_keyword(kind, true), first.line);
            pass.blocks.push(Block::pseudo(kind, start));
            pass.indent += 1;
            apply_pseudo_flags(pass, kind, true);
            pass.cursor = resume;
            return Ok(Flow::Continue);
        }
        return Err(pass.err_unsupported(start));
    }

    if let Some(handler) = innermost_handler(&pass.blocks) {
        let is_until = target >= handler
            && pass
                .bank
                .instruction(target)
                .is_some_and(|i| i.opcode == Opcode::BrkExcept);
        if is_until {
            let first = *pass.instr(start)?;
            let cond = builder::build_until(ctx, pass, start, end)?;
            pass.emit(pass.indent, format!("until {}", cond.text), first.line);
            pass.cursor = end + 1;
            return Ok(Flow::Continue);
        }
    }

    if !fin.flags.is_forward() || target > pass.last {
        // A jump out of the script is a truncated or corrupted stream;
        // report it rather than emit wrong nesting.
        return Err(pass.err_unsupported(end));
    }
    let first = *pass.instr(start)?;
    let cond = builder::build_guard(ctx, pass, start, end)?;
    pass.emit(pass.indent, format!("if {}", cond.text), first.line);
    pass.blocks.push(Block::open_if(start, target));
    pass.indent += 1;
    pass.cursor = end + 1;
    Ok(Flow::Continue)
}

/// A native statement may close the current pseudo-block or open a
/// marker-driven one; everything else is template-formatted.
fn handle_sys<'b>(
    ctx: &mut FileCtx<'b>,
    pass: &mut ScriptPass<'b>,
    start: Addr,
    end: Addr,
) -> Result<Flow, DecompileError> {
    let fin = *pass.instr(end)?;

    if pass.current_block().kind.is_pseudo() {
        if let Some((kind, resume)) = natives_fmt::match_pseudo_close(ctx, pass, start, end)? {
            pass.indent -= 1;
            pass.emit(pass.indent, natives_fmt::pseudo_keyword(kind, false), fin.line);
            pass.blocks.pop();
            apply_pseudo_flags(pass, kind, false);
            pass.cursor = resume;
            return Ok(Flow::Continue);
        }
    }

    let marker = fin
        .payload
        .as_int()
        .and_then(|id| usize::try_from(id).ok())
        .and_then(|id| pass.bank.natives.name_of(id))
        .and_then(natives_fmt::marker_open);

    let text = builder::build_statement(ctx, pass, start, end)?;
    pass.emit(pass.indent, text, fin.line);
    if let Some(kind) = marker {
        pass.blocks.push(Block::pseudo(kind, start));
        pass.indent += 1;
    }
    pass.cursor = end + 1;
    Ok(Flow::Continue)
}

fn apply_pseudo_flags(pass: &mut ScriptPass<'_>, kind: BlockKind, open: bool) {
    match kind {
        BlockKind::Dialogue => pass.inside_dialogue = open,
        BlockKind::Camera | BlockKind::Cinema => {
            pass.inside_camera = open;
            pass.inside_dialogue = open;
        }
        _ => {}
    }
}
