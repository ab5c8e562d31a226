//! Decompilation state.
//!
//! No ambient instance state: everything a pass mutates travels in one of
//! two explicit context values. `FileCtx` holds the per-file tables shared
//! by every script (variable store, loaded symbol tables, notices);
//! `ScriptPass` holds the per-script cursor, simulated stack, block stack
//! and output lines. Speculative idiom matching snapshots and restores the
//! pass state instead of throwing.

use crate::bytecode::{
    fold_slots, resolve_slot, Addr, DataKind, InstrFlags, Instruction, Opcode, Payload, Script,
    ScriptBank, SlotDecl,
};
use crate::error::DecompileError;
use crate::tables::GameTables;
use crate::writer::SourceLine;
use crate::{DecompilerOptions, Effort};

use super::blocks::Block;
use super::stack::{SimError, SimStack};
use super::types::{VarId, VarOwner, VarStore};

// ═══════════════════════════════════════════════════════════════════════════
// Notices
// ═══════════════════════════════════════════════════════════════════════════

/// Severity of a soft failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeSeverity {
    Note,
    Warning,
}

/// A soft failure: reported, never aborts decompilation.
#[derive(Debug, Clone)]
pub struct Notice {
    pub severity: NoticeSeverity,
    pub script: String,
    pub address: Option<Addr>,
    pub message: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// Per-file context
// ═══════════════════════════════════════════════════════════════════════════

/// A resolved variable reference: store identity plus display text.
#[derive(Debug, Clone)]
pub struct VarRef {
    pub id: VarId,
    pub display: String,
}

/// State shared by every script of one bank.
pub struct FileCtx<'a> {
    pub bank: &'a ScriptBank,
    pub tables: &'a GameTables,
    pub options: &'a DecompilerOptions,
    pub vars: VarStore,
    pub notices: Vec<Notice>,
    /// Set during the seeding pre-pass so it stays silent.
    pub suppress_notices: bool,
    global_slots: Vec<SlotDecl>,
}

impl<'a> FileCtx<'a> {
    pub fn new(
        bank: &'a ScriptBank,
        tables: &'a GameTables,
        options: &'a DecompilerOptions,
    ) -> Self {
        let names: Vec<String> = bank.globals.iter().map(|g| g.name.clone()).collect();
        let global_slots = fold_slots(&names);
        let mut vars = VarStore::new();
        for decl in &global_slots {
            vars.intern(VarOwner::Global, &decl.name, decl.slot, decl.size);
        }
        Self {
            bank,
            tables,
            options,
            vars,
            notices: Vec::new(),
            suppress_notices: false,
            global_slots,
        }
    }

    /// Whether type edges are recorded at all at this effort level.
    pub fn track_types(&self) -> bool {
        self.options.effort >= Effort::Low
    }

    pub fn warn(&mut self, script: &str, address: Option<Addr>, message: impl Into<String>) {
        self.push_notice(NoticeSeverity::Warning, script, address, message.into());
    }

    pub fn note(&mut self, script: &str, address: Option<Addr>, message: impl Into<String>) {
        self.push_notice(NoticeSeverity::Note, script, address, message.into());
    }

    fn push_notice(
        &mut self,
        severity: NoticeSeverity,
        script: &str,
        address: Option<Addr>,
        message: String,
    ) {
        if self.suppress_notices {
            return;
        }
        match severity {
            NoticeSeverity::Warning => tracing::warn!(script, ?address, "{message}"),
            NoticeSeverity::Note => tracing::debug!(script, ?address, "{message}"),
        }
        self.notices.push(Notice {
            severity,
            script: script.to_string(),
            address,
            message,
        });
    }

    /// Resolve a raw variable id of `script` to its variable and display
    /// text. Ids below the script's visible-global count address the global
    /// table, the rest its local table. `whole` accesses take the slot run
    /// as one value (coordinate reads and stores) and print the bare name;
    /// element accesses into a sentinel-declared array print `name[index]`.
    pub fn resolve_var(
        &mut self,
        script: &Script,
        slots: &[SlotDecl],
        raw: i32,
        whole: bool,
    ) -> Option<VarRef> {
        let raw = usize::try_from(raw).ok()?;
        let (owner, slot) = if raw < script.visible_globals as usize {
            (VarOwner::Global, raw)
        } else {
            (
                VarOwner::Script(script.id),
                raw - script.visible_globals as usize,
            )
        };
        let decls: &[SlotDecl] = match owner {
            VarOwner::Global => &self.global_slots,
            VarOwner::Script(_) => slots,
        };
        let (decl, offset) = resolve_slot(decls, slot)?;
        let display = if decl.size > 1 && !whole {
            format!("{}[{}]", decl.name, offset)
        } else {
            decl.name.clone()
        };
        let id = self.vars.intern(owner, &decl.name, decl.slot, decl.size);
        Some(VarRef { id, display })
    }

    /// Variable entry for a callee's formal parameter, created on first
    /// forward reference and reused by the callee's own pass.
    pub fn param_var(&mut self, callee: &Script, index: usize) -> Option<VarId> {
        let name = callee.var_names.get(index)?;
        Some(self.vars.intern(VarOwner::Script(callee.id), name, index, 1))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Per-script pass
// ═══════════════════════════════════════════════════════════════════════════

/// Snapshot for speculative idiom matching: restore on mismatch instead of
/// unwinding.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    cursor: Addr,
    lines: usize,
    blocks: usize,
    indent: usize,
    inside_camera: bool,
    inside_dialogue: bool,
}

/// State of one script's decompilation.
pub struct ScriptPass<'a> {
    pub bank: &'a ScriptBank,
    pub script: &'a Script,
    /// Folded local slot declarations (parameters first).
    pub slots: Vec<SlotDecl>,
    pub cursor: Addr,
    /// Address of the script's terminating `End`.
    pub last: Addr,
    pub stack: SimStack,
    pub blocks: Vec<Block>,
    pub lines: Vec<SourceLine>,
    pub indent: usize,
    pub inside_camera: bool,
    pub inside_dialogue: bool,
    /// Pre-pass: walk everything, emit nothing.
    pub suppress: bool,
}

impl<'a> ScriptPass<'a> {
    /// Set up a pass; `None` when the script has no terminating `End`.
    pub fn new(bank: &'a ScriptBank, script: &'a Script, suppress: bool) -> Option<Self> {
        let last = script.last_address(&bank.instructions)?;
        Some(Self {
            bank,
            script,
            slots: script.slots(),
            cursor: script.entry,
            last,
            stack: SimStack::new(),
            blocks: vec![Block::script(script.entry, last)],
            lines: Vec::new(),
            indent: 1,
            inside_camera: false,
            inside_dialogue: false,
            suppress,
        })
    }

    /// Instruction at `addr`, or an unsupported-construct error when the
    /// address falls outside the bank.
    pub fn instr(&self, addr: Addr) -> Result<&'a Instruction, DecompileError> {
        self.bank
            .instruction(addr)
            .ok_or_else(|| self.err_unsupported(addr))
    }

    /// Emit one statement line at the given indent.
    pub fn emit(&mut self, indent: usize, text: impl Into<String>, source_line: u32) {
        if self.suppress {
            return;
        }
        self.lines.push(SourceLine {
            indent,
            text: text.into(),
            source_line: (source_line > 0).then_some(source_line),
        });
    }

    pub fn current_block(&self) -> &Block {
        self.blocks.last().expect("script block always open")
    }

    pub fn block_name(&self) -> &'static str {
        self.blocks.last().map(|b| b.kind.name()).unwrap_or("script")
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            cursor: self.cursor,
            lines: self.lines.len(),
            blocks: self.blocks.len(),
            indent: self.indent,
            inside_camera: self.inside_camera,
            inside_dialogue: self.inside_dialogue,
        }
    }

    pub fn restore(&mut self, cp: Checkpoint) {
        self.cursor = cp.cursor;
        self.lines.truncate(cp.lines);
        self.blocks.truncate(cp.blocks);
        self.indent = cp.indent;
        self.inside_camera = cp.inside_camera;
        self.inside_dialogue = cp.inside_dialogue;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Error builders
    // ─────────────────────────────────────────────────────────────────────

    fn instr_or_placeholder(&self, addr: Addr) -> Instruction {
        self.bank
            .instruction(addr)
            .copied()
            .unwrap_or(END_PLACEHOLDER)
    }

    pub fn err_unexpected(&self, addr: Addr, expected: &'static str) -> DecompileError {
        DecompileError::UnexpectedInstruction {
            script: self.script.name.clone(),
            address: addr,
            instruction: self.instr_or_placeholder(addr),
            expected,
        }
    }

    pub fn err_unsupported(&self, addr: Addr) -> DecompileError {
        DecompileError::UnsupportedConstruct {
            script: self.script.name.clone(),
            address: addr,
            instruction: self.instr_or_placeholder(addr),
            block: self.block_name(),
        }
    }

    pub fn err_bad_var(&self, addr: Addr, id: i32) -> DecompileError {
        DecompileError::InvalidVariableId {
            script: self.script.name.clone(),
            address: addr,
            instruction: self.instr_or_placeholder(addr),
            id,
        }
    }

    pub fn err_sim(&self, addr: Addr, e: SimError) -> DecompileError {
        let script = self.script.name.clone();
        let instruction = self.instr_or_placeholder(addr);
        match e {
            SimError::Underflow => DecompileError::StackUnderflow {
                script,
                address: addr,
                instruction,
            },
            SimError::BadNative(code) => DecompileError::InvalidNativeFunction {
                script,
                address: addr,
                instruction,
                code,
            },
            SimError::BadScript(id) => DecompileError::InvalidScriptId {
                script,
                address: addr,
                instruction,
                id,
            },
            SimError::VarargCount => DecompileError::UnexpectedInstruction {
                script,
                address: addr,
                instruction,
                expected: "pushed integer argument count",
            },
            SimError::NoTerminator => DecompileError::UnsupportedConstruct {
                script,
                address: addr,
                instruction,
                block: self.block_name(),
            },
        }
    }
}

/// Placeholder used when an error points past the instruction sequence.
const END_PLACEHOLDER: Instruction = Instruction {
    opcode: Opcode::End,
    flags: InstrFlags(0),
    data_kind: DataKind::None,
    payload: Payload::None,
    line: 0,
};
