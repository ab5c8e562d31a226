//! Script records of a scene bank.

use super::opcode::{Addr, Instruction, Opcode};

/// Variable-table name marking "this slot extends the previous array".
pub const ARRAY_SENTINEL: &str = "@";

/// Kind of a script entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    /// Plain script, run for effect.
    Script,
    /// Function script, returns a value through `Ret`.
    Function,
    /// Help script variant, triggered by the help system.
    HelpScript,
}

impl ScriptKind {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => ScriptKind::Script,
            1 => ScriptKind::Function,
            2 => ScriptKind::HelpScript,
            _ => return None,
        })
    }

    /// Keyword used in the script header and footer lines.
    pub fn keyword(self) -> &'static str {
        match self {
            ScriptKind::Script => "script",
            ScriptKind::Function => "function",
            ScriptKind::HelpScript => "help script",
        }
    }
}

/// One script of the bank.
///
/// The variable-name table lists parameters first, then locals, in slot
/// order. A slot named [`ARRAY_SENTINEL`] extends the previous name into an
/// array; the array's size is one plus the run length of sentinel slots.
#[derive(Debug, Clone)]
pub struct Script {
    pub id: u32,
    pub name: String,
    /// Tag of the source file the script came from.
    pub source_file: String,
    pub kind: ScriptKind,
    /// Number of globals visible to this script (its variable ids below this
    /// count address the global table).
    pub visible_globals: u32,
    pub param_count: u32,
    pub var_names: Vec<String>,
    pub entry: Addr,
}

/// A named slot of a script's (or the global) variable table, with array
/// run-lengths already folded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDecl {
    /// First slot of the variable.
    pub slot: usize,
    pub name: String,
    /// 1 for scalars, >1 for arrays declared through sentinel slots.
    pub size: usize,
}

/// Fold a raw name table into slot declarations.
pub fn fold_slots(names: &[String]) -> Vec<SlotDecl> {
    let mut decls: Vec<SlotDecl> = Vec::new();
    for (slot, name) in names.iter().enumerate() {
        if name == ARRAY_SENTINEL {
            if let Some(last) = decls.last_mut() {
                last.size += 1;
            }
            // A leading sentinel has nothing to extend; the container layer
            // rejects it, so it cannot reach here.
        } else {
            decls.push(SlotDecl {
                slot,
                name: name.clone(),
                size: 1,
            });
        }
    }
    decls
}

/// Resolve a raw slot index to its declaration and element offset.
pub fn resolve_slot(decls: &[SlotDecl], slot: usize) -> Option<(&SlotDecl, usize)> {
    decls
        .iter()
        .find(|d| slot >= d.slot && slot < d.slot + d.size)
        .map(|d| (d, slot - d.slot))
}

impl Script {
    /// Derived last instruction: the first terminating `End` at or after the
    /// entry address.
    pub fn last_address(&self, instructions: &[Instruction]) -> Option<Addr> {
        instructions[self.entry.min(instructions.len())..]
            .iter()
            .position(|i| i.opcode == Opcode::End)
            .map(|off| self.entry + off)
    }

    /// Local slot declarations (parameters included, sentinels folded).
    pub fn slots(&self) -> Vec<SlotDecl> {
        fold_slots(&self.var_names)
    }

    /// Names of the parameters, in order.
    pub fn param_names(&self) -> &[String] {
        &self.var_names[..self.param_count as usize]
    }
}
