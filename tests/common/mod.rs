//! Shared helpers: a tiny in-memory bank assembler for building test inputs
//! in the same shapes the companion compiler emits.

#![allow(dead_code)]

use scenedec::bytecode::{
    DataKind, GlobalInit, InstrFlags, Instruction, NativeTable, Opcode, Payload, Script,
    ScriptBank, ScriptKind,
};
use scenedec::tables::GameTables;
use scenedec::{decompile_bank, BankOutput, DecompilerOptions, Effort};

/// Emits instructions and patches jump targets after the fact.
pub struct Asm {
    pub instructions: Vec<Instruction>,
    natives: NativeTable,
    line: u32,
}

impl Asm {
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
            natives: NativeTable::builtin(),
            line: 0,
        }
    }

    /// Tag subsequent instructions with a source line.
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    pub fn here(&self) -> usize {
        self.instructions.len()
    }

    fn emit(&mut self, opcode: Opcode, flags: u32, data_kind: DataKind, payload: Payload) -> usize {
        let addr = self.instructions.len();
        self.instructions.push(Instruction {
            opcode,
            flags: InstrFlags(flags),
            data_kind,
            payload,
            line: self.line,
        });
        addr
    }

    /// Fix up a jump/handler target emitted as a placeholder.
    pub fn patch(&mut self, addr: usize, target: usize) {
        self.instructions[addr].payload = Payload::Int(target as i32);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pushes and stores
    // ─────────────────────────────────────────────────────────────────────

    pub fn pushi(&mut self, v: i32) -> usize {
        self.emit(Opcode::PushI, 0, DataKind::Int, Payload::Int(v))
    }

    pub fn pushf(&mut self, v: f32) -> usize {
        self.emit(Opcode::PushF, 0, DataKind::Float, Payload::Float(v))
    }

    pub fn pushb(&mut self, v: bool) -> usize {
        self.emit(Opcode::PushB, 0, DataKind::Bool, Payload::Bool(v))
    }

    /// The compiler-generated always-true guard of an `else` clause.
    pub fn pushb_synth(&mut self) -> usize {
        self.emit(
            Opcode::PushB,
            InstrFlags::SYNTH,
            DataKind::Bool,
            Payload::Bool(true),
        )
    }

    pub fn pusho(&mut self, v: i32) -> usize {
        self.emit(Opcode::PushO, 0, DataKind::Object, Payload::Int(v))
    }

    pub fn pushv(&mut self, id: i32) -> usize {
        self.emit(Opcode::PushV, 0, DataKind::Float, Payload::Int(id))
    }

    pub fn pushv_obj(&mut self, id: i32) -> usize {
        self.emit(Opcode::PushV, 0, DataKind::Object, Payload::Int(id))
    }

    pub fn pushv_coord(&mut self, id: i32) -> usize {
        self.emit(Opcode::PushV, 0, DataKind::Coord, Payload::Int(id))
    }

    pub fn pushv_ref(&mut self, id: i32) -> usize {
        self.emit(
            Opcode::PushV,
            InstrFlags::REF,
            DataKind::Var,
            Payload::Int(id),
        )
    }

    pub fn popf(&mut self) -> usize {
        self.emit(Opcode::PopF, 0, DataKind::Float, Payload::None)
    }

    pub fn popi(&mut self) -> usize {
        self.emit(Opcode::PopI, 0, DataKind::Int, Payload::None)
    }

    pub fn popo(&mut self) -> usize {
        self.emit(Opcode::PopO, 0, DataKind::Object, Payload::None)
    }

    pub fn popc(&mut self) -> usize {
        self.emit(Opcode::PopC, 0, DataKind::Coord, Payload::None)
    }

    pub fn discard(&mut self) -> usize {
        self.emit(Opcode::Discard, 0, DataKind::Float, Payload::None)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Operators
    // ─────────────────────────────────────────────────────────────────────

    pub fn op(&mut self, opcode: Opcode) -> usize {
        self.emit(opcode, 0, DataKind::None, Payload::None)
    }

    pub fn cast_coord(&mut self) -> usize {
        self.emit(Opcode::Cast, 0, DataKind::Coord, Payload::None)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Control
    // ─────────────────────────────────────────────────────────────────────

    pub fn jz_fwd(&mut self) -> usize {
        self.emit(
            Opcode::Jz,
            InstrFlags::FORWARD,
            DataKind::Int,
            Payload::Int(0),
        )
    }

    pub fn jz_back(&mut self, target: usize) -> usize {
        self.emit(Opcode::Jz, 0, DataKind::Int, Payload::Int(target as i32))
    }

    pub fn jmp_fwd(&mut self) -> usize {
        self.emit(
            Opcode::Jmp,
            InstrFlags::FORWARD,
            DataKind::Int,
            Payload::Int(0),
        )
    }

    pub fn jmp_back(&mut self, target: usize) -> usize {
        self.emit(Opcode::Jmp, 0, DataKind::Int, Payload::Int(target as i32))
    }

    pub fn except(&mut self) -> usize {
        self.emit(Opcode::Except, 0, DataKind::Int, Payload::Int(0))
    }

    pub fn iter_except(&mut self) -> usize {
        self.emit(Opcode::IterExcept, 0, DataKind::None, Payload::None)
    }

    pub fn brk_except(&mut self) -> usize {
        self.emit(Opcode::BrkExcept, 0, DataKind::None, Payload::None)
    }

    pub fn end_except_free(&mut self) -> usize {
        self.emit(
            Opcode::EndExcept,
            InstrFlags::FREE,
            DataKind::None,
            Payload::None,
        )
    }

    pub fn sys(&mut self, name: &str) -> usize {
        let id = self.natives.id_of(name).expect("native in data file") as i32;
        self.emit(Opcode::Sys, 0, DataKind::Int, Payload::Int(id))
    }

    pub fn call(&mut self, script_id: u32) -> usize {
        self.emit(Opcode::Call, 0, DataKind::Int, Payload::Int(script_id as i32))
    }

    pub fn sleep(&mut self) -> usize {
        self.emit(Opcode::Sleep, 0, DataKind::None, Payload::None)
    }

    pub fn ret(&mut self) -> usize {
        self.emit(Opcode::Ret, 0, DataKind::None, Payload::None)
    }

    pub fn swap(&mut self) -> usize {
        self.emit(Opcode::Swap, 0, DataKind::None, Payload::None)
    }

    pub fn end(&mut self) -> usize {
        self.emit(Opcode::End, 0, DataKind::None, Payload::None)
    }
}

/// A script record over an address range of the shared instruction list.
pub fn script(id: u32, name: &str, entry: usize, vars: &[&str], params: u32) -> Script {
    Script {
        id,
        name: name.to_string(),
        source_file: "test.scn".to_string(),
        kind: ScriptKind::Script,
        visible_globals: 0,
        param_count: params,
        var_names: vars.iter().map(|v| v.to_string()).collect(),
        entry,
    }
}

pub fn function(id: u32, name: &str, entry: usize, vars: &[&str], params: u32) -> Script {
    Script {
        kind: ScriptKind::Function,
        ..script(id, name, entry, vars, params)
    }
}

pub fn global(name: &str, value: f32) -> GlobalInit {
    GlobalInit {
        name: name.to_string(),
        kind: DataKind::Float,
        payload: Payload::Float(value),
    }
}

pub fn bank(asm: Asm, scripts: Vec<Script>) -> ScriptBank {
    ScriptBank {
        instructions: asm.instructions,
        scripts,
        globals: Vec::new(),
        data: Vec::new(),
        natives: NativeTable::builtin(),
    }
}

pub fn decompile(bank: &ScriptBank) -> BankOutput {
    decompile_with(bank, "", Effort::Standard)
}

pub fn decompile_with(b: &ScriptBank, tables_text: &str, effort: Effort) -> BankOutput {
    let mut tables = GameTables::new();
    if !tables_text.is_empty() {
        tables.load_str(tables_text).expect("test tables parse");
    }
    let options = DecompilerOptions::builder().effort(effort).build();
    decompile_bank(b, &tables, &options)
}

/// Statement lines of the named script.
pub fn lines(out: &BankOutput, name: &str) -> Vec<String> {
    out.script_lines(name)
        .into_iter()
        .map(str::to_string)
        .collect()
}
