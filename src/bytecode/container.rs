//! Scene-bank container reading and writing.
//!
//! A bank is a little-endian binary file: fixed-width fields, length-prefixed
//! arrays, NUL-terminated 8-bit strings. Everything above raw field decoding
//! (statement recovery, typing) lives in the decompiler; this layer only
//! turns bytes into the in-memory tables the core consumes.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::natives::NativeTable;
use super::opcode::{DataKind, InstrFlags, Instruction, Opcode, Payload};
use super::script::{Script, ScriptKind, ARRAY_SENTINEL};
use crate::error::BankError;

/// "SBNK" in little-endian byte order.
const MAGIC: u32 = u32::from_le_bytes(*b"SBNK");
const VERSION: u32 = 7;

/// One global-variable initializer.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalInit {
    pub name: String,
    pub kind: DataKind,
    pub payload: Payload,
}

/// A fully loaded scene bank.
///
/// Loaded once per decompile run; the decompiler never mutates it.
#[derive(Debug, Clone, Default)]
pub struct ScriptBank {
    pub instructions: Vec<Instruction>,
    pub scripts: Vec<Script>,
    pub globals: Vec<GlobalInit>,
    /// Raw string/data section; offsets index NUL-terminated entries.
    pub data: Vec<u8>,
    pub natives: NativeTable,
}

impl Default for GlobalInit {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: DataKind::Float,
            payload: Payload::Float(0.0),
        }
    }
}

impl ScriptBank {
    /// Read a bank from a byte stream.
    pub fn read<R: Read>(mut r: R) -> Result<Self, BankError> {
        let magic = r.read_u32::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(BankError::BadMagic(magic));
        }
        let version = r.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(BankError::BadVersion(version));
        }

        let instructions = read_instructions(&mut r)?;
        let scripts = read_scripts(&mut r)?;
        let globals = read_globals(&mut r)?;

        let data_len = r.read_u32::<LittleEndian>()? as usize;
        let mut data = vec![0u8; data_len];
        r.read_exact(&mut data)?;

        let native_count = r.read_u32::<LittleEndian>()? as usize;
        let mut native_names = Vec::with_capacity(native_count);
        for _ in 0..native_count {
            native_names.push(read_cstring(&mut r)?);
        }

        Ok(Self {
            instructions,
            scripts,
            globals,
            data,
            natives: NativeTable::new(native_names),
        })
    }

    /// Write the bank back out. The decompiler does not use this; tests and
    /// tooling do.
    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(MAGIC)?;
        w.write_u32::<LittleEndian>(VERSION)?;

        w.write_u32::<LittleEndian>(self.instructions.len() as u32)?;
        for instr in &self.instructions {
            write_instruction(&mut w, instr)?;
        }

        w.write_u32::<LittleEndian>(self.scripts.len() as u32)?;
        for script in &self.scripts {
            write_cstring(&mut w, &script.name)?;
            write_cstring(&mut w, &script.source_file)?;
            w.write_u32::<LittleEndian>(script.kind as u32)?;
            w.write_u32::<LittleEndian>(script.visible_globals)?;
            w.write_u32::<LittleEndian>(script.param_count)?;
            w.write_u32::<LittleEndian>(script.var_names.len() as u32)?;
            for name in &script.var_names {
                write_cstring(&mut w, name)?;
            }
            w.write_u32::<LittleEndian>(script.entry as u32)?;
            w.write_u32::<LittleEndian>(script.id)?;
        }

        w.write_u32::<LittleEndian>(self.globals.len() as u32)?;
        for global in &self.globals {
            write_cstring(&mut w, &global.name)?;
            w.write_u32::<LittleEndian>(global.kind as u32)?;
            write_payload(&mut w, global.payload)?;
        }

        w.write_u32::<LittleEndian>(self.data.len() as u32)?;
        w.write_all(&self.data)?;

        w.write_u32::<LittleEndian>(self.natives.len() as u32)?;
        for id in 0..self.natives.len() {
            write_cstring(&mut w, self.natives.name_of(id).unwrap_or_default())?;
        }
        Ok(())
    }

    /// NUL-terminated string at `offset` in the data section.
    pub fn get_string(&self, offset: u32) -> Result<&str, BankError> {
        let start = offset as usize;
        if start >= self.data.len() {
            return Err(BankError::BadStringOffset(offset));
        }
        let end = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| start + p)
            .ok_or(BankError::BadStringOffset(offset))?;
        std::str::from_utf8(&self.data[start..end]).map_err(|_| BankError::BadStringOffset(offset))
    }

    pub fn instruction(&self, addr: usize) -> Option<&Instruction> {
        self.instructions.get(addr)
    }

    pub fn script_by_id(&self, id: u32) -> Option<&Script> {
        self.scripts.iter().find(|s| s.id == id)
    }

    pub fn script_by_name(&self, name: &str) -> Option<&Script> {
        self.scripts.iter().find(|s| s.name == name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Field readers
// ─────────────────────────────────────────────────────────────────────────────

fn read_instructions<R: Read>(r: &mut R) -> Result<Vec<Instruction>, BankError> {
    let count = r.read_u32::<LittleEndian>()? as usize;
    let mut instructions = Vec::with_capacity(count);
    for index in 0..count {
        let raw_op = r.read_u32::<LittleEndian>()?;
        let opcode = Opcode::from_u32(raw_op).ok_or(BankError::UnknownOpcode(raw_op, index))?;
        let flags = InstrFlags(r.read_u32::<LittleEndian>()?);
        let raw_kind = r.read_u32::<LittleEndian>()?;
        let data_kind =
            DataKind::from_u32(raw_kind).ok_or(BankError::UnknownDataKind(raw_kind, index))?;
        let payload = read_instr_payload(r, opcode)?;
        let line = r.read_u32::<LittleEndian>()?;
        instructions.push(Instruction {
            opcode,
            flags,
            data_kind,
            payload,
            line,
        });
    }
    Ok(instructions)
}

fn read_scripts<R: Read>(r: &mut R) -> Result<Vec<Script>, BankError> {
    let count = r.read_u32::<LittleEndian>()? as usize;
    let mut scripts = Vec::with_capacity(count);
    for _ in 0..count {
        let name = read_cstring(r)?;
        let source_file = read_cstring(r)?;
        let raw_kind = r.read_u32::<LittleEndian>()?;
        let kind = ScriptKind::from_u32(raw_kind).unwrap_or(ScriptKind::Script);
        let visible_globals = r.read_u32::<LittleEndian>()?;
        let param_count = r.read_u32::<LittleEndian>()?;
        let var_count = r.read_u32::<LittleEndian>()? as usize;
        let mut var_names = Vec::with_capacity(var_count);
        for _ in 0..var_count {
            var_names.push(read_cstring(r)?);
        }
        if var_names.first().is_some_and(|n| n == ARRAY_SENTINEL) {
            return Err(BankError::BadVarTable(name));
        }
        let entry = r.read_u32::<LittleEndian>()? as usize;
        let id = r.read_u32::<LittleEndian>()?;
        scripts.push(Script {
            id,
            name,
            source_file,
            kind,
            visible_globals,
            param_count,
            var_names,
            entry,
        });
    }
    Ok(scripts)
}

fn read_globals<R: Read>(r: &mut R) -> Result<Vec<GlobalInit>, BankError> {
    let count = r.read_u32::<LittleEndian>()? as usize;
    let mut globals = Vec::with_capacity(count);
    for index in 0..count {
        let name = read_cstring(r)?;
        let raw_kind = r.read_u32::<LittleEndian>()?;
        let kind =
            DataKind::from_u32(raw_kind).ok_or(BankError::UnknownDataKind(raw_kind, index))?;
        let payload = read_payload(r, kind)?;
        globals.push(GlobalInit {
            name,
            kind,
            payload,
        });
    }
    Ok(globals)
}

/// Records are fixed width: every instruction carries 4 payload bytes. The
/// opcode decides how they are interpreted; most opcodes carry none.
fn read_instr_payload<R: Read>(r: &mut R, opcode: Opcode) -> Result<Payload, BankError> {
    let bits = r.read_u32::<LittleEndian>()?;
    Ok(match opcode {
        Opcode::PushF => Payload::Float(f32::from_bits(bits)),
        Opcode::PushB => Payload::Bool(bits != 0),
        Opcode::PushI
        | Opcode::PushO
        | Opcode::PushV
        | Opcode::Jmp
        | Opcode::Jz
        | Opcode::Except
        | Opcode::Call
        | Opcode::Sys => Payload::Int(bits as i32),
        _ => Payload::None,
    })
}

/// Global initializers interpret their payload by declared data kind.
fn read_payload<R: Read>(r: &mut R, kind: DataKind) -> Result<Payload, BankError> {
    Ok(match kind {
        DataKind::Float => Payload::Float(r.read_f32::<LittleEndian>()?),
        DataKind::Bool => Payload::Bool(r.read_u32::<LittleEndian>()? != 0),
        DataKind::None => {
            let _ = r.read_u32::<LittleEndian>()?;
            Payload::None
        }
        _ => Payload::Int(r.read_i32::<LittleEndian>()?),
    })
}

fn read_cstring<R: Read>(r: &mut R) -> Result<String, BankError> {
    let mut bytes = Vec::new();
    loop {
        let b = r.read_u8()?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    // 8-bit-per-character strings; the banks in the wild are ASCII
    Ok(bytes.iter().map(|&b| b as char).collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Field writers
// ─────────────────────────────────────────────────────────────────────────────

fn write_instruction<W: Write>(w: &mut W, instr: &Instruction) -> io::Result<()> {
    w.write_u32::<LittleEndian>(opcode_to_u32(instr.opcode))?;
    w.write_u32::<LittleEndian>(instr.flags.0)?;
    w.write_u32::<LittleEndian>(data_kind_to_u32(instr.data_kind))?;
    write_payload(w, instr.payload)?;
    w.write_u32::<LittleEndian>(instr.line)
}

fn write_payload<W: Write>(w: &mut W, payload: Payload) -> io::Result<()> {
    match payload {
        Payload::None => w.write_u32::<LittleEndian>(0),
        Payload::Int(v) => w.write_i32::<LittleEndian>(v),
        Payload::Float(v) => w.write_f32::<LittleEndian>(v),
        Payload::Bool(v) => w.write_u32::<LittleEndian>(v as u32),
    }
}

fn write_cstring<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    for c in s.chars() {
        w.write_u8(if (c as u32) < 256 { c as u8 } else { b'?' })?;
    }
    w.write_u8(0)
}

fn opcode_to_u32(op: Opcode) -> u32 {
    // from_u32 is dense from 0; probe it rather than maintain a second table
    (0..=u32::MAX)
        .take(64)
        .find(|&raw| Opcode::from_u32(raw) == Some(op))
        .expect("opcode encodable")
}

fn data_kind_to_u32(kind: DataKind) -> u32 {
    (0..8u32)
        .find(|&raw| DataKind::from_u32(raw) == Some(kind))
        .expect("data kind encodable")
}
