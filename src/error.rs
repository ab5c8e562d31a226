//! Error types for scene-bank decompilation.

use thiserror::Error;

use crate::bytecode::{Addr, Instruction};

/// Errors raised while reconstructing a script.
///
/// Structural errors carry the script name, the instruction address, and the
/// offending instruction so a failed script can be pinpointed in the bank.
/// The driver catches these per script: one bad script never aborts the
/// whole bank.
#[derive(Debug, Error)]
pub enum DecompileError {
    #[error("stack underflow in script '{script}' at {address}: {instruction}")]
    StackUnderflow {
        script: String,
        address: Addr,
        instruction: Instruction,
    },

    #[error("unexpected instruction in script '{script}' at {address}: {instruction} (expected {expected})")]
    UnexpectedInstruction {
        script: String,
        address: Addr,
        instruction: Instruction,
        expected: &'static str,
    },

    #[error("invalid native function code {code} in script '{script}' at {address}: {instruction}")]
    InvalidNativeFunction {
        script: String,
        address: Addr,
        instruction: Instruction,
        code: i32,
    },

    #[error("invalid script id {id} in script '{script}' at {address}: {instruction}")]
    InvalidScriptId {
        script: String,
        address: Addr,
        instruction: Instruction,
        id: i32,
    },

    #[error("invalid variable id {id} in script '{script}' at {address}: {instruction}")]
    InvalidVariableId {
        script: String,
        address: Addr,
        instruction: Instruction,
        id: i32,
    },

    #[error("unsupported construct in {block} block of script '{script}' at {address}: {instruction}")]
    UnsupportedConstruct {
        script: String,
        address: Addr,
        instruction: Instruction,
        block: &'static str,
    },
}

/// Errors raised by the boundary layers (container reading, aux tables).
#[derive(Debug, Error)]
pub enum BankError {
    #[error("container read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic: expected \"SBNK\", found {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported container version {0}")]
    BadVersion(u32),

    #[error("unknown opcode {0} at instruction {1}")]
    UnknownOpcode(u32, usize),

    #[error("unknown data kind {0} at instruction {1}")]
    UnknownDataKind(u32, usize),

    #[error("string offset {0} out of range of data section")]
    BadStringOffset(u32),

    #[error("malformed variable table in script '{0}': leading array-continuation slot")]
    BadVarTable(String),

    #[error("malformed table line {line}: {text}")]
    BadTableLine { line: usize, text: String },
}
