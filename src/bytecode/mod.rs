//! Scene-bank bytecode: instruction set, container format, script records and
//! native-function metadata.
//!
//! # Module Structure
//!
//! - `opcode`: instruction sum types (opcode, flags, data kinds, payloads)
//! - `container`: little-endian bank reader/writer and the data section
//! - `script`: script records and the variable-name table
//! - `natives`: native-function id table joined with compile-time metadata

mod container;
mod natives;
mod opcode;
mod script;

pub use container::{GlobalInit, ScriptBank};
pub use natives::{parse_arg_spec, ArgKind, ArgRender, ArgSpec, NativeSpec, NativeTable, ResolvedNative};
pub use opcode::{Addr, DataKind, InstrFlags, Instruction, Opcode, Payload};
pub use script::{fold_slots, resolve_slot, Script, ScriptKind, SlotDecl, ARRAY_SENTINEL};
