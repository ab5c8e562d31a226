//! Instruction set of the SceneScript virtual machine.
//!
//! One instruction is an opcode, a mode bitmask whose meaning depends on the
//! opcode, a data-kind tag, one immediate payload, and the source line the
//! compiler recorded for it. An instruction's address is its position in the
//! bank's instruction sequence.

use std::fmt;

/// Address of an instruction inside the bank = its sequence index.
pub type Addr = usize;

// ═══════════════════════════════════════════════════════════════════════════
// Opcodes
// ═══════════════════════════════════════════════════════════════════════════

/// Operation tag of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Control
    End,
    Jmp,
    Jz,
    Call,
    Sys,
    Ret,
    Sleep,
    Cast,
    Swap,

    // Exception machinery (loops are built on it)
    Except,
    EndExcept,
    RetExcept,
    IterExcept,
    BrkExcept,

    // Pushes
    PushI,
    PushF,
    PushB,
    PushO,
    PushV,

    // Stores / pops
    PopI,
    PopF,
    PopB,
    PopO,
    PopC,
    Discard,

    // Scalar arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,

    // Coordinate arithmetic (3-wide aggregates)
    CAdd,
    CSub,
    CMul,
    CDiv,
    CNeg,

    // Comparisons
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Boolean
    And,
    Or,
    Not,
}

impl Opcode {
    /// Decode a container opcode word.
    pub fn from_u32(raw: u32) -> Option<Self> {
        use Opcode::*;
        Some(match raw {
            0 => End,
            1 => Jmp,
            2 => Jz,
            3 => Call,
            4 => Sys,
            5 => Ret,
            6 => Sleep,
            7 => Cast,
            8 => Swap,
            9 => Except,
            10 => EndExcept,
            11 => RetExcept,
            12 => IterExcept,
            13 => BrkExcept,
            14 => PushI,
            15 => PushF,
            16 => PushB,
            17 => PushO,
            18 => PushV,
            19 => PopI,
            20 => PopF,
            21 => PopB,
            22 => PopO,
            23 => PopC,
            24 => Discard,
            25 => Add,
            26 => Sub,
            27 => Mul,
            28 => Div,
            29 => Mod,
            30 => Neg,
            31 => CAdd,
            32 => CSub,
            33 => CMul,
            34 => CDiv,
            35 => CNeg,
            36 => Eq,
            37 => Ne,
            38 => Lt,
            39 => Le,
            40 => Gt,
            41 => Ge,
            42 => And,
            43 => Or,
            44 => Not,
            _ => return None,
        })
    }

    /// True for binary operators (two operand recursions in the builder).
    pub fn is_binary(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Add | Sub | Mul | Div | Mod | CAdd | CSub | CMul | CDiv | Eq | Ne | Lt | Le | Gt
                | Ge | And | Or
        )
    }

    /// True for comparison operators.
    pub fn is_comparison(self) -> bool {
        use Opcode::*;
        matches!(self, Eq | Ne | Lt | Le | Gt | Ge)
    }

    /// Surface operator text, where one exists.
    pub fn operator_text(self) -> Option<&'static str> {
        use Opcode::*;
        Some(match self {
            Add | CAdd => "+",
            Sub | CSub => "-",
            Mul | CMul => "*",
            Div | CDiv => "/",
            Mod => "%",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            And => "and",
            Or => "or",
            _ => return None,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Mode flags and data kinds
// ═══════════════════════════════════════════════════════════════════════════

/// Mode bitmask of an instruction. Which bits are meaningful depends on the
/// opcode: REF on PushV, FORWARD on jumps, FREE on EndExcept, SYNTH on the
/// compiler-generated always-true guard of an `else` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstrFlags(pub u32);

impl InstrFlags {
    pub const REF: u32 = 1 << 0;
    pub const FORWARD: u32 = 1 << 1;
    pub const FREE: u32 = 1 << 2;
    pub const SYNTH: u32 = 1 << 3;

    pub fn is_ref(self) -> bool {
        self.0 & Self::REF != 0
    }

    pub fn is_forward(self) -> bool {
        self.0 & Self::FORWARD != 0
    }

    pub fn frees_handler(self) -> bool {
        self.0 & Self::FREE != 0
    }

    pub fn is_synthetic(self) -> bool {
        self.0 & Self::SYNTH != 0
    }
}

/// Data-kind tag of an instruction. Selects the payload interpretation and,
/// for pushes and casts, the width of the value on the operand stack
/// (`Coord` is a 3-cell aggregate, everything else is one cell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    None,
    Int,
    Float,
    Bool,
    Coord,
    Object,
    Var,
}

impl DataKind {
    pub fn from_u32(raw: u32) -> Option<Self> {
        use DataKind::*;
        Some(match raw {
            0 => None,
            1 => Int,
            2 => Float,
            3 => Bool,
            4 => Coord,
            5 => Object,
            6 => Var,
            _ => return Option::None,
        })
    }

    /// Number of operand-stack cells a value of this kind occupies.
    pub fn width(self) -> usize {
        match self {
            DataKind::Coord => 3,
            _ => 1,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Payload and instruction
// ═══════════════════════════════════════════════════════════════════════════

/// Immediate payload of an instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    None,
    Int(i32),
    Float(f32),
    Bool(bool),
}

impl Payload {
    /// Integer view of the payload, for jump targets, ids and counts.
    pub fn as_int(self) -> Option<i32> {
        match self {
            Payload::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(self) -> Option<f32> {
        match self {
            Payload::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Payload::Bool(v) => Some(v),
            _ => None,
        }
    }
}

/// One decoded instruction. Immutable after the bank is loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub flags: InstrFlags,
    pub data_kind: DataKind,
    pub payload: Payload,
    /// Source line the compiler recorded, 1-based; 0 = unknown.
    pub line: u32,
}

impl Instruction {
    /// Jump target / handler address carried in the payload.
    pub fn target(&self) -> Option<Addr> {
        self.payload.as_int().and_then(|v| usize::try_from(v).ok())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.opcode)?;
        match self.payload {
            Payload::None => {}
            Payload::Int(v) => write!(f, " {v}")?,
            Payload::Float(v) => write!(f, " {v}")?,
            Payload::Bool(v) => write!(f, " {v}")?,
        }
        if self.flags.0 != 0 {
            write!(f, " [mode={:#x}]", self.flags.0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_roundtrip() {
        for raw in 0..45u32 {
            let op = Opcode::from_u32(raw).expect("opcode in range");
            // Decoding is dense: every value below 45 maps to a variant.
            let _ = op;
        }
        assert!(Opcode::from_u32(45).is_none());
    }

    #[test]
    fn coord_width() {
        assert_eq!(DataKind::Coord.width(), 3);
        assert_eq!(DataKind::Float.width(), 1);
    }

    #[test]
    fn display_carries_payload_and_mode() {
        let instr = Instruction {
            opcode: Opcode::PushV,
            flags: InstrFlags(InstrFlags::REF),
            data_kind: DataKind::Var,
            payload: Payload::Int(3),
            line: 10,
        };
        let text = instr.to_string();
        assert!(text.contains("PushV 3"));
        assert!(text.contains("mode=0x1"));
    }
}
