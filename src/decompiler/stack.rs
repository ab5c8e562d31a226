//! Operand-stack simulation.
//!
//! The simulator mirrors the VM's push/pop behaviour over value *kinds*,
//! never real values (literals ride along purely as bookkeeping, e.g. the
//! count cell of a variable-arity native call). It is used to find the end
//! of a statement: scanning forward from a statement's first instruction,
//! the statement ends at the instruction that brings the depth back to the
//! level observed at its start.

use crate::bytecode::{DataKind, Instruction, Opcode, ScriptBank, ScriptKind};

use super::expr::Literal;

/// One simulated operand-stack cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackVal {
    pub kind: DataKind,
    pub lit: Option<Literal>,
}

/// Structural failures the simulator can observe. The driver wraps these
/// with script/address/instruction context.
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// Pop on an empty stack: the stream is inconsistent with the VM.
    Underflow,
    /// SYS payload does not resolve to a known native.
    BadNative(i32),
    /// CALL payload does not resolve to a script.
    BadScript(i32),
    /// A variable-arity call was not preceded by a pushed integer count.
    VarargCount,
    /// The scan ran past the script's last instruction without the depth
    /// returning to the statement's starting level.
    NoTerminator,
}

/// The simulated operand stack.
#[derive(Debug, Clone, Default)]
pub struct SimStack {
    cells: Vec<StackVal>,
}

impl SimStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.cells.len()
    }

    pub fn push(&mut self, kind: DataKind, lit: Option<Literal>) {
        self.cells.push(StackVal { kind, lit });
    }

    pub fn pop(&mut self) -> Result<StackVal, SimError> {
        self.cells.pop().ok_or(SimError::Underflow)
    }

    pub fn peek(&self) -> Option<&StackVal> {
        self.cells.last()
    }

    fn pop_n(&mut self, n: usize) -> Result<(), SimError> {
        for _ in 0..n {
            self.pop()?;
        }
        Ok(())
    }

    fn push_n(&mut self, kind: DataKind, n: usize) {
        for _ in 0..n {
            self.push(kind, None);
        }
    }

    /// Undo one instruction's stack effect: pop what `advance` pushed, then
    /// restore placeholder cells for what it consumed. Consumed literals are
    /// gone, so restored cells carry kinds only; a variable-arity native is
    /// not invertible without its count cell and reports `VarargCount`.
    pub fn retreat(&mut self, instr: &Instruction, bank: &ScriptBank) -> Result<(), SimError> {
        use Opcode::*;
        match instr.opcode {
            End | Jmp | Except | EndExcept | RetExcept | IterExcept | BrkExcept => {}

            Jz => self.push(DataKind::Bool, None),

            PushI | PushF | PushB | PushO => {
                self.pop()?;
            }
            PushV => {
                if instr.flags.is_ref() {
                    self.pop()?;
                } else {
                    self.pop_n(instr.data_kind.width())?;
                }
            }

            PopI | PopF | PopB | PopO => {
                self.push(instr.data_kind, None);
                self.push(DataKind::Var, None);
            }
            PopC => {
                self.push_n(DataKind::Coord, 3);
                self.push(DataKind::Var, None);
            }
            Discard => self.push_n(instr.data_kind, instr.data_kind.width()),

            Add | Sub | Mul | Div | Mod => {
                self.pop()?;
                self.push_n(DataKind::Float, 2);
            }
            Neg => {
                let v = self.pop()?;
                self.push(v.kind, None);
            }

            CAdd | CSub => {
                self.pop_n(3)?;
                self.push_n(DataKind::Coord, 6);
            }
            CMul | CDiv => {
                self.pop_n(3)?;
                self.push_n(DataKind::Coord, 3);
                self.push(DataKind::Float, None);
            }
            CNeg => {
                self.pop_n(3)?;
                self.push_n(DataKind::Coord, 3);
            }

            Eq | Ne | Lt | Le | Gt | Ge | And | Or => {
                self.pop()?;
                self.push_n(DataKind::Float, 2);
            }
            Not => {
                self.pop()?;
                self.push(DataKind::Bool, None);
            }

            Cast => {
                if instr.data_kind == DataKind::Coord {
                    self.pop_n(3)?;
                    self.push_n(DataKind::Float, 3);
                } else {
                    let v = self.pop()?;
                    self.push(v.kind, v.lit);
                }
            }

            Swap => {
                // Self-inverse.
                let a = self.pop()?;
                let b = self.pop()?;
                self.cells.push(a);
                self.cells.push(b);
            }

            Sleep | Ret => self.push(DataKind::Float, None),

            Call => {
                let id = instr.payload.as_int().unwrap_or(-1);
                let script = u32::try_from(id)
                    .ok()
                    .and_then(|id| bank.script_by_id(id))
                    .ok_or(SimError::BadScript(id))?;
                if script.kind == ScriptKind::Function {
                    self.pop()?;
                }
                self.push_n(DataKind::Float, script.param_count as usize);
            }

            Sys => {
                let id = instr.payload.as_int().unwrap_or(-1);
                let native = usize::try_from(id)
                    .ok()
                    .and_then(|id| bank.natives.lookup(id))
                    .ok_or(SimError::BadNative(id))?;
                if native.spec.varargs {
                    return Err(SimError::VarargCount);
                }
                match native.spec.ret {
                    "" => {}
                    "coord" => self.pop_n(3)?,
                    _ => self.pop_n(1)?,
                }
                self.push_n(DataKind::Float, native.spec.fixed_width());
            }
        }
        Ok(())
    }

    /// Apply one instruction's stack effect going forward.
    pub fn advance(&mut self, instr: &Instruction, bank: &ScriptBank) -> Result<(), SimError> {
        use Opcode::*;
        match instr.opcode {
            // No operand-stack effect; the exception machinery has its own
            // handler stack inside the VM.
            End | Jmp | Except | EndExcept | RetExcept | IterExcept | BrkExcept => {}

            Jz => {
                self.pop()?;
            }

            PushI => self.push(DataKind::Int, instr.payload.as_int().map(Literal::Int)),
            PushF => self.push(DataKind::Float, instr.payload.as_float().map(Literal::Float)),
            PushB => self.push(DataKind::Bool, instr.payload.as_bool().map(Literal::Bool)),
            PushO => self.push(DataKind::Object, instr.payload.as_int().map(Literal::Int)),
            PushV => {
                if instr.flags.is_ref() {
                    self.push(DataKind::Var, instr.payload.as_int().map(Literal::Int));
                } else if instr.data_kind == DataKind::Coord {
                    self.push_n(DataKind::Coord, 3);
                } else {
                    self.push(instr.data_kind, None);
                }
            }

            PopI | PopF | PopB | PopO => {
                self.pop()?; // store target reference
                self.pop()?; // value
            }
            PopC => {
                self.pop()?; // store target reference
                self.pop_n(3)?;
            }
            Discard => self.pop_n(instr.data_kind.width())?,

            Add | Sub | Mul | Div | Mod => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let kind = if rhs.kind == DataKind::Int && lhs.kind == DataKind::Int {
                    DataKind::Int
                } else {
                    DataKind::Float
                };
                self.push(kind, None);
            }
            Neg => {
                let v = self.pop()?;
                self.push(v.kind, None);
            }

            // Coordinate arithmetic works on 3-wide aggregates: +/- combine
            // two coordinates, * and / scale a coordinate by a scalar.
            CAdd | CSub => {
                self.pop_n(6)?;
                self.push_n(DataKind::Coord, 3);
            }
            CMul | CDiv => {
                self.pop()?; // scalar factor
                self.pop_n(3)?;
                self.push_n(DataKind::Coord, 3);
            }
            CNeg => {
                self.pop_n(3)?;
                self.push_n(DataKind::Coord, 3);
            }

            Eq | Ne | Lt | Le | Gt | Ge | And | Or => {
                self.pop()?;
                self.pop()?;
                self.push(DataKind::Bool, None);
            }
            Not => {
                self.pop()?;
                self.push(DataKind::Bool, None);
            }

            Cast => {
                if instr.data_kind == DataKind::Coord {
                    // Aggregate three scalars into a coordinate.
                    self.pop_n(3)?;
                    self.push_n(DataKind::Coord, 3);
                } else {
                    let v = self.pop()?;
                    self.push(instr.data_kind, v.lit);
                }
            }

            Swap => {
                let a = self.pop()?;
                let b = self.pop()?;
                self.cells.push(a);
                self.cells.push(b);
            }

            Sleep => {
                self.pop()?;
            }
            Ret => {
                self.pop()?;
            }

            Call => {
                let id = instr.payload.as_int().unwrap_or(-1);
                let script = u32::try_from(id)
                    .ok()
                    .and_then(|id| bank.script_by_id(id))
                    .ok_or(SimError::BadScript(id))?;
                self.pop_n(script.param_count as usize)?;
                if script.kind == ScriptKind::Function {
                    self.push(DataKind::Float, None);
                }
            }

            Sys => {
                let id = instr.payload.as_int().unwrap_or(-1);
                let native = usize::try_from(id)
                    .ok()
                    .and_then(|id| bank.natives.lookup(id))
                    .ok_or(SimError::BadNative(id))?;
                if native.spec.varargs {
                    // The argument count rides on top of the stack as a
                    // pushed integer literal.
                    let count = self.pop()?;
                    let n = match (count.kind, count.lit) {
                        (DataKind::Int, Some(Literal::Int(n))) if n >= 0 => n as usize,
                        _ => return Err(SimError::VarargCount),
                    };
                    self.pop_n(n)?;
                }
                self.pop_n(native.spec.fixed_width())?;
                match native.spec.ret {
                    "" => {}
                    "coord" => self.push_n(DataKind::Coord, 3),
                    "int" => self.push(DataKind::Int, None),
                    "bool" => self.push(DataKind::Bool, None),
                    "object" => self.push(DataKind::Object, None),
                    _ => self.push(DataKind::Float, None),
                }
            }
        }
        Ok(())
    }
}

/// True for opcodes that can terminate a statement once the depth is back at
/// the statement's starting level.
pub fn ends_statement(op: Opcode) -> bool {
    use Opcode::*;
    matches!(
        op,
        PopI | PopF | PopB | PopO | PopC | Discard | Jz | Sys | Call | Sleep | Ret
    )
}

/// Scan forward from `start`, applying stack effects, until the next
/// statement terminator at the starting depth. Returns the terminator's
/// address; on return the stack is back at the starting depth.
pub fn find_statement_end(
    stack: &mut SimStack,
    bank: &ScriptBank,
    start: usize,
    last: usize,
) -> Result<usize, (usize, SimError)> {
    let depth0 = stack.depth();
    let mut addr = start;
    while addr <= last {
        let instr = bank
            .instruction(addr)
            .ok_or((addr, SimError::NoTerminator))?;
        stack.advance(instr, bank).map_err(|e| (addr, e))?;
        if stack.depth() == depth0 && ends_statement(instr.opcode) {
            return Ok(addr);
        }
        addr += 1;
    }
    Err((last, SimError::NoTerminator))
}
