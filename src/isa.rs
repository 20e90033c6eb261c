//! Instruction set definition for the simulated 16-bit RISC-like machine.

use std::fmt;

/// One of eight general-purpose registers, `R0` through `R7`.
///
/// `R0` is wired to zero: reads always yield 0 and writes are discarded.
pub type RegId = u8;

pub const REG_COUNT: usize = 8;
/// The link register CALL writes and RET reads; never named explicitly
/// in the RET operand list.
pub const LINK_REG: RegId = 1;

/// The nine opcodes the assembler and engine understand.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Load,
    Store,
    Beq,
    Call,
    Ret,
    Add,
    Sub,
    Nor,
    Mul,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Beq => "BEQ",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Nor => "NOR",
            Opcode::Mul => "MUL",
        };
        f.write_str(s)
    }
}

/// Opcode-specific operand layout, stored positionally.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    /// `LOAD dest, offset(base)`
    Load { dest: RegId, base: RegId, offset: i32 },
    /// `STORE data, offset(base)`
    Store { data: RegId, base: RegId, offset: i32 },
    /// `BEQ a, b, offset`
    Beq { a: RegId, b: RegId, offset: i32 },
    /// `CALL label`
    Call { label: i32 },
    /// `RET` (no explicit operands; implicitly reads/writes R1)
    Ret,
    /// `ADD/SUB/NOR/MUL dest, src1, src2`
    Arith { dest: RegId, src1: RegId, src2: RegId },
}

/// A parsed instruction, immutable except for the four timestamp slots the
/// engine stamps exactly once each as it moves through the pipeline.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Operands,
    /// Address of this instruction in the linear program image.
    pub pc: i64,
    pub issue_cycle: Option<u64>,
    pub start_exec_cycle: Option<u64>,
    pub end_exec_cycle: Option<u64>,
    pub write_cycle: Option<u64>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Operands, pc: i64) -> Self {
        Instruction {
            opcode,
            operands,
            pc,
            issue_cycle: None,
            start_exec_cycle: None,
            end_exec_cycle: None,
            write_cycle: None,
        }
    }

    /// Has this instruction retired (broadcast its result, or otherwise
    /// completed, on the CDB)?
    pub fn is_complete(&self) -> bool {
        self.write_cycle.is_some()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PC{}: {}", self.pc, self.opcode)
    }
}
