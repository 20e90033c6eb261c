//! Error taxonomy for the assembler, hardware configuration and engine.

use thiserror::Error;

use crate::station::OpType;

/// Every way a program can fail to load or a simulation can fail to run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// The first token of a line did not match any known mnemonic.
    #[error("unknown opcode `{opcode}` on line {line}")]
    UnknownOpcode {
        /// 1-indexed source line.
        line: usize,
        /// The offending token, as written.
        opcode: String,
    },

    /// A line parsed to a known mnemonic but its operands are malformed:
    /// wrong shape, an out-of-range `CALL` label, or an unparsable
    /// memory initializer.
    #[error("malformed instruction on line {line}: {reason}")]
    MalformedInstruction {
        /// 1-indexed source line, or 0 for a non-program input (e.g. memory init).
        line: usize,
        /// Human-readable explanation.
        reason: String,
    },

    /// A reservation-station count or latency was not a positive integer.
    #[error("invalid hardware configuration for {op_type}: count and cycles must each be >= 1 (got count={count}, cycles={cycles})")]
    InvalidHardwareConfig {
        /// The unit whose configuration is invalid.
        op_type: OpType,
        count: i64,
        cycles: i64,
    },

    /// A taken branch computed a negative target PC.
    #[error("invalid branch target: pc cannot be negative (attempted to branch to {0})")]
    InvalidBranchTarget(i64),

    /// The cycle counter exceeded the hard cap; the engine drains all state.
    #[error("cycle limit of {0} exceeded")]
    CycleLimitExceeded(u64),
}

pub type Result<T> = std::result::Result<T, SimError>;
