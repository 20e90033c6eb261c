//! Cycle-accurate simulator for Tomasulo's out-of-order instruction
//! scheduling algorithm over a small 16-bit RISC-like instruction set.
//!
//! The engine is the whole library surface: construct one from a parsed
//! program, initial memory contents and a hardware configuration, then
//! drive it one cycle at a time (or to completion) and read back snapshots
//! and terminal statistics. Everything outside that — a GUI, a REPL, a wire
//! protocol to a frontend — is an external collaborator's problem.

pub mod engine;
pub mod error;
pub mod isa;
pub mod memory;
pub mod parse;
pub mod queue;
pub mod snapshot;
pub mod station;

pub use engine::Engine;
pub use error::{Result, SimError};
pub use isa::{Instruction, Opcode, Operands};
pub use parse::{parse_mem_init, parse_program};
pub use snapshot::{Snapshot, Statistics};
pub use station::{HardwareConfig, OpType, UnitConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_and_runs_a_tiny_program() {
        let program = parse_program("ADD R1,R0,R0\nADD R2,R1,R1\n", 0).unwrap();
        let mut engine = Engine::new(program, &[], &HardwareConfig::default(), 0).unwrap();
        engine.run_to_completion().unwrap();
        assert_eq!(engine.statistics().completed_instructions, 2);
    }
}
