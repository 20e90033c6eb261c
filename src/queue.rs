//! The in-flight instruction queue: an ordered pending-issue list that is
//! cleared and rebuilt from the linear program image on CALL/RET/taken-BEQ.

use std::collections::VecDeque;

use crate::isa::Instruction;

#[derive(Debug, Clone, Default)]
pub struct InstructionQueue {
    pending: VecDeque<Instruction>,
}

impl InstructionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the queue with the entire program, in order; used at load time
    /// when `current_pc` already names the first instruction.
    pub fn fill_from(&mut self, program: &[Instruction]) {
        self.pending = program.iter().cloned().collect();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn front(&self) -> Option<&Instruction> {
        self.pending.front()
    }

    pub fn pop_front(&mut self) -> Option<Instruction> {
        self.pending.pop_front()
    }

    /// Clear the queue and rebuild it from the first instruction in `program`
    /// whose `pc` equals `new_pc`, plus every subsequent instruction in
    /// program order. Already-issued instructions in stations are untouched.
    pub fn refetch(&mut self, program: &[Instruction], new_pc: i64) {
        self.pending = program
            .iter()
            .skip_while(|instr| instr.pc != new_pc)
            .cloned()
            .collect();
    }
}
