//! The pipeline engine: drives Issue, Execute and Write-Back one cycle at a
//! time, in the fixed order release -> write-back -> execute -> issue, and
//! enforces every invariant in the data model.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{Result, SimError};
use crate::isa::{Instruction, Opcode, Operands, LINK_REG};
use crate::memory::{Memory, RegisterFile, RegisterStatus};
use crate::queue::InstructionQueue;
use crate::snapshot::{Snapshot, StationSnapshot, Statistics};
use crate::station::{HardwareConfig, Operand, OpType, Station, StationId, StationPool};

/// Hard cap on cycle count; exceeding it halts the simulation and drains
/// all in-flight state.
pub const MAX_CYCLES: u64 = 1000;

/// The cycle-accurate Tomasulo engine.
pub struct Engine {
    /// The immutable linear program image: source of truth for refetches,
    /// always with fresh (`None`) timestamps.
    program: Vec<Instruction>,
    /// Maps a program address to its index in `program`/`display`.
    pc_index: HashMap<i64, usize>,
    /// One entry per program instruction, echoing the timestamps of its most
    /// recent dynamic instance (an instruction revisited by a loop or a
    /// recursive CALL overwrites its own entry here); read by `snapshot()`.
    display: Vec<Instruction>,
    queue: InstructionQueue,
    stations: StationPool,
    registers: RegisterFile,
    reg_status: RegisterStatus,
    memory: Memory,
    cycle: u64,
    current_pc: i64,
    pending_control_flow: bool,
    stats: Statistics,
    halted: bool,
}

impl Engine {
    /// Build a fresh engine: wire up a program image, initial memory
    /// contents, hardware configuration and starting PC.
    pub fn new(
        program: Vec<Instruction>,
        mem_init: &[(u16, u16)],
        config: &HardwareConfig,
        starting_pc: i64,
    ) -> Result<Self> {
        let stations = StationPool::build(config)?;
        let mut memory = Memory::new();
        for &(addr, value) in mem_init {
            memory.init(addr, value);
        }
        let mut queue = InstructionQueue::new();
        queue.fill_from(&program);

        let pc_index = program.iter().enumerate().map(|(i, instr)| (instr.pc, i)).collect();
        let display = program.clone();

        Ok(Engine {
            program,
            pc_index,
            display,
            queue,
            stations,
            registers: RegisterFile::new(),
            reg_status: RegisterStatus::new(),
            memory,
            cycle: 1,
            current_pc: starting_pc,
            pending_control_flow: false,
            stats: Statistics::default(),
            halted: false,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.halted || (self.queue.is_empty() && !self.stations.any_busy())
    }

    pub fn statistics(&self) -> Statistics {
        self.stats
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Run every cycle until the simulation finishes or halts with an error.
    pub fn run_to_completion(&mut self) -> Result<()> {
        while !self.is_finished() {
            self.step()?;
        }
        Ok(())
    }

    /// Advance the simulation by exactly one cycle.
    pub fn step(&mut self) -> Result<()> {
        if self.cycle > MAX_CYCLES {
            self.drain();
            self.halted = true;
            warn!(cycle = self.cycle, "cycle limit exceeded, draining simulation");
            return Err(SimError::CycleLimitExceeded(MAX_CYCLES));
        }

        self.sweep_release();
        self.sweep_write_back()?;
        self.sweep_execute();
        self.sweep_issue();

        self.stats.total_cycles += 1;
        self.cycle += 1;
        Ok(())
    }

    fn drain(&mut self) {
        self.queue = InstructionQueue::new();
        self.stations = StationPool::build(&HardwareConfig::default())
            .expect("default hardware configuration is always valid");
        self.pending_control_flow = false;
    }

    /// Mutate the display echo for `pc`, if that address belongs to the program.
    fn touch_display(&mut self, pc: i64, f: impl FnOnce(&mut Instruction)) {
        if let Some(&idx) = self.pc_index.get(&pc) {
            f(&mut self.display[idx]);
        }
    }

    /// Sweep 1: release every station that broadcast last cycle.
    fn sweep_release(&mut self) {
        self.stations.release_written();
    }

    /// Sweep 2: write-back. Collect finished stations, compute results,
    /// write registers, broadcast on the CDB, and handle control flow.
    fn sweep_write_back(&mut self) -> Result<()> {
        let ready: Vec<StationId> = self
            .stations
            .iter()
            .filter(|s| s.busy && s.executing && s.cycles_left == 0 && !s.wrote_result)
            .map(|s| s.id)
            .collect();

        for id in ready {
            self.complete_station(id)?;
        }
        Ok(())
    }

    fn complete_station(&mut self, id: StationId) -> Result<()> {
        let station = self.stations.get(id).clone();
        let mut instr = station.instruction.clone().expect("ready station holds an instruction");
        instr.write_cycle = Some(self.cycle);
        self.touch_display(instr.pc, |d| d.write_cycle = instr.write_cycle);

        let vj = station.vj.value().expect("executing station has both operands ready");
        let vk = station.vk.value().expect("executing station has both operands ready");

        let mut reg_result: Option<(u8, u16)> = None;

        match instr.opcode {
            Opcode::Load => {
                let Operands::Load { dest, .. } = instr.operands else { unreachable!() };
                let addr = vj.wrapping_add(station.a as u16);
                let value = self.memory.read(addr);
                reg_result = Some((dest, value));
            }
            Opcode::Add | Opcode::Sub | Opcode::Nor | Opcode::Mul => {
                let Operands::Arith { dest, .. } = instr.operands else { unreachable!() };
                let result = match instr.opcode {
                    Opcode::Add => vj.wrapping_add(vk),
                    Opcode::Sub => vj.wrapping_sub(vk),
                    Opcode::Nor => !(vj | vk),
                    Opcode::Mul => vj.wrapping_mul(vk),
                    _ => unreachable!(),
                };
                reg_result = Some((dest, result));
            }
            Opcode::Store => {
                let addr = vj.wrapping_add(station.a as u16);
                self.memory.write(addr, vk);
            }
            Opcode::Call => {
                reg_result = Some((LINK_REG, (instr.pc + 1) as u16));
                let target = station.a as i64;
                self.refetch(target);
            }
            Opcode::Ret => {
                let target = vj as i64;
                self.refetch(target);
            }
            Opcode::Beq => {
                let Operands::Beq { offset, .. } = instr.operands else { unreachable!() };
                self.stats.branches += 1;
                let taken = vj == vk;
                if taken {
                    let target_pc = instr.pc + 1 + (offset as i64 - 1);
                    if target_pc < 0 {
                        self.drain();
                        self.halted = true;
                        warn!(target_pc, "invalid branch target, halting simulation");
                        return Err(SimError::InvalidBranchTarget(target_pc));
                    }
                    self.stats.mispredictions += 1;
                    self.refetch(target_pc);
                } else {
                    self.current_pc = instr.pc + 1;
                    self.pending_control_flow = false;
                }
            }
        }

        if let Some((dest, value)) = reg_result {
            self.reg_status.clear_if(dest, id);
            self.registers.write(dest, value);
            self.stations.broadcast(id, value);
        }

        debug!(station = %id, opcode = %instr.opcode, cycle = self.cycle, "write-back");

        self.stats.completed_instructions += 1;
        let station = self.stations.get_mut(id);
        station.instruction = Some(instr);
        station.wrote_result = true;
        Ok(())
    }

    /// Clear the queue and rebuild it from `new_pc`; used by CALL, RET and a
    /// taken BEQ. Always clears `pending_control_flow`.
    fn refetch(&mut self, new_pc: i64) {
        self.current_pc = new_pc;
        self.queue.refetch(&self.program, new_pc);
        self.pending_control_flow = false;
        debug!(new_pc, "refetch: instruction queue flushed and reloaded");
    }

    /// Sweep 3: advance execution latency counters, starting newly-ready
    /// stations and stamping start/end execution timestamps.
    fn sweep_execute(&mut self) {
        let cycle = self.cycle;
        let mut touched: Vec<(i64, Option<u64>, Option<u64>)> = Vec::new();
        for station in self.stations.iter_mut() {
            if station.busy && !station.executing && station.operands_ready() && !station.just_wrote {
                station.executing = true;
                station.cycles_left = station.latency;
                debug!(station = %station.id, cycle, "begin execute");
                if let Some(instr) = station.instruction.as_mut() {
                    instr.start_exec_cycle = Some(cycle);
                    if station.cycles_left == 0 {
                        instr.end_exec_cycle = Some(cycle);
                    }
                    touched.push((instr.pc, instr.start_exec_cycle, instr.end_exec_cycle));
                }
            } else if station.executing && station.cycles_left > 0 {
                station.cycles_left -= 1;
                if station.cycles_left == 0 {
                    if let Some(instr) = station.instruction.as_mut() {
                        instr.end_exec_cycle = Some(cycle);
                        touched.push((instr.pc, instr.start_exec_cycle, instr.end_exec_cycle));
                    }
                }
            }
            station.just_wrote = false;
        }
        for (pc, start, end) in touched {
            self.touch_display(pc, |d| {
                d.start_exec_cycle = start;
                d.end_exec_cycle = end;
            });
        }
    }

    /// Sweep 4: issue the head of the queue into a free station, if any.
    fn sweep_issue(&mut self) {
        if self.queue.is_empty() || self.pending_control_flow {
            return;
        }
        let op_type = OpType::of(self.queue.front().expect("checked non-empty").opcode);
        if self.stations.find_free(op_type).is_none() {
            return; // structural stall: head remains queued
        }

        let mut instr = self.queue.pop_front().expect("checked non-empty");
        instr.issue_cycle = Some(self.cycle);
        self.touch_display(instr.pc, |d| {
            d.issue_cycle = instr.issue_cycle;
            d.start_exec_cycle = None;
            d.end_exec_cycle = None;
            d.write_cycle = None;
        });
        let id = self.stations.find_free(op_type).expect("checked above").id;

        let (vj, vk, a) = self.operands_for(&instr);
        self.apply_destination(&instr, id);

        if matches!(instr.opcode, Opcode::Beq | Opcode::Call | Opcode::Ret) {
            self.pending_control_flow = true;
        }

        debug!(station = %id, opcode = %instr.opcode, cycle = self.cycle, "issue");

        let station = self.stations.get_mut(id);
        station.busy = true;
        station.vj = vj;
        station.vk = vk;
        station.a = a;
        station.instruction = Some(instr);
    }

    /// Resolve Vj/Qj, Vk/Qk and the immediate slot for an about-to-issue
    /// instruction, by consulting current register status.
    fn operands_for(&self, instr: &Instruction) -> (Operand, Operand, i32) {
        let src = |reg: u8| -> Operand {
            match self.reg_status.get(reg) {
                Some(tag) => Operand::waiting(tag),
                None => Operand::ready(self.registers.read(reg)),
            }
        };

        match instr.operands {
            Operands::Load { base, offset, .. } => (src(base), Operand::unused(), offset),
            Operands::Store { data, base, offset } => (src(base), src(data), offset),
            Operands::Beq { a, b, offset } => (src(a), src(b), offset),
            Operands::Call { label } => (Operand::unused(), Operand::unused(), label),
            Operands::Ret => (src(LINK_REG), Operand::unused(), 0),
            Operands::Arith { src1, src2, .. } => (src(src1), src(src2), 0),
        }
    }

    /// Record this station as the pending producer of whatever register the
    /// instruction writes, if any.
    fn apply_destination(&mut self, instr: &Instruction, id: StationId) {
        match instr.operands {
            Operands::Load { dest, .. } => self.reg_status.set(dest, id),
            Operands::Arith { dest, .. } => self.reg_status.set(dest, id),
            Operands::Call { .. } => self.reg_status.set(LINK_REG, id),
            Operands::Store { .. } | Operands::Beq { .. } | Operands::Ret => {}
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let stations = self.stations.iter().map(station_snapshot).collect();

        Snapshot {
            cycle: self.cycle,
            current_pc: self.current_pc,
            instructions: self.display.clone(),
            registers: self.registers.snapshot(),
            register_status: self
                .reg_status
                .snapshot()
                .map(|tag| tag.map(|t| t.to_string())),
            memory: self.memory.nonzero_cells(),
            stations,
        }
    }
}

fn station_snapshot(station: &Station) -> StationSnapshot {
    StationSnapshot {
        name: station.id.to_string(),
        busy: station.busy,
        opcode: station.instruction.as_ref().map(|i| i.opcode.to_string()),
        vj: station.vj.value(),
        vk: station.vk.value(),
        qj: station.vj.tag().map(|t| t.to_string()),
        qk: station.vk.tag().map(|t| t.to_string()),
        a: station.a,
        status: station.status().map(Into::into),
        cycles_left: station.cycles_left,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_program;

    fn run(source: &str, mem: &[(u16, u16)], config: &HardwareConfig) -> Engine {
        let program = parse_program(source, 0).unwrap();
        let mut engine = Engine::new(program, mem, config, 0).unwrap();
        engine.run_to_completion().unwrap();
        engine
    }

    #[test]
    fn raw_forwarding() {
        let engine = run("ADD R1,R0,R0\nADD R2,R1,R1\n", &[], &HardwareConfig::default());
        assert_eq!(engine.registers.read(2), 0);
        let d = &engine.display;
        assert_eq!(d[1].issue_cycle, Some(2));
        assert_eq!(d[1].start_exec_cycle, Some(d[0].write_cycle.unwrap() + 1));
    }

    #[test]
    fn structural_stall_serializes_issue() {
        let mut config = HardwareConfig::default();
        config.add_sub = crate::station::UnitConfig::new(1, 2);
        let source = "ADD R1,R0,R0\nADD R2,R0,R0\nADD R3,R0,R0\nADD R4,R0,R0\nADD R5,R0,R0\n";
        let engine = run(source, &[], &config);
        let issue_cycles: Vec<u64> =
            engine.display.iter().map(|i| i.issue_cycle.unwrap()).collect();
        for w in issue_cycles.windows(2) {
            assert_eq!(w[1] - w[0], 5); // latency 2 + 3: issue->start, start->end, end->write, write->release
        }
    }

    #[test]
    fn load_then_use() {
        let engine = run(
            "ADD R2,R0,R0\nLOAD R1, 5(R0)\nADD R3,R1,R1\n",
            &[(5, 42)],
            &HardwareConfig::default(),
        );
        assert_eq!(engine.registers.read(1), 42);
        assert_eq!(engine.registers.read(3), 84);
        let load = &engine.display[1];
        // configured LOAD=6 becomes internal latency 5; end_exec - start_exec + 1 == latency + 1
        assert_eq!(load.end_exec_cycle.unwrap() - load.start_exec_cycle.unwrap() + 1, 6);
    }

    #[test]
    fn branch_not_taken_does_not_flush() {
        let engine = run(
            "LOAD R1, 5(R0)\nBEQ R1,R0,2\nADD R2,R0,R0\n",
            &[(5, 7)],
            &HardwareConfig::default(),
        );
        let stats = engine.statistics();
        assert_eq!(stats.branches, 1);
        assert_eq!(stats.mispredictions, 0);
        assert_eq!(engine.registers.read(2), 0);
    }

    #[test]
    fn branch_taken_flushes_and_counts_misprediction() {
        let engine = run("BEQ R0,R0,3\nADD R1,R0,R0\nADD R1,R0,R0\nADD R2,R0,R0\n", &[], &HardwareConfig::default());
        let stats = engine.statistics();
        assert_eq!(stats.branches, 1);
        assert_eq!(stats.mispredictions, 1);
        // the two filler ADDs at pc 1,2 were skipped by the flush
        assert_eq!(engine.registers.read(1), 0);
        assert_eq!(engine.registers.read(2), 0);
    }

    #[test]
    fn call_ret_round_trip() {
        // CALL 3 at pc 0 jumps straight to pc 3, skipping the filler at pc
        // 1-2 entirely (it never gets a chance to issue); RET then returns
        // to pc+1 of the CALL, i.e. pc 1, the formula's literal value.
        let program = "CALL 3\nADD R4,R0,R0\nADD R4,R0,R0\nADD R2,R0,R0\nRET\n";
        let parsed = parse_program(program, 0).unwrap();
        let mut engine = Engine::new(parsed, &[], &HardwareConfig::default(), 0).unwrap();
        while engine.statistics().completed_instructions < 3 {
            engine.step().unwrap();
        }
        assert_eq!(engine.current_pc, 1);
        assert_eq!(engine.registers.read(1), 1);
        assert_eq!(engine.registers.read(2), 0);
        assert_eq!(engine.registers.read(4), 0); // fillers at pc 1,2 never issued
    }
}
