//! Read-only views of engine state for an external collaborator: a per-cycle
//! snapshot of the whole machine, and terminal statistics.
//!
//! These types optionally derive `serde::Serialize` behind the `serde`
//! feature, so exposing simulator state to a frontend doesn't pull
//! serialization into default builds.

use crate::isa::{Instruction, REG_COUNT};
use crate::station::StationStatus;

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone)]
pub struct StationSnapshot {
    pub name: String,
    pub busy: bool,
    pub opcode: Option<String>,
    pub vj: Option<u16>,
    pub vk: Option<u16>,
    pub qj: Option<String>,
    pub qk: Option<String>,
    pub a: i32,
    pub status: Option<StationStatusSnapshot>,
    pub cycles_left: u32,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationStatusSnapshot {
    Waiting,
    Executing,
    Wrote,
}

impl From<StationStatus> for StationStatusSnapshot {
    fn from(value: StationStatus) -> Self {
        match value {
            StationStatus::Waiting => StationStatusSnapshot::Waiting,
            StationStatus::Executing => StationStatusSnapshot::Executing,
            StationStatus::Wrote => StationStatusSnapshot::Wrote,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub cycle: u64,
    pub current_pc: i64,
    pub instructions: Vec<Instruction>,
    pub registers: [u16; REG_COUNT],
    pub register_status: [Option<String>; REG_COUNT],
    pub memory: Vec<(u16, u16)>,
    pub stations: Vec<StationSnapshot>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, Default)]
pub struct Statistics {
    pub total_cycles: u64,
    pub completed_instructions: u64,
    pub branches: u64,
    pub mispredictions: u64,
}

impl Statistics {
    pub fn ipc(&self) -> f64 {
        if self.total_cycles == 0 {
            0.0
        } else {
            self.completed_instructions as f64 / self.total_cycles as f64
        }
    }

    pub fn misprediction_pct(&self) -> f64 {
        if self.branches == 0 {
            0.0
        } else {
            self.mispredictions as f64 / self.branches as f64 * 100.0
        }
    }
}
