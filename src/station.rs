//! Reservation stations: typed buckets of in-flight instructions, their
//! operand state, and the hardware configuration that sizes the pool.

use std::fmt;

use crate::error::{Result, SimError};
use crate::isa::{Instruction, Opcode};

/// Which bucket of reservation stations an opcode is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpType {
    Load,
    Store,
    Beq,
    CallRet,
    AddSub,
    Nor,
    Mul,
}

impl OpType {
    pub const ALL: [OpType; 7] = [
        OpType::Load,
        OpType::Store,
        OpType::Beq,
        OpType::CallRet,
        OpType::AddSub,
        OpType::Nor,
        OpType::Mul,
    ];

    pub fn of(opcode: Opcode) -> OpType {
        match opcode {
            Opcode::Load => OpType::Load,
            Opcode::Store => OpType::Store,
            Opcode::Beq => OpType::Beq,
            Opcode::Call | Opcode::Ret => OpType::CallRet,
            Opcode::Add | Opcode::Sub => OpType::AddSub,
            Opcode::Nor => OpType::Nor,
            Opcode::Mul => OpType::Mul,
        }
    }

    /// The `<TYPE>` prefix used to build a station's display name, e.g. "ADD_SUB".
    pub fn prefix(&self) -> &'static str {
        match self {
            OpType::Load => "LOAD",
            OpType::Store => "STORE",
            OpType::Beq => "BEQ",
            OpType::CallRet => "CALL_RET",
            OpType::AddSub => "ADD_SUB",
            OpType::Nor => "NOR",
            OpType::Mul => "MUL",
        }
    }

    /// LOAD/STORE silently lose one cycle off the configured latency — the
    /// configured value includes a stage accounted for implicitly elsewhere.
    fn uses_reduced_latency(&self) -> bool {
        matches!(self, OpType::Load | OpType::Store)
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// The stable, globally unique name of a reservation station, e.g. `ADD_SUB2`.
///
/// Represented as a small `Copy` value (op-type + 1-based index) rather than
/// an owned `String`: it is the lightweight identity the register-status
/// table and operand tags actually need, and it still `Display`s to the
/// exact "<TYPE><index>" form used elsewhere as a station's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StationId {
    pub op_type: OpType,
    pub index: u32,
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op_type.prefix(), self.index)
    }
}

/// Per-unit `(count, cycles)` pair as supplied by the hardware configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitConfig {
    pub count: u32,
    pub cycles: u32,
}

impl UnitConfig {
    pub fn new(count: u32, cycles: u32) -> Self {
        UnitConfig { count, cycles }
    }
}

/// Hardware configuration: one `(count, cycles)` pair per op-type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareConfig {
    pub load: UnitConfig,
    pub store: UnitConfig,
    pub beq: UnitConfig,
    pub call_ret: UnitConfig,
    pub add_sub: UnitConfig,
    pub nor: UnitConfig,
    pub mul: UnitConfig,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        HardwareConfig {
            load: UnitConfig::new(2, 6),
            store: UnitConfig::new(2, 6),
            beq: UnitConfig::new(2, 1),
            call_ret: UnitConfig::new(1, 1),
            add_sub: UnitConfig::new(4, 2),
            nor: UnitConfig::new(2, 1),
            mul: UnitConfig::new(2, 10),
        }
    }
}

impl HardwareConfig {
    pub fn get(&self, op_type: OpType) -> UnitConfig {
        match op_type {
            OpType::Load => self.load,
            OpType::Store => self.store,
            OpType::Beq => self.beq,
            OpType::CallRet => self.call_ret,
            OpType::AddSub => self.add_sub,
            OpType::Nor => self.nor,
            OpType::Mul => self.mul,
        }
    }

    pub fn set(&mut self, op_type: OpType, config: UnitConfig) {
        match op_type {
            OpType::Load => self.load = config,
            OpType::Store => self.store = config,
            OpType::Beq => self.beq = config,
            OpType::CallRet => self.call_ret = config,
            OpType::AddSub => self.add_sub = config,
            OpType::Nor => self.nor = config,
            OpType::Mul => self.mul = config,
        }
    }

    /// Validate every unit has a positive count and cycle count.
    pub fn validate(&self) -> Result<()> {
        for op_type in OpType::ALL {
            let cfg = self.get(op_type);
            if cfg.count < 1 || cfg.cycles < 1 {
                return Err(SimError::InvalidHardwareConfig {
                    op_type,
                    count: cfg.count as i64,
                    cycles: cfg.cycles as i64,
                });
            }
        }
        Ok(())
    }
}

/// An operand slot: either a ready value, or a tag naming the producing station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Operand {
    value: Option<u16>,
    tag: Option<StationId>,
}

impl Operand {
    /// A slot that is unused by the current opcode: ready, don't-care value.
    pub fn unused() -> Self {
        Operand { value: Some(0), tag: None }
    }

    pub fn ready(value: u16) -> Self {
        Operand { value: Some(value), tag: None }
    }

    pub fn waiting(tag: StationId) -> Self {
        Operand { value: None, tag: Some(tag) }
    }

    pub fn is_ready(&self) -> bool {
        self.tag.is_none()
    }

    pub fn value(&self) -> Option<u16> {
        self.value
    }

    pub fn tag(&self) -> Option<StationId> {
        self.tag
    }

    /// Forward a broadcast result into this slot if it is waiting on `from`.
    /// Returns true if this slot was the one waiting.
    fn forward(&mut self, from: StationId, result: u16) -> bool {
        if self.tag == Some(from) {
            self.value = Some(result);
            self.tag = None;
            true
        } else {
            false
        }
    }
}

/// What stage of its life a busy station is in (for the snapshot exporter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationStatus {
    Waiting,
    Executing,
    Wrote,
}

/// A single reservation station: a slot of fixed op-type holding at most one
/// in-flight instruction along with its operand state.
#[derive(Debug, Clone)]
pub struct Station {
    pub id: StationId,
    pub latency: u32,
    pub busy: bool,
    pub instruction: Option<Instruction>,
    pub vj: Operand,
    pub vk: Operand,
    pub a: i32,
    pub cycles_left: u32,
    pub executing: bool,
    pub wrote_result: bool,
    pub just_wrote: bool,
}

impl Station {
    fn new(id: StationId, latency: u32) -> Self {
        Station {
            id,
            latency,
            busy: false,
            instruction: None,
            vj: Operand::unused(),
            vk: Operand::unused(),
            a: 0,
            cycles_left: 0,
            executing: false,
            wrote_result: false,
            just_wrote: false,
        }
    }

    fn clear(&mut self) {
        self.busy = false;
        self.instruction = None;
        self.vj = Operand::unused();
        self.vk = Operand::unused();
        self.a = 0;
        self.cycles_left = 0;
        self.executing = false;
        self.wrote_result = false;
        self.just_wrote = false;
    }

    pub fn op_type(&self) -> OpType {
        self.id.op_type
    }

    pub fn status(&self) -> Option<StationStatus> {
        if !self.busy {
            return None;
        }
        if self.wrote_result {
            Some(StationStatus::Wrote)
        } else if self.executing {
            Some(StationStatus::Executing)
        } else {
            Some(StationStatus::Waiting)
        }
    }

    /// Both operands are ready: the station may begin executing.
    pub fn operands_ready(&self) -> bool {
        self.vj.is_ready() && self.vk.is_ready()
    }
}

/// The full pool of reservation stations across every op-type.
#[derive(Debug, Clone)]
pub struct StationPool {
    stations: Vec<Station>,
}

impl StationPool {
    pub fn build(config: &HardwareConfig) -> Result<Self> {
        config.validate()?;
        let mut stations = Vec::new();
        for op_type in OpType::ALL {
            let unit = config.get(op_type);
            let latency = if op_type.uses_reduced_latency() {
                unit.cycles - 1
            } else {
                unit.cycles
            };
            for index in 1..=unit.count {
                stations.push(Station::new(StationId { op_type, index }, latency));
            }
        }
        Ok(StationPool { stations })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Station> {
        self.stations.iter_mut()
    }

    pub fn any_busy(&self) -> bool {
        self.stations.iter().any(|s| s.busy)
    }

    pub fn get(&self, id: StationId) -> &Station {
        self.stations
            .iter()
            .find(|s| s.id == id)
            .expect("station id always refers to a station in this pool")
    }

    pub fn get_mut(&mut self, id: StationId) -> &mut Station {
        self.stations
            .iter_mut()
            .find(|s| s.id == id)
            .expect("station id always refers to a station in this pool")
    }

    /// First free station (lowest index) of the given type, if any.
    pub fn find_free(&mut self, op_type: OpType) -> Option<&mut Station> {
        self.stations
            .iter_mut()
            .filter(|s| s.op_type() == op_type && !s.busy)
            .min_by_key(|s| s.id.index)
    }

    /// Release every station that broadcast last cycle (Sweep 1).
    pub fn release_written(&mut self) {
        for station in &mut self.stations {
            if station.wrote_result {
                station.clear();
            }
        }
    }

    /// Broadcast `result` from `from` to every station waiting on it (Sweep 2 step 3).
    pub fn broadcast(&mut self, from: StationId, result: u16) {
        for station in &mut self.stations {
            if !station.busy || station.id == from {
                continue;
            }
            let hit_j = station.vj.forward(from, result);
            let hit_k = station.vk.forward(from, result);
            if hit_j || hit_k {
                station.just_wrote = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_zero_count_for_every_unit() {
        for op_type in OpType::ALL {
            let mut config = HardwareConfig::default();
            config.set(op_type, UnitConfig::new(0, 1));
            let err = config.validate().unwrap_err();
            assert!(matches!(err, SimError::InvalidHardwareConfig { op_type: bad, .. } if bad == op_type));
        }
    }

    #[test]
    fn validate_rejects_zero_cycles_for_every_unit() {
        for op_type in OpType::ALL {
            let mut config = HardwareConfig::default();
            config.set(op_type, UnitConfig::new(1, 0));
            let err = config.validate().unwrap_err();
            assert!(matches!(err, SimError::InvalidHardwareConfig { op_type: bad, .. } if bad == op_type));
        }
    }

    #[test]
    fn validate_accepts_every_unit_at_its_minimum() {
        for op_type in OpType::ALL {
            let mut config = HardwareConfig::default();
            config.set(op_type, UnitConfig::new(1, 1));
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn load_and_store_stations_get_configured_minus_one_latency() {
        let mut config = HardwareConfig::default();
        config.load = UnitConfig::new(2, 6);
        config.store = UnitConfig::new(2, 6);
        let pool = StationPool::build(&config).unwrap();
        for station in pool.iter().filter(|s| s.op_type() == OpType::Load || s.op_type() == OpType::Store) {
            assert_eq!(station.latency, 5);
        }
    }

    #[test]
    fn other_units_get_latency_equal_to_configured_cycles() {
        let mut config = HardwareConfig::default();
        config.add_sub = UnitConfig::new(4, 2);
        config.mul = UnitConfig::new(2, 10);
        config.beq = UnitConfig::new(2, 1);
        config.call_ret = UnitConfig::new(1, 1);
        config.nor = UnitConfig::new(2, 1);
        let pool = StationPool::build(&config).unwrap();
        for station in pool.iter() {
            match station.op_type() {
                OpType::AddSub => assert_eq!(station.latency, 2),
                OpType::Mul => assert_eq!(station.latency, 10),
                OpType::Beq => assert_eq!(station.latency, 1),
                OpType::CallRet => assert_eq!(station.latency, 1),
                OpType::Nor => assert_eq!(station.latency, 1),
                OpType::Load | OpType::Store => {}
            }
        }
    }
}
