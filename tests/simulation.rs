//! Integration tests driving the public engine API exactly as an embedding
//! caller would: parse a program, construct an engine, step it, read back
//! statistics and snapshots. Never reaches into sweep internals.

use tomasulo_sim::station::UnitConfig;
use tomasulo_sim::{parse_program, Engine, HardwareConfig, SimError};

fn engine_for(source: &str, mem_init: &[(u16, u16)], config: &HardwareConfig) -> anyhow::Result<Engine> {
    let program = parse_program(source, 0)?;
    Ok(Engine::new(program, mem_init, config, 0)?)
}

#[test]
fn raw_hazard_forwards_over_the_cdb() -> anyhow::Result<()> {
    let mut engine = engine_for("ADD R1,R0,R0\nADD R2,R1,R1\nSUB R3,R2,R1\n", &[], &HardwareConfig::default())?;
    engine.run_to_completion()?;

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.registers[1], 0);
    assert_eq!(snapshot.registers[2], 0);
    assert_eq!(snapshot.registers[3], 0);
    assert_eq!(engine.statistics().completed_instructions, 3);
    Ok(())
}

#[test]
fn structural_hazard_serializes_through_one_add_sub_station() -> anyhow::Result<()> {
    let mut config = HardwareConfig::default();
    config.add_sub = UnitConfig::new(1, 2);

    let mut engine = engine_for(
        "ADD R1,R0,R0\nADD R2,R0,R0\nADD R3,R0,R0\nADD R4,R0,R0\n",
        &[],
        &config,
    )?;
    engine.run_to_completion()?;

    let snapshot = engine.snapshot();
    let issue_cycles: Vec<u64> = snapshot.instructions.iter().map(|i| i.issue_cycle.unwrap()).collect();
    for window in issue_cycles.windows(2) {
        assert_eq!(window[1] - window[0], 5, "only one ADD_SUB station means strict serialization");
    }
    Ok(())
}

#[test]
fn load_result_is_visible_to_a_dependent_add() -> anyhow::Result<()> {
    let mut engine = engine_for(
        "LOAD R1, 5(R0)\nADD R2,R1,R1\n",
        &[(5, 42)],
        &HardwareConfig::default(),
    )?;
    engine.run_to_completion()?;

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.registers[1], 42);
    assert_eq!(snapshot.registers[2], 84);
    Ok(())
}

#[test]
fn branch_not_taken_falls_through_without_a_flush() -> anyhow::Result<()> {
    let mut engine = engine_for(
        "LOAD R1, 5(R0)\nBEQ R1,R0,9\nADD R2,R0,R0\n",
        &[(5, 7)],
        &HardwareConfig::default(),
    )?;
    engine.run_to_completion()?;

    let stats = engine.statistics();
    assert_eq!(stats.branches, 1);
    assert_eq!(stats.mispredictions, 0);
    assert_eq!(engine.snapshot().registers[2], 0);
    Ok(())
}

#[test]
fn branch_taken_flushes_the_queue_and_counts_a_misprediction() -> anyhow::Result<()> {
    let mut engine = engine_for(
        "BEQ R0,R0,3\nADD R1,R0,R0\nADD R2,R0,R0\nADD R3,R0,R0\n",
        &[],
        &HardwareConfig::default(),
    )?;
    engine.run_to_completion()?;

    let stats = engine.statistics();
    assert_eq!(stats.branches, 1);
    assert_eq!(stats.mispredictions, 1);
    // the flush skips pc 1 and pc 2 entirely; only the ADD at pc 3 ever runs
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.registers[1], 0);
    assert_eq!(snapshot.registers[2], 0);
    assert_eq!(stats.completed_instructions, 2); // BEQ + the ADD at pc 3
    Ok(())
}

#[test]
fn call_then_ret_writes_the_link_register_and_skips_the_filler() -> anyhow::Result<()> {
    let mut engine = engine_for(
        "CALL 3\nADD R4,R0,R0\nADD R4,R0,R0\nADD R2,R0,R0\nRET\n",
        &[],
        &HardwareConfig::default(),
    )?;
    while engine.statistics().completed_instructions < 3 {
        engine.step()?;
    }

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.registers[1], 1); // link register: pc(CALL) + 1
    assert_eq!(snapshot.registers[2], 0);
    assert_eq!(snapshot.registers[4], 0); // filler at pc 1,2 never issued
    assert_eq!(snapshot.current_pc, 1);
    Ok(())
}

#[test]
fn cycle_limit_halts_an_unbounded_program() -> anyhow::Result<()> {
    // An unconditional branch back to itself never terminates on its own.
    let mut engine = engine_for("BEQ R0,R0,0\n", &[], &HardwareConfig::default())?;
    let err = engine.run_to_completion().unwrap_err();
    assert!(matches!(err, SimError::CycleLimitExceeded(_)));
    Ok(())
}
