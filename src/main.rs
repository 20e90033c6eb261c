use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use tomasulo_sim::station::{OpType, UnitConfig};
use tomasulo_sim::{parse_mem_init, parse_program, Engine, HardwareConfig};

/// Cycle-accurate Tomasulo out-of-order scheduling simulator.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the assembly program file
    program: String,

    /// Path to a memory-initializer file (`addr:value` per line)
    #[arg(short = 'm', long)]
    mem_init: Option<String>,

    /// Path to a hardware-configuration file (`UNIT=count,cycles` per line)
    #[arg(short = 'c', long)]
    config: Option<String>,

    /// Starting program counter
    #[arg(long, default_value_t = 0)]
    start_pc: i64,

    /// Print per-cycle debug logs during simulation
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(log_level).with_target(false).init();

    let source = std::fs::read_to_string(&args.program)
        .with_context(|| format!("could not read program file `{}`", &args.program))?;
    let program = parse_program(&source, args.start_pc)?;

    let mem_init = match &args.mem_init {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("could not read memory-init file `{path}`"))?;
            parse_mem_init(&text)?
        }
        None => Vec::new(),
    };

    let config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("could not read hardware-config file `{path}`"))?;
            parse_hardware_config(&text)?
        }
        None => HardwareConfig::default(),
    };

    info!(instructions = program.len(), "loaded program");

    let mut engine = Engine::new(program, &mem_init, &config, args.start_pc)?;
    engine.run_to_completion()?;

    let stats = engine.statistics();
    println!("cycles:      {}", stats.total_cycles);
    println!("instructions:{}", stats.completed_instructions);
    println!("IPC:         {:.3}", stats.ipc());
    println!("branches:    {}", stats.branches);
    println!("mispredict:  {} ({:.1}%)", stats.mispredictions, stats.misprediction_pct());

    Ok(())
}

/// Parse the CLI-only `UNIT=count,cycles` hardware-configuration text format.
/// The library itself knows nothing about this format; it only consumes the
/// resulting [`HardwareConfig`].
fn parse_hardware_config(text: &str) -> Result<HardwareConfig> {
    let mut config = HardwareConfig::default();
    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let (unit, rest) = line
            .split_once('=')
            .with_context(|| format!("line {}: expected `UNIT=count,cycles`", lineno + 1))?;
        let (count_tok, cycles_tok) = rest
            .split_once(',')
            .with_context(|| format!("line {}: expected `UNIT=count,cycles`", lineno + 1))?;
        let count: u32 = count_tok
            .trim()
            .parse()
            .with_context(|| format!("line {}: invalid count `{count_tok}`", lineno + 1))?;
        let cycles: u32 = cycles_tok
            .trim()
            .parse()
            .with_context(|| format!("line {}: invalid cycles `{cycles_tok}`", lineno + 1))?;

        let op_type = match unit.trim().to_uppercase().as_str() {
            "LOAD" => OpType::Load,
            "STORE" => OpType::Store,
            "BEQ" => OpType::Beq,
            "CALL_RET" => OpType::CallRet,
            "ADD_SUB" => OpType::AddSub,
            "NOR" => OpType::Nor,
            "MUL" => OpType::Mul,
            other => bail!("line {}: unknown unit `{other}`", lineno + 1),
        };
        config.set(op_type, UnitConfig::new(count, cycles));
    }
    Ok(config)
}
