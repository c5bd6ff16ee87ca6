//! CLI entry point for the simulation harness: samples actuator positions over
//! built-in move scenarios and writes CSV or JSON Lines.

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use krusty_kinematics::config::{load_config, Config, ConfigError};
use krusty_kinematics::motion::{Coord, Move, MoveError, PositionEngine, StepperKinematics, TrapQ};

/// Used when no config file is given.
const DEFAULT_CONFIG: &str = r#"
[axis.x]
type = "smoother"
smoother = "quartic"
smooth_time = 0.02

[axis.y]
type = "shaper"
shaper = "mzv"
frequency = 45.0

[steppers.stepper_a]
type = "corexy"
sign = "plus"

[steppers.stepper_b]
type = "corexy"
sign = "minus"

[steppers.stepper_z]
type = "cartesian"
axis = "z"

[steppers.extruder]
type = "extruder"
pressure_advance_smooth_time = 0.04
"#;

const SCENARIOS: [&str; 3] = ["cruise", "trapezoid", "corner"];

/// Simulation Harness CLI
#[derive(Parser, Debug)]
#[command(name = "sim-harness", about = "Sample actuator positions over built-in move scenarios.")]
pub struct Cli {
    /// Path to a TOML config file (overrides defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for sample files
    #[arg(short, long, default_value = "./sim_output")]
    output: PathBuf,

    /// Scenario to run
    #[arg(long, default_value = "trapezoid")]
    scenario: String,

    /// Sample period in seconds
    #[arg(long, default_value_t = 0.001)]
    period: f64,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available built-in scenarios
    ListScenarios,
    /// Run a single scenario (default)
    Run,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum Format {
    Csv,
    Json,
}

#[derive(Debug, Serialize)]
struct SampleRecord<'a> {
    stepper: &'a str,
    time: f64,
    position: f64,
    velocity: f64,
}

/// Toolhead and extruder move queues of one scenario.
struct Scenario {
    toolhead: TrapQ,
    extruder: TrapQ,
}

fn build_scenario(name: &str) -> Result<Option<Scenario>, MoveError> {
    let mut toolhead = TrapQ::new();
    let mut extruder = TrapQ::new();
    match name {
        "cruise" => {
            toolhead.append(Move::fill(0.0, 0.0, 1.0, 0.0, Coord::default(), Coord::new(10.0, 0.0, 0.0), 10.0, 10.0, 0.0)?)?;
            extruder.append(Move::extruder_fill(0.0, 0.0, 1.0, 0.0, 0.0, 0.5, 0.5, 0.0, 0.0, 0.0)?)?;
        }
        "trapezoid" => {
            // 0 -> 100 mm/s at 2000 mm/s^2, 0.2s cruise, back to 0
            let axes_d = Coord::new(15.0, 20.0, 0.0);
            toolhead.append(Move::fill(0.0, 0.05, 0.2, 0.05, Coord::default(), axes_d, 0.0, 100.0, 2000.0)?)?;
            extruder.append(Move::extruder_fill(0.0, 0.05, 0.2, 0.05, 0.0, 0.0, 4.0, 80.0, 2.0, -2.0)?)?;
        }
        "corner" => {
            let first = Move::fill(0.0, 0.02, 0.1, 0.02, Coord::default(), Coord::new(12.0, 0.0, 0.0), 0.0, 100.0, 5000.0)?;
            let corner = first.end_coord();
            toolhead.append(first)?;
            // Leaves a 10ms pause at the corner
            toolhead.append(Move::fill(0.15, 0.02, 0.1, 0.02, corner, Coord::new(0.0, 12.0, 0.0), 0.0, 100.0, 5000.0)?)?;
            extruder.append(Move::extruder_fill(0.0, 0.02, 0.1, 0.02, 0.0, 0.0, 4.0, 200.0, 1.5, -1.5)?)?;
            extruder.append(Move::extruder_fill(0.15, 0.02, 0.1, 0.02, 0.48, 0.0, 4.0, 200.0, 1.5, -1.5)?)?;
        }
        _ => return Ok(None),
    }
    Ok(Some(Scenario { toolhead, extruder }))
}

fn sample_engine<'a>(
    name: &'a str,
    engine: &PositionEngine,
    queue: &TrapQ,
    period: f64,
    out: &mut Vec<SampleRecord<'a>>,
) {
    let moves = queue.moves();
    let (Some(first), Some(last)) = (moves.first(), moves.last()) else {
        return;
    };
    let mut last_pos = engine.position_at(&first.start_pos, 0.0).unwrap_or(0.0);
    let steps = ((last.end_time() - first.print_time) / period).floor() as usize;
    for i in 0..=steps {
        let time = first.print_time + i as f64 * period;
        let Some((idx, move_time)) = queue.find(time) else {
            continue;
        };
        match engine.calc_sample(moves, idx, move_time, last_pos) {
            Ok(s) => {
                last_pos = s.position;
                out.push(SampleRecord { stepper: name, time, position: s.position, velocity: s.velocity });
            }
            Err(e) => tracing::warn!("{} at {:.4}s: {}", name, time, e),
        }
    }
}

fn write_samples(path: &PathBuf, format: Format, records: &[SampleRecord]) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        Format::Csv => {
            let mut wtr = csv::Writer::from_path(path)?;
            for r in records {
                wtr.serialize(r)?;
            }
            wtr.flush()?;
        }
        Format::Json => {
            let mut out = BufWriter::new(File::create(path)?);
            for r in records {
                writeln!(out, "{}", serde_json::to_string(r)?)?;
            }
            out.flush()?;
        }
    }
    Ok(())
}

fn load_engines(cli: &Cli) -> Result<HashMap<String, PositionEngine>, ConfigError> {
    let config = match &cli.config {
        Some(path) => load_config(&path.to_string_lossy())?,
        None => toml::from_str::<Config>(DEFAULT_CONFIG)?,
    };
    config.build_engines()
}

fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
    let cli = Cli::parse();

    if let Some(Commands::ListScenarios) = cli.command {
        println!("Available scenarios: {}", SCENARIOS.join(", "));
        return;
    }
    if !cli.period.is_finite() || cli.period <= 0.0 {
        eprintln!("Sample period must be > 0, got {}", cli.period);
        std::process::exit(1);
    }

    let engines = match load_engines(&cli) {
        Ok(engines) => engines,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };
    let scenario = match build_scenario(&cli.scenario) {
        Ok(Some(s)) => s,
        Ok(None) => {
            eprintln!("Unknown scenario '{}'. Available: {}", cli.scenario, SCENARIOS.join(", "));
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to build scenario '{}': {e}", cli.scenario);
            std::process::exit(1);
        }
    };

    if let Err(e) = std::fs::create_dir_all(&cli.output) {
        eprintln!("Failed to create output directory {}: {e}", cli.output.display());
        std::process::exit(1);
    }

    let mut names: Vec<&String> = engines.keys().collect();
    names.sort();
    let mut records = Vec::new();
    for name in names {
        let engine = &engines[name];
        let queue = match engine.kinematics() {
            StepperKinematics::Extruder(_) => &scenario.extruder,
            _ => &scenario.toolhead,
        };
        sample_engine(name, engine, queue, cli.period, &mut records);
    }

    let ext = match cli.format {
        Format::Csv => "csv",
        Format::Json => "jsonl",
    };
    let path = cli.output.join(format!("{}.{}", cli.scenario, ext));
    if let Err(e) = write_samples(&path, cli.format, &records) {
        eprintln!("Failed to write {}: {e}", path.display());
        std::process::exit(1);
    }
    tracing::info!("Wrote {} samples to {}", records.len(), path.display());
}
