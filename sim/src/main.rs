//! LOCO SIM: A simulation and analysis tool for the loco Monte Carlo localization filter.
//!
//! This program can operate in two modes:
//!
//! - Run mode: Steps the filter against a simulated robot as fast as possible and writes one CSV row
//!   per filter cycle together with a summary report. Deterministic for a given configuration.
//!
//! - Live mode: Runs the filter on its own fixed-cadence thread in real time while the simulated
//!   robot drives, logging the estimate against the truth at a fixed interval.
//!
//! Parameters are loaded from a configuration file (TOML/JSON/YAML) when one is given and may then
//! be overridden with command-line flags. Use `init-config` to write a template.

mod common;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use common::{ensure_parent_dir, init_logger};
use log::{info, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use loco::config::ConfigFile;
use loco::particle::PoseHandle;
use loco::runner::LocalizationRunner;
use loco::sim::{
    Initialization, LocalizationRecord, SimDrivetrain, SimRobot, SimulationConfig,
    build_simulated_filter, run_simulation,
};

const LONG_ABOUT: &str = "LOCO SIM: A simulation and analysis tool for the loco Monte Carlo localization filter.

This program can operate in two modes:

- Run mode: Steps the filter against a simulated robot as fast as possible and writes one CSV row
  per filter cycle together with a summary report.

- Live mode: Runs the filter on its own fixed-cadence thread in real time while the simulated
  robot drives.

Parameters are loaded from a configuration file (TOML/JSON/YAML) when one is given and may then
be overridden with command-line flags. Use `init-config` to write a template.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "A simulation and analysis tool for the loco localization filter.", long_about = LONG_ABOUT)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

/// Verbosity of the log output
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}
impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Top-level commands
#[derive(Subcommand, Clone)]
enum Command {
    #[command(about = "Run a deterministic simulation and write per-cycle results to CSV")]
    Run(RunArgs),
    #[command(about = "Run the filter in real time on a background thread against a simulated robot")]
    Live(LiveArgs),
    #[command(name = "init-config", about = "Write a template simulation configuration file")]
    InitConfig(InitConfigArgs),
}

/// How the particle cloud is seeded
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum InitMode {
    Uniform,
    Known,
    Normal,
}

/// Overrides shared by the run and live modes
#[derive(Args, Clone, Debug)]
struct ScenarioArgs {
    /// Simulation configuration file (TOML/JSON/YAML); defaults are used when omitted
    #[arg(short, long, value_parser)]
    config: Option<PathBuf>,

    /// Number of particles
    #[arg(long)]
    particles: Option<usize>,

    /// Simulated duration in seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Seed of the simulated hardware
    #[arg(long)]
    seed: Option<u64>,

    /// Seed of the filter
    #[arg(long)]
    filter_seed: Option<u64>,

    /// How to seed the particle cloud
    #[arg(long, value_enum)]
    init: Option<InitMode>,

    /// Standard deviation of the normal initialization (m)
    #[arg(long, default_value_t = 0.1)]
    init_std: f64,
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    #[command(flatten)]
    scenario: ScenarioArgs,

    /// Output CSV file for the per-cycle records
    #[arg(short, long, value_parser)]
    output: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
struct LiveArgs {
    #[command(flatten)]
    scenario: ScenarioArgs,

    /// Interval between logged estimates in milliseconds
    #[arg(long, default_value_t = 500)]
    report_interval_ms: u64,
}

/// Arguments for the init-config command
#[derive(Args, Clone, Debug)]
struct InitConfigArgs {
    /// Output file path for the config file
    /// File extension determines format: .json, .yaml/.yml, or .toml
    #[arg(short, long, value_parser)]
    output: PathBuf,
}

/// Load the configuration and apply command-line overrides
fn load_scenario(args: &ScenarioArgs) -> Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if let Some(particles) = args.particles {
        config.localization.filter.num_particles = particles;
    }
    if let Some(duration) = args.duration {
        config.duration = duration;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(seed) = args.filter_seed {
        config.localization.filter.seed = seed;
    }
    match args.init {
        Some(InitMode::Uniform) => config.initialization = Initialization::Uniform,
        Some(InitMode::Known) => config.initialization = Initialization::Known,
        Some(InitMode::Normal) => {
            config.initialization = Initialization::Normal { std: args.init_std }
        }
        None => {}
    }
    Ok(config)
}

fn run(args: &RunArgs) -> Result<()> {
    let config = load_scenario(&args.scenario)?;
    let result = run_simulation(&config).context("simulation failed")?;
    if let Some(output) = &args.output {
        ensure_parent_dir(output)?;
        LocalizationRecord::to_csv(&result.records, output)
            .with_context(|| format!("writing {}", output.display()))?;
        info!("Wrote {} records to {}", result.records.len(), output.display());
    }
    println!("{}", result.report);
    Ok(())
}

fn live(args: &LiveArgs) -> Result<()> {
    let config = load_scenario(&args.scenario)?;
    if args.report_interval_ms == 0 {
        bail!("report interval must be positive");
    }
    let period = Duration::try_from_secs_f64(config.period)
        .with_context(|| format!("invalid period {}", config.period))?;
    let duration = Duration::try_from_secs_f64(config.duration)
        .with_context(|| format!("invalid duration {}", config.duration))?;

    let robot = SimRobot::new(&config.waypoints, config.speed)?;
    let truth = PoseHandle::new(robot.pose());
    let mut filter = build_simulated_filter(&config, &truth)?;
    let start = robot.pose().position();
    match config.initialization {
        Initialization::Uniform => filter.init_uniform(),
        Initialization::Known => filter.init_at(start),
        Initialization::Normal { std } => filter.init_normal(start, std)?,
    }
    let drivetrain = SimDrivetrain::new(
        robot,
        truth.clone(),
        config.period,
        config.noise.odometry_slip_std,
        config.seed,
    )?;
    let noise = config.localization.build_odometry_noise()?;

    let runner = LocalizationRunner::spawn(filter, period, drivetrain, noise)
        .context("spawning the localization thread")?;
    let interval = Duration::from_millis(args.report_interval_ms);
    let started = Instant::now();
    while started.elapsed() < duration {
        std::thread::sleep(interval);
        let estimate = runner.pose();
        let actual = truth.get();
        info!(
            "t={:>6.2}s estimate {} truth {} error {:.4} m",
            started.elapsed().as_secs_f64(),
            estimate,
            actual,
            estimate.distance_to(&actual)
        );
    }
    let cycles = runner.cycles();
    let corrections = runner.corrections();
    let overruns = runner.overruns();
    let filter = match runner.stop() {
        Ok(filter) => filter,
        Err(_) => bail!("localization thread panicked"),
    };
    if overruns > 0 {
        warn!("{} of {} cycles overran their deadline", overruns, cycles);
    }
    let final_error = filter.compute_prediction().distance_to(&truth.get());
    println!("cycles:       {}", cycles);
    println!("corrections:  {}", corrections);
    println!("overruns:     {}", overruns);
    println!("final error:  {:.4} m", final_error);
    Ok(())
}

fn init_config(args: &InitConfigArgs) -> Result<()> {
    ensure_parent_dir(&args.output)?;
    SimulationConfig::default()
        .to_file(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!("Wrote template configuration to {}", args.output.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.log_level.into(), cli.log_file.as_ref())?;

    match &cli.command {
        Command::Run(args) => run(args),
        Command::Live(args) => live(args),
        Command::InitConfig(args) => init_config(args),
    }
}
