mod calibrate;
mod clock;
mod config;
mod context;
mod error;
mod failure;
mod generator;
mod ingest;
mod item_store;
mod logging;
mod metrics;
mod planner;
mod signals;
mod sim;
mod types;
mod worker;
mod zones;

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use crate::calibrate::CalibrationParams;
use crate::clock::RunOutcome;
use crate::config::{DEFAULT_TIME_LIMIT_S, EngineConfig, LineGeometry};
use crate::error::EngineError;

/// Conveyor-line labeling cell simulator.
#[derive(Parser, Debug)]
#[command(name = "mango_line", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept one batch on PORT and run the labeling engine.
    Run(RunArgs),
    /// Generate a random batch and send it to a running engine.
    Vision(VisionArgs),
    /// Sweep item counts and failure probabilities for the minimum worker count.
    Calibrate(CalibrateArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// TCP port to listen on (1024-65535)
    port: u16,
    /// Number of workers R
    workers: usize,
    /// Belt speed X in cm/s
    speed: f64,
    /// Container side Z in cm
    container_side: f64,
    /// Line length W in cm
    line_length: f64,
    /// Service time per item in ms
    service_ms: u64,
    /// Per-second failure probability B in [0, 1]
    failure_probability: f64,
    /// Run seed for the failure injectors. When omitted, a random seed is used.
    #[arg(long)]
    seed: Option<u64>,
    /// Simulated seconds per wall-clock second
    #[arg(long, default_value_t = 1.0)]
    time_scale: f64,
    /// Safety time limit in simulated seconds
    #[arg(long, default_value_t = DEFAULT_TIME_LIMIT_S)]
    time_limit: f64,
}

impl RunArgs {
    fn into_config(self) -> EngineConfig {
        EngineConfig {
            port: self.port,
            workers: self.workers,
            geometry: LineGeometry {
                speed: self.speed,
                container_side: self.container_side,
                line_length: self.line_length,
            },
            service_ms: self.service_ms,
            failure_probability: self.failure_probability,
            seed: self.seed.unwrap_or_else(rand::random),
            time_scale: self.time_scale,
            time_limit_s: self.time_limit,
        }
    }
}

#[derive(Args, Debug)]
struct VisionArgs {
    host: String,
    port: u16,
    /// Number of items N
    items: usize,
    /// Container side Z in cm
    container_side: f64,
    seed: u64,
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    n_min: usize,
    n_max: usize,
    /// Belt speed X in cm/s
    speed: f64,
    /// Container side Z in cm
    container_side: f64,
    /// Line length W in cm
    line_length: f64,
    /// Service time per item in ms
    service_ms: u64,
    /// Directory for the per-B result tables
    out_dir: PathBuf,
    /// Simulated seconds per wall-clock second
    #[arg(long, default_value_t = 10.0)]
    time_scale: f64,
}

fn run(args: RunArgs) -> i32 {
    let config = args.into_config();
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        return e.exit_code();
    }
    if let Err(e) = signals::install() {
        error!(%e, "signal handlers not installed");
        return e.exit_code();
    }
    info!(
        port = config.port,
        workers = config.workers,
        speed = config.geometry.speed,
        side = config.geometry.container_side,
        length = config.geometry.line_length,
        service_ms = config.service_ms,
        failure_probability = config.failure_probability,
        seed = config.seed,
        "engine starting"
    );
    match sim::run_engine(&config, signals::interrupt_flag()) {
        Ok(metrics) => {
            print!("{metrics}");
            if metrics.outcome == RunOutcome::Interrupted {
                signals::interrupted_exit_code()
            } else if metrics.success() {
                0
            } else {
                1
            }
        }
        Err(EngineError::Interrupted) => {
            info!("interrupted before the run started");
            signals::interrupted_exit_code()
        }
        Err(e) => {
            error!(%e, "run aborted");
            eprintln!("{e}");
            e.exit_code()
        }
    }
}

fn vision(args: VisionArgs) -> i32 {
    match generator::send_batch(
        &args.host,
        args.port,
        args.items,
        args.container_side,
        args.seed,
    ) {
        Ok(()) => {
            println!(
                "vision: sent {} items to {}:{} (Z={:.2})",
                args.items, args.host, args.port, args.container_side
            );
            0
        }
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    }
}

fn calibrate(args: CalibrateArgs) -> i32 {
    let params = CalibrationParams {
        n_min: args.n_min,
        n_max: args.n_max,
        geometry: LineGeometry {
            speed: args.speed,
            container_side: args.container_side,
            line_length: args.line_length,
        },
        service_ms: args.service_ms,
        time_scale: args.time_scale,
        out_dir: args.out_dir,
        ..CalibrationParams::default()
    };
    if let Err(e) = signals::install() {
        eprintln!("{e}");
        return e.exit_code();
    }
    match calibrate::run_calibration(&params, signals::interrupt_flag()) {
        Ok(paths) => {
            for path in paths {
                println!("{}", path.display());
            }
            0
        }
        Err(EngineError::Interrupted) => signals::interrupted_exit_code(),
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    }
}

fn main() {
    logging::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not failures.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };
    let code = match cli.command {
        Command::Run(args) => run(args),
        Command::Vision(args) => vision(args),
        Command::Calibrate(args) => calibrate(args),
    };
    process::exit(code);
}
