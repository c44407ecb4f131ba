//! Headless movement scenario runner.
//!
//! Runs scenarios without graphics and prints JSON reports on stdout;
//! logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in scenario
//! cargo run -p loco_headless -- run --ticks 500
//!
//! # Run a scenario file
//! cargo run -p loco_headless -- run --scenario crossing.ron --ticks 500
//!
//! # Verify determinism across repeated runs
//! cargo run -p loco_headless -- verify --scenario crossing.ron --runs 4
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loco_headless::{run_scenario, verify_scenario, Scenario};

#[derive(Parser)]
#[command(name = "loco_headless")]
#[command(about = "Headless movement scenario runner for CI and experiments")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single scenario and print a JSON report
    Run {
        /// Scenario file to load (built-in scenario if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Number of ticks to simulate
        #[arg(short, long, default_value = "500")]
        ticks: u64,
    },

    /// Run a scenario repeatedly and verify all runs agree
    Verify {
        /// Scenario file to load (built-in scenario if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Number of ticks to simulate per run
        #[arg(short, long, default_value = "500")]
        ticks: u64,

        /// Number of runs to compare
        #[arg(short, long, default_value = "4")]
        runs: usize,
    },
}

fn load(path: Option<&PathBuf>) -> Result<Scenario, loco_headless::HeadlessError> {
    match path {
        Some(path) => Scenario::load(path),
        None => Ok(Scenario::builtin()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match &cli.command {
        Commands::Run { scenario, ticks } => load(scenario.as_ref())
            .and_then(|s| run_scenario(&s, *ticks))
            .and_then(|report| {
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(())
            }),
        Commands::Verify {
            scenario,
            ticks,
            runs,
        } => load(scenario.as_ref())
            .and_then(|s| verify_scenario(&s, *ticks, *runs))
            .and_then(|hash| {
                println!("{}", serde_json::json!({ "runs": runs, "state_hash": hash }));
                Ok(())
            }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "headless run failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
