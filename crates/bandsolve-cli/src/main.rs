//! bandsolve command-line interface.
//!
//! Solve banded systems from TOML job files and generate test problems:
//! ```sh
//! bandsolve run job.toml
//! bandsolve validate job.toml
//! bandsolve generate --kind pivoting --size 1000 --band-width 10 -o problem.json
//! ```

mod config;
mod runner;

use bandsolve_core::generate::ProblemKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bandsolve")]
#[command(about = "Distributed banded Gaussian elimination with partial pivoting")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve the system described by a TOML job file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a job file and its problem without solving.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Write a generated problem in wire format.
    Generate {
        /// Problem family: dominant, diagonal, weak_diagonal, random, pivoting.
        #[arg(short, long)]
        kind: ProblemKind,
        /// Matrix order.
        #[arg(short = 'n', long)]
        size: usize,
        /// Band width (ignored for `diagonal`).
        #[arg(short = 'm', long, default_value_t = 1)]
        band_width: usize,
        /// Seed for random kinds.
        #[arg(short, long, default_value_t = 0)]
        seed: u64,
        /// Output file (`.json` for a JSON array, anything else for text).
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("bandsolve");
            println!("=========");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let report = runner::run_job(&job)?;

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            // CSV solution (default on)
            if job.output.save_csv {
                runner::write_solution_csv(&report, &out_dir.join("solution.csv"))?;
            }

            // JSON report (optional)
            if job.output.save_json {
                runner::write_report_json(&report, &out_dir.join("solution.json"))?;
            }

            println!("Solve complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            let problem = runner::load_problem(&job)?;
            println!("Configuration is valid: {}", config.display());
            println!(
                "  Problem: {} (n={}, bandwidth={})",
                problem.description,
                problem.system.size(),
                problem.system.band_width()
            );
            Ok(())
        }
        Commands::Generate {
            kind,
            size,
            band_width,
            seed,
            output,
        } => {
            let problem = runner::generate_problem(kind, size, band_width, seed)?;
            runner::write_wire(&problem.system, &output)?;
            Ok(())
        }
    }
}
