//! Job runner: loads or generates the system, solves it and writes results.

use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use bandsolve_core::generate::ProblemKind;
use bandsolve_core::{BandSolver, BandedSystem, DistributedSolver, SequentialSolver, Solution};

use crate::config::{JobConfig, ProblemConfig};

/// A loaded system, with the exact solution when it was generated.
pub struct LoadedProblem {
    pub system: BandedSystem,
    pub expected: Option<Vec<f64>>,
    pub description: String,
}

/// Comparison against the sequential reference solver.
#[derive(Debug, Clone, Serialize)]
pub struct SequentialComparison {
    pub elapsed_seconds: f64,
    pub max_abs_difference: f64,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub problem: String,
    pub size: usize,
    pub band_width: usize,
    pub processes: usize,
    pub distribution: String,
    pub elapsed_seconds: f64,
    pub residual: f64,
    /// Largest deviation from the known solution, for generated problems.
    pub max_error: Option<f64>,
    pub sequential: Option<SequentialComparison>,
    pub solution: Solution,
}

/// Read a wire-format buffer from a JSON array or whitespace-separated text.
pub fn read_wire(path: &Path) -> Result<Vec<f64>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read problem file {}", path.display()))?;
    if is_json(path) {
        serde_json::from_str(&content)
            .with_context(|| format!("Problem file {} is not a JSON number array", path.display()))
    } else {
        content
            .split_whitespace()
            .enumerate()
            .map(|(i, token)| {
                token.parse::<f64>().with_context(|| {
                    format!("Value {} ('{}') in {} is not a number", i, token, path.display())
                })
            })
            .collect()
    }
}

/// Write `system` in wire format: a JSON array for `.json` paths, otherwise
/// text with the header, one band row per line and the right-hand side.
pub fn write_wire(system: &BandedSystem, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if is_json(path) {
        let json = serde_json::to_string(&system.to_wire())
            .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
        std::fs::write(path, json)?;
    } else {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        writeln!(file, "{} {}", system.size(), system.band_width())?;
        for row in system.band().rows() {
            let line: Vec<String> = row.iter().map(|v| format!("{v:e}")).collect();
            writeln!(file, "{}", line.join(" "))?;
        }
        let rhs: Vec<String> = system.rhs().iter().map(|v| format!("{v:e}")).collect();
        writeln!(file, "{}", rhs.join(" "))?;
        file.flush()?;
    }

    println!("Problem written to: {}", path.display());
    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Generate a problem of the given kind.
pub fn generate_problem(
    kind: ProblemKind,
    size: usize,
    band_width: usize,
    seed: u64,
) -> Result<LoadedProblem> {
    let problem = kind
        .generate(size, band_width, seed)
        .with_context(|| format!("Cannot generate {kind} problem of size {size}"))?;
    Ok(LoadedProblem {
        description: format!("{kind} (seed {seed})"),
        system: problem.system,
        expected: Some(problem.expected),
    })
}

/// Load or generate the problem described by a job.
pub fn load_problem(job: &JobConfig) -> Result<LoadedProblem> {
    match &job.problem {
        ProblemConfig::File { file } => {
            let wire = read_wire(file)?;
            let system = BandedSystem::from_wire(&wire)
                .with_context(|| format!("Invalid problem in {}", file.display()))?;
            Ok(LoadedProblem {
                system,
                expected: None,
                description: file.display().to_string(),
            })
        }
        ProblemConfig::Generated {
            kind,
            size,
            band_width,
            seed,
        } => generate_problem(*kind, *size, *band_width, *seed),
    }
}

fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let value = f();
    (value, start.elapsed())
}

/// Run a full job from a parsed configuration.
pub fn run_job(job: &JobConfig) -> Result<RunReport> {
    let problem = load_problem(job)?;
    let system = &problem.system;
    println!(
        "Problem: {} (n={}, bandwidth={})",
        problem.description,
        system.size(),
        system.band_width()
    );

    let solver = DistributedSolver::new(job.solver.processes)
        .with_distribution(job.solver.distribution);
    println!(
        "Solver: {} on {} ranks ({} distribution)",
        solver.method_name(),
        solver.processes,
        solver.distribution
    );

    let (solution, elapsed) = timed(|| solver.solve(system));
    let solution = solution.context("Distributed solve failed")?;
    println!("  Solved in {:.3} ms", elapsed.as_secs_f64() * 1e3);

    if !solution.is_regular() {
        println!(
            "  Warning: {} degenerate pivot(s); affected components set to 0",
            solution.singular_columns.len()
        );
    }

    let residual = system.residual_norm(&solution.values);
    println!("  Relative residual: {residual:.3e}");

    let max_error = problem.expected.as_ref().map(|expected| {
        solution
            .values
            .iter()
            .zip(expected)
            .map(|(x, e)| (x - e).abs())
            .fold(0.0, f64::max)
    });
    if let Some(err) = max_error {
        println!("  Max error vs known solution: {err:.3e}");
    }

    let sequential = if job.solver.compare_sequential {
        let (reference, seq_elapsed) = timed(|| SequentialSolver.solve(system));
        let reference = reference.context("Sequential solve failed")?;
        let diff = solution.max_abs_difference(&reference);
        println!(
            "  Sequential reference: {:.3} ms, max difference {diff:.3e}",
            seq_elapsed.as_secs_f64() * 1e3
        );
        Some(SequentialComparison {
            elapsed_seconds: seq_elapsed.as_secs_f64(),
            max_abs_difference: diff,
        })
    } else {
        None
    };

    info!("Run finished: residual {residual:.3e}");

    Ok(RunReport {
        problem: problem.description,
        size: system.size(),
        band_width: system.band_width(),
        processes: job.solver.processes,
        distribution: job.solver.distribution.to_string(),
        elapsed_seconds: elapsed.as_secs_f64(),
        residual,
        max_error,
        sequential,
        solution,
    })
}

/// Write the solution vector to a CSV file.
pub fn write_solution_csv(report: &RunReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    writeln!(file, "# bandsolve: banded Gaussian elimination with partial pivoting")?;
    writeln!(file, "# problem: {}", report.problem)?;
    writeln!(
        file,
        "# n={}, bandwidth={}, processes={}, distribution={}",
        report.size, report.band_width, report.processes, report.distribution
    )?;
    writeln!(file, "# relative residual: {:.6e}", report.residual)?;
    if !report.solution.singular_columns.is_empty() {
        let cols: Vec<String> = report
            .solution
            .singular_columns
            .iter()
            .map(|c| c.to_string())
            .collect();
        writeln!(file, "# singular columns: {}", cols.join(" "))?;
    }
    writeln!(file, "#")?;
    writeln!(file, "index,value")?;

    for (i, value) in report.solution.values.iter().enumerate() {
        writeln!(file, "{},{:.15e}", i, value)?;
    }
    file.flush()?;

    println!("Solution written to: {}", path.display());
    Ok(())
}

/// Write the full run report to a JSON file.
pub fn write_report_json(report: &RunReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(report)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Report (JSON) written to: {}", path.display());
    Ok(())
}
