//! TOML configuration deserialisation for solve jobs.

use std::path::{Path, PathBuf};

use anyhow::Context;
use bandsolve_core::generate::ProblemKind;
use bandsolve_core::DistributionMode;
use serde::Deserialize;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub problem: ProblemConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where the system comes from: a wire-format file or a generator.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ProblemConfig {
    File {
        /// Path to a wire-format problem (JSON array or whitespace text).
        /// Relative paths are resolved against the job file's directory.
        file: PathBuf,
    },
    Generated {
        kind: ProblemKind,
        size: usize,
        #[serde(default = "default_band_width")]
        band_width: usize,
        #[serde(default)]
        seed: u64,
    },
}

fn default_band_width() -> usize {
    1
}

/// Solver settings.
#[derive(Debug, Deserialize)]
pub struct SolverConfig {
    /// Number of ranks (default: 1).
    #[serde(default = "default_processes")]
    pub processes: usize,
    /// "broadcast" (default) or "scatter".
    #[serde(default)]
    pub distribution: DistributionMode,
    /// Also run the sequential solver and report the difference (default: false).
    #[serde(default)]
    pub compare_sequential: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            processes: default_processes(),
            distribution: DistributionMode::default(),
            compare_sequential: false,
        }
    }
}

fn default_processes() -> usize {
    1
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save the solution as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_csv: bool,
    /// Whether to also save a JSON report (default: false).
    #[serde(default)]
    pub save_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_csv: true,
            save_json: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

impl JobConfig {
    /// Check settings that TOML types alone cannot express.
    pub fn check(&self) -> anyhow::Result<()> {
        if self.solver.processes == 0 {
            anyhow::bail!("solver.processes must be at least 1");
        }
        Ok(())
    }

    /// Resolve a relative problem file against `base`.
    fn resolve_paths(&mut self, base: &Path) {
        if let ProblemConfig::File { file } = &mut self.problem {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
    }
}

/// Parse a job from TOML text.
pub fn parse_config(content: &str) -> anyhow::Result<JobConfig> {
    let config: JobConfig = toml::from_str(content)?;
    config.check()?;
    Ok(config)
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    let mut config =
        parse_config(&content).with_context(|| format!("Invalid job file {}", path.display()))?;
    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_problem_with_defaults() {
        let job = parse_config(
            r#"
            [problem]
            kind = "dominant"
            size = 100
            band_width = 10
            "#,
        )
        .unwrap();
        match job.problem {
            ProblemConfig::Generated {
                kind,
                size,
                band_width,
                seed,
            } => {
                assert_eq!(kind, ProblemKind::Dominant);
                assert_eq!((size, band_width, seed), (100, 10, 0));
            }
            other => panic!("unexpected problem config {other:?}"),
        }
        assert_eq!(job.solver.processes, 1);
        assert_eq!(job.solver.distribution, DistributionMode::Broadcast);
        assert!(!job.solver.compare_sequential);
        assert_eq!(job.output.directory, "./output");
        assert!(job.output.save_csv);
        assert!(!job.output.save_json);
    }

    #[test]
    fn test_full_job() {
        let job = parse_config(
            r#"
            [problem]
            file = "problem.json"

            [solver]
            processes = 4
            distribution = "scatter"
            compare_sequential = true

            [output]
            directory = "results"
            save_csv = false
            save_json = true
            "#,
        )
        .unwrap();
        assert!(matches!(job.problem, ProblemConfig::File { .. }));
        assert_eq!(job.solver.processes, 4);
        assert_eq!(job.solver.distribution, DistributionMode::Scatter);
        assert!(job.solver.compare_sequential);
        assert_eq!(job.output.directory, "results");
        assert!(!job.output.save_csv);
        assert!(job.output.save_json);
    }

    #[test]
    fn test_zero_processes_rejected() {
        let err = parse_config(
            r#"
            [problem]
            kind = "diagonal"
            size = 4

            [solver]
            processes = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("processes"));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(parse_config(
            r#"
            [problem]
            kind = "tridiagonal"
            size = 4
            "#,
        )
        .is_err());
    }

    #[test]
    fn test_relative_file_resolved_against_job_directory() {
        let mut job = parse_config("[problem]\nfile = \"p.txt\"\n").unwrap();
        job.resolve_paths(Path::new("/jobs"));
        match job.problem {
            ProblemConfig::File { file } => assert_eq!(file, PathBuf::from("/jobs/p.txt")),
            other => panic!("unexpected problem config {other:?}"),
        }
    }
}
