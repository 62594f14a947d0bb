//! Distributed banded Gaussian elimination.
//!
//! The solver is written SPMD-style against [`ProcessGroup`]: every rank
//! runs [`DistributedSolver::solve_spmd`], owns a contiguous block of rows
//! and takes part in every collective. A solve has three stages:
//!
//! 1. [`distribution::distribute`]: the coordinator (rank 0) hands every
//!    rank its rows of the band and right-hand side.
//! 2. [`elimination::forward_eliminate`]: one collective round per column
//!    selects the global pivot, exchanges rows across rank boundaries and
//!    eliminates the column from the owned rows below the pivot.
//! 3. [`gather::gather_and_solve`]: the eliminated band is gathered at the
//!    coordinator, solved by back-substitution and the solution broadcast.
//!
//! [`DistributedSolver`] also implements [`BandSolver`] by running the SPMD
//! entry point on an in-process [`LocalUniverse`].

pub mod distribution;
pub mod elimination;
pub mod gather;

use bandsolve_comm::{LocalUniverse, ProcessGroup};
use log::debug;
use serde::{Deserialize, Serialize};

use super::{BandSolver, SolverError};
use crate::types::{BandedSystem, Solution};

/// Rank that holds the input system and performs back-substitution.
pub const COORDINATOR: usize = 0;

/// How the coordinator hands out the input rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionMode {
    /// Broadcast the whole band; every rank keeps its own rows.
    #[default]
    Broadcast,
    /// Scatter exactly each rank's rows.
    Scatter,
}

impl std::fmt::Display for DistributionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Broadcast => f.write_str("broadcast"),
            Self::Scatter => f.write_str("scatter"),
        }
    }
}

/// Row-partitioned solver over a group of ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributedSolver {
    /// Number of ranks used by [`BandSolver::solve`].
    pub processes: usize,
    pub distribution: DistributionMode,
}

impl Default for DistributedSolver {
    fn default() -> Self {
        Self {
            processes: 1,
            distribution: DistributionMode::Broadcast,
        }
    }
}

impl DistributedSolver {
    pub fn new(processes: usize) -> Self {
        Self {
            processes,
            ..Self::default()
        }
    }

    pub fn with_distribution(mut self, distribution: DistributionMode) -> Self {
        self.distribution = distribution;
        self
    }

    /// SPMD entry point: every rank of `group` calls this.
    ///
    /// `system` is only read on the [`COORDINATOR`]; other ranks pass `None`.
    /// On success every rank returns the same [`Solution`]. If the
    /// coordinator has no system, every rank returns
    /// [`SolverError::MissingSystem`].
    pub fn solve_spmd<G>(
        &self,
        group: &G,
        system: Option<&BandedSystem>,
    ) -> Result<Solution, SolverError>
    where
        G: ProcessGroup + ?Sized,
    {
        let mut local = distribution::distribute(group, system, self.distribution)?;
        let summary = elimination::forward_eliminate(group, &mut local)?;
        if group.is_root(COORDINATOR) {
            debug!(
                "Elimination finished: {} local swaps, {} cross-rank swaps, {} singular columns",
                summary.local_swaps,
                summary.remote_swaps,
                summary.singular_columns.len()
            );
        }
        gather::gather_and_solve(group, &local, summary.singular_columns)
    }
}

/// Pick the error to report when some ranks failed.
///
/// Communication errors are usually a consequence of another rank giving
/// up, so a rank's own error is preferred.
fn primary_error(errors: Vec<SolverError>) -> Option<SolverError> {
    let mut fallback = None;
    for err in errors {
        match err {
            SolverError::Communication(_) => {
                fallback.get_or_insert(err);
            }
            _ => return Some(err),
        }
    }
    fallback
}

impl BandSolver for DistributedSolver {
    fn solve(&self, system: &BandedSystem) -> Result<Solution, SolverError> {
        if self.processes == 0 {
            return Err(SolverError::NoProcesses);
        }
        debug!(
            "Distributed solve of n={} m={} on {} ranks ({})",
            system.size(),
            system.band_width(),
            self.processes,
            self.distribution
        );

        let results = LocalUniverse::run(self.processes, |group| {
            let root_system = group.is_root(COORDINATOR).then_some(system);
            self.solve_spmd(&group, root_system)
        })?;

        let (solutions, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
        let errors: Vec<SolverError> = errors.into_iter().filter_map(Result::err).collect();
        if let Some(err) = primary_error(errors) {
            return Err(err);
        }

        let mut solutions = solutions.into_iter().flatten();
        let reference = solutions.next().ok_or(SolverError::NoProcesses)?;
        for (offset, solution) in solutions.enumerate() {
            if solution != reference {
                return Err(SolverError::InconsistentSolution { rank: offset + 1 });
            }
        }
        Ok(reference)
    }

    fn method_name(&self) -> &str {
        "Distributed banded Gaussian elimination"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bandsolve_comm::CommError;

    #[test]
    fn test_zero_processes_rejected() {
        let problem = crate::generate::diagonal(3).unwrap();
        let err = DistributedSolver::new(0).solve(&problem.system).unwrap_err();
        assert!(matches!(err, SolverError::NoProcesses));
    }

    #[test]
    fn test_primary_error_prefers_rank_errors() {
        let errors = vec![
            SolverError::Communication(CommError::PeerFailed),
            SolverError::MissingSystem,
        ];
        assert!(matches!(
            primary_error(errors),
            Some(SolverError::MissingSystem)
        ));
        assert!(primary_error(Vec::new()).is_none());
    }

    #[test]
    fn test_distribution_mode_serde() {
        let mode: DistributionMode = serde_json::from_str("\"scatter\"").unwrap();
        assert_eq!(mode, DistributionMode::Scatter);
        assert_eq!(DistributionMode::default().to_string(), "broadcast");
    }
}
