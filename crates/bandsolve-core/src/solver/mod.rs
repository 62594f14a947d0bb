//! Solver abstraction and implementations.
//!
//! The [`BandSolver`] trait is the interface shared by the sequential
//! reference solver and the distributed solver. Both drive the same kernels
//! (pivot search, row elimination, back-substitution), which is what makes
//! their results bitwise identical.

pub mod distributed;
pub(crate) mod kernels;
pub mod sequential;

use bandsolve_comm::CommError;
use thiserror::Error;

use crate::types::{BandedSystem, Solution, ValidationError};

/// Pivot magnitudes below this value are treated as zero; elimination
/// factors at or below it are skipped.
pub const PIVOT_TOLERANCE: f64 = 1e-12;

/// Errors that can occur during a solve.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Invalid problem: {0}")]
    Validation(#[from] ValidationError),

    #[error("No system was provided at the coordinator")]
    MissingSystem,

    #[error("Communication error: {0}")]
    Communication(#[from] CommError),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("At least one process is required")]
    NoProcesses,

    #[error("Rank {rank} out of range for {processes} processes")]
    InvalidRank { rank: usize, processes: usize },

    #[error("Rank {rank} returned a solution that differs from rank 0")]
    InconsistentSolution { rank: usize },
}

/// Outcome of a distributed argmax over pivot candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotInfo {
    /// Absolute value of the candidate entry.
    pub magnitude: f64,
    /// Global row holding the candidate.
    pub row: usize,
}

impl PivotInfo {
    /// Contribution of a rank without candidates to the global reduction.
    pub const NONE: PivotInfo = PivotInfo {
        magnitude: -1.0,
        row: usize::MAX,
    };

    /// Whether the pivot is too small to eliminate with.
    pub fn is_degenerate(&self) -> bool {
        self.magnitude.is_nan() || self.magnitude < PIVOT_TOLERANCE
    }
}

/// The interface implemented by every solver.
pub trait BandSolver {
    /// Solve `A x = b`.
    ///
    /// Degenerate pivots are not an error: the affected columns are reported
    /// in [`Solution::singular_columns`] and their components set to zero.
    fn solve(&self, system: &BandedSystem) -> Result<Solution, SolverError>;

    /// Human-readable name of the solver.
    fn method_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_pivots() {
        assert!(PivotInfo::NONE.is_degenerate());
        assert!(PivotInfo { magnitude: 1e-13, row: 0 }.is_degenerate());
        assert!(PivotInfo { magnitude: f64::NAN, row: 0 }.is_degenerate());
        assert!(!PivotInfo { magnitude: 1e-12, row: 0 }.is_degenerate());
    }

    #[test]
    fn test_error_messages() {
        let err = SolverError::from(ValidationError::TooShort { len: 2 });
        assert!(err.to_string().contains("too short"));
        assert_eq!(
            SolverError::InconsistentSolution { rank: 3 }.to_string(),
            "Rank 3 returned a solution that differs from rank 0"
        );
        assert_eq!(
            SolverError::InvalidRank { rank: 4, processes: 4 }.to_string(),
            "Rank 4 out of range for 4 processes"
        );
    }
}
