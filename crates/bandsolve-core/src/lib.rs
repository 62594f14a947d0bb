//! # bandsolve-core
//!
//! The numerical backbone of bandsolve: Gaussian elimination with partial
//! pivoting for banded linear systems, implemented twice, once sequentially
//! and once for a row-partitioned group of cooperating ranks.
//!
//! ## Architecture
//!
//! All solvers implement the [`solver::BandSolver`] trait. The sequential
//! reference ([`solver::sequential::SequentialSolver`]) and the distributed
//! solver ([`solver::distributed::DistributedSolver`]) share the same
//! pivot-search, elimination and back-substitution kernels, so for a given
//! system they produce bitwise-identical results for every process count.
//!
//! ## Modules
//!
//! - [`band`]: Band storage layout and index arithmetic.
//! - [`partition`]: Contiguous row partitioning across ranks.
//! - [`types`]: Problem description, wire format and solution.
//! - [`generate`]: Reproducible test and benchmark problems.
//! - [`solver`]: Solver trait, sequential and distributed implementations.

pub mod band;
pub mod generate;
pub mod partition;
pub mod solver;
pub mod types;

pub use band::BandLayout;
pub use partition::{partition, Partition, RowPartitioner};
pub use solver::distributed::{DistributedSolver, DistributionMode};
pub use solver::sequential::SequentialSolver;
pub use solver::{BandSolver, SolverError};
pub use types::{BandedSystem, Solution, ValidationError};
