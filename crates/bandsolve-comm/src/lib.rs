//! # bandsolve-comm
//!
//! Communication layer for the bandsolve framework. This crate provides a
//! [`ProcessGroup`](group::ProcessGroup) trait that isolates the solver from
//! the transport that connects its ranks.
//!
//! The solver is written SPMD-style: every rank runs the same code and the
//! ranks meet at collectives (broadcast, scatter/gather, reductions) and at
//! tagged point-to-point exchanges.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Status |
//! |---------|-------------|--------|
//! | In-process threads ([`LocalUniverse`]) | `local` (default) | Implemented |
//! | MPI world communicator (`MpiUniverse`) | `mpi` | Implemented, needs an MPI installation |
//!
//! ## Quick start
//!
//! ```
//! use bandsolve_comm::{LocalUniverse, ProcessGroup};
//!
//! let sums = LocalUniverse::run(4, |group| {
//!     let mut data = vec![0.0; 3];
//!     if group.rank() == 0 {
//!         data = vec![1.0, 2.0, 3.0];
//!     }
//!     group.broadcast(&mut data, 0)?;
//!     Ok::<f64, bandsolve_comm::CommError>(data.iter().sum())
//! })
//! .unwrap();
//!
//! assert!(sums.into_iter().all(|s| s.unwrap() == 6.0));
//! ```

pub mod group;

#[cfg(feature = "local")]
pub mod local;

pub use group::{max_loc, CommError, ProcessGroup, Status, Tag, COLLECTIVE_TAG_BASE};

#[cfg(feature = "mpi")]
pub mod mpi_backend;

#[cfg(feature = "local")]
pub use local::{LocalGroup, LocalUniverse};

#[cfg(feature = "mpi")]
pub use mpi_backend::{MpiGroup, MpiUniverse};
