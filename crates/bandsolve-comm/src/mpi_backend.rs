//! MPI backend.
//!
//! Requires the `mpi` feature flag and an MPI installation. Every OS process
//! launched by `mpirun` is one rank of the world communicator:
//!
//! ```ignore
//! let universe = MpiUniverse::initialize(1 << 20)?;
//! let group = universe.world();
//! let solution = DistributedSolver::default().solve_spmd(&group, system.as_ref())?;
//! ```
//!
//! Point-to-point sends use buffered mode against a buffer attached at
//! initialization, so a rank can send both halves of a row exchange before
//! receiving. The buffer must hold every message a rank has in flight.

use std::marker::PhantomData;

use ::mpi::datatype::{Partition, PartitionMut};
use ::mpi::environment::Universe;
use ::mpi::topology::SimpleCommunicator;
use ::mpi::traits::*;
use ::mpi::Count;
use log::debug;

use crate::group::{max_loc, CommError, ProcessGroup, Status, Tag, COLLECTIVE_TAG_BASE};

fn to_count(n: usize) -> Result<Count, CommError> {
    Count::try_from(n).map_err(|_| CommError::CountOverflow(n))
}

fn to_counts(values: &[usize]) -> Result<Vec<Count>, CommError> {
    values.iter().map(|&v| to_count(v)).collect()
}

/// Owner of the MPI environment; MPI is finalized when it is dropped.
pub struct MpiUniverse {
    universe: Universe,
}

impl MpiUniverse {
    /// Initialize MPI and attach `buffer_bytes` for buffered sends.
    ///
    /// Fails if MPI was already initialized in this process.
    pub fn initialize(buffer_bytes: usize) -> Result<Self, CommError> {
        let mut universe = ::mpi::initialize().ok_or(CommError::AlreadyInitialized)?;
        universe.set_buffer_size(buffer_bytes);
        Ok(Self { universe })
    }

    /// Group over every process of the job.
    pub fn world(&self) -> MpiGroup<'_> {
        let world = self.universe.world();
        let group = MpiGroup {
            rank: world.rank() as usize,
            size: world.size() as usize,
            world,
            _universe: PhantomData,
        };
        debug!("MPI rank {} of {} ready", group.rank, group.size);
        group
    }
}

/// One rank of an MPI world communicator.
pub struct MpiGroup<'u> {
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
    _universe: PhantomData<&'u MpiUniverse>,
}

impl MpiGroup<'_> {
    fn check_rank(&self, rank: usize) -> Result<i32, CommError> {
        if rank < self.size {
            Ok(rank as i32)
        } else {
            Err(CommError::InvalidRank {
                rank,
                size: self.size,
            })
        }
    }

    fn check_user_tag(tag: Tag) -> Result<i32, CommError> {
        if tag < COLLECTIVE_TAG_BASE {
            i32::try_from(tag).map_err(|_| CommError::ReservedTag(tag))
        } else {
            Err(CommError::ReservedTag(tag))
        }
    }

    fn check_layout(&self, counts: &[usize], displs: &[usize]) -> Result<(), CommError> {
        for len in [counts.len(), displs.len()] {
            if len != self.size {
                return Err(CommError::CountMismatch {
                    expected: self.size,
                    actual: len,
                });
            }
        }
        Ok(())
    }
}

impl ProcessGroup for MpiGroup<'_> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.world.barrier();
        Ok(())
    }

    fn send(&self, data: &[f64], dest: usize, tag: Tag) -> Result<(), CommError> {
        let dest = self.check_rank(dest)?;
        let tag = Self::check_user_tag(tag)?;
        self.world
            .process_at_rank(dest)
            .buffered_send_with_tag(data, tag);
        Ok(())
    }

    fn recv(&self, data: &mut [f64], source: usize, tag: Tag) -> Result<Status, CommError> {
        let source_rank = self.check_rank(source)?;
        let mpi_tag = Self::check_user_tag(tag)?;
        let (message, status) = self
            .world
            .process_at_rank(source_rank)
            .matched_probe_with_tag(mpi_tag);
        let count = status.count(f64::equivalent_datatype()) as usize;
        if count > data.len() {
            return Err(CommError::Truncated {
                capacity: data.len(),
                actual: count,
            });
        }
        message.matched_receive_into(&mut data[..count]);
        Ok(Status { source, tag, count })
    }

    fn broadcast(&self, data: &mut [f64], root: usize) -> Result<(), CommError> {
        let root = self.check_rank(root)?;
        self.world.process_at_rank(root).broadcast_into(data);
        Ok(())
    }

    fn gatherv(
        &self,
        send: &[f64],
        recv: &mut [f64],
        counts: &[usize],
        displs: &[usize],
        root: usize,
    ) -> Result<(), CommError> {
        let root_rank = self.check_rank(root)?;
        self.check_layout(counts, displs)?;
        if send.len() != counts[self.rank] {
            return Err(CommError::CountMismatch {
                expected: counts[self.rank],
                actual: send.len(),
            });
        }

        let root_process = self.world.process_at_rank(root_rank);
        if self.rank == root {
            let needed = counts
                .iter()
                .zip(displs)
                .map(|(c, d)| c + d)
                .max()
                .unwrap_or(0);
            if recv.len() < needed {
                return Err(CommError::Truncated {
                    capacity: recv.len(),
                    actual: needed,
                });
            }
            let counts = to_counts(counts)?;
            let displs = to_counts(displs)?;
            let mut partition = PartitionMut::new(recv, counts, displs);
            root_process.gather_varcount_into_root(send, &mut partition);
        } else {
            root_process.gather_varcount_into(send);
        }
        Ok(())
    }

    fn scatterv(
        &self,
        send: &[f64],
        counts: &[usize],
        displs: &[usize],
        recv: &mut [f64],
        root: usize,
    ) -> Result<(), CommError> {
        let root_rank = self.check_rank(root)?;
        self.check_layout(counts, displs)?;
        if recv.len() != counts[self.rank] {
            return Err(CommError::CountMismatch {
                expected: counts[self.rank],
                actual: recv.len(),
            });
        }

        let root_process = self.world.process_at_rank(root_rank);
        if self.rank == root {
            for (&count, &displ) in counts.iter().zip(displs) {
                if displ + count > send.len() {
                    return Err(CommError::Truncated {
                        capacity: send.len(),
                        actual: displ + count,
                    });
                }
            }
            let counts = to_counts(counts)?;
            let displs = to_counts(displs)?;
            let partition = Partition::new(send, counts, displs);
            root_process.scatter_varcount_into_root(&partition, recv);
        } else {
            root_process.scatter_varcount_into(recv);
        }
        Ok(())
    }

    fn allreduce_max_loc(&self, value: f64, location: usize) -> Result<(f64, usize), CommError> {
        // Gathering every candidate and folding locally keeps the tie rule
        // identical to the in-process backend.
        let mut values = vec![0.0f64; self.size];
        let mut locations = vec![0u64; self.size];
        self.world.all_gather_into(&value, &mut values[..]);
        self.world
            .all_gather_into(&(location as u64), &mut locations[..]);
        Ok(values
            .into_iter()
            .zip(locations)
            .map(|(v, l)| (v, l as usize))
            .fold((f64::NEG_INFINITY, usize::MAX), max_loc))
    }
}
