//! Contiguous row partitioning.
//!
//! Rows `0..n` are split into `p` contiguous blocks. Every rank receives
//! `n / p` rows and the first `n % p` ranks receive one extra row, so block
//! sizes differ by at most one. When `p > n` the trailing ranks own no rows.
//!
//! The partitioning is a pure function of `(n, p)`: any rank can compute any
//! other rank's block and the owner of any global row without communicating.

use std::ops::Range;

use crate::solver::SolverError;

/// Rows owned by one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    /// Rank owning the block.
    pub rank: usize,
    /// Number of rows in the block.
    pub local_rows: usize,
    /// First global row (inclusive).
    pub start: usize,
    /// Last global row (exclusive).
    pub end: usize,
}

impl Partition {
    /// Global row range of the block.
    pub fn rows(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Whether `row` belongs to this block.
    pub fn contains(&self, row: usize) -> bool {
        self.start <= row && row < self.end
    }

    /// Index of global `row` within the block.
    pub fn local_index(&self, row: usize) -> Option<usize> {
        self.contains(row).then(|| row - self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.local_rows == 0
    }
}

/// Block decomposition of `size` rows over `processes` ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPartitioner {
    size: usize,
    processes: usize,
}

impl RowPartitioner {
    /// Create a partitioner. Fails when `processes == 0`.
    pub fn new(size: usize, processes: usize) -> Result<Self, SolverError> {
        if processes == 0 {
            return Err(SolverError::NoProcesses);
        }
        Ok(Self { size, processes })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn processes(&self) -> usize {
        self.processes
    }

    fn base_rows(&self) -> usize {
        self.size / self.processes
    }

    fn remainder(&self) -> usize {
        self.size % self.processes
    }

    /// Block owned by `rank`.
    ///
    /// # Panics
    /// Panics if `rank >= processes`.
    pub fn partition(&self, rank: usize) -> Partition {
        assert!(
            rank < self.processes,
            "rank {rank} out of range for {} processes",
            self.processes
        );
        let rows = self.base_rows();
        let remainder = self.remainder();
        let local_rows = if rank < remainder { rows + 1 } else { rows };
        let start = rank * rows + rank.min(remainder);
        Partition {
            rank,
            local_rows,
            start,
            end: start + local_rows,
        }
    }

    /// Rank owning global `row`.
    ///
    /// # Panics
    /// Panics if `row >= size`.
    pub fn owner_of(&self, row: usize) -> usize {
        assert!(row < self.size, "row {row} out of range for size {}", self.size);
        let rows = self.base_rows();
        let remainder = self.remainder();
        // The first `remainder` blocks hold `rows + 1` rows each.
        let boundary = remainder * (rows + 1);
        if row < boundary {
            row / (rows + 1)
        } else {
            // Only reachable with rows >= 1, since boundary == size when rows == 0.
            remainder + (row - boundary) / rows
        }
    }

    /// Rows per rank, in rank order.
    pub fn counts(&self) -> Vec<usize> {
        self.iter().map(|p| p.local_rows).collect()
    }

    /// First row of each rank's block, in rank order.
    pub fn displacements(&self) -> Vec<usize> {
        self.iter().map(|p| p.start).collect()
    }

    /// All blocks, in rank order.
    pub fn iter(&self) -> impl Iterator<Item = Partition> + '_ {
        (0..self.processes).map(move |rank| self.partition(rank))
    }
}

/// Block owned by `rank` when `size` rows are split over `processes` ranks.
pub fn partition(size: usize, processes: usize, rank: usize) -> Result<Partition, SolverError> {
    let partitioner = RowPartitioner::new(size, processes)?;
    if rank >= processes {
        return Err(SolverError::InvalidRank { rank, processes });
    }
    Ok(partitioner.partition(rank))
}
