//! Process group trait and message metadata.
//!
//! The [`ProcessGroup`] trait abstracts over the transport that connects the
//! ranks of an SPMD computation (threads in one process, OS processes over
//! sockets, or a message-passing library) so that the solver code in
//! `bandsolve-core` remains transport-agnostic.
//!
//! Every collective must be entered by all ranks of the group, in the same
//! order. Point-to-point messages are matched on `(source, tag)`; messages
//! from one source with one tag are delivered in the order they were sent.

use thiserror::Error;

/// Message tag for point-to-point communication.
pub type Tag = u32;

/// First tag reserved for the group's own collective traffic.
///
/// User tags passed to [`ProcessGroup::send`] and [`ProcessGroup::recv`] must
/// be strictly below this value.
pub const COLLECTIVE_TAG_BASE: Tag = 1 << 30;

/// Errors originating from a process group.
#[derive(Debug, Error)]
pub enum CommError {
    #[error("Invalid rank {rank} for a group of size {size}")]
    InvalidRank { rank: usize, size: usize },

    #[error("Tag {0} is reserved for collective operations")]
    ReservedTag(Tag),

    #[error("Expected {expected} elements, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Message of {actual} elements does not fit a buffer of {capacity}")]
    Truncated { capacity: usize, actual: usize },

    #[error("Unexpected payload from rank {source_rank} (tag {tag})")]
    UnexpectedPayload { source_rank: usize, tag: Tag },

    #[error("A peer rank failed; aborting communication")]
    PeerFailed,

    #[error("Channel to rank {0} is disconnected")]
    Disconnected(usize),

    #[error("Rank {0} panicked")]
    RankPanicked(usize),

    #[error("Group size must be at least 1")]
    EmptyGroup,

    #[error("Element count {0} exceeds the transport's count type")]
    CountOverflow(usize),

    #[error("The message-passing environment is already initialized")]
    AlreadyInitialized,
}

/// Information about a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Source rank of the message.
    pub source: usize,
    /// Tag of the message.
    pub tag: Tag,
    /// Number of elements received.
    pub count: usize,
}

/// Combine two `(value, location)` pairs with MAXLOC semantics.
///
/// The larger value wins; on equal values the smaller location wins, which
/// makes the reduction independent of the order in which ranks contribute.
/// A NaN candidate never displaces the current pair.
pub fn max_loc(current: (f64, usize), candidate: (f64, usize)) -> (f64, usize) {
    if candidate.0 > current.0 || (candidate.0 == current.0 && candidate.1 < current.1) {
        candidate
    } else {
        current
    }
}

/// Abstraction over a fixed group of cooperating ranks.
///
/// Implementations provide the communication primitives; the solver composes
/// them. All methods block until the calling rank's part of the operation is
/// complete. A returned error is fatal for the whole SPMD run.
pub trait ProcessGroup {
    /// Rank of the calling process, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Block until every rank has entered the barrier.
    fn barrier(&self) -> Result<(), CommError>;

    /// Send `data` to `dest` under `tag`.
    fn send(&self, data: &[f64], dest: usize, tag: Tag) -> Result<(), CommError>;

    /// Receive a message from `source` with `tag` into `data`.
    ///
    /// The message may be shorter than the buffer; the number of elements
    /// written is reported in the returned [`Status`].
    fn recv(&self, data: &mut [f64], source: usize, tag: Tag) -> Result<Status, CommError>;

    /// Broadcast `data` from `root` to all ranks.
    ///
    /// `data` is the input at the root and the output everywhere else; every
    /// rank must pass a buffer of the same length.
    fn broadcast(&self, data: &mut [f64], root: usize) -> Result<(), CommError>;

    /// Gather variable-sized contributions at `root`.
    ///
    /// Rank `r` contributes `counts[r]` elements, which land at
    /// `recv[displs[r]..displs[r] + counts[r]]` on the root. `recv` is only
    /// significant at the root.
    fn gatherv(
        &self,
        send: &[f64],
        recv: &mut [f64],
        counts: &[usize],
        displs: &[usize],
        root: usize,
    ) -> Result<(), CommError>;

    /// Scatter variable-sized slices from `root`.
    ///
    /// Rank `r` receives `send[displs[r]..displs[r] + counts[r]]` into `recv`,
    /// which must hold exactly `counts[r]` elements. `send` is only
    /// significant at the root.
    fn scatterv(
        &self,
        send: &[f64],
        counts: &[usize],
        displs: &[usize],
        recv: &mut [f64],
        root: usize,
    ) -> Result<(), CommError>;

    /// All-reduce a `(value, location)` pair with [`max_loc`] semantics.
    fn allreduce_max_loc(&self, value: f64, location: usize) -> Result<(f64, usize), CommError>;

    /// Whether the calling rank is `root`.
    fn is_root(&self, root: usize) -> bool {
        self.rank() == root
    }
}
