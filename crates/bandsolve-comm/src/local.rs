//! In-process process group backed by one thread per rank.
//!
//! [`LocalUniverse::run`] spawns `size` scoped threads and hands each one a
//! [`LocalGroup`]. Ranks talk through unbounded `mpsc` channels: every rank
//! owns one inbox and a sender to every inbox. Messages that arrive before
//! the `(source, tag)` a rank is currently waiting for are parked in a
//! pending queue, so tag matching behaves like a message-passing library.
//!
//! Sends never block. A blocking protocol where two ranks both send before
//! they both receive therefore cannot deadlock.
//!
//! Collectives are layered on point-to-point traffic using tags at or above
//! [`COLLECTIVE_TAG_BASE`]. Because every rank enters collectives in the same
//! order and per-source delivery is FIFO, no sequence numbers are needed.
//!
//! # Failure handling
//!
//! A rank that panics marks the universe as failed; any rank blocked in a
//! receive notices within one poll interval and returns
//! [`CommError::PeerFailed`]. A rank waiting on a peer that has already
//! returned gets [`CommError::Disconnected`] instead of hanging.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::group::{max_loc, CommError, ProcessGroup, Status, Tag, COLLECTIVE_TAG_BASE};

/// How long a blocked receive waits before re-checking peer liveness.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

const TAG_BROADCAST: Tag = COLLECTIVE_TAG_BASE;
const TAG_GATHERV: Tag = COLLECTIVE_TAG_BASE + 1;
const TAG_SCATTERV: Tag = COLLECTIVE_TAG_BASE + 2;
const TAG_REDUCE: Tag = COLLECTIVE_TAG_BASE + 3;
const TAG_REDUCE_RESULT: Tag = COLLECTIVE_TAG_BASE + 4;
const TAG_BARRIER_ARRIVE: Tag = COLLECTIVE_TAG_BASE + 5;
const TAG_BARRIER_RELEASE: Tag = COLLECTIVE_TAG_BASE + 6;

/// Rank that coordinates reductions and barriers.
const COORDINATOR: usize = 0;

enum Payload {
    Values(Vec<f64>),
    MaxLoc(f64, usize),
}

struct Envelope {
    source: usize,
    tag: Tag,
    payload: Payload,
}

/// Liveness flags shared by all ranks of one universe.
struct Liveness {
    failed: AtomicBool,
    departed: Vec<AtomicBool>,
}

/// Entry point for running an SPMD closure on in-process ranks.
pub struct LocalUniverse;

impl LocalUniverse {
    /// Run `f` on `size` ranks and collect the per-rank results in rank order.
    ///
    /// Each rank receives its own [`LocalGroup`]. The call returns once every
    /// rank has finished.
    ///
    /// # Errors
    ///
    /// [`CommError::EmptyGroup`] if `size` is zero, or
    /// [`CommError::RankPanicked`] for the lowest rank whose closure panicked.
    pub fn run<F, T>(size: usize, f: F) -> Result<Vec<T>, CommError>
    where
        F: Fn(LocalGroup) -> T + Sync,
        T: Send,
    {
        if size == 0 {
            return Err(CommError::EmptyGroup);
        }
        debug!("Starting local universe with {size} ranks");

        let groups = Self::connect(size);
        let f = &f;

        let joined: Vec<Result<T, CommError>> = thread::scope(|scope| {
            let handles: Vec<_> = groups
                .into_iter()
                .map(|group| {
                    let rank = group.rank;
                    (rank, scope.spawn(move || f(group)))
                })
                .collect();

            handles
                .into_iter()
                .map(|(rank, handle)| {
                    handle.join().map_err(|_| {
                        warn!("Rank {rank} panicked");
                        CommError::RankPanicked(rank)
                    })
                })
                .collect()
        });

        joined.into_iter().collect()
    }

    /// Create the fully connected set of rank handles.
    fn connect(size: usize) -> Vec<LocalGroup> {
        let liveness = Arc::new(Liveness {
            failed: AtomicBool::new(false),
            departed: (0..size).map(|_| AtomicBool::new(false)).collect(),
        });

        let (senders, receivers): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
            (0..size).map(|_| mpsc::channel()).unzip();

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalGroup {
                rank,
                outboxes: senders.clone(),
                inbox,
                pending: RefCell::new(VecDeque::new()),
                liveness: Arc::clone(&liveness),
            })
            .collect()
    }
}

/// One rank's handle on an in-process group.
///
/// A `LocalGroup` can be moved to another thread but not shared between
/// threads: it owns the rank's inbox.
pub struct LocalGroup {
    rank: usize,
    outboxes: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    pending: RefCell<VecDeque<Envelope>>,
    liveness: Arc<Liveness>,
}

impl LocalGroup {
    fn check_rank(&self, rank: usize) -> Result<(), CommError> {
        if rank < self.size() {
            Ok(())
        } else {
            Err(CommError::InvalidRank {
                rank,
                size: self.size(),
            })
        }
    }

    fn check_user_tag(tag: Tag) -> Result<(), CommError> {
        if tag < COLLECTIVE_TAG_BASE {
            Ok(())
        } else {
            Err(CommError::ReservedTag(tag))
        }
    }

    fn check_layout(&self, counts: &[usize], displs: &[usize]) -> Result<(), CommError> {
        for len in [counts.len(), displs.len()] {
            if len != self.size() {
                return Err(CommError::CountMismatch {
                    expected: self.size(),
                    actual: len,
                });
            }
        }
        Ok(())
    }

    fn post(&self, dest: usize, tag: Tag, payload: Payload) -> Result<(), CommError> {
        self.outboxes[dest]
            .send(Envelope {
                source: self.rank,
                tag,
                payload,
            })
            .map_err(|_| CommError::Disconnected(dest))
    }

    fn take_pending(&self, source: usize, tag: Tag) -> Option<Payload> {
        let mut pending = self.pending.borrow_mut();
        let pos = pending
            .iter()
            .position(|env| env.source == source && env.tag == tag)?;
        pending.remove(pos).map(|env| env.payload)
    }

    /// Block until the next message from `source` with `tag` arrives.
    fn take(&self, source: usize, tag: Tag) -> Result<Payload, CommError> {
        if let Some(payload) = self.take_pending(source, tag) {
            return Ok(payload);
        }

        loop {
            match self.inbox.recv_timeout(POLL_INTERVAL) {
                Ok(env) if env.source == source && env.tag == tag => return Ok(env.payload),
                Ok(env) => self.pending.borrow_mut().push_back(env),
                Err(RecvTimeoutError::Timeout) => {
                    if self.liveness.failed.load(Ordering::SeqCst) {
                        return Err(CommError::PeerFailed);
                    }
                    if self.liveness.departed[source].load(Ordering::SeqCst) {
                        // The peer may have sent right before leaving.
                        while let Ok(env) = self.inbox.try_recv() {
                            if env.source == source && env.tag == tag {
                                return Ok(env.payload);
                            }
                            self.pending.borrow_mut().push_back(env);
                        }
                        return Err(CommError::Disconnected(source));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(CommError::Disconnected(source)),
            }
        }
    }

    fn take_values(&self, source: usize, tag: Tag) -> Result<Vec<f64>, CommError> {
        match self.take(source, tag)? {
            Payload::Values(values) => Ok(values),
            Payload::MaxLoc(..) => Err(CommError::UnexpectedPayload {
                source_rank: source,
                tag,
            }),
        }
    }

    fn take_max_loc(&self, source: usize, tag: Tag) -> Result<(f64, usize), CommError> {
        match self.take(source, tag)? {
            Payload::MaxLoc(value, location) => Ok((value, location)),
            Payload::Values(_) => Err(CommError::UnexpectedPayload {
                source_rank: source,
                tag,
            }),
        }
    }
}

impl ProcessGroup for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.outboxes.len()
    }

    fn barrier(&self) -> Result<(), CommError> {
        if self.rank == COORDINATOR {
            for source in (0..self.size()).filter(|&r| r != COORDINATOR) {
                self.take_values(source, TAG_BARRIER_ARRIVE)?;
            }
            for dest in (0..self.size()).filter(|&r| r != COORDINATOR) {
                self.post(dest, TAG_BARRIER_RELEASE, Payload::Values(Vec::new()))?;
            }
        } else {
            self.post(COORDINATOR, TAG_BARRIER_ARRIVE, Payload::Values(Vec::new()))?;
            self.take_values(COORDINATOR, TAG_BARRIER_RELEASE)?;
        }
        Ok(())
    }

    fn send(&self, data: &[f64], dest: usize, tag: Tag) -> Result<(), CommError> {
        Self::check_user_tag(tag)?;
        self.check_rank(dest)?;
        self.post(dest, tag, Payload::Values(data.to_vec()))
    }

    fn recv(&self, data: &mut [f64], source: usize, tag: Tag) -> Result<Status, CommError> {
        Self::check_user_tag(tag)?;
        self.check_rank(source)?;
        let values = self.take_values(source, tag)?;
        if values.len() > data.len() {
            return Err(CommError::Truncated {
                capacity: data.len(),
                actual: values.len(),
            });
        }
        data[..values.len()].copy_from_slice(&values);
        Ok(Status {
            source,
            tag,
            count: values.len(),
        })
    }

    fn broadcast(&self, data: &mut [f64], root: usize) -> Result<(), CommError> {
        self.check_rank(root)?;
        if self.rank == root {
            for dest in (0..self.size()).filter(|&r| r != root) {
                self.post(dest, TAG_BROADCAST, Payload::Values(data.to_vec()))?;
            }
            return Ok(());
        }

        let values = self.take_values(root, TAG_BROADCAST)?;
        if values.len() != data.len() {
            return Err(CommError::CountMismatch {
                expected: data.len(),
                actual: values.len(),
            });
        }
        data.copy_from_slice(&values);
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
        self.check_rank(root)?;
        self.check_layout(counts, displs)?;
        if send.len() != counts[self.rank] {
            return Err(CommError::CountMismatch {
                expected: counts[self.rank],
                actual: send.len(),
            });
        }

        if self.rank != root {
            return self.post(root, TAG_GATHERV, Payload::Values(send.to_vec()));
        }

        for source in 0..self.size() {
            let start = displs[source];
            let end = start + counts[source];
            if end > recv.len() {
                return Err(CommError::Truncated {
                    capacity: recv.len(),
                    actual: end,
                });
            }
            if source == root {
                recv[start..end].copy_from_slice(send);
                continue;
            }
            let chunk = self.take_values(source, TAG_GATHERV)?;
            if chunk.len() != counts[source] {
                return Err(CommError::CountMismatch {
                    expected: counts[source],
                    actual: chunk.len(),
                });
            }
            recv[start..end].copy_from_slice(&chunk);
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
        self.check_rank(root)?;
        self.check_layout(counts, displs)?;
        if recv.len() != counts[self.rank] {
            return Err(CommError::CountMismatch {
                expected: counts[self.rank],
                actual: recv.len(),
            });
        }

        if self.rank != root {
            let chunk = self.take_values(root, TAG_SCATTERV)?;
            if chunk.len() != recv.len() {
                return Err(CommError::CountMismatch {
                    expected: recv.len(),
                    actual: chunk.len(),
                });
            }
            recv.copy_from_slice(&chunk);
            return Ok(());
        }

        for dest in 0..self.size() {
            let start = displs[dest];
            let end = start + counts[dest];
            let slice = send.get(start..end).ok_or(CommError::Truncated {
                capacity: send.len(),
                actual: end,
            })?;
            if dest == root {
                recv.copy_from_slice(slice);
            } else {
                self.post(dest, TAG_SCATTERV, Payload::Values(slice.to_vec()))?;
            }
        }
        Ok(())
    }

    fn allreduce_max_loc(&self, value: f64, location: usize) -> Result<(f64, usize), CommError> {
        if self.rank != COORDINATOR {
            self.post(COORDINATOR, TAG_REDUCE, Payload::MaxLoc(value, location))?;
            return self.take_max_loc(COORDINATOR, TAG_REDUCE_RESULT);
        }

        let mut best = (value, location);
        for source in (0..self.size()).filter(|&r| r != COORDINATOR) {
            best = max_loc(best, self.take_max_loc(source, TAG_REDUCE)?);
        }
        for dest in (0..self.size()).filter(|&r| r != COORDINATOR) {
            self.post(dest, TAG_REDUCE_RESULT, Payload::MaxLoc(best.0, best.1))?;
        }
        Ok(best)
    }
}

impl Drop for LocalGroup {
    fn drop(&mut self) {
        if thread::panicking() {
            self.liveness.failed.store(true, Ordering::SeqCst);
        }
        self.liveness.departed[self.rank].store(true, Ordering::SeqCst);
    }
}
