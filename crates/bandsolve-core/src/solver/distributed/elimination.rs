//! Pivoted elimination engine.
//!
//! For every column `k` the ranks agree on a pivot through an all-reduce,
//! the pivot's owner broadcasts it, the pivot row is exchanged with row `k`
//! if they differ and every rank eliminates column `k` from its own rows.

use bandsolve_comm::{ProcessGroup, Tag};
use log::{trace, warn};
use ndarray::ArrayView1;

use super::distribution::LocalBand;
use crate::solver::{kernels, PivotInfo, SolverError};

/// Point-to-point tags of the row exchange.
pub mod tags {
    use bandsolve_comm::Tag;

    /// Pivot row, sent by its owner to the owner of row `k`.
    pub const PIVOT_ROW: Tag = 0;
    pub const PIVOT_RHS: Tag = 1;
    /// Row `k`, sent by its owner to the owner of the pivot row.
    pub const DISPLACED_ROW: Tag = 2;
    pub const DISPLACED_RHS: Tag = 3;
}

/// What forward elimination did, identical on every rank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EliminationSummary {
    /// Columns skipped because no usable pivot existed, ascending.
    pub singular_columns: Vec<usize>,
    /// Row exchanges where both rows belonged to one rank.
    pub local_swaps: usize,
    /// Row exchanges between two ranks.
    pub remote_swaps: usize,
}

/// Send an owned row to `peer` and replace it with the row `peer` sends back.
///
/// Both sides send before they receive. `row` is the global slot the local
/// row occupies, `other` the slot of the row arriving from `peer`.
fn exchange<G>(
    group: &G,
    local: &mut LocalBand,
    row: usize,
    other: usize,
    peer: usize,
    outgoing: (Tag, Tag),
    incoming: (Tag, Tag),
) -> Result<(), SolverError>
where
    G: ProcessGroup + ?Sized,
{
    let layout = local.layout;
    let (values, rhs) = local.row_mut(row)?;
    let outgoing_values = values.to_vec();
    let outgoing_rhs = [*rhs];
    group.send(&outgoing_values, peer, outgoing.0)?;
    group.send(&outgoing_rhs, peer, outgoing.1)?;

    let mut incoming_values = vec![0.0; layout.working_width()];
    let mut incoming_rhs = [0.0];
    let status = group.recv(&mut incoming_values, peer, incoming.0)?;
    if status.count != incoming_values.len() {
        return Err(SolverError::Shape(format!(
            "row exchange with rank {peer} delivered {} of {} values",
            status.count,
            incoming_values.len()
        )));
    }
    group.recv(&mut incoming_rhs, peer, incoming.1)?;

    layout.rebase(&mut incoming_values, other, row);
    let (mut values, rhs) = local.row_mut(row)?;
    values.assign(&ArrayView1::from(&incoming_values));
    *rhs = incoming_rhs[0];
    Ok(())
}

/// Run forward elimination with partial pivoting on every rank's rows.
///
/// On return each rank's band holds its rows of the upper-triangular
/// working band.
pub fn forward_eliminate<G>(
    group: &G,
    local: &mut LocalBand,
) -> Result<EliminationSummary, SolverError>
where
    G: ProcessGroup + ?Sized,
{
    let layout = local.layout;
    let partitioner = local.partitioner;
    let part = local.partition;
    let rank = group.rank();
    let width = layout.working_width();
    let mut summary = EliminationSummary::default();

    for k in 0..layout.size() {
        let candidate =
            kernels::local_pivot(layout, local.band.view(), part.start, k).unwrap_or(PivotInfo::NONE);
        let (magnitude, row) = group.allreduce_max_loc(candidate.magnitude, candidate.row)?;
        let pivot = PivotInfo { magnitude, row };

        if pivot.is_degenerate() {
            if rank == 0 {
                warn!("Degenerate pivot in column {k}, skipping elimination step");
            }
            summary.singular_columns.push(k);
            continue;
        }
        trace!("Rank {rank} step {k}: pivot row {} (|a| = {:.3e})", pivot.row, magnitude);

        // The pivot's owner broadcasts the row as stored at its current slot.
        let pivot_owner = partitioner.owner_of(pivot.row);
        let mut pivot_buf = vec![0.0; width + 1];
        if rank == pivot_owner {
            let (values, rhs) = local.row_mut(pivot.row)?;
            pivot_buf[..width].copy_from_slice(&values.to_vec());
            pivot_buf[width] = *rhs;
        }
        group.broadcast(&mut pivot_buf, pivot_owner)?;
        layout.rebase(&mut pivot_buf[..width], pivot.row, k);

        if pivot.row != k {
            let k_owner = partitioner.owner_of(k);
            if k_owner == pivot_owner {
                if rank == k_owner {
                    kernels::swap_rows(
                        layout,
                        local.band.view_mut(),
                        &mut local.rhs,
                        part.start,
                        k,
                        pivot.row,
                    );
                }
                summary.local_swaps += 1;
            } else {
                if part.contains(pivot.row) {
                    exchange(
                        group,
                        local,
                        pivot.row,
                        k,
                        k_owner,
                        (tags::PIVOT_ROW, tags::PIVOT_RHS),
                        (tags::DISPLACED_ROW, tags::DISPLACED_RHS),
                    )?;
                } else if part.contains(k) {
                    exchange(
                        group,
                        local,
                        k,
                        pivot.row,
                        pivot_owner,
                        (tags::DISPLACED_ROW, tags::DISPLACED_RHS),
                        (tags::PIVOT_ROW, tags::PIVOT_RHS),
                    )?;
                }
                summary.remote_swaps += 1;
            }
        }

        let (pivot_values, pivot_rhs) = pivot_buf.split_at(width);
        let pivot_values = ArrayView1::from(pivot_values);
        let reach = layout.reach(k);
        for row in (k + 1).max(part.start)..reach.end.min(part.end) {
            let (values, rhs) = local.row_mut(row)?;
            kernels::eliminate_row(layout, row, values, rhs, k, pivot_values, pivot_rhs[0]);
        }
    }

    Ok(summary)
}
