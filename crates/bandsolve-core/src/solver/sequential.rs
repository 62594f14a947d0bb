//! Sequential reference solver.
//!
//! Runs pivot search, row exchange, elimination and back-substitution on the
//! whole working band in one address space. It is the baseline the
//! distributed solver is validated against.

use log::{debug, trace, warn};

use super::kernels;
use super::{BandSolver, SolverError};
use crate::types::{BandedSystem, Solution};

/// Single-process banded Gaussian elimination with partial pivoting.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialSolver;

impl SequentialSolver {
    pub fn new() -> Self {
        Self
    }
}

impl BandSolver for SequentialSolver {
    fn solve(&self, system: &BandedSystem) -> Result<Solution, SolverError> {
        let layout = system.layout();
        let n = layout.size();
        let mut band = kernels::widen(layout, system.band());
        let mut rhs = system.rhs().to_owned();
        let mut singular_columns = Vec::new();
        let mut swaps = 0usize;

        for k in 0..n {
            let pivot = match kernels::local_pivot(layout, band.view(), 0, k) {
                Some(pivot) if !pivot.is_degenerate() => pivot,
                _ => {
                    warn!("Degenerate pivot in column {k}, skipping elimination step");
                    singular_columns.push(k);
                    continue;
                }
            };
            trace!("Step {k}: pivot row {} (|a| = {:.3e})", pivot.row, pivot.magnitude);

            if pivot.row != k {
                kernels::swap_rows(layout, band.view_mut(), &mut rhs, 0, k, pivot.row);
                swaps += 1;
            }

            let pivot_values = band.row(k).to_owned();
            let pivot_rhs = rhs[k];
            for row in k + 1..layout.reach(k).end {
                kernels::eliminate_row(
                    layout,
                    row,
                    band.row_mut(row),
                    &mut rhs[row],
                    k,
                    pivot_values.view(),
                    pivot_rhs,
                );
            }
        }

        debug!(
            "Sequential elimination of n={n}, m={}: {swaps} swaps, {} singular columns",
            layout.band_width(),
            singular_columns.len()
        );

        let values = kernels::back_substitute(layout, band.view(), rhs.view(), &singular_columns);
        Ok(Solution {
            values,
            singular_columns,
        })
    }

    fn method_name(&self) -> &str {
        "Sequential banded Gaussian elimination"
    }
}
