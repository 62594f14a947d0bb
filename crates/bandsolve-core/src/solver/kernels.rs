//! Numerical kernels shared by the sequential and distributed solvers.
//!
//! Kernels operate on blocks of the working band (see [`crate::band`]): a
//! block is a `rows x (2m - 1)` array whose first row is global row `start`.
//! Each kernel touches only the rows it is given, so running them on one
//! whole band or on several row blocks yields identical floating-point
//! results.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};

use super::{PivotInfo, PIVOT_TOLERANCE};
use crate::band::BandLayout;

/// Copy input-window rows into a zeroed working band.
pub(crate) fn widen(layout: BandLayout, input: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut working = Array2::zeros((input.nrows(), layout.working_width()));
    working
        .slice_mut(s![.., ..layout.band_width()])
        .assign(&input);
    working
}

/// Largest-magnitude candidate for column `k` among the block's rows.
///
/// Only rows in [`BandLayout::reach`] are considered. Ties keep the lowest
/// row and NaN entries are never candidates.
pub(crate) fn local_pivot(
    layout: BandLayout,
    block: ArrayView2<'_, f64>,
    start: usize,
    k: usize,
) -> Option<PivotInfo> {
    let reach = layout.reach(k);
    let first = reach.start.max(start);
    let last = reach.end.min(start + block.nrows());

    let mut best: Option<PivotInfo> = None;
    for row in first..last {
        let Some(b) = layout.band_index(row, k) else {
            continue;
        };
        let magnitude = block[[row - start, b]].abs();
        if magnitude.is_nan() {
            continue;
        }
        if best.map_or(true, |p| magnitude > p.magnitude) {
            best = Some(PivotInfo { magnitude, row });
        }
    }
    best
}

/// Exchange two rows of one block, rebasing each to its new slot.
///
/// `a` and `b` are global rows; both must belong to the block.
pub(crate) fn swap_rows(
    layout: BandLayout,
    mut block: ArrayViewMut2<'_, f64>,
    rhs: &mut Array1<f64>,
    start: usize,
    a: usize,
    b: usize,
) {
    if a == b {
        return;
    }
    let mut row_a = block.row(a - start).to_vec();
    let mut row_b = block.row(b - start).to_vec();
    layout.rebase(&mut row_a, a, b);
    layout.rebase(&mut row_b, b, a);
    block.row_mut(a - start).assign(&ArrayView1::from(&row_b));
    block.row_mut(b - start).assign(&ArrayView1::from(&row_a));
    rhs.swap(a - start, b - start);
}

/// Eliminate column `k` from global row `row` using the pivot at slot `k`.
///
/// `pivot` is the pivot's working-band row already rebased to slot `k`.
/// Returns whether the row was modified.
pub(crate) fn eliminate_row(
    layout: BandLayout,
    row: usize,
    mut values: ArrayViewMut1<'_, f64>,
    rhs: &mut f64,
    k: usize,
    pivot: ArrayView1<'_, f64>,
    pivot_rhs: f64,
) -> bool {
    let Some(target) = layout.band_index(row, k) else {
        return false;
    };
    let factor = values[target] / pivot[layout.diagonal()];
    if factor.is_nan() || factor.abs() <= PIVOT_TOLERANCE {
        return false;
    }

    for col in layout.reach(k) {
        if let (Some(dst), Some(src)) = (layout.band_index(row, col), layout.band_index(k, col)) {
            values[dst] -= factor * pivot[src];
        }
    }
    values[target] = 0.0;
    *rhs -= factor * pivot_rhs;
    true
}

/// Solve the upper-triangular working band from the last row up.
///
/// Components listed in `singular_columns` (ascending), components whose
/// diagonal is below tolerance and non-finite results are set to zero.
pub(crate) fn back_substitute(
    layout: BandLayout,
    band: ArrayView2<'_, f64>,
    rhs: ArrayView1<'_, f64>,
    singular_columns: &[usize],
) -> Vec<f64> {
    let n = layout.size();
    let diag_col = layout.diagonal();
    let mut x = vec![0.0; n];

    for i in (0..n).rev() {
        if singular_columns.binary_search(&i).is_ok() {
            continue;
        }
        let diag = band[[i, diag_col]];
        if diag.is_nan() || diag.abs() < PIVOT_TOLERANCE {
            continue;
        }
        let mut sum = rhs[i];
        for j in i + 1..(i + layout.band_width()).min(n) {
            if let Some(b) = layout.band_index(i, j) {
                sum -= band[[i, b]] * x[j];
            }
        }
        let value = sum / diag;
        x[i] = if value.is_finite() { value } else { 0.0 };
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_widen_zeroes_fill_columns() {
        let layout = BandLayout::new(3, 2);
        let input = array![[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]];
        let working = widen(layout, input.view());
        assert_eq!(working.dim(), (3, 3));
        assert_eq!(working.row(1).to_vec(), vec![2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_local_pivot_tie_keeps_lowest_row() {
        let layout = BandLayout::new(4, 3);
        // Column 1: rows 1 and 2 both hold magnitude 2.
        let input = array![
            [0.0, 0.0, 1.0],
            [0.0, 1.0, -2.0],
            [0.0, 2.0, 1.0],
            [0.0, 0.0, 1.0],
        ];
        let working = widen(layout, input.view());
        let pivot = local_pivot(layout, working.view(), 0, 1).unwrap();
        assert_eq!(pivot, PivotInfo { magnitude: 2.0, row: 1 });
    }

    #[test]
    fn test_local_pivot_respects_block_offset() {
        let layout = BandLayout::new(4, 2);
        let input = array![[0.0, 1.0], [5.0, 1.0], [0.0, 1.0], [0.0, 1.0]];
        let working = widen(layout, input.view());
        // A block holding rows 1..3 sees row 1's entry in column 0.
        let block = working.slice(s![1..3, ..]);
        let pivot = local_pivot(layout, block, 1, 0).unwrap();
        assert_eq!(pivot.row, 1);
        assert_eq!(pivot.magnitude, 5.0);
        // Column 0 is out of reach for a block starting at row 2.
        let block = working.slice(s![2..4, ..]);
        assert!(local_pivot(layout, block, 2, 0).is_none());
    }

    #[test]
    fn test_eliminate_row_zeroes_pivot_column() {
        let layout = BandLayout::new(3, 2);
        let input = array![[0.0, 2.0], [4.0, 3.0], [1.0, 1.0]];
        let mut working = widen(layout, input.view());
        let mut rhs = Array1::from_vec(vec![2.0, 11.0, 3.0]);
        let pivot = working.row(0).to_owned();
        let pivot_rhs = rhs[0];

        let changed = eliminate_row(
            layout,
            1,
            working.row_mut(1),
            &mut rhs[1],
            0,
            pivot.view(),
            pivot_rhs,
        );
        assert!(changed);
        assert_eq!(working.row(1).to_vec(), vec![0.0, 3.0, 0.0]);
        assert_relative_eq!(rhs[1], 7.0);
    }

    #[test]
    fn test_eliminate_row_skips_tiny_factor() {
        let layout = BandLayout::new(2, 2);
        let input = array![[0.0, 1.0], [1e-14, 1.0]];
        let mut working = widen(layout, input.view());
        let mut rhs = Array1::from_vec(vec![1.0, 1.0]);
        let pivot = working.row(0).to_owned();
        assert!(!eliminate_row(
            layout,
            1,
            working.row_mut(1),
            &mut rhs[1],
            0,
            pivot.view(),
            1.0
        ));
        assert_eq!(rhs[1], 1.0);
    }

    #[test]
    fn test_swap_rows_rebases() {
        let layout = BandLayout::new(3, 2);
        let input = array![[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]];
        let mut working = widen(layout, input.view());
        let mut rhs = Array1::from_vec(vec![10.0, 20.0, 30.0]);
        swap_rows(layout, working.view_mut(), &mut rhs, 0, 0, 1);
        // Former row 1 (columns 0, 1) now sits at slot 0.
        assert_eq!(working.row(0).to_vec(), vec![0.0, 2.0, 3.0]);
        // Former row 0 (column 0) now sits at slot 1.
        assert_eq!(working.row(1).to_vec(), vec![1.0, 0.0, 0.0]);
        assert_eq!(rhs.to_vec(), vec![20.0, 10.0, 30.0]);
    }

    #[test]
    fn test_back_substitute_upper_band() {
        let layout = BandLayout::new(3, 2);
        // Upper bidiagonal [[2, 1, 0], [0, 2, 1], [0, 0, 2]] in working form.
        let band = array![[0.0, 2.0, 1.0], [0.0, 2.0, 1.0], [0.0, 2.0, 0.0]];
        let rhs = array![4.0, 7.0, 6.0];
        let x = back_substitute(layout, band.view(), rhs.view(), &[]);
        assert_eq!(x, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_back_substitute_zeroes_singular_components() {
        let layout = BandLayout::new(3, 2);
        let band = array![[0.0, 2.0, 1.0], [0.0, 0.0, 1.0], [0.0, 2.0, 0.0]];
        let rhs = array![4.0, 7.0, 6.0];
        let x = back_substitute(layout, band.view(), rhs.view(), &[1]);
        assert_eq!(x[1], 0.0);
        assert_eq!(x[2], 3.0);
        assert_eq!(x[0], 2.0);
    }
}
