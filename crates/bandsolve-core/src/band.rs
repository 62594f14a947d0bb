//! Band storage layout.
//!
//! A banded matrix of order $n$ with bandwidth $m$ is stored row by row,
//! keeping only a fixed window of columns around the diagonal. Band column
//! `c` of row `i` holds the true column
//!
//! $$ j = i - (m - 1) + c $$
//!
//! so the diagonal always sits at band column $m - 1$.
//!
//! # Input window and working band
//!
//! Problems arrive with the *input window*: $m$ columns per row, i.e. the
//! diagonal and the $m - 1$ sub-diagonals. Entries outside it are zero.
//!
//! Partial pivoting moves a row up by at most $m - 1$ slots, which pushes
//! its entries up to $m - 1$ columns right of the diagonal. The *working
//! band* used during elimination therefore stores $2m - 1$ columns per row
//! with the same mapping formula: band columns `0..m` are the input window,
//! `m..2m-1` receive the fill-in. Band columns that map outside `[0, n)`
//! (the first and last $m - 1$ rows) are zero and never touched.
//!
//! Storage is relative to a row's *slot*. When a row changes slot its
//! entries must be shifted, see [`BandLayout::rebase`].

use std::ops::Range;

/// Index arithmetic for a banded matrix of order `size` and bandwidth
/// `band_width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandLayout {
    size: usize,
    band_width: usize,
}

impl BandLayout {
    /// Create a layout. Callers guarantee `1 <= band_width <= size`.
    pub fn new(size: usize, band_width: usize) -> Self {
        debug_assert!(band_width >= 1 && band_width <= size);
        Self { size, band_width }
    }

    /// Matrix order $n$.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Input bandwidth $m$.
    pub fn band_width(&self) -> usize {
        self.band_width
    }

    /// Number of stored columns per row of the working band, $2m - 1$.
    pub fn working_width(&self) -> usize {
        2 * self.band_width - 1
    }

    /// Band column of the diagonal, $m - 1$.
    pub fn diagonal(&self) -> usize {
        self.band_width - 1
    }

    /// Working-band column holding true column `col` of row `row`.
    ///
    /// Returns `None` when `col` is outside the matrix or outside the row's
    /// working window.
    pub fn band_index(&self, row: usize, col: usize) -> Option<usize> {
        if col >= self.size {
            return None;
        }
        (col + self.diagonal())
            .checked_sub(row)
            .filter(|&b| b < self.working_width())
    }

    /// Input-window column holding true column `col` of row `row`.
    pub fn input_index(&self, row: usize, col: usize) -> Option<usize> {
        self.band_index(row, col).filter(|&b| b <= self.diagonal())
    }

    /// True column stored at band column `band_col` of row `row`.
    pub fn column_of(&self, row: usize, band_col: usize) -> Option<usize> {
        if band_col >= self.working_width() {
            return None;
        }
        (row + band_col)
            .checked_sub(self.diagonal())
            .filter(|&col| col < self.size)
    }

    /// Rows that can hold a non-zero in column `k` once columns `0..k` have
    /// been eliminated.
    pub fn reach(&self, k: usize) -> Range<usize> {
        k..(k + self.band_width).min(self.size)
    }

    /// Re-express a stored working-band row that moves from slot `from_row`
    /// to slot `to_row`.
    ///
    /// Moving up shifts the entries right, moving down shifts them left.
    /// Positions that have no source are zeroed. Entries shifted out of the
    /// window must already be zero; this holds for every row swap performed
    /// by pivoting because the rows involved have no non-zeros left of the
    /// pivot column and none beyond `k + m - 1`.
    pub fn rebase(&self, values: &mut [f64], from_row: usize, to_row: usize) {
        let len = values.len();
        if to_row < from_row {
            let shift = (from_row - to_row).min(len);
            values.rotate_right(shift);
            values[..shift].fill(0.0);
        } else if to_row > from_row {
            let shift = (to_row - from_row).min(len);
            values.rotate_left(shift);
            values[len - shift..].fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagonal_is_last_input_column() {
        for m in 1..5 {
            let layout = BandLayout::new(8, m);
            for row in 0..8 {
                assert_eq!(layout.band_index(row, row), Some(m - 1));
                assert_eq!(layout.input_index(row, row), Some(m - 1));
            }
        }
    }

    #[test]
    fn test_input_window_covers_lower_band_only() {
        let layout = BandLayout::new(6, 3);
        // Row 4 stores columns 2, 3, 4 in the input window.
        assert_eq!(layout.input_index(4, 2), Some(0));
        assert_eq!(layout.input_index(4, 3), Some(1));
        assert_eq!(layout.input_index(4, 4), Some(2));
        assert_eq!(layout.input_index(4, 1), None);
        assert_eq!(layout.input_index(4, 5), None);
        // The working band additionally reaches two columns right.
        assert_eq!(layout.band_index(4, 5), Some(3));
        assert_eq!(layout.band_index(3, 5), Some(4));
        assert_eq!(layout.band_index(2, 5), None);
    }

    #[test]
    fn test_boundary_rows() {
        let layout = BandLayout::new(5, 3);
        // Row 0 has nothing left of the diagonal inside the matrix.
        assert_eq!(layout.column_of(0, 0), None);
        assert_eq!(layout.column_of(0, 1), None);
        assert_eq!(layout.column_of(0, 2), Some(0));
        // The last row has nothing right of the diagonal.
        assert_eq!(layout.column_of(4, 2), Some(4));
        assert_eq!(layout.column_of(4, 3), None);
        assert_eq!(layout.band_index(4, 5), None);
    }

    #[test]
    fn test_band_index_and_column_of_are_inverse() {
        let layout = BandLayout::new(7, 3);
        for row in 0..7 {
            for b in 0..layout.working_width() {
                if let Some(col) = layout.column_of(row, b) {
                    assert_eq!(layout.band_index(row, col), Some(b));
                }
            }
        }
    }

    #[test]
    fn test_reach_is_clipped_to_matrix() {
        let layout = BandLayout::new(5, 3);
        assert_eq!(layout.reach(0), 0..3);
        assert_eq!(layout.reach(3), 3..5);
        assert_eq!(layout.reach(4), 4..5);
    }

    #[test]
    fn test_rebase_preserves_true_columns() {
        let layout = BandLayout::new(6, 3);
        // Row stored at slot 3 with entries in columns 2, 3, 4.
        let mut row = vec![0.0; layout.working_width()];
        row[layout.band_index(3, 2).unwrap()] = 1.0;
        row[layout.band_index(3, 3).unwrap()] = 2.0;
        row[layout.band_index(3, 4).unwrap()] = 3.0;

        let mut moved_up = row.clone();
        layout.rebase(&mut moved_up, 3, 2);
        assert_eq!(moved_up[layout.band_index(2, 2).unwrap()], 1.0);
        assert_eq!(moved_up[layout.band_index(2, 3).unwrap()], 2.0);
        assert_eq!(moved_up[layout.band_index(2, 4).unwrap()], 3.0);
        assert_eq!(moved_up.iter().sum::<f64>(), 6.0);

        let mut back = moved_up.clone();
        layout.rebase(&mut back, 2, 3);
        assert_eq!(back, row);
    }

    #[test]
    fn test_rebase_same_slot_is_noop() {
        let layout = BandLayout::new(4, 2);
        let mut row = vec![1.0, 2.0, 3.0];
        layout.rebase(&mut row, 1, 1);
        assert_eq!(row, vec![1.0, 2.0, 3.0]);
    }
}
