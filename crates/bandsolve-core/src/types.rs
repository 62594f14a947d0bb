//! Problem description, wire format and solution.
//!
//! A [`BandedSystem`] is valid by construction: every constructor checks the
//! shape invariants, so solvers never re-validate.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::band::BandLayout;

/// Number of header values (`size`, `band_width`) in the wire format.
pub const WIRE_HEADER_LEN: usize = 2;

/// Reasons a problem description is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Wire buffer of {len} values is too short (minimum 4)")]
    TooShort { len: usize },

    #[error("Invalid size {0}: must be a positive integer")]
    InvalidSize(f64),

    #[error("Invalid band width {band_width} for size {size}: must be an integer in 1..={size}")]
    InvalidBandWidth { band_width: f64, size: usize },

    #[error("{what} has {actual} values, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Non-zero entry at ({row}, {col}) lies outside the band")]
    OutsideBand { row: usize, col: usize },
}

/// Interpret a header value as a positive integer.
fn integral(value: f64) -> Option<usize> {
    if value.is_finite() && value >= 1.0 && value.fract() == 0.0 && value <= usize::MAX as f64 {
        Some(value as usize)
    } else {
        None
    }
}

fn check_shape(size: usize, band_width: usize) -> Result<(), ValidationError> {
    if size == 0 {
        return Err(ValidationError::InvalidSize(0.0));
    }
    if band_width == 0 || band_width > size {
        return Err(ValidationError::InvalidBandWidth {
            band_width: band_width as f64,
            size,
        });
    }
    Ok(())
}

/// A linear system `A x = b` with `A` stored in the lower band window.
///
/// Row `i` of `band` holds the true columns `i - (m - 1) ..= i`; see
/// [`crate::band`] for the layout.
#[derive(Debug, Clone, PartialEq)]
pub struct BandedSystem {
    layout: BandLayout,
    band: Array2<f64>,
    rhs: Array1<f64>,
}

impl BandedSystem {
    /// Build a system from a row-major band of `size * band_width` values and
    /// a right-hand side of `size` values.
    pub fn new(
        size: usize,
        band_width: usize,
        band: Vec<f64>,
        rhs: Vec<f64>,
    ) -> Result<Self, ValidationError> {
        check_shape(size, band_width)?;
        let expected = size * band_width;
        if band.len() != expected {
            return Err(ValidationError::LengthMismatch {
                what: "band",
                expected,
                actual: band.len(),
            });
        }
        if rhs.len() != size {
            return Err(ValidationError::LengthMismatch {
                what: "rhs",
                expected: size,
                actual: rhs.len(),
            });
        }
        let band = Array2::from_shape_vec((size, band_width), band).map_err(|_| {
            ValidationError::LengthMismatch {
                what: "band",
                expected,
                actual: 0,
            }
        })?;
        Ok(Self {
            layout: BandLayout::new(size, band_width),
            band,
            rhs: Array1::from_vec(rhs),
        })
    }

    /// Parse the wire format `[size, band_width, band.., rhs..]`.
    pub fn from_wire(data: &[f64]) -> Result<Self, ValidationError> {
        if data.len() < 4 {
            return Err(ValidationError::TooShort { len: data.len() });
        }
        let size = integral(data[0]).ok_or(ValidationError::InvalidSize(data[0]))?;
        let band_width = integral(data[1])
            .filter(|&m| m <= size)
            .ok_or(ValidationError::InvalidBandWidth {
                band_width: data[1],
                size,
            })?;

        let expected = size
            .checked_mul(band_width)
            .and_then(|cells| cells.checked_add(size))
            .and_then(|payload| payload.checked_add(WIRE_HEADER_LEN))
            .unwrap_or(usize::MAX);
        if data.len() != expected {
            return Err(ValidationError::LengthMismatch {
                what: "wire buffer",
                expected,
                actual: data.len(),
            });
        }

        let split = WIRE_HEADER_LEN + size * band_width;
        Self::new(
            size,
            band_width,
            data[WIRE_HEADER_LEN..split].to_vec(),
            data[split..].to_vec(),
        )
    }

    /// Serialize to the wire format.
    pub fn to_wire(&self) -> Vec<f64> {
        let mut wire = Vec::with_capacity(WIRE_HEADER_LEN + self.band.len() + self.rhs.len());
        wire.push(self.size() as f64);
        wire.push(self.band_width() as f64);
        wire.extend(self.band.iter().copied());
        wire.extend(self.rhs.iter().copied());
        wire
    }

    /// Build a system from a dense square matrix.
    ///
    /// Fails if any non-zero lies above the diagonal or more than
    /// `band_width - 1` columns left of it.
    pub fn from_dense(
        dense: ArrayView2<f64>,
        band_width: usize,
        rhs: Vec<f64>,
    ) -> Result<Self, ValidationError> {
        let size = dense.nrows();
        if dense.ncols() != size {
            return Err(ValidationError::LengthMismatch {
                what: "dense row",
                expected: size,
                actual: dense.ncols(),
            });
        }
        check_shape(size, band_width)?;
        let layout = BandLayout::new(size, band_width);

        let mut band = Array2::zeros((size, band_width));
        for ((row, col), &value) in dense.indexed_iter() {
            match layout.input_index(row, col) {
                Some(b) => band[[row, b]] = value,
                None if value != 0.0 => return Err(ValidationError::OutsideBand { row, col }),
                None => {}
            }
        }

        if rhs.len() != size {
            return Err(ValidationError::LengthMismatch {
                what: "rhs",
                expected: size,
                actual: rhs.len(),
            });
        }
        Ok(Self {
            layout,
            band,
            rhs: Array1::from_vec(rhs),
        })
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    pub fn band_width(&self) -> usize {
        self.layout.band_width()
    }

    pub fn layout(&self) -> BandLayout {
        self.layout
    }

    /// The `size x band_width` input band.
    pub fn band(&self) -> ArrayView2<'_, f64> {
        self.band.view()
    }

    pub fn rhs(&self) -> ArrayView1<'_, f64> {
        self.rhs.view()
    }

    pub(crate) fn band_mut(&mut self) -> ArrayViewMut2<'_, f64> {
        self.band.view_mut()
    }

    pub(crate) fn set_rhs(&mut self, rhs: Vec<f64>) {
        debug_assert_eq!(rhs.len(), self.size());
        self.rhs = Array1::from_vec(rhs);
    }

    /// Entry `A[row, col]`, zero outside the band.
    pub fn entry(&self, row: usize, col: usize) -> f64 {
        self.layout
            .input_index(row, col)
            .map_or(0.0, |b| self.band[[row, b]])
    }

    /// Compute `A x`.
    ///
    /// # Panics
    /// Panics if `x.len() != size`.
    pub fn multiply(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.size(), "vector length must match system size");
        (0..self.size())
            .into_par_iter()
            .map(|row| {
                self.band
                    .row(row)
                    .iter()
                    .enumerate()
                    .filter_map(|(b, &a)| self.layout.column_of(row, b).map(|col| a * x[col]))
                    .sum::<f64>()
            })
            .collect()
    }

    /// Relative residual $\|A x - b\|_2 / \max(\|b\|_2, 1)$.
    pub fn residual_norm(&self, x: &[f64]) -> f64 {
        let ax = self.multiply(x);
        let residual = ax
            .iter()
            .zip(self.rhs.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        let scale = self.rhs.dot(&self.rhs).sqrt().max(1.0);
        residual / scale
    }
}

/// Result of a solve, identical on every rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// Solution vector `x`.
    pub values: Vec<f64>,
    /// Elimination steps skipped because no usable pivot existed, ascending.
    /// The corresponding components of `values` are zero.
    #[serde(default)]
    pub singular_columns: Vec<usize>,
}

impl Solution {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether every elimination step found a usable pivot.
    pub fn is_regular(&self) -> bool {
        self.singular_columns.is_empty()
    }

    /// Largest absolute component-wise difference to `other`.
    pub fn max_abs_difference(&self, other: &Solution) -> f64 {
        self.values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}
