//! Reproducible test and benchmark problems.
//!
//! Every generator fixes the solution to $x_i = i + 1$ and derives the
//! right-hand side as $b = A x$, so results can be checked against a known
//! answer. Random generators are seeded with [`ChaCha8Rng`] and produce the
//! same system on every platform.

use ndarray::ArrayViewMut1;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::types::{BandedSystem, ValidationError};

/// Number of sub-diagonals filled by the random generators, at most.
const MAX_RANDOM_OFFSETS: usize = 9;

/// A generated system together with its exact solution.
#[derive(Debug, Clone)]
pub struct Problem {
    pub system: BandedSystem,
    pub expected: Vec<f64>,
}

/// Problem families selectable from job files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    /// Strictly diagonally dominant, deterministic.
    Dominant,
    /// Pure diagonal; the band width is always 1.
    Diagonal,
    /// Identity-like with every third diagonal entry near zero.
    WeakDiagonal,
    /// Random diagonally dominant band.
    Random,
    /// Small diagonal, large first sub-diagonal; needs row exchanges.
    Pivoting,
}

impl ProblemKind {
    pub const ALL: [ProblemKind; 5] = [
        Self::Dominant,
        Self::Diagonal,
        Self::WeakDiagonal,
        Self::Random,
        Self::Pivoting,
    ];

    /// Generate a problem of this kind. `seed` only affects random kinds.
    pub fn generate(
        self,
        size: usize,
        band_width: usize,
        seed: u64,
    ) -> Result<Problem, ValidationError> {
        match self {
            Self::Dominant => diagonally_dominant(size, band_width),
            Self::Diagonal => diagonal(size),
            Self::WeakDiagonal => weak_diagonal(size, band_width),
            Self::Random => random_dominant(size, band_width, seed),
            Self::Pivoting => pivoting(size, band_width, seed),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Dominant => "dominant",
            Self::Diagonal => "diagonal",
            Self::WeakDiagonal => "weak_diagonal",
            Self::Random => "random",
            Self::Pivoting => "pivoting",
        }
    }
}

impl std::fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ProblemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|k| k.name()).collect();
                format!("unknown problem kind '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// Build a problem by filling each band row in place.
///
/// `fill(row, band_row)` receives the zeroed input row; the diagonal is the
/// last element and `band_row[m - 1 - d]` is the entry `d` columns left of it.
fn assemble<F>(size: usize, band_width: usize, mut fill: F) -> Result<Problem, ValidationError>
where
    F: FnMut(usize, ArrayViewMut1<'_, f64>),
{
    let mut system = BandedSystem::new(
        size,
        band_width,
        vec![0.0; size * band_width],
        vec![0.0; size],
    )?;
    for (row, band_row) in system.band_mut().rows_mut().into_iter().enumerate() {
        fill(row, band_row);
    }
    let expected: Vec<f64> = (1..=size).map(|i| i as f64).collect();
    let rhs = system.multiply(&expected);
    system.set_rhs(rhs);
    Ok(Problem { system, expected })
}

/// Sub-diagonal offsets that fit in `row` of a band of width `band_width`,
/// capped at `limit`.
fn offsets(row: usize, band_width: usize, limit: usize) -> std::ops::RangeInclusive<usize> {
    1..=row.min(band_width - 1).min(limit)
}

/// Off-diagonals `0.1 / (d + 1)` at distance `d`, diagonal
/// `sum(|off|) + n + 10`.
pub fn diagonally_dominant(size: usize, band_width: usize) -> Result<Problem, ValidationError> {
    assemble(size, band_width, |row, mut band_row| {
        let diag = band_width - 1;
        let mut sum = 0.0;
        for d in offsets(row, band_width, usize::MAX) {
            let value = 0.1 / (d as f64 + 1.0);
            band_row[diag - d] = value;
            sum += value;
        }
        band_row[diag] = sum + size as f64 + 10.0;
    })
}

/// Diagonal matrix with entries `2 (i + 1)`.
pub fn diagonal(size: usize) -> Result<Problem, ValidationError> {
    assemble(size, 1, |row, mut band_row| {
        band_row[0] = 2.0 * (row as f64 + 1.0);
    })
}

/// Identity with every third diagonal entry set to `1e-6`.
///
/// The small entries stay above the pivot tolerance, so the system is solved
/// exactly; the sub-diagonals are left empty.
pub fn weak_diagonal(size: usize, band_width: usize) -> Result<Problem, ValidationError> {
    assemble(size, band_width, |row, mut band_row| {
        band_row[band_width - 1] = if row % 3 == 0 { 1e-6 } else { 1.0 };
    })
}

/// Random diagonally dominant band.
///
/// Up to nine sub-diagonals are drawn from `[0.1, 1.0)` and the diagonal is
/// `sum(|off|) + U[1, 10) + 10`.
pub fn random_dominant(
    size: usize,
    band_width: usize,
    seed: u64,
) -> Result<Problem, ValidationError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    assemble(size, band_width, |row, mut band_row| {
        let diag = band_width - 1;
        let mut sum = 0.0;
        for d in offsets(row, band_width, MAX_RANDOM_OFFSETS) {
            let value = rng.gen_range(1.0..10.0) * 0.1;
            band_row[diag - d] = value;
            sum += value;
        }
        band_row[diag] = sum + rng.gen_range(1.0..10.0) + 10.0;
    })
}

/// Band that forces partial pivoting to exchange rows.
///
/// Even rows get a diagonal in `[0.25, 0.5)`, odd rows one in `[8, 12)`. The
/// first sub-diagonal is drawn from `[0.6, 1.0)` and dominates the small
/// diagonals, further sub-diagonals from `[0, 0.05)`. Alternating small and
/// large diagonals keeps the system well conditioned.
pub fn pivoting(size: usize, band_width: usize, seed: u64) -> Result<Problem, ValidationError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    assemble(size, band_width, |row, mut band_row| {
        let diag = band_width - 1;
        for d in offsets(row, band_width, MAX_RANDOM_OFFSETS) {
            band_row[diag - d] = if d == 1 {
                rng.gen_range(0.6..1.0)
            } else {
                rng.gen_range(0.0..0.05)
            };
        }
        band_row[diag] = if row % 2 == 0 {
            rng.gen_range(0.25..0.5)
        } else {
            rng.gen_range(8.0..12.0)
        };
    })
}
