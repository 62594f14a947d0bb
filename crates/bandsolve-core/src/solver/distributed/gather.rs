//! Gather & back-substitution stage.

use bandsolve_comm::ProcessGroup;
use log::debug;
use ndarray::{ArrayView1, ArrayView2};

use super::distribution::LocalBand;
use super::COORDINATOR;
use crate::solver::{kernels, SolverError};
use crate::types::Solution;

/// Gather the eliminated band at the coordinator, back-substitute there and
/// broadcast the solution to every rank.
pub fn gather_and_solve<G>(
    group: &G,
    local: &LocalBand,
    singular_columns: Vec<usize>,
) -> Result<Solution, SolverError>
where
    G: ProcessGroup + ?Sized,
{
    let layout = local.layout;
    let n = layout.size();
    let width = layout.working_width();
    let is_root = group.is_root(COORDINATOR);

    let rows = local.partitioner.counts();
    let starts = local.partitioner.displacements();
    let band_counts: Vec<usize> = rows.iter().map(|r| r * width).collect();
    let band_displs: Vec<usize> = starts.iter().map(|d| d * width).collect();

    let send_band = local
        .band
        .as_slice()
        .ok_or_else(|| SolverError::Shape("local band is not contiguous".to_string()))?;
    let send_rhs = local
        .rhs
        .as_slice()
        .ok_or_else(|| SolverError::Shape("local rhs is not contiguous".to_string()))?;

    let (mut band, mut rhs) = if is_root {
        (vec![0.0; n * width], vec![0.0; n])
    } else {
        (Vec::new(), Vec::new())
    };
    group.gatherv(send_band, &mut band, &band_counts, &band_displs, COORDINATOR)?;
    group.gatherv(send_rhs, &mut rhs, &rows, &starts, COORDINATOR)?;

    let mut values = vec![0.0; n];
    if is_root {
        let band = ArrayView2::from_shape((n, width), band.as_slice())
            .map_err(|e| SolverError::Shape(e.to_string()))?;
        values = kernels::back_substitute(layout, band, ArrayView1::from(&rhs), &singular_columns);
        debug!("Back-substitution of n={n} finished at the coordinator");
    }
    group.broadcast(&mut values, COORDINATOR)?;

    Ok(Solution {
        values,
        singular_columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::distributed::{distribution, elimination, DistributionMode};
    use crate::types::BandedSystem;
    use bandsolve_comm::LocalUniverse;

    #[test]
    fn test_every_rank_receives_the_solution() {
        let system = BandedSystem::new(
            5,
            1,
            vec![2.0, 4.0, 6.0, 8.0, 10.0],
            vec![4.0, 16.0, 36.0, 64.0, 100.0],
        )
        .unwrap();
        let solutions = LocalUniverse::run(3, |group| {
            let mut local =
                distribution::distribute(&group, Some(&system), DistributionMode::Scatter)?;
            let summary = elimination::forward_eliminate(&group, &mut local)?;
            gather_and_solve(&group, &local, summary.singular_columns)
        })
        .unwrap();
        for solution in solutions {
            assert_eq!(solution.unwrap().values, vec![2.0, 4.0, 6.0, 8.0, 10.0]);
        }
    }
}
