//! Distribution stage: hand every rank its rows of the system.

use bandsolve_comm::ProcessGroup;
use log::debug;
use ndarray::{s, Array1, Array2, ArrayView2, ArrayViewMut1};

use super::{DistributionMode, COORDINATOR};
use crate::band::BandLayout;
use crate::partition::{Partition, RowPartitioner};
use crate::solver::{kernels, SolverError};
use crate::types::BandedSystem;

/// One rank's rows of the working band and right-hand side.
#[derive(Debug, Clone)]
pub struct LocalBand {
    pub partition: Partition,
    pub partitioner: RowPartitioner,
    pub layout: BandLayout,
    /// `local_rows x (2m - 1)` working-band rows.
    pub band: Array2<f64>,
    pub rhs: Array1<f64>,
}

impl LocalBand {
    /// Wrap input-window rows for `partition`, widening them to the working
    /// band.
    pub fn from_input(
        layout: BandLayout,
        partitioner: RowPartitioner,
        partition: Partition,
        input: ArrayView2<'_, f64>,
        rhs: Array1<f64>,
    ) -> Result<Self, SolverError> {
        if input.dim() != (partition.local_rows, layout.band_width()) {
            return Err(SolverError::Shape(format!(
                "rank {} expected {} x {} input rows, got {:?}",
                partition.rank,
                partition.local_rows,
                layout.band_width(),
                input.dim()
            )));
        }
        if rhs.len() != partition.local_rows {
            return Err(SolverError::Shape(format!(
                "rank {} expected {} rhs values, got {}",
                partition.rank,
                partition.local_rows,
                rhs.len()
            )));
        }
        Ok(Self {
            partition,
            partitioner,
            layout,
            band: kernels::widen(layout, input),
            rhs,
        })
    }

    /// Working-band row and rhs entry of owned global `row`.
    pub fn row_mut(
        &mut self,
        row: usize,
    ) -> Result<(ArrayViewMut1<'_, f64>, &mut f64), SolverError> {
        let local = self.partition.local_index(row).ok_or_else(|| {
            SolverError::Shape(format!(
                "rank {} does not own row {row}",
                self.partition.rank
            ))
        })?;
        Ok((self.band.row_mut(local), &mut self.rhs[local]))
    }
}

/// Parse the broadcast header into a layout.
fn header_layout(header: [f64; 2]) -> Option<BandLayout> {
    let size = header[0] as usize;
    let band_width = header[1] as usize;
    (size > 0 && band_width > 0 && band_width <= size).then(|| BandLayout::new(size, band_width))
}

/// Distribute `system` from the coordinator to every rank of `group`.
///
/// The coordinator first broadcasts `[size, band_width]`; `[0, 0]` signals
/// that it has no system, in which case every rank returns
/// [`SolverError::MissingSystem`].
pub fn distribute<G>(
    group: &G,
    system: Option<&BandedSystem>,
    mode: DistributionMode,
) -> Result<LocalBand, SolverError>
where
    G: ProcessGroup + ?Sized,
{
    let root_system = system.filter(|_| group.is_root(COORDINATOR));

    let mut header = root_system.map_or([0.0, 0.0], |s| [s.size() as f64, s.band_width() as f64]);
    group.broadcast(&mut header, COORDINATOR)?;
    let layout = header_layout(header).ok_or(SolverError::MissingSystem)?;

    let partitioner = RowPartitioner::new(layout.size(), group.size())?;
    let partition = partitioner.partition(group.rank());
    let m = layout.band_width();

    let (input, rhs) = match mode {
        DistributionMode::Broadcast => {
            let mut band = root_system.map_or_else(
                || vec![0.0; layout.size() * m],
                |s| s.band().iter().copied().collect(),
            );
            let mut rhs =
                root_system.map_or_else(|| vec![0.0; layout.size()], |s| s.rhs().to_vec());
            group.broadcast(&mut band, COORDINATOR)?;
            group.broadcast(&mut rhs, COORDINATOR)?;

            let full = ArrayView2::from_shape((layout.size(), m), band.as_slice())
                .map_err(|e| SolverError::Shape(e.to_string()))?;
            (
                full.slice(s![partition.rows(), ..]).to_owned(),
                Array1::from(rhs[partition.rows()].to_vec()),
            )
        }
        DistributionMode::Scatter => {
            let rows = partitioner.counts();
            let starts = partitioner.displacements();
            let band_counts: Vec<usize> = rows.iter().map(|r| r * m).collect();
            let band_displs: Vec<usize> = starts.iter().map(|d| d * m).collect();

            let band_send: Vec<f64> =
                root_system.map_or_else(Vec::new, |s| s.band().iter().copied().collect());
            let rhs_send: Vec<f64> = root_system.map_or_else(Vec::new, |s| s.rhs().to_vec());

            let mut band = vec![0.0; partition.local_rows * m];
            let mut rhs = vec![0.0; partition.local_rows];
            group.scatterv(&band_send, &band_counts, &band_displs, &mut band, COORDINATOR)?;
            group.scatterv(&rhs_send, &rows, &starts, &mut rhs, COORDINATOR)?;

            let block = Array2::from_shape_vec((partition.local_rows, m), band)
                .map_err(|e| SolverError::Shape(e.to_string()))?;
            (block, Array1::from(rhs))
        }
    };

    debug!(
        "Rank {} received rows {}..{} of n={} m={} ({mode})",
        partition.rank,
        partition.start,
        partition.end,
        layout.size(),
        m
    );
    LocalBand::from_input(layout, partitioner, partition, input.view(), rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate;
    use bandsolve_comm::LocalUniverse;

    fn distribute_all(processes: usize, mode: DistributionMode) -> Vec<LocalBand> {
        let problem = generate::random_dominant(11, 3, 5).unwrap();
        LocalUniverse::run(processes, |group| {
            distribute(&group, Some(&problem.system), mode).unwrap()
        })
        .unwrap()
    }

    #[test]
    fn test_broadcast_and_scatter_agree() {
        let broadcast = distribute_all(3, DistributionMode::Broadcast);
        let scatter = distribute_all(3, DistributionMode::Scatter);
        for (a, b) in broadcast.iter().zip(&scatter) {
            assert_eq!(a.partition, b.partition);
            assert_eq!(a.band, b.band);
            assert_eq!(a.rhs, b.rhs);
        }
    }

    #[test]
    fn test_local_rows_are_widened() {
        let problem = generate::random_dominant(11, 3, 5).unwrap();
        let locals = distribute_all(3, DistributionMode::Scatter);
        let second = &locals[1];
        assert_eq!(second.partition.rows(), 4..8);
        assert_eq!(second.band.dim(), (4, 5));
        for (local, row) in second.partition.rows().enumerate() {
            assert_eq!(
                second.band.slice(s![local, ..3]),
                problem.system.band().row(row)
            );
            assert!(second.band.slice(s![local, 3..]).iter().all(|&v| v == 0.0));
            assert_eq!(second.rhs[local], problem.system.rhs()[row]);
        }
    }

    #[test]
    fn test_row_mut_rejects_foreign_rows() {
        let mut locals = distribute_all(3, DistributionMode::Broadcast);
        let second = &mut locals[1];
        let (values, rhs) = second.row_mut(4).unwrap();
        assert_eq!(values.len(), 5);
        assert!(rhs.is_finite());
        assert!(matches!(second.row_mut(3), Err(SolverError::Shape(_))));
        assert!(matches!(second.row_mut(8), Err(SolverError::Shape(_))));
    }

    #[test]
    fn test_ranks_without_rows() {
        let locals = distribute_all(13, DistributionMode::Scatter);
        assert_eq!(locals[12].partition.local_rows, 0);
        assert_eq!(locals[12].band.dim(), (0, 5));
    }

    #[test]
    fn test_missing_system_fails_on_every_rank() {
        let results = LocalUniverse::run(3, |group| {
            distribute(&group, None, DistributionMode::Broadcast).map(|_| ())
        })
        .unwrap();
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(SolverError::MissingSystem))));
    }
}
