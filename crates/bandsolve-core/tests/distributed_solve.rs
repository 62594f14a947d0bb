//! Distributed solver against the sequential reference and known solutions.

use approx::assert_abs_diff_eq;
use bandsolve_comm::{LocalUniverse, ProcessGroup};
use bandsolve_core::generate::{self, Problem};
use bandsolve_core::{
    BandSolver, BandedSystem, DistributedSolver, DistributionMode, SequentialSolver, SolverError,
};
use ndarray::array;

fn assert_close(values: &[f64], expected: &[f64], epsilon: f64) {
    assert_eq!(values.len(), expected.len());
    for (i, (x, e)) in values.iter().zip(expected).enumerate() {
        assert_abs_diff_eq!(*x, *e, epsilon = epsilon);
        assert!(x.is_finite(), "component {i} is not finite");
    }
}

#[test]
fn test_dominant_system_on_one_two_and_four_ranks() {
    let problem = generate::diagonally_dominant(64, 8).unwrap();
    for processes in [1, 2, 4] {
        let solution = DistributedSolver::new(processes)
            .solve(&problem.system)
            .unwrap();
        assert_close(&solution.values, &problem.expected, 1e-5);
        assert!(solution.is_regular());
    }
}

#[test]
fn test_results_are_invariant_under_process_count() {
    let problems: Vec<Problem> = vec![
        generate::diagonally_dominant(23, 4).unwrap(),
        generate::random_dominant(37, 6, 17).unwrap(),
        generate::pivoting(29, 5, 3).unwrap(),
        generate::weak_diagonal(12, 3).unwrap(),
    ];
    for problem in &problems {
        let reference = SequentialSolver.solve(&problem.system).unwrap();
        for processes in 1..=5 {
            let solution = DistributedSolver::new(processes)
                .solve(&problem.system)
                .unwrap();
            assert_eq!(solution, reference, "{processes} ranks");
        }
    }
}

#[test]
fn test_scatter_and_broadcast_agree() {
    let problem = generate::pivoting(30, 4, 8).unwrap();
    let broadcast = DistributedSolver::new(4).solve(&problem.system).unwrap();
    let scatter = DistributedSolver::new(4)
        .with_distribution(DistributionMode::Scatter)
        .solve(&problem.system)
        .unwrap();
    assert_eq!(broadcast, scatter);
}

#[test]
fn test_lower_triangular_scenario() {
    let dense = array![[1.0, 0.0, 0.0], [2.0, 3.0, 0.0], [0.0, 4.0, 5.0]];
    let x = [1.0, 5.0, 9.0];
    let probe = BandedSystem::from_dense(dense.view(), 3, vec![0.0; 3]).unwrap();
    let system = BandedSystem::from_dense(dense.view(), 3, probe.multiply(&x)).unwrap();
    for processes in [1, 2, 3] {
        let solution = DistributedSolver::new(processes).solve(&system).unwrap();
        assert_close(&solution.values, &x, 1e-9);
    }
}

#[test]
fn test_diagonal_scenario() {
    let system = BandedSystem::new(
        5,
        1,
        vec![2.0, 4.0, 6.0, 8.0, 10.0],
        vec![4.0, 16.0, 36.0, 64.0, 100.0],
    )
    .unwrap();
    let solution = DistributedSolver::new(2).solve(&system).unwrap();
    assert_close(&solution.values, &[2.0, 4.0, 6.0, 8.0, 10.0], 1e-12);
}

#[test]
fn test_pivoting_workload_has_small_residual() {
    let problem = generate::pivoting(200, 6, 21).unwrap();
    let solution = DistributedSolver::new(4).solve(&problem.system).unwrap();
    assert!(problem.system.residual_norm(&solution.values) < 1e-10);
    assert_close(&solution.values, &problem.expected, 1e-6);
}

#[test]
fn test_random_workload_matches_expected() {
    let problem = generate::random_dominant(500, 5, 1).unwrap();
    let solution = DistributedSolver::new(3).solve(&problem.system).unwrap();
    assert_close(&solution.values, &problem.expected, 1e-8);
}

#[test]
fn test_zero_column_gives_zero_component() {
    // Column 2 is zero: the system is singular there but the solve succeeds.
    let dense = array![
        [1.0, 0.0, 0.0, 0.0],
        [1.0, 2.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 4.0],
    ];
    let system = BandedSystem::from_dense(dense.view(), 2, vec![1.0, 3.0, 1.0, 8.0]).unwrap();
    for processes in [1, 2, 4] {
        let solution = DistributedSolver::new(processes).solve(&system).unwrap();
        assert_eq!(solution.singular_columns, vec![2]);
        assert_eq!(solution.values[2], 0.0);
        assert_close(&solution.values, &[1.0, 1.0, 0.0, 2.0], 1e-12);
    }
}

#[test]
fn test_pivot_tie_selects_lower_row() {
    // Column 0 holds 2 in rows 1 and 2 (owned by different ranks with 3
    // processes). Choosing row 1 moves [2, 1] to the top.
    let dense = array![[1.0, 0.0, 0.0], [2.0, 1.0, 0.0], [-2.0, 0.0, 1.0]];
    let system = BandedSystem::from_dense(dense.view(), 3, vec![1.0, 3.0, -1.0]).unwrap();
    let reference = SequentialSolver.solve(&system).unwrap();
    for processes in [1, 2, 3] {
        let solution = DistributedSolver::new(processes).solve(&system).unwrap();
        assert_eq!(solution, reference);
        assert_close(&solution.values, &[1.0, 1.0, 1.0], 1e-12);
    }
}

#[test]
fn test_more_ranks_than_rows() {
    let problem = generate::diagonally_dominant(3, 2).unwrap();
    let solution = DistributedSolver::new(6).solve(&problem.system).unwrap();
    assert_close(&solution.values, &problem.expected, 1e-12);
}

#[test]
fn test_missing_system_fails_cleanly_on_every_rank() {
    let solver = DistributedSolver::new(4);
    let results = LocalUniverse::run(4, |group| solver.solve_spmd(&group, None)).unwrap();
    assert_eq!(results.len(), 4);
    for result in results {
        assert!(matches!(result, Err(SolverError::MissingSystem)));
    }
}

#[test]
fn test_system_on_non_coordinator_is_ignored() {
    let problem = generate::diagonal(4).unwrap();
    let solver = DistributedSolver::new(2);
    let results = LocalUniverse::run(2, |group| {
        let system = (group.rank() == 1).then_some(&problem.system);
        solver.solve_spmd(&group, system)
    })
    .unwrap();
    for result in results {
        assert!(matches!(result, Err(SolverError::MissingSystem)));
    }
}

#[test]
fn test_band_width_larger_than_size_fails_validation() {
    let wire = [2.0, 3.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
    let err = BandedSystem::from_wire(&wire).unwrap_err();
    let err = SolverError::from(err);
    assert!(matches!(err, SolverError::Validation(_)));
}

#[test]
fn test_method_names() {
    assert!(SequentialSolver.method_name().contains("Sequential"));
    assert!(DistributedSolver::default().method_name().contains("Distributed"));
}
