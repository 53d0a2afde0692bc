//! Integration tests for the direct and iterative sparse solvers
//!
//! Every solver runs on both dense and CSC storage through the same
//! `LinearOperator` seam and is checked against a dense LU solve.

use numr_engine::dense::{DenseMatrix, lusolve, matvec};
use numr_engine::solvers::{
    ConvergenceReason, IterativeOptions, SymbolicAnalysis, bicgstab, conjugate_gradient,
    gauss_seidel, gmres, jacobi, sor, sparse_cholesky, sparse_lu, sparse_lusolve,
};
use numr_engine::sparse::{AmdMode, CscMatrix};

mod common;
use common::{assert_allclose, poisson_1d, random_buffer, random_sparse, random_sparse_spd, rng};

/// Nonsymmetric, strictly diagonally dominant sparse matrix
fn sparse_dominant(seed: u64, n: usize) -> CscMatrix {
    let mut rng = rng(seed);
    let off = random_sparse(&mut rng, n, n, 0.15);
    let dense = off.to_dense();
    let mut triplets = Vec::new();
    for j in 0..n {
        for i in 0..n {
            let v = dense.get(i, j);
            if i != j && v != 0.0 {
                triplets.push((i, j, v));
            }
        }
    }
    for i in 0..n {
        let row_sum: f64 = dense.row(i).iter().map(|v| v.abs()).sum();
        triplets.push((i, i, row_sum + 1.0));
    }
    CscMatrix::from_triplets(n, n, &triplets).unwrap()
}

fn dense_reference(a: &CscMatrix, b: &[f64]) -> Vec<f64> {
    lusolve(&a.to_dense(), b, 1).unwrap().unwrap()
}

// ============================================================================
// Krylov
// ============================================================================

#[test]
fn test_cg_poisson_converges_within_default_cap() {
    let n = 60;
    let dense = poisson_1d(n);
    let sparse = CscMatrix::from_dense(&dense);
    let b: Vec<f64> = (0..n).map(|i| (i as f64 * 0.3).sin()).collect();

    let on_sparse = conjugate_gradient(&sparse, &b, None, IterativeOptions::default()).unwrap();
    assert!(on_sparse.converged);
    assert_eq!(on_sparse.reason, ConvergenceReason::Tolerance);
    assert!(on_sparse.iterations <= n);

    let on_dense = conjugate_gradient(&dense, &b, None, IterativeOptions::default()).unwrap();
    assert_allclose(&on_sparse.x, &on_dense.x, 1e-9, 1e-12, "dense vs sparse CG");
    assert_allclose(&matvec(dense.data(), &on_sparse.x, n, n), &b, 0.0, 1e-9, "A·x = b");
}

#[test]
fn test_cg_iteration_cap_reports_state() {
    let n = 100;
    let a = CscMatrix::from_dense(&poisson_1d(n));
    let b = vec![1.0; n];
    let opts = IterativeOptions::default()
        .with_max_iterations(3)
        .with_tolerance(1e-14);
    let state = conjugate_gradient(&a, &b, None, opts).unwrap();
    assert!(!state.converged);
    assert_eq!(state.reason, ConvergenceReason::MaxIterationsReached);
    assert_eq!(state.iterations, 3);
    assert_eq!(state.x.len(), n);
}

#[test]
fn test_cg_on_indefinite_matrix_is_not_an_error() {
    let a = DenseMatrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 1.0]]).unwrap();
    let state = conjugate_gradient(&a, &[1.0, -1.0], None, IterativeOptions::default()).unwrap();
    assert_eq!(state.x.len(), 2);
}

#[test]
fn test_gmres_and_bicgstab_nonsymmetric() {
    let n = 40;
    let a = sparse_dominant(71, n);
    let mut rng = rng(72);
    let b = random_buffer(&mut rng, n, 1);
    let expected = dense_reference(&a, &b);
    let opts = IterativeOptions::default().with_tolerance(1e-12);

    let g = gmres(&a, &b, None, 15, opts).unwrap();
    assert!(g.converged, "gmres: {}", g.reason);
    assert_allclose(&g.x, &expected, 1e-8, 1e-10, "gmres");

    let s = bicgstab(&a, &b, None, opts).unwrap();
    assert!(s.converged, "bicgstab: {}", s.reason);
    assert_allclose(&s.x, &expected, 1e-8, 1e-10, "bicgstab");

    assert!(gmres(&a, &b, None, 0, opts).is_err());
}

#[test]
fn test_initial_guess_at_solution_finishes_immediately() {
    let n = 20;
    let a = sparse_dominant(73, n);
    let x_true: Vec<f64> = (0..n).map(|i| i as f64 - 10.0).collect();
    let b = matvec(a.to_dense().data(), &x_true, n, n);
    let state = bicgstab(&a, &b, Some(&x_true), IterativeOptions::default().with_tolerance(1e-8))
        .unwrap();
    assert!(state.converged);
    assert_eq!(state.iterations, 0);
}

// ============================================================================
// Stationary
// ============================================================================

#[test]
fn test_stationary_methods_agree() {
    let n = 25;
    let a = sparse_dominant(79, n);
    let mut rng = rng(80);
    let b = random_buffer(&mut rng, n, 1);
    let expected = dense_reference(&a, &b);
    let opts = IterativeOptions::default().with_tolerance(1e-11);

    let j = jacobi(&a, &b, None, opts).unwrap();
    let gs = gauss_seidel(&a, &b, None, opts).unwrap();
    let s = sor(&a, &b, None, 1.1, opts).unwrap();
    for (name, state) in [("jacobi", &j), ("gauss-seidel", &gs), ("sor", &s)] {
        assert!(state.converged, "{name}: {}", state.reason);
        assert_allclose(&state.x, &expected, 1e-8, 1e-10, name);
    }
    assert!(sor(&a, &b, None, 2.0, opts).is_err());
}

// ============================================================================
// Sparse direct
// ============================================================================

#[test]
fn test_sparse_lusolve_every_ordering() {
    let n = 30;
    let a = sparse_dominant(83, n);
    let mut rng = rng(84);
    let b = random_buffer(&mut rng, n, 1);
    let expected = dense_reference(&a, &b);
    for mode in [AmdMode::Natural, AmdMode::Lu, AmdMode::Qr] {
        for threshold in [1.0, 0.1] {
            let x = sparse_lusolve(&a, &b, mode, threshold).unwrap().unwrap();
            assert_allclose(&x, &expected, 1e-10, 1e-12, &format!("{mode:?}/{threshold}"));
        }
    }
}

#[test]
fn test_sparse_lu_factor_reused_for_several_rhs() {
    let n = 18;
    let a = sparse_dominant(89, n);
    let symbolic = SymbolicAnalysis::analyze(&a, AmdMode::Lu).unwrap();
    let lu = sparse_lu(&a, &symbolic, 1.0).unwrap();
    assert!(!lu.singular);
    let mut rng = rng(90);
    for _ in 0..3 {
        let b = random_buffer(&mut rng, n, 1);
        let x = lu.solve(&b).unwrap().unwrap();
        assert_allclose(&x, &dense_reference(&a, &b), 1e-10, 1e-12, "reused LU");
    }
}

#[test]
fn test_sparse_singular_is_none() {
    // Column 1 is empty
    let a = CscMatrix::from_triplets(3, 3, &[(0, 0, 1.0), (2, 2, 1.0), (1, 0, 1.0)]).unwrap();
    assert_eq!(sparse_lusolve(&a, &[1.0, 1.0, 1.0], AmdMode::Lu, 1.0).unwrap(), None);
}

#[test]
fn test_sparse_cholesky_matches_dense() {
    let n = 35;
    let mut rng = rng(97);
    let a = random_sparse_spd(&mut rng, n, 0.1);
    let b = random_buffer(&mut rng, n, 1);
    let symbolic = SymbolicAnalysis::analyze(&a, AmdMode::Cholesky).unwrap();
    let chol = sparse_cholesky(&a, &symbolic).unwrap();
    assert!(chol.positive_definite);
    assert_eq!(chol.l.nnz(), symbolic.lnz);
    let x = chol.solve(&b).unwrap().unwrap();
    assert_allclose(&x, &dense_reference(&a, &b), 1e-10, 1e-12, "sparse Cholesky");

    let cg = conjugate_gradient(&a, &b, None, IterativeOptions::default()).unwrap();
    assert!(cg.converged);
    assert_allclose(&cg.x, &x, 1e-8, 1e-9, "CG vs Cholesky");
}
