//! Integration tests for dense decompositions and direct solvers
//!
//! Tests verify:
//! - LU: P·A = L·U on random invertible input, singular flag on rank loss
//! - QR: Q orthogonal, A = Q·R
//! - Cholesky: A = L·Lᵀ for SPD input, flag for indefinite input
//! - det / inverse / lusolve / qr_solve against each other
//! - SVD and symmetric eigen reconstruction
//! - Triangular, tridiagonal and banded solvers

use numr_engine::dense::{
    DenseMatrix, cholesky_decompose, det, eigenvalues, inverse, lu_decompose, lusolve, matvec,
    qr_decompose, qr_solve, svd, symmetric_eigen,
};
use numr_engine::solvers::{
    backward_substitution, forward_substitution, solve_banded, solve_tridiagonal,
    to_band_storage,
};

mod common;
use common::{assert_allclose, random_buffer, random_dominant, random_matrix, random_spd, rng};

fn mul(a: &DenseMatrix, b: &DenseMatrix) -> DenseMatrix {
    a.matmul(b).unwrap()
}

// ============================================================================
// LU
// ============================================================================

#[test]
fn test_lu_reconstructs_random_invertible() {
    let mut rng = rng(101);
    for n in [1, 2, 5, 12, 30] {
        let a = random_dominant(&mut rng, n);
        let lu = lu_decompose(&a);
        assert!(!lu.singular, "n = {n}");
        let pa = lu.permute_rows(a.data(), n);
        let prod = mul(&lu.l, &lu.u);
        assert_allclose(prod.data(), &pa, 1e-12, 1e-12, "P·A = L·U");
    }
}

#[test]
fn test_lu_with_pivoting_needed() {
    let a = DenseMatrix::from_rows(&[
        vec![0.0, 2.0, 1.0],
        vec![1.0, 1.0, 0.0],
        vec![3.0, 0.0, 1.0],
    ])
    .unwrap();
    let lu = lu_decompose(&a);
    assert!(!lu.singular);
    assert_eq!(lu.permutation[0], 2);
    let pa = lu.permute_rows(a.data(), 3);
    assert_allclose(mul(&lu.l, &lu.u).data(), &pa, 1e-14, 1e-14, "pivoted LU");
}

#[test]
fn test_lu_zero_row_is_singular() {
    let a = DenseMatrix::from_rows(&[
        vec![1.0, 2.0, 3.0],
        vec![0.0, 0.0, 0.0],
        vec![4.0, 5.0, 6.0],
    ])
    .unwrap();
    let lu = lu_decompose(&a);
    assert!(lu.singular);
    assert_eq!(det(&a).unwrap(), 0.0);
    assert_eq!(inverse(&a).unwrap(), None);
    assert_eq!(lusolve(&a, &[1.0, 2.0, 3.0], 1).unwrap(), None);
}

// ============================================================================
// QR and Cholesky
// ============================================================================

#[test]
fn test_qr_orthogonal_and_reconstructs() {
    let mut rng = rng(202);
    for (m, n) in [(4, 4), (7, 3), (3, 5)] {
        let a = random_matrix(&mut rng, m, n);
        let qr = qr_decompose(&a);
        assert_eq!(qr.q.shape(), (m, m));
        assert_eq!(qr.r.shape(), (m, n));
        let qtq = mul(&qr.q.transpose(), &qr.q);
        assert_allclose(qtq.data(), DenseMatrix::identity(m).data(), 0.0, 1e-12, "QᵀQ = I");
        assert_allclose(mul(&qr.q, &qr.r).data(), a.data(), 0.0, 1e-12, "A = Q·R");
        for i in 0..m {
            for j in 0..i.min(n) {
                assert!(qr.r.get(i, j).abs() < 1e-12, "R not upper at ({i}, {j})");
            }
        }
    }
}

#[test]
fn test_cholesky_reconstructs_spd() {
    let mut rng = rng(303);
    let a = random_spd(&mut rng, 8);
    let chol = cholesky_decompose(&a).unwrap();
    assert!(chol.positive_definite);
    let llt = mul(&chol.l, &chol.l.transpose());
    assert_allclose(llt.data(), a.data(), 1e-12, 1e-12, "A = L·Lᵀ");
}

#[test]
fn test_cholesky_indefinite_flag() {
    let a = DenseMatrix::from_rows(&[vec![1.0, 3.0], vec![3.0, 1.0]]).unwrap();
    let chol = cholesky_decompose(&a).unwrap();
    assert!(!chol.positive_definite);
    assert!(cholesky_decompose(&DenseMatrix::zeros(2, 3)).is_err());
}

// ============================================================================
// Solves
// ============================================================================

#[test]
fn test_lusolve_and_inverse_agree() {
    let mut rng = rng(404);
    let a = random_dominant(&mut rng, 6);
    let b = random_buffer(&mut rng, 6, 1);
    let x = lusolve(&a, &b, 1).unwrap().unwrap();
    assert_allclose(&matvec(a.data(), &x, 6, 6), &b, 1e-10, 1e-12, "A·x = b");

    let inv = inverse(&a).unwrap().unwrap();
    let x2 = matvec(inv.data(), &b, 6, 6);
    assert_allclose(&x2, &x, 1e-10, 1e-12, "inv(A)·b");

    let x3 = qr_solve(&a, &b).unwrap().unwrap();
    assert_allclose(&x3, &x, 1e-10, 1e-12, "qr_solve");
}

#[test]
fn test_det_known_values() {
    let a = DenseMatrix::from_rows(&[vec![2.0, 0.0, 1.0], vec![1.0, 3.0, 2.0], vec![1.0, 1.0, 2.0]])
        .unwrap();
    assert!((det(&a).unwrap() - 6.0).abs() < 1e-12);
    // One row swap flips the sign
    let swapped = DenseMatrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
    assert!((det(&swapped).unwrap() + 1.0).abs() < 1e-15);
    assert_eq!(det(&DenseMatrix::zeros(0, 0)).unwrap(), 1.0);
}

#[test]
fn test_least_squares_overdetermined() {
    // Fit y = 1 + 2t through exact points
    let a = DenseMatrix::from_rows(&[
        vec![1.0, 0.0],
        vec![1.0, 1.0],
        vec![1.0, 2.0],
        vec![1.0, 3.0],
    ])
    .unwrap();
    let y = [1.0, 3.0, 5.0, 7.0];
    let coef = qr_solve(&a, &y).unwrap().unwrap();
    assert_allclose(&coef, &[1.0, 2.0], 0.0, 1e-12, "least squares");
}

#[test]
fn test_triangular_substitution() {
    let l = DenseMatrix::from_rows(&[vec![2.0, 0.0], vec![1.0, 4.0]]).unwrap();
    assert_eq!(forward_substitution(&l, &[2.0, 9.0]).unwrap(), Some(vec![1.0, 2.0]));
    let u = DenseMatrix::from_rows(&[vec![1.0, 1.0], vec![0.0, 0.0]]).unwrap();
    assert_eq!(backward_substitution(&u, &[1.0, 1.0]).unwrap(), None);
}

#[test]
fn test_tridiagonal_matches_dense() {
    let n = 6;
    let lower = vec![-1.0; n - 1];
    let diag = vec![4.0; n];
    let upper = vec![-1.0; n - 1];
    let b: Vec<f64> = (0..n).map(|i| i as f64 + 1.0).collect();
    let x = solve_tridiagonal(&lower, &diag, &upper, &b).unwrap().unwrap();
    let dense = common::poisson_1d(n);
    assert_allclose(&matvec(dense.data(), &x, n, n), &b, 0.0, 1e-12, "Thomas");
}

#[test]
fn test_banded_matches_dense() {
    let mut rng = rng(505);
    let n = 9;
    let (kl, ku) = (2, 1);
    let mut a = random_dominant(&mut rng, n);
    for i in 0..n {
        for j in 0..n {
            if i > j + kl || j > i + ku {
                a.set(i, j, 0.0);
            }
        }
    }
    let ab = to_band_storage(a.data(), n, kl, ku).unwrap();
    let b = random_buffer(&mut rng, n, 2);
    let x = solve_banded(&ab, kl, ku, n, &b, 2).unwrap().unwrap();
    let expected = lusolve(&a, &b, 2).unwrap().unwrap();
    assert_allclose(&x, &expected, 1e-10, 1e-12, "banded");
}

// ============================================================================
// Spectral
// ============================================================================

#[test]
fn test_svd_reconstructs() {
    let mut rng = rng(606);
    for (m, n) in [(5, 3), (3, 5), (4, 4)] {
        let a = random_matrix(&mut rng, m, n);
        let d = svd(&a).unwrap();
        let k = m.min(n);
        assert_eq!(d.s.len(), k);
        assert!(d.s.windows(2).all(|w| w[0] >= w[1]));
        let mut us = d.u.clone();
        for i in 0..m {
            for j in 0..k {
                us.set(i, j, us.get(i, j) * d.s[j]);
            }
        }
        assert_allclose(mul(&us, &d.vt).data(), a.data(), 0.0, 1e-10, "U·S·Vᵀ");
    }
}

#[test]
fn test_symmetric_eigen_and_general_agree() {
    let mut rng = rng(707);
    let a = random_spd(&mut rng, 5);
    let sym = symmetric_eigen(&a).unwrap();
    let mut general: Vec<f64> = eigenvalues(&a).unwrap().iter().map(|z| z.re).collect();
    general.sort_by(|x, y| y.total_cmp(x));
    assert_allclose(&general, &sym.values, 1e-9, 1e-9, "eigenvalues");

    // A·v = λ·v for the first pair
    let v: Vec<f64> = (0..5).map(|i| sym.vectors.get(i, 0)).collect();
    let av = matvec(a.data(), &v, 5, 5);
    let lv: Vec<f64> = v.iter().map(|x| x * sym.values[0]).collect();
    assert_allclose(&av, &lv, 1e-9, 1e-9, "eigenpair");
}
