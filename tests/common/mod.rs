//! Common test utilities
#![allow(dead_code)]

use numr_engine::dense::{Complex64, DenseMatrix};
use numr_engine::sparse::CscMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic RNG for a test
pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Random `rows x cols` buffer with entries in [-1, 1)
pub fn random_buffer(rng: &mut StdRng, rows: usize, cols: usize) -> Vec<f64> {
    (0..rows * cols).map(|_| rng.random_range(-1.0..1.0)).collect()
}

/// Random dense matrix with entries in [-1, 1)
pub fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> DenseMatrix {
    DenseMatrix::new(random_buffer(rng, rows, cols), rows, cols).unwrap()
}

/// Random strictly diagonally dominant matrix (always invertible)
pub fn random_dominant(rng: &mut StdRng, n: usize) -> DenseMatrix {
    let mut a = random_matrix(rng, n, n);
    for i in 0..n {
        let row_sum: f64 = a.row(i).iter().map(|v| v.abs()).sum();
        a.set(i, i, row_sum + 1.0);
    }
    a
}

/// Random symmetric positive definite matrix `BᵀB + n·I`
pub fn random_spd(rng: &mut StdRng, n: usize) -> DenseMatrix {
    let b = random_matrix(rng, n, n);
    let mut a = b.transpose().matmul(&b).unwrap();
    for i in 0..n {
        a.set(i, i, a.get(i, i) + n as f64);
    }
    a
}

/// Random sparse matrix with about `density * rows * cols` entries
pub fn random_sparse(rng: &mut StdRng, rows: usize, cols: usize, density: f64) -> CscMatrix {
    let mut triplets = Vec::new();
    for j in 0..cols {
        for i in 0..rows {
            if rng.random_bool(density) {
                triplets.push((i, j, rng.random_range(-1.0..1.0)));
            }
        }
    }
    CscMatrix::from_triplets(rows, cols, &triplets).unwrap()
}

/// Sparse symmetric, strictly diagonally dominant matrix
pub fn random_sparse_spd(rng: &mut StdRng, n: usize, density: f64) -> CscMatrix {
    let mut triplets = Vec::new();
    let mut diag = vec![1.0; n];
    for j in 0..n {
        for i in (j + 1)..n {
            if rng.random_bool(density) {
                let v: f64 = rng.random_range(-1.0..1.0);
                triplets.push((i, j, v));
                triplets.push((j, i, v));
                diag[i] += v.abs();
                diag[j] += v.abs();
            }
        }
    }
    for (k, d) in diag.into_iter().enumerate() {
        triplets.push((k, k, d));
    }
    CscMatrix::from_triplets(n, n, &triplets).unwrap()
}

/// Tridiagonal `(-1, 4, -1)` matrix, SPD
pub fn poisson_1d(n: usize) -> DenseMatrix {
    let mut a = DenseMatrix::zeros(n, n);
    for i in 0..n {
        a.set(i, i, 4.0);
        if i + 1 < n {
            a.set(i, i + 1, -1.0);
            a.set(i + 1, i, -1.0);
        }
    }
    a
}

/// Check that `perm` is a bijection on `[0, n)`
pub fn assert_permutation(perm: &[usize], n: usize) {
    assert_eq!(perm.len(), n, "permutation length");
    let mut seen = vec![false; n];
    for &p in perm {
        assert!(p < n, "index {} out of range", p);
        assert!(!seen[p], "index {} repeated", p);
        seen[p] = true;
    }
}

/// Compare root sets without caring about order
pub fn assert_roots_match(mut got: Vec<Complex64>, mut expected: Vec<Complex64>, tol: f64) {
    assert_eq!(got.len(), expected.len(), "root count");
    let key = |z: &Complex64| (z.re, z.im);
    got.sort_by(|a, b| key(a).partial_cmp(&key(b)).unwrap());
    expected.sort_by(|a, b| key(a).partial_cmp(&key(b)).unwrap());
    for (g, e) in got.iter().zip(&expected) {
        assert!(
            (g.re - e.re).abs() < tol && (g.im - e.im).abs() < tol,
            "root {:?} vs expected {:?}",
            g,
            e
        );
    }
}
