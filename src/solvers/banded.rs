//! Banded linear system solvers (Thomas algorithm + general banded LU)
//!
//! # Band storage
//!
//! A matrix with `kl` sub-diagonals and `ku` super-diagonals is passed as a
//! row-major `(kl + ku + 1) x n` array `ab` with `ab[ku + i - j, j] = A[i, j]`.
//! Row `ku` holds the main diagonal.

use crate::error::{Error, Result};

/// Solve a tridiagonal system with the Thomas algorithm in O(n)
///
/// `lower` and `upper` have `n - 1` entries (`lower[i] = A[i + 1, i]`,
/// `upper[i] = A[i, i + 1]`). No pivoting is done: a zero on the eliminated
/// diagonal returns `Ok(None)`, even if the matrix is nonsingular.
pub fn solve_tridiagonal(
    lower: &[f64],
    diag: &[f64],
    upper: &[f64],
    b: &[f64],
) -> Result<Option<Vec<f64>>> {
    let n = diag.len();
    let off = n.saturating_sub(1);
    if lower.len() != off {
        return Err(Error::dimension_mismatch("lower", &[off], &[lower.len()]));
    }
    if upper.len() != off {
        return Err(Error::dimension_mismatch("upper", &[off], &[upper.len()]));
    }
    if b.len() != n {
        return Err(Error::dimension_mismatch("b", &[n], &[b.len()]));
    }
    if n == 0 {
        return Ok(Some(Vec::new()));
    }

    let mut c = vec![0.0; n]; // modified upper diagonal
    let mut d = vec![0.0; n]; // modified rhs

    // Forward elimination
    if diag[0] == 0.0 {
        return Ok(None);
    }
    if n > 1 {
        c[0] = upper[0] / diag[0];
    }
    d[0] = b[0] / diag[0];
    for i in 1..n {
        let denom = diag[i] - lower[i - 1] * c[i - 1];
        if denom == 0.0 {
            return Ok(None);
        }
        if i < n - 1 {
            c[i] = upper[i] / denom;
        }
        d[i] = (b[i] - lower[i - 1] * d[i - 1]) / denom;
    }

    // Back substitution
    let mut x = d;
    for i in (0..n - 1).rev() {
        x[i] -= c[i] * x[i + 1];
    }
    Ok(Some(x))
}

/// Row-oriented working copy of a band matrix with room for pivoting fill
///
/// Row `i` stores columns `i - kl ..= i + kl + ku`.
struct BandWork {
    data: Vec<f64>,
    kl: usize,
    width: usize,
}

impl BandWork {
    #[inline]
    fn idx(&self, i: usize, j: usize) -> usize {
        debug_assert!(j + self.kl >= i && j + self.kl - i < self.width);
        i * self.width + (j + self.kl - i)
    }

    #[inline]
    fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.idx(i, j)]
    }

    #[inline]
    fn set(&mut self, i: usize, j: usize, v: f64) {
        let k = self.idx(i, j);
        self.data[k] = v;
    }
}

/// Solve `A X = B` for a band matrix by LU with partial pivoting in O(n·bw²)
///
/// `b` is row-major `n x nrhs`. Returns `Ok(None)` when a pivot column is
/// entirely zero.
pub fn solve_banded(
    ab: &[f64],
    kl: usize,
    ku: usize,
    n: usize,
    b: &[f64],
    nrhs: usize,
) -> Result<Option<Vec<f64>>> {
    let band_rows = kl + ku + 1;
    if ab.len() != band_rows * n {
        return Err(Error::dimension_mismatch("ab", &[band_rows, n], &[ab.len()]));
    }
    if b.len() != n * nrhs {
        return Err(Error::dimension_mismatch("b", &[n, nrhs], &[b.len()]));
    }

    // Copy band data into working storage
    let width = 2 * kl + ku + 1;
    let mut work = BandWork {
        data: vec![0.0; n * width],
        kl,
        width,
    };
    for r in 0..band_rows {
        for j in 0..n {
            // ab[r, j] = A[i, j] with i = r + j - ku
            let Some(i) = (r + j).checked_sub(ku) else {
                continue;
            };
            if i < n {
                work.set(i, j, ab[r * n + j]);
            }
        }
    }
    let mut x = b.to_vec();

    for k in 0..n {
        // Find pivot in column k
        let max_row = (k + kl + 1).min(n);
        let mut pivot_row = k;
        let mut pivot_val = 0.0f64;
        for i in k..max_row {
            let val = work.get(i, k).abs();
            if val > pivot_val {
                pivot_val = val;
                pivot_row = i;
            }
        }
        if pivot_val == 0.0 {
            return Ok(None);
        }

        let col_end = (k + kl + ku + 1).min(n);
        if pivot_row != k {
            for j in k..col_end {
                let a = work.idx(k, j);
                let p = work.idx(pivot_row, j);
                work.data.swap(a, p);
            }
            for c in 0..nrhs {
                x.swap(k * nrhs + c, pivot_row * nrhs + c);
            }
        }

        // Eliminate below pivot
        let diag = work.get(k, k);
        for i in (k + 1)..max_row {
            let factor = work.get(i, k) / diag;
            if factor == 0.0 {
                continue;
            }
            for j in (k + 1)..col_end {
                let v = work.get(i, j) - factor * work.get(k, j);
                work.set(i, j, v);
            }
            for c in 0..nrhs {
                let xk = x[k * nrhs + c];
                x[i * nrhs + c] -= factor * xk;
            }
        }
    }

    // Back substitution; U has kl + ku super-diagonals after pivoting
    for k in (0..n).rev() {
        let col_end = (k + kl + ku + 1).min(n);
        let diag = work.get(k, k);
        for c in 0..nrhs {
            let mut sum = x[k * nrhs + c];
            for j in (k + 1)..col_end {
                sum -= work.get(k, j) * x[j * nrhs + c];
            }
            x[k * nrhs + c] = sum / diag;
        }
    }
    Ok(Some(x))
}

/// Pack a dense row-major `n x n` matrix into band storage
pub fn to_band_storage(a: &[f64], n: usize, kl: usize, ku: usize) -> Result<Vec<f64>> {
    if a.len() != n * n {
        return Err(Error::dimension_mismatch("a", &[n, n], &[a.len()]));
    }
    let band_rows = kl + ku + 1;
    let mut ab = vec![0.0; band_rows * n];
    for j in 0..n {
        let lo = j.saturating_sub(ku);
        let hi = (j + kl + 1).min(n);
        for i in lo..hi {
            ab[(ku + i - j) * n + j] = a[i * n + j];
        }
    }
    Ok(ab)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::{DenseMatrix, lusolve};

    fn assert_close(a: &[f64], b: &[f64], tol: f64) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < tol, "{x} vs {y}");
        }
    }

    #[test]
    fn test_thomas() {
        // [2 -1 0; -1 2 -1; 0 -1 2] x = [1 0 1] -> x = [1 1 1]
        let x = solve_tridiagonal(&[-1.0, -1.0], &[2.0, 2.0, 2.0], &[-1.0, -1.0], &[1.0, 0.0, 1.0])
            .unwrap()
            .unwrap();
        assert_close(&x, &[1.0, 1.0, 1.0], 1e-14);
    }

    #[test]
    fn test_thomas_zero_pivot_and_shapes() {
        assert!(solve_tridiagonal(&[1.0], &[0.0, 1.0], &[1.0], &[1.0, 1.0])
            .unwrap()
            .is_none());
        assert!(solve_tridiagonal(&[1.0, 2.0], &[1.0, 1.0], &[1.0], &[1.0, 1.0]).is_err());
        assert_eq!(solve_tridiagonal(&[], &[], &[], &[]).unwrap(), Some(vec![]));
    }

    #[test]
    fn test_banded_matches_dense_with_pivoting() {
        // Pentadiagonal-ish system with a small leading diagonal to force pivoting
        let n = 6;
        let (kl, ku) = (2, 1);
        let mut a = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                if j + kl >= i && j <= i + ku {
                    a[i * n + j] = if i == j { 1e-3 + i as f64 } else { 1.0 + (i + 2 * j) as f64 };
                }
            }
        }
        let b: Vec<f64> = (0..2 * n).map(|k| k as f64 - 3.0).collect();
        let ab = to_band_storage(&a, n, kl, ku).unwrap();
        let x = solve_banded(&ab, kl, ku, n, &b, 2).unwrap().unwrap();
        let expected = lusolve(&DenseMatrix::new(a, n, n).unwrap(), &b, 2)
            .unwrap()
            .unwrap();
        assert_close(&x, &expected, 1e-9);
    }

    #[test]
    fn test_banded_singular() {
        let ab = vec![0.0; 3 * 4];
        assert!(solve_banded(&ab, 1, 1, 4, &[1.0; 4], 1).unwrap().is_none());
    }

    #[test]
    fn test_banded_diagonal_only() {
        let ab = vec![2.0, 4.0, 8.0];
        let x = solve_banded(&ab, 0, 0, 3, &[2.0, 2.0, 2.0], 1).unwrap().unwrap();
        assert_eq!(x, vec![1.0, 0.5, 0.25]);
    }
}
