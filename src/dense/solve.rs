//! Dense linear solves built on the decompositions
//!
//! Right-hand sides are `n x nrhs` row-major buffers. A singular system is
//! reported as `Ok(None)`; `Err` is reserved for shape mismatches.

use super::decompositions::{LuDecomposition, lu_decompose, qr_decompose};
use super::{DenseMatrix, PIVOT_EPSILON, identity, validate_buffer, validate_square};
use crate::error::Result;

/// Solve `L·X = B` in place for unit lower triangular `L` (`n x n`)
pub(crate) fn forward_substitute_unit_in_place(l: &[f64], b: &mut [f64], n: usize, nrhs: usize) {
    for i in 0..n {
        for k in 0..i {
            let lik = l[i * n + k];
            if lik == 0.0 {
                continue;
            }
            for c in 0..nrhs {
                b[i * nrhs + c] -= lik * b[k * nrhs + c];
            }
        }
    }
}

/// Solve `U·X = B` in place for upper triangular `U` stored with row stride
/// `stride`; returns `false` when a diagonal entry is at or below `tol`
pub(crate) fn back_substitute_in_place(
    u: &[f64],
    stride: usize,
    b: &mut [f64],
    n: usize,
    nrhs: usize,
    tol: f64,
) -> bool {
    for i in (0..n).rev() {
        let diag = u[i * stride + i];
        if diag.abs() <= tol {
            return false;
        }
        for k in (i + 1)..n {
            let uik = u[i * stride + k];
            if uik == 0.0 {
                continue;
            }
            for c in 0..nrhs {
                b[i * nrhs + c] -= uik * b[k * nrhs + c];
            }
        }
        for c in 0..nrhs {
            b[i * nrhs + c] /= diag;
        }
    }
    true
}

/// Threshold under which a diagonal of `U` (or `R`) counts as zero
fn zero_pivot_tolerance(diag_source: &[f64]) -> f64 {
    let scale = diag_source.iter().fold(0.0f64, |acc, x| acc.max(x.abs()));
    PIVOT_EPSILON * scale
}

/// Solve `A·X = B` from an existing LU decomposition
///
/// Returns `Ok(None)` when the decomposition is singular.
pub fn lu_solve(lu: &LuDecomposition, b: &[f64], nrhs: usize) -> Result<Option<Vec<f64>>> {
    let n = lu.u.rows();
    validate_buffer("b", b, n, nrhs)?;
    if lu.singular || lu.l.rows() != lu.u.cols() {
        return Ok(None);
    }

    let mut x = lu.permute_rows(b, nrhs);
    forward_substitute_unit_in_place(lu.l.data(), &mut x, n, nrhs);
    let tol = zero_pivot_tolerance(lu.u.data());
    if !back_substitute_in_place(lu.u.data(), n, &mut x, n, nrhs, tol) {
        return Ok(None);
    }
    Ok(Some(x))
}

/// Solve `A·X = B` for square `A`
///
/// `b` is `n x nrhs`. Returns `Ok(None)` for singular `A`.
pub fn lusolve(a: &DenseMatrix, b: &[f64], nrhs: usize) -> Result<Option<Vec<f64>>> {
    let n = validate_square(a)?;
    validate_buffer("b", b, n, nrhs)?;
    let lu = lu_decompose(a);
    lu_solve(&lu, b, nrhs)
}

/// Determinant via LU; exactly `0.0` when the factorization is singular
pub fn det(a: &DenseMatrix) -> Result<f64> {
    let n = validate_square(a)?;
    if n == 0 {
        return Ok(1.0);
    }
    let lu = lu_decompose(a);
    if lu.singular {
        return Ok(0.0);
    }
    let mut d = if lu.swap_parity() { -1.0 } else { 1.0 };
    for i in 0..n {
        d *= lu.u.get(i, i);
    }
    Ok(d)
}

/// Matrix inverse; `Ok(None)` for singular input
pub fn inverse(a: &DenseMatrix) -> Result<Option<DenseMatrix>> {
    let n = validate_square(a)?;
    let eye = identity(n);
    Ok(lusolve(a, &eye, n)?.map(|data| DenseMatrix {
        data,
        rows: n,
        cols: n,
    }))
}

/// Solve `A·x = b` through QR
///
/// For `m >= n` this is the least-squares solution minimizing `‖A·x - b‖₂`;
/// for `m < n` it is the minimum-norm solution. `Ok(None)` when `A` is rank
/// deficient.
pub fn qr_solve(a: &DenseMatrix, b: &[f64]) -> Result<Option<Vec<f64>>> {
    let (m, n) = a.shape();
    validate_buffer("b", b, m, 1)?;

    if m >= n {
        let qr = qr_decompose(a);
        let q = qr.q.data();
        // c = Qᵀ b, only the leading n entries are needed
        let mut c = vec![0.0; n];
        for (j, cj) in c.iter_mut().enumerate() {
            let mut sum = 0.0;
            for i in 0..m {
                sum += q[i * m + j] * b[i];
            }
            *cj = sum;
        }
        let tol = zero_pivot_tolerance(qr.r.data());
        if !back_substitute_in_place(qr.r.data(), n, &mut c, n, 1, tol) {
            return Ok(None);
        }
        Ok(Some(c))
    } else {
        // Aᵀ = Q·R, so A = Rᵀ·Qᵀ and x = Q₁·(Rᵀ)⁻¹·b
        let at = a.transpose();
        let qr = qr_decompose(&at);
        let r = qr.r.data();
        let tol = zero_pivot_tolerance(r);
        let mut y = b.to_vec();
        for i in 0..m {
            let mut sum = y[i];
            for k in 0..i {
                sum -= r[k * m + i] * y[k];
            }
            let diag = r[i * m + i];
            if diag.abs() <= tol {
                return Ok(None);
            }
            y[i] = sum / diag;
        }
        let q = qr.q.data();
        let mut x = vec![0.0; n];
        for (i, xi) in x.iter_mut().enumerate() {
            let mut sum = 0.0;
            for (k, yk) in y.iter().enumerate() {
                sum += q[i * n + k] * yk;
            }
            *xi = sum;
        }
        Ok(Some(x))
    }
}
