//! Eigenvalues of general and symmetric matrices
//!
//! General matrices go through Householder reduction to upper Hessenberg form
//! followed by Francis double-shift QR iteration on the Hessenberg matrix.
//! Complex eigenvalues come out as conjugate pairs. The order of the returned
//! values follows deflation position and carries no further meaning.
//!
//! Symmetric matrices use the cyclic Jacobi method, which also yields an
//! orthonormal set of eigenvectors.

use super::jacobi::{JacobiRotation, apply_rotation_to_columns, apply_two_sided_rotation};
use super::{Complex64, DenseMatrix, identity, validate_square};
use crate::error::{Error, Result};

/// QR sweeps allowed per eigenvalue before giving up
const MAX_QR_ITERATIONS_PER_EIGENVALUE: usize = 60;

/// Jacobi sweeps over all (p, q) pairs
const MAX_JACOBI_SWEEPS: usize = 50;

/// Eigenvalues of a general real square matrix
///
/// Returns one `Complex64` per eigenvalue; [`super::complex::interleave`]
/// converts them to the flat `[re, im]` layout.
pub fn eigenvalues(a: &DenseMatrix) -> Result<Vec<Complex64>> {
    let n = validate_square(a)?;
    match n {
        0 => return Ok(Vec::new()),
        1 => return Ok(vec![Complex64::real(a.get(0, 0))]),
        _ => {}
    }

    let mut h = a.data().to_vec();
    hessenberg_reduction(&mut h, n);
    hessenberg_qr(&mut h, n)
}

/// Reduce `h` (`n x n`) to upper Hessenberg form in place using Householder
/// similarity transforms
pub fn hessenberg_reduction(h: &mut [f64], n: usize) {
    if n < 3 {
        return;
    }
    let mut v = vec![0.0; n];
    for k in 0..(n - 2) {
        let len = n - k - 1;
        let mut norm_sq = 0.0;
        for i in 0..len {
            let val = h[(k + 1 + i) * n + k];
            v[i] = val;
            norm_sq += val * val;
        }
        if norm_sq == 0.0 {
            continue;
        }

        let norm = norm_sq.sqrt();
        let alpha = if v[0] >= 0.0 { -norm } else { norm };
        v[0] -= alpha;

        let v_norm = v[..len].iter().map(|x| x * x).sum::<f64>().sqrt();
        if v_norm == 0.0 {
            continue;
        }
        for vi in &mut v[..len] {
            *vi /= v_norm;
        }

        // H[k+1:n, :] -= 2 v (vᵀ H[k+1:n, :])
        for j in 0..n {
            let mut dot = 0.0;
            for i in 0..len {
                dot += v[i] * h[(k + 1 + i) * n + j];
            }
            for i in 0..len {
                h[(k + 1 + i) * n + j] -= 2.0 * v[i] * dot;
            }
        }

        // H[:, k+1:n] -= 2 (H[:, k+1:n] v) vᵀ
        for i in 0..n {
            let mut dot = 0.0;
            for j in 0..len {
                dot += h[i * n + (k + 1 + j)] * v[j];
            }
            for j in 0..len {
                h[i * n + (k + 1 + j)] -= 2.0 * dot * v[j];
            }
        }

        // Entries below the subdiagonal are zero in exact arithmetic
        for i in (k + 2)..n {
            h[i * n + k] = 0.0;
        }
    }
}

#[inline]
fn sign(a: f64, b: f64) -> f64 {
    if b >= 0.0 { a.abs() } else { -a.abs() }
}

/// Francis double-shift QR iteration on an upper Hessenberg matrix
///
/// Destroys `h`. Exceptional shifts are applied every tenth iteration on a
/// block that refuses to deflate.
fn hessenberg_qr(h: &mut [f64], n: usize) -> Result<Vec<Complex64>> {
    let idx = |i: isize, j: isize| i as usize * n + j as usize;
    let eps = f64::EPSILON;

    let mut anorm = 0.0;
    for i in 0..n {
        for j in i.saturating_sub(1)..n {
            anorm += h[i * n + j].abs();
        }
    }

    let mut wr = vec![Complex64::ZERO; n];
    let mut nn = n as isize - 1;
    let mut t = 0.0;
    let mut total_iterations = 0usize;

    while nn >= 0 {
        let mut its = 0usize;
        loop {
            // Look for a single small subdiagonal element
            let mut l = nn;
            while l > 0 {
                let mut s = h[idx(l - 1, l - 1)].abs() + h[idx(l, l)].abs();
                if s == 0.0 {
                    s = anorm;
                }
                if h[idx(l, l - 1)].abs() <= eps * s {
                    h[idx(l, l - 1)] = 0.0;
                    break;
                }
                l -= 1;
            }

            let mut x = h[idx(nn, nn)];
            if l == nn {
                // One root found
                wr[nn as usize] = Complex64::real(x + t);
                nn -= 1;
                break;
            }

            let mut y = h[idx(nn - 1, nn - 1)];
            let mut w = h[idx(nn, nn - 1)] * h[idx(nn - 1, nn)];
            if l == nn - 1 {
                // Two roots found
                let p = 0.5 * (y - x);
                let q = p * p + w;
                let z = q.abs().sqrt();
                x += t;
                if q >= 0.0 {
                    let z = p + sign(z, p);
                    let hi = if z != 0.0 { x - w / z } else { x + z };
                    wr[(nn - 1) as usize] = Complex64::real(x + z);
                    wr[nn as usize] = Complex64::real(hi);
                } else {
                    wr[(nn - 1) as usize] = Complex64::new(x + p, z);
                    wr[nn as usize] = Complex64::new(x + p, -z);
                }
                nn -= 2;
                break;
            }

            if its == MAX_QR_ITERATIONS_PER_EIGENVALUE {
                return Err(Error::NotConverged {
                    op: "eigenvalues",
                    iterations: total_iterations,
                });
            }
            if its > 0 && its % 10 == 0 {
                // Exceptional shift
                t += x;
                for i in 0..=nn {
                    h[idx(i, i)] -= x;
                }
                let s = h[idx(nn, nn - 1)].abs() + h[idx(nn - 1, nn - 2)].abs();
                x = 0.75 * s;
                y = x;
                w = -0.4375 * s * s;
            }
            its += 1;
            total_iterations += 1;

            // Form shift and look for two consecutive small subdiagonal elements
            let mut p;
            let mut q;
            let mut r;
            let mut m = nn - 2;
            loop {
                let z = h[idx(m, m)];
                let rr = x - z;
                let ss = y - z;
                p = (rr * ss - w) / h[idx(m + 1, m)] + h[idx(m, m + 1)];
                q = h[idx(m + 1, m + 1)] - z - rr - ss;
                r = h[idx(m + 2, m + 1)];
                let s = p.abs() + q.abs() + r.abs();
                p /= s;
                q /= s;
                r /= s;
                if m == l {
                    break;
                }
                let u = h[idx(m, m - 1)].abs() * (q.abs() + r.abs());
                let v = p.abs() * (h[idx(m - 1, m - 1)].abs() + z.abs() + h[idx(m + 1, m + 1)].abs());
                if u <= eps * v {
                    break;
                }
                m -= 1;
            }

            for i in m..(nn - 1) {
                h[idx(i + 2, i)] = 0.0;
                if i != m {
                    h[idx(i + 2, i - 1)] = 0.0;
                }
            }

            // Double QR step on rows l..=nn and columns m..=nn
            let mut k = m;
            while k < nn {
                if k != m {
                    p = h[idx(k, k - 1)];
                    q = h[idx(k + 1, k - 1)];
                    r = if k + 1 != nn { h[idx(k + 2, k - 1)] } else { 0.0 };
                    x = p.abs() + q.abs() + r.abs();
                    if x != 0.0 {
                        p /= x;
                        q /= x;
                        r /= x;
                    }
                }
                let s = sign((p * p + q * q + r * r).sqrt(), p);
                if s != 0.0 {
                    if k == m {
                        if l != m {
                            h[idx(k, k - 1)] = -h[idx(k, k - 1)];
                        }
                    } else {
                        h[idx(k, k - 1)] = -s * x;
                    }
                    p += s;
                    x = p / s;
                    y = q / s;
                    let z = r / s;
                    q /= p;
                    r /= p;

                    for j in k..=nn {
                        let mut pp = h[idx(k, j)] + q * h[idx(k + 1, j)];
                        if k + 1 != nn {
                            pp += r * h[idx(k + 2, j)];
                            h[idx(k + 2, j)] -= pp * z;
                        }
                        h[idx(k + 1, j)] -= pp * y;
                        h[idx(k, j)] -= pp * x;
                    }

                    let mmin = if nn < k + 3 { nn } else { k + 3 };
                    for i in l..=mmin {
                        let mut pp = x * h[idx(i, k)] + y * h[idx(i, k + 1)];
                        if k + 1 != nn {
                            pp += z * h[idx(i, k + 2)];
                            h[idx(i, k + 2)] -= pp * r;
                        }
                        h[idx(i, k + 1)] -= pp * q;
                        h[idx(i, k)] -= pp;
                    }
                }
                k += 1;
            }
        }
    }

    Ok(wr)
}

/// Eigenvalues and eigenvectors of a symmetric matrix
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricEigen {
    /// Eigenvalues in descending order
    pub values: Vec<f64>,
    /// Eigenvectors as columns, in the order of `values`
    pub vectors: DenseMatrix,
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations
///
/// Only the upper triangle's symmetry is assumed, not checked. Converges when
/// the off-diagonal Frobenius norm falls below `n * ε * ‖A‖_F`.
pub fn symmetric_eigen(a: &DenseMatrix) -> Result<SymmetricEigen> {
    let n = validate_square(a)?;
    let mut work = a.data().to_vec();
    let mut v = identity(n);

    let scale = super::norm_frobenius(&work).max(f64::MIN_POSITIVE);
    let tol = n as f64 * f64::EPSILON * scale;

    let mut converged = n < 2;
    for _sweep in 0..MAX_JACOBI_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += work[p * n + q] * work[p * n + q];
            }
        }
        if off.sqrt() < tol {
            converged = true;
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let a_pq = work[p * n + q];
                if a_pq.abs() < tol / n as f64 {
                    continue;
                }
                let rot = JacobiRotation::compute(work[p * n + p], work[q * n + q], a_pq);
                apply_two_sided_rotation(&mut work, n, p, q, rot);
                apply_rotation_to_columns(&mut v, n, n, p, q, rot);
            }
        }
    }

    if !converged {
        return Err(Error::NotConverged {
            op: "symmetric_eigen",
            iterations: MAX_JACOBI_SWEEPS,
        });
    }

    let diag: Vec<f64> = (0..n).map(|i| work[i * n + i]).collect();
    let order = super::jacobi::argsort_desc(&diag);
    let values = order.iter().map(|&i| diag[i]).collect();
    let vectors = super::jacobi::permute_columns(&v, n, n, &order, n);

    Ok(SymmetricEigen {
        values,
        vectors: DenseMatrix {
            data: vectors,
            rows: n,
            cols: n,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_real(values: &[Complex64]) -> Vec<f64> {
        let mut re: Vec<f64> = values.iter().map(|z| z.re).collect();
        re.sort_by(f64::total_cmp);
        re
    }

    #[test]
    fn test_eigenvalues_triangular() {
        let a = DenseMatrix::from_rows(&[
            vec![1.0, 5.0, 7.0],
            vec![0.0, 2.0, 3.0],
            vec![0.0, 0.0, 4.0],
        ])
        .unwrap();
        let ev = eigenvalues(&a).unwrap();
        let re = sorted_real(&ev);
        for (x, e) in re.iter().zip([1.0, 2.0, 4.0]) {
            assert!((x - e).abs() < 1e-10);
        }
        assert!(ev.iter().all(|z| z.im == 0.0));
    }

    #[test]
    fn test_eigenvalues_rotation_complex_pair() {
        let a = DenseMatrix::from_rows(&[vec![0.0, -1.0], vec![1.0, 0.0]]).unwrap();
        let ev = eigenvalues(&a).unwrap();
        let mut ims: Vec<f64> = ev.iter().map(|z| z.im).collect();
        ims.sort_by(f64::total_cmp);
        assert!((ims[0] + 1.0).abs() < 1e-12);
        assert!((ims[1] - 1.0).abs() < 1e-12);
        assert!(ev.iter().all(|z| z.re.abs() < 1e-12));
    }

    #[test]
    fn test_eigenvalues_trace_and_det() {
        let a = DenseMatrix::from_rows(&[
            vec![4.0, -2.0, 1.0, 0.5],
            vec![1.0, 3.0, 0.0, 2.0],
            vec![0.0, 1.0, -1.0, 1.0],
            vec![2.0, 0.0, 1.0, 5.0],
        ])
        .unwrap();
        let ev = eigenvalues(&a).unwrap();
        assert_eq!(ev.len(), 4);
        let sum = ev.iter().fold(Complex64::ZERO, |acc, &z| acc + z);
        let prod = ev.iter().fold(Complex64::ONE, |acc, &z| acc * z);
        assert!((sum.re - 11.0).abs() < 1e-9);
        assert!(sum.im.abs() < 1e-9);
        let d = super::super::det(&a).unwrap();
        assert!((prod.re - d).abs() < 1e-8 * d.abs().max(1.0));
    }

    #[test]
    fn test_symmetric_eigen() {
        let a = DenseMatrix::from_rows(&[vec![2.0, 1.0], vec![1.0, 2.0]]).unwrap();
        let eig = symmetric_eigen(&a).unwrap();
        assert!((eig.values[0] - 3.0).abs() < 1e-12);
        assert!((eig.values[1] - 1.0).abs() < 1e-12);
        // A v = λ v for each column
        for (col, &lambda) in eig.values.iter().enumerate() {
            for i in 0..2 {
                let av: f64 = (0..2).map(|k| a.get(i, k) * eig.vectors.get(k, col)).sum();
                assert!((av - lambda * eig.vectors.get(i, col)).abs() < 1e-12);
            }
        }
    }
}
