//! Jacobi rotations shared by the symmetric eigensolver and one-sided SVD
//!
//! The rotation parameters use the LAPACK formula, which avoids catastrophic
//! cancellation when the diagonal entries are close.

/// Jacobi rotation parameters (cosine and sine of the rotation angle)
///
/// ```text
/// J = [ c  s ]
///     [-s  c ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JacobiRotation {
    /// Cosine of rotation angle
    pub c: f64,
    /// Sine of rotation angle
    pub s: f64,
}

impl JacobiRotation {
    /// Rotation that zeroes the off-diagonal of the symmetric 2x2 block
    /// `[[a_pp, a_pq], [a_pq, a_qq]]`
    ///
    /// ```text
    /// τ = (a_qq - a_pp) / (2 * a_pq)
    /// t = sign(τ) / (|τ| + sqrt(1 + τ²))
    /// c = 1 / sqrt(1 + t²)
    /// s = t * c
    /// ```
    #[inline]
    pub fn compute(a_pp: f64, a_qq: f64, a_pq: f64) -> Self {
        let tau_den = 2.0 * a_pq;
        if tau_den.abs() < 1e-300 {
            return Self { c: 1.0, s: 0.0 };
        }

        let tau = (a_qq - a_pp) / tau_den;
        let t = if tau >= 0.0 {
            1.0 / (tau + (1.0 + tau * tau).sqrt())
        } else {
            -1.0 / (-tau + (1.0 + tau * tau).sqrt())
        };

        let c = 1.0 / (1.0 + t * t).sqrt();
        Self { c, s: t * c }
    }
}

/// `[col_p, col_q] = [col_p, col_q] @ J` for a `rows x cols` matrix
#[inline]
pub fn apply_rotation_to_columns(
    data: &mut [f64],
    rows: usize,
    cols: usize,
    p: usize,
    q: usize,
    rot: JacobiRotation,
) {
    let JacobiRotation { c, s } = rot;
    for i in 0..rows {
        let val_p = data[i * cols + p];
        let val_q = data[i * cols + q];
        data[i * cols + p] = c * val_p - s * val_q;
        data[i * cols + q] = s * val_p + c * val_q;
    }
}

/// `A = Jᵀ A J` on a symmetric `n x n` matrix, zeroing `A[p,q]` and `A[q,p]`
#[inline]
pub fn apply_two_sided_rotation(work: &mut [f64], n: usize, p: usize, q: usize, rot: JacobiRotation) {
    let JacobiRotation { c, s } = rot;
    let a_pp = work[p * n + p];
    let a_qq = work[q * n + q];
    let a_pq = work[p * n + q];

    for k in 0..n {
        if k == p || k == q {
            continue;
        }
        let a_kp = work[k * n + p];
        let a_kq = work[k * n + q];
        let new_kp = c * a_kp - s * a_kq;
        let new_kq = s * a_kp + c * a_kq;
        work[k * n + p] = new_kp;
        work[p * n + k] = new_kp;
        work[k * n + q] = new_kq;
        work[q * n + k] = new_kq;
    }

    let cs2 = 2.0 * c * s;
    work[p * n + p] = c * c * a_pp - cs2 * a_pq + s * s * a_qq;
    work[q * n + q] = s * s * a_pp + cs2 * a_pq + c * c * a_qq;
    work[p * n + q] = 0.0;
    work[q * n + p] = 0.0;
}

/// Gram entries `(‖b_p‖², ‖b_q‖², b_p·b_q)` of two columns
#[inline]
pub fn gram_elements(b: &[f64], rows: usize, cols: usize, p: usize, q: usize) -> (f64, f64, f64) {
    let mut a_pp = 0.0;
    let mut a_qq = 0.0;
    let mut a_pq = 0.0;
    for i in 0..rows {
        let bp = b[i * cols + p];
        let bq = b[i * cols + q];
        a_pp += bp * bp;
        a_qq += bq * bq;
        a_pq += bp * bq;
    }
    (a_pp, a_qq, a_pq)
}

/// Indices that sort `values` in descending order
pub fn argsort_desc(values: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_by(|&i, &j| values[j].total_cmp(&values[i]));
    indices
}

/// Reorder the first `new_cols` columns according to `indices`
pub fn permute_columns(
    data: &[f64],
    rows: usize,
    cols: usize,
    indices: &[usize],
    new_cols: usize,
) -> Vec<f64> {
    let mut result = vec![0.0; rows * new_cols];
    for (new_idx, &old_idx) in indices.iter().take(new_cols).enumerate() {
        for i in 0..rows {
            result[i * new_cols + new_idx] = data[i * cols + old_idx];
        }
    }
    result
}
