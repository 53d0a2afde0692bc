//! Singular value decomposition by one-sided Jacobi
//!
//! Columns of a working copy are rotated pairwise until they are mutually
//! orthogonal; their norms are then the singular values. Wide matrices are
//! transposed first so the working copy always has `rows >= cols`.

use super::jacobi::{
    JacobiRotation, apply_rotation_to_columns, argsort_desc, gram_elements, permute_columns,
};
use super::{DenseMatrix, identity, norm_frobenius, transpose};
use crate::error::{Error, Result};

const MAX_SWEEPS: usize = 60;

/// Thin SVD: `A = U · diag(s) · Vᵀ`
#[derive(Debug, Clone, PartialEq)]
pub struct SvdDecomposition {
    /// Left singular vectors, `m x k`
    pub u: DenseMatrix,
    /// Singular values in descending order, length `k = min(m, n)`
    pub s: Vec<f64>,
    /// Right singular vectors transposed, `k x n`
    pub vt: DenseMatrix,
}

/// One-sided Jacobi SVD
///
/// Returns [`Error::NotConverged`] when the columns are still not orthogonal
/// after the sweep limit, which is what non-finite input leads to.
pub fn svd(a: &DenseMatrix) -> Result<SvdDecomposition> {
    let (m, n) = a.shape();
    let k = m.min(n);
    let wide = m < n;

    let (work_m, work_n) = if wide { (n, m) } else { (m, n) };
    let mut b = if wide {
        transpose(a.data(), m, n)
    } else {
        a.data().to_vec()
    };
    let mut v = identity(work_n);

    let tol = work_n.max(1) as f64 * f64::EPSILON;
    // Squared norm below which a column is rounding noise
    let noise = {
        let level = work_m.max(work_n) as f64 * f64::EPSILON * norm_frobenius(&b);
        level * level
    };

    let mut converged = work_n < 2;
    for _sweep in 0..MAX_SWEEPS {
        let mut rotated = false;
        for p in 0..work_n {
            for q in (p + 1)..work_n {
                let (a_pp, a_qq, a_pq) = gram_elements(&b, work_m, work_n, p, q);
                if a_pq.abs() <= tol * (a_pp * a_qq).sqrt()
                    || a_pq == 0.0
                    || a_pp.min(a_qq) <= noise
                {
                    continue;
                }
                rotated = true;
                let rot = JacobiRotation::compute(a_pp, a_qq, a_pq);
                apply_rotation_to_columns(&mut b, work_m, work_n, p, q, rot);
                apply_rotation_to_columns(&mut v, work_n, work_n, p, q, rot);
            }
        }
        if !rotated {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(Error::NotConverged {
            op: "svd",
            iterations: MAX_SWEEPS,
        });
    }

    // Column norms are the singular values; normalized columns form U
    let mut sigma = vec![0.0; work_n];
    for (j, sj) in sigma.iter_mut().enumerate() {
        let norm = (0..work_m)
            .map(|i| b[i * work_n + j] * b[i * work_n + j])
            .sum::<f64>()
            .sqrt();
        *sj = norm;
        if norm > f64::MIN_POSITIVE {
            for i in 0..work_m {
                b[i * work_n + j] /= norm;
            }
        }
    }

    let order = argsort_desc(&sigma);
    let s: Vec<f64> = order.iter().take(k).map(|&i| sigma[i]).collect();
    let u_work = permute_columns(&b, work_m, work_n, &order, k);
    let v_work = permute_columns(&v, work_n, work_n, &order, k);

    // For wide inputs Aᵀ = U' S V'ᵀ, so A = V' S U'ᵀ
    let (u, vt) = if wide {
        (v_work, transpose(&u_work, work_m, k))
    } else {
        (u_work, transpose(&v_work, work_n, k))
    };

    Ok(SvdDecomposition {
        u: DenseMatrix {
            data: u,
            rows: m,
            cols: k,
        },
        s,
        vt: DenseMatrix {
            data: vt,
            rows: k,
            cols: n,
        },
    })
}
