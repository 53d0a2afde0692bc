//! LU, QR and Cholesky decompositions
//!
//! Numerically expected failures are reported on the result record instead of
//! as errors: LU sets `singular`, Cholesky clears `positive_definite`. Only
//! shape problems produce `Err`.

use super::{DenseMatrix, PIVOT_EPSILON, validate_square};
use crate::error::Result;

/// LU decomposition with partial pivoting: `P·A = L·U`
///
/// `permutation[i]` is the row of `A` that ends up in row `i` of `P·A`.
#[derive(Debug, Clone, PartialEq)]
pub struct LuDecomposition {
    /// Unit lower triangular factor, `m x min(m, n)`
    pub l: DenseMatrix,
    /// Upper triangular factor, `min(m, n) x n`
    pub u: DenseMatrix,
    /// Row permutation
    pub permutation: Vec<usize>,
    /// A pivot was numerically zero; `L·U` still reproduces `P·A`
    pub singular: bool,
}

impl LuDecomposition {
    /// Number of row interchanges implied by `permutation` (parity of P)
    pub fn swap_parity(&self) -> bool {
        let n = self.permutation.len();
        let mut seen = vec![false; n];
        let mut odd = false;
        for start in 0..n {
            if seen[start] {
                continue;
            }
            let mut len = 0;
            let mut j = start;
            while !seen[j] {
                seen[j] = true;
                j = self.permutation[j];
                len += 1;
            }
            if len % 2 == 0 {
                odd = !odd;
            }
        }
        odd
    }

    /// Apply the row permutation to `b` (`P·b`)
    pub fn permute_rows(&self, b: &[f64], ncols: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(b.len());
        for &src in &self.permutation {
            out.extend_from_slice(&b[src * ncols..(src + 1) * ncols]);
        }
        out
    }
}

/// QR decomposition: `A = Q·R` with `Q` orthogonal `m x m`, `R` upper `m x n`
#[derive(Debug, Clone, PartialEq)]
pub struct QrDecomposition {
    /// Orthogonal factor
    pub q: DenseMatrix,
    /// Upper triangular (trapezoidal) factor
    pub r: DenseMatrix,
}

/// Cholesky decomposition: `A = L·Lᵀ`
#[derive(Debug, Clone, PartialEq)]
pub struct CholeskyDecomposition {
    /// Lower triangular factor (partial when `positive_definite` is false)
    pub l: DenseMatrix,
    /// The factorization completed with positive pivots
    pub positive_definite: bool,
}

/// LU decomposition with partial pivoting (Doolittle algorithm)
///
/// A pivot whose magnitude is below `PIVOT_EPSILON * max|A|` marks the
/// decomposition singular; elimination for that column is skipped so the
/// factors remain consistent.
pub fn lu_decompose(a: &DenseMatrix) -> LuDecomposition {
    let (m, n) = a.shape();
    let k = m.min(n);
    let mut lu = a.data().to_vec();
    let mut perm: Vec<usize> = (0..m).collect();
    let mut singular = m != n;

    let scale = lu.iter().fold(0.0f64, |acc, x| acc.max(x.abs()));
    let threshold = PIVOT_EPSILON * scale;

    for col in 0..k {
        // Find pivot: max absolute value in column col, rows col..m
        let mut pivot_row = col;
        let mut max_val = lu[col * n + col].abs();
        for row in (col + 1)..m {
            let val = lu[row * n + col].abs();
            if val > max_val {
                max_val = val;
                pivot_row = row;
            }
        }

        if pivot_row != col {
            for j in 0..n {
                lu.swap(col * n + j, pivot_row * n + j);
            }
            perm.swap(col, pivot_row);
        }

        if max_val <= threshold {
            singular = true;
            for row in (col + 1)..m {
                lu[row * n + col] = 0.0;
            }
            continue;
        }

        let pivot = lu[col * n + col];
        for row in (col + 1)..m {
            lu[row * n + col] /= pivot;
        }

        // Update trailing submatrix
        for row in (col + 1)..m {
            let multiplier = lu[row * n + col];
            if multiplier == 0.0 {
                continue;
            }
            for j in (col + 1)..n {
                lu[row * n + j] -= multiplier * lu[col * n + j];
            }
        }
    }

    let mut l = vec![0.0; m * k];
    let mut u = vec![0.0; k * n];
    for i in 0..m {
        for j in 0..k {
            if i == j {
                l[i * k + j] = 1.0;
            } else if i > j {
                l[i * k + j] = lu[i * n + j];
            }
        }
    }
    for i in 0..k {
        for j in i..n {
            u[i * n + j] = lu[i * n + j];
        }
    }

    LuDecomposition {
        l: DenseMatrix {
            data: l,
            rows: m,
            cols: k,
        },
        u: DenseMatrix {
            data: u,
            rows: k,
            cols: n,
        },
        permutation: perm,
        singular,
    }
}

/// Householder QR decomposition
///
/// Works for any shape; for `m > n` the trailing rows of `R` are zero and the
/// leading `n` columns of `Q` span the range of `A`.
pub fn qr_decompose(a: &DenseMatrix) -> QrDecomposition {
    let (m, n) = a.shape();
    let mut r = a.data().to_vec();
    let mut q = super::identity(m);
    let steps = m.saturating_sub(1).min(n);

    let mut v = vec![0.0; m];
    for k in 0..steps {
        // Householder vector for column k, rows k..m
        let mut norm_sq = 0.0;
        for i in k..m {
            norm_sq += r[i * n + k] * r[i * n + k];
        }
        if norm_sq == 0.0 {
            continue;
        }
        let norm = norm_sq.sqrt();
        let x0 = r[k * n + k];
        let alpha = if x0 >= 0.0 { -norm } else { norm };

        for i in k..m {
            v[i] = r[i * n + k];
        }
        v[k] -= alpha;
        let v_norm_sq: f64 = v[k..m].iter().map(|x| x * x).sum();
        if v_norm_sq == 0.0 {
            continue;
        }

        // R = (I - 2vvᵀ/vᵀv) R
        for j in k..n {
            let mut dot = 0.0;
            for i in k..m {
                dot += v[i] * r[i * n + j];
            }
            let f = 2.0 * dot / v_norm_sq;
            for i in k..m {
                r[i * n + j] -= f * v[i];
            }
        }
        // Q = Q (I - 2vvᵀ/vᵀv)
        for row in 0..m {
            let mut dot = 0.0;
            for i in k..m {
                dot += q[row * m + i] * v[i];
            }
            let f = 2.0 * dot / v_norm_sq;
            for i in k..m {
                q[row * m + i] -= f * v[i];
            }
        }
        // Column k below the diagonal is exactly zero after the reflection
        r[k * n + k] = alpha;
        for i in (k + 1)..m {
            r[i * n + k] = 0.0;
        }
    }

    QrDecomposition {
        q: DenseMatrix {
            data: q,
            rows: m,
            cols: m,
        },
        r: DenseMatrix {
            data: r,
            rows: m,
            cols: n,
        },
    }
}

/// Cholesky decomposition (Cholesky-Banachiewicz algorithm)
///
/// Only the lower triangle of `a` is read; symmetry is not checked.
pub fn cholesky_decompose(a: &DenseMatrix) -> Result<CholeskyDecomposition> {
    let n = validate_square(a)?;
    let a_data = a.data();
    let mut l = vec![0.0; n * n];

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[i * n + k] * l[j * n + k];
            }
            if i == j {
                let diag = a_data[i * n + i] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return Ok(CholeskyDecomposition {
                        l: DenseMatrix {
                            data: l,
                            rows: n,
                            cols: n,
                        },
                        positive_definite: false,
                    });
                }
                l[i * n + i] = diag.sqrt();
            } else {
                l[i * n + j] = (a_data[i * n + j] - sum) / l[j * n + j];
            }
        }
    }

    Ok(CholeskyDecomposition {
        l: DenseMatrix {
            data: l,
            rows: n,
            cols: n,
        },
        positive_definite: true,
    })
}
