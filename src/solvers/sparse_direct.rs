//! Sparse direct solvers: triangular solves, symbolic analysis, LU and
//! Cholesky factorization on CSC matrices
//!
//! # Permutations
//!
//! `pinv` maps an original row to its pivot position and `q` maps a factor
//! column to the original column, so a factorization satisfies
//! `(P A Q)[pinv[i], k] = A[i, q[k]]`.
//!
//! # Factor layout
//!
//! The LU factor `L` is unit lower triangular with the diagonal stored first
//! in each column; `U` stores its diagonal last. The Cholesky factor stores
//! its diagonal first. The triangular solves here locate the diagonal by row
//! index, so they accept any in-column order.

use crate::error::{Error, Result};
use crate::sparse::CscMatrix;
use crate::sparse::graph::{ereach, etree, reach, reach_raw};
use crate::sparse::kernels::{Workspace, cumsum};
use crate::sparse::ordering::{AmdMode, Permutation, amd};
use crate::sparse::permute::{ipvec, permute, pvec, symperm};

fn check_square(a: &CscMatrix) -> Result<usize> {
    if a.rows() != a.cols() {
        return Err(Error::NotSquare {
            rows: a.rows(),
            cols: a.cols(),
        });
    }
    Ok(a.cols())
}

fn check_rhs(n: usize, b: &[f64]) -> Result<()> {
    if b.len() != n {
        return Err(Error::dimension_mismatch("b", &[n], &[b.len()]));
    }
    Ok(())
}

/// Sum of the entries of column `j` stored on row `j`
#[inline]
fn diagonal_of(a: &CscMatrix, values: &[f64], j: usize) -> f64 {
    a.col_range(j)
        .filter(|&p| a.row_indices()[p] == j)
        .map(|p| values[p])
        .sum()
}

// ============================================================================
// Triangular solves
// ============================================================================

/// Solve `L x = b` for lower-triangular CSC `L`; entries above the diagonal
/// are ignored
///
/// Returns `Ok(None)` when a diagonal entry is zero or missing.
pub fn sparse_lsolve(l: &CscMatrix, b: &[f64]) -> Result<Option<Vec<f64>>> {
    let n = check_square(l)?;
    check_rhs(n, b)?;
    let values = l.numeric_values("sparse_lsolve")?;
    let mut x = b.to_vec();
    for j in 0..n {
        let d = diagonal_of(l, values, j);
        if d == 0.0 {
            return Ok(None);
        }
        x[j] /= d;
        let xj = x[j];
        for p in l.col_range(j) {
            let i = l.row_indices()[p];
            if i > j {
                x[i] -= values[p] * xj;
            }
        }
    }
    Ok(Some(x))
}

/// Solve `Lᵀ x = b` for lower-triangular CSC `L`
pub fn sparse_ltsolve(l: &CscMatrix, b: &[f64]) -> Result<Option<Vec<f64>>> {
    let n = check_square(l)?;
    check_rhs(n, b)?;
    let values = l.numeric_values("sparse_ltsolve")?;
    let mut x = b.to_vec();
    for j in (0..n).rev() {
        let mut d = 0.0;
        for p in l.col_range(j) {
            let i = l.row_indices()[p];
            if i > j {
                x[j] -= values[p] * x[i];
            } else if i == j {
                d += values[p];
            }
        }
        if d == 0.0 {
            return Ok(None);
        }
        x[j] /= d;
    }
    Ok(Some(x))
}

/// Solve `U x = b` for upper-triangular CSC `U`; entries below the diagonal
/// are ignored
pub fn sparse_usolve(u: &CscMatrix, b: &[f64]) -> Result<Option<Vec<f64>>> {
    let n = check_square(u)?;
    check_rhs(n, b)?;
    let values = u.numeric_values("sparse_usolve")?;
    let mut x = b.to_vec();
    for j in (0..n).rev() {
        let d = diagonal_of(u, values, j);
        if d == 0.0 {
            return Ok(None);
        }
        x[j] /= d;
        let xj = x[j];
        for p in u.col_range(j) {
            let i = u.row_indices()[p];
            if i < j {
                x[i] -= values[p] * xj;
            }
        }
    }
    Ok(Some(x))
}

/// Solution of a triangular system with a sparse right-hand side
#[derive(Debug, Clone, PartialEq)]
pub struct SparseSolution {
    /// Rows that may be nonzero, in the order they were computed
    pub pattern: Vec<usize>,
    /// Dense solution vector; zero outside `pattern`
    pub x: Vec<f64>,
}

/// Solve `G x = B[:, k]` for triangular `G` and sparse `B`
///
/// Only the rows reachable from the pattern of `B[:, k]` are touched, so the
/// cost is proportional to the flops performed rather than to `n`. `lower`
/// selects which triangle of `G` is used. Returns `Ok(None)` on a zero
/// diagonal in a reached column.
pub fn spsolve(g: &CscMatrix, b: &CscMatrix, k: usize, lower: bool) -> Result<Option<SparseSolution>> {
    let n = check_square(g)?;
    if b.rows() != n {
        return Err(Error::dimension_mismatch("b", &[n, b.cols()], &[b.rows(), b.cols()]));
    }
    if k >= b.cols() {
        return Err(Error::invalid_argument(
            "k",
            format!("column {k} out of range for {} columns", b.cols()),
        ));
    }
    let gv = g.numeric_values("spsolve")?;
    let bv = b.numeric_values("spsolve")?;

    let b_rows: Vec<usize> = b.col_range(k).map(|p| b.row_indices()[p]).collect();
    let pattern = reach(g, &b_rows, None);
    let mut x = vec![0.0; n];
    for p in b.col_range(k) {
        x[b.row_indices()[p]] += bv[p];
    }
    for &j in &pattern {
        let d = diagonal_of(g, gv, j);
        if d == 0.0 {
            return Ok(None);
        }
        x[j] /= d;
        let xj = x[j];
        for p in g.col_range(j) {
            let i = g.row_indices()[p];
            if (lower && i > j) || (!lower && i < j) {
                x[i] -= gv[p] * xj;
            }
        }
    }
    Ok(Some(SparseSolution { pattern, x }))
}

// ============================================================================
// Symbolic analysis
// ============================================================================

/// Fill-reducing order and structure estimates, shared by numeric
/// factorizations of matrices with the same pattern
#[derive(Debug, Clone)]
pub struct SymbolicAnalysis {
    /// Column order `q`; for Cholesky also the symmetric row order
    pub order: Permutation,
    /// Graph the order was computed on
    pub mode: AmdMode,
    /// Elimination tree: of `P A Pᵀ` for Cholesky, of `(A Q)ᵀ(A Q)` otherwise
    pub parent: Vec<Option<usize>>,
    /// Column counts of the Cholesky factor; empty unless `mode` is Cholesky
    pub col_counts: Vec<usize>,
    /// Entries in `L`: exact for Cholesky, an estimate otherwise
    pub lnz: usize,
    /// Estimated entries in `U`
    pub unz: usize,
}

impl SymbolicAnalysis {
    /// Order `a` with [`amd`] and predict the factor structure
    pub fn analyze(a: &CscMatrix, mode: AmdMode) -> Result<Self> {
        let n = check_square(a)?;
        let order = amd(a, mode)?;
        if mode == AmdMode::Cholesky {
            let (parent, col_counts) = cholesky_structure(a, &order)?;
            let lnz = col_counts.iter().sum();
            return Ok(Self {
                order,
                mode,
                parent,
                col_counts,
                lnz,
                unz: lnz,
            });
        }
        let c = permute(a, None, Some(order.as_slice()))?;
        let parent = etree(&c, true);
        let estimate = 4 * a.nnz() + n;
        Ok(Self {
            order,
            mode,
            parent,
            col_counts: Vec::new(),
            lnz: estimate,
            unz: estimate,
        })
    }
}

/// Elimination tree and column counts of the Cholesky factor of `P A Pᵀ`
fn cholesky_structure(a: &CscMatrix, order: &Permutation) -> Result<(Vec<Option<usize>>, Vec<usize>)> {
    let n = a.cols();
    let c = symperm(a, Some(order.inverse().as_slice()))?;
    let parent = etree(&c, false);
    let mut counts = vec![1usize; n];
    let mut ws = Workspace::new(n);
    for k in 0..n {
        for j in ereach(&c, k, &parent, &mut ws) {
            counts[j] += 1;
        }
    }
    Ok((parent, counts))
}

fn check_order(symbolic: &SymbolicAnalysis, n: usize) -> Result<()> {
    if symbolic.order.len() != n {
        return Err(Error::dimension_mismatch(
            "symbolic",
            &[n],
            &[symbolic.order.len()],
        ));
    }
    Ok(())
}

// ============================================================================
// LU
// ============================================================================

/// `P A Q = L U` from [`sparse_lu`]
#[derive(Debug, Clone)]
pub struct SparseLu {
    /// Unit lower-triangular factor
    pub l: CscMatrix,
    /// Upper-triangular factor
    pub u: CscMatrix,
    /// Row permutation, old to new
    pub pinv: Vec<usize>,
    /// Column permutation, new to old
    pub q: Vec<usize>,
    /// A column had no nonzero pivot candidate; `U` has a zero on its diagonal
    pub singular: bool,
}

impl SparseLu {
    /// Solve `A x = b`; `Ok(None)` when the factorization is singular
    pub fn solve(&self, b: &[f64]) -> Result<Option<Vec<f64>>> {
        check_rhs(self.pinv.len(), b)?;
        if self.singular {
            return Ok(None);
        }
        let y = ipvec(Some(&self.pinv), b);
        let Some(y) = sparse_lsolve(&self.l, &y)? else {
            return Ok(None);
        };
        let Some(z) = sparse_usolve(&self.u, &y)? else {
            return Ok(None);
        };
        Ok(Some(ipvec(Some(&self.q), &z)))
    }
}

/// Left-looking LU with threshold partial pivoting
///
/// Column `k` of the factors comes from a sparse triangular solve with the
/// first `k` columns of `L`. The pivot is the diagonal entry `A[q[k], q[k]]`
/// when its magnitude is at least `threshold` times the largest candidate,
/// and the largest candidate otherwise: `threshold = 1` is partial pivoting,
/// smaller values favour the fill-reducing order. A column with no nonzero
/// candidate is not an error: it sets [`SparseLu::singular`] and continues.
pub fn sparse_lu(a: &CscMatrix, symbolic: &SymbolicAnalysis, threshold: f64) -> Result<SparseLu> {
    let n = check_square(a)?;
    check_order(symbolic, n)?;
    a.numeric_values("sparse_lu")?;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::invalid_argument(
            "threshold",
            format!("pivot threshold must lie in [0, 1], got {threshold}"),
        ));
    }
    let q = symbolic.order.as_slice();

    let mut l_ptrs = Vec::with_capacity(n + 1);
    let mut l_rows = Vec::with_capacity(symbolic.lnz);
    let mut l_vals = Vec::with_capacity(symbolic.lnz);
    let mut u_ptrs = Vec::with_capacity(n + 1);
    let mut u_rows = Vec::with_capacity(symbolic.unz);
    let mut u_vals = Vec::with_capacity(symbolic.unz);
    l_ptrs.push(0);
    u_ptrs.push(0);

    let mut pinv: Vec<Option<usize>> = vec![None; n];
    let mut ws = Workspace::new(n);
    let mut a_pattern = Vec::new();
    let mut next_free = 0;
    let mut singular = false;

    for (k, &col) in q.iter().enumerate() {
        // x = L \ A[:, col] over the pivotal rows
        ws.next_generation();
        a_pattern.clear();
        ws.scatter(a, col, 1.0, &mut a_pattern);
        let xi = reach_raw(&l_ptrs, &l_rows, n, &a_pattern, Some(&pinv));
        for &j in &xi {
            let Some(jcol) = pinv[j] else {
                continue;
            };
            let xj = ws.value(j);
            // Skip the unit diagonal stored first
            for p in (l_ptrs[jcol] + 1)..l_ptrs[jcol + 1] {
                let i = l_rows[p];
                ws.set(i, ws.value(i) - l_vals[p] * xj);
            }
        }

        // Split into U entries and pivot candidates
        let mut ipiv = None;
        let mut a_max = 0.0f64;
        for &i in &xi {
            let xv = ws.value(i);
            match pinv[i] {
                Some(row) => {
                    u_rows.push(row);
                    u_vals.push(xv);
                }
                None => {
                    if xv.abs() > a_max {
                        a_max = xv.abs();
                        ipiv = Some(i);
                    }
                }
            }
        }
        if pinv[col].is_none() && a_max > 0.0 {
            let diag = ws.value(col);
            if diag != 0.0 && diag.abs() >= threshold * a_max {
                ipiv = Some(col);
            }
        }
        let ipiv = match ipiv.filter(|_| a_max > 0.0) {
            Some(i) => i,
            None => {
                singular = true;
                while next_free < n && pinv[next_free].is_some() {
                    next_free += 1;
                }
                let fallback = if pinv[col].is_none() { col } else { next_free };
                if fallback >= n {
                    return Err(Error::Internal(format!("no free pivot row at step {k}")));
                }
                fallback
            }
        };

        let pivot = ws.value(ipiv);
        u_rows.push(k);
        u_vals.push(pivot);
        u_ptrs.push(u_rows.len());
        pinv[ipiv] = Some(k);

        l_rows.push(ipiv);
        l_vals.push(1.0);
        if pivot != 0.0 {
            for &i in &xi {
                if pinv[i].is_none() {
                    l_rows.push(i);
                    l_vals.push(ws.value(i) / pivot);
                }
            }
        }
        l_ptrs.push(l_rows.len());
    }

    let pinv = pinv
        .into_iter()
        .enumerate()
        .map(|(i, p)| p.ok_or_else(|| Error::Internal(format!("row {i} never pivoted"))))
        .collect::<Result<Vec<usize>>>()?;
    for r in &mut l_rows {
        *r = pinv[*r];
    }
    if singular {
        tracing::debug!(n, "sparse LU found a structurally or numerically zero pivot");
    }

    Ok(SparseLu {
        l: CscMatrix::from_parts(Some(l_vals), l_rows, l_ptrs, n, n),
        u: CscMatrix::from_parts(Some(u_vals), u_rows, u_ptrs, n, n),
        pinv,
        q: q.to_vec(),
        singular,
    })
}

/// Solve `A x = b` by sparse LU with an [`amd`] column order
///
/// `Ok(None)` when `A` is singular.
pub fn sparse_lusolve(a: &CscMatrix, b: &[f64], mode: AmdMode, threshold: f64) -> Result<Option<Vec<f64>>> {
    let symbolic = SymbolicAnalysis::analyze(a, mode)?;
    let lu = sparse_lu(a, &symbolic, threshold)?;
    lu.solve(b)
}

// ============================================================================
// Cholesky
// ============================================================================

/// `P A Pᵀ = L Lᵀ` from [`sparse_cholesky`]
#[derive(Debug, Clone)]
pub struct SparseCholesky {
    /// Lower-triangular factor; only the first columns are meaningful when
    /// the matrix is not positive definite
    pub l: CscMatrix,
    /// Symmetric permutation, old to new
    pub pinv: Vec<usize>,
    /// Whether every pivot was positive
    pub positive_definite: bool,
}

impl SparseCholesky {
    /// Solve `A x = b`; `Ok(None)` when `A` was not positive definite
    pub fn solve(&self, b: &[f64]) -> Result<Option<Vec<f64>>> {
        check_rhs(self.pinv.len(), b)?;
        if !self.positive_definite {
            return Ok(None);
        }
        let y = ipvec(Some(&self.pinv), b);
        let Some(y) = sparse_lsolve(&self.l, &y)? else {
            return Ok(None);
        };
        let Some(z) = sparse_ltsolve(&self.l, &y)? else {
            return Ok(None);
        };
        Ok(Some(pvec(Some(&self.pinv), &z)))
    }
}

/// Up-looking Cholesky factorization of symmetric `a`, using its upper
/// triangle
///
/// Row `k` of `L` is found by a sparse triangular solve over the pattern
/// given by [`ereach`]. A non-positive pivot stops the factorization with
/// `positive_definite = false`.
pub fn sparse_cholesky(a: &CscMatrix, symbolic: &SymbolicAnalysis) -> Result<SparseCholesky> {
    let n = check_square(a)?;
    check_order(symbolic, n)?;
    a.numeric_values("sparse_cholesky")?;

    let (parent, counts) = if symbolic.col_counts.len() == n {
        (symbolic.parent.clone(), symbolic.col_counts.clone())
    } else {
        cholesky_structure(a, &symbolic.order)?
    };
    let pinv = symbolic.order.inverse().into_vec();
    let c = symperm(a, Some(&pinv))?;
    let cv = c.numeric_values("sparse_cholesky")?;

    let mut col_ptrs = vec![0usize; n + 1];
    let mut next = counts;
    let lnz = cumsum(&mut col_ptrs, &mut next);
    let mut l_rows = vec![0usize; lnz];
    let mut l_vals = vec![0.0; lnz];
    let mut x = vec![0.0; n];
    let mut ws = Workspace::new(n);
    let mut positive_definite = true;

    for k in 0..n {
        let pattern = ereach(&c, k, &parent, &mut ws);
        for p in c.col_range(k) {
            let i = c.row_indices()[p];
            if i <= k {
                x[i] += cv[p];
            }
        }
        let mut d = x[k];
        x[k] = 0.0;
        for j in pattern {
            let lkj = x[j] / l_vals[col_ptrs[j]];
            x[j] = 0.0;
            for p in (col_ptrs[j] + 1)..next[j] {
                x[l_rows[p]] -= l_vals[p] * lkj;
            }
            d -= lkj * lkj;
            let p = next[j];
            next[j] += 1;
            l_rows[p] = k;
            l_vals[p] = lkj;
        }
        if d <= 0.0 || !d.is_finite() {
            positive_definite = false;
            tracing::debug!(column = k, pivot = d, "sparse Cholesky hit a non-positive pivot");
            break;
        }
        let p = next[k];
        next[k] += 1;
        l_rows[p] = k;
        l_vals[p] = d.sqrt();
    }

    if !positive_definite {
        // Keep only the entries written so far
        let mut ptrs = Vec::with_capacity(n + 1);
        let mut rows = Vec::new();
        let mut vals = Vec::new();
        ptrs.push(0);
        for j in 0..n {
            rows.extend_from_slice(&l_rows[col_ptrs[j]..next[j]]);
            vals.extend_from_slice(&l_vals[col_ptrs[j]..next[j]]);
            ptrs.push(rows.len());
        }
        l_rows = rows;
        l_vals = vals;
        col_ptrs = ptrs;
    }

    Ok(SparseCholesky {
        l: CscMatrix::from_parts(Some(l_vals), l_rows, col_ptrs, n, n),
        pinv,
        positive_definite,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::{DenseMatrix, lusolve};
    use crate::sparse::ordering::symbolic_fill;

    fn assert_close(a: &[f64], b: &[f64], tol: f64) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < tol, "{x} vs {y}");
        }
    }

    fn unsymmetric() -> CscMatrix {
        CscMatrix::from_dense(
            &DenseMatrix::from_rows(&[
                vec![2.0, 0.0, 4.0, 0.0, -1.0],
                vec![1.0, 5.0, 0.0, 0.0, 0.0],
                vec![0.0, 3.0, 1.0, 2.0, 0.0],
                vec![0.0, 0.0, 0.0, 3.0, 6.0],
                vec![7.0, 0.0, 0.0, 1.0, 1.0],
            ])
            .unwrap(),
        )
    }

    fn spd_tridiagonal(n: usize) -> CscMatrix {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 4.0));
            if i + 1 < n {
                t.push((i, i + 1, -1.0));
                t.push((i + 1, i, -1.0));
            }
        }
        CscMatrix::from_triplets(n, n, &t).unwrap()
    }

    #[test]
    fn test_triangular_solves() {
        let l = CscMatrix::from_triplets(3, 3, &[
            (0, 0, 2.0),
            (1, 0, 1.0),
            (1, 1, 1.0),
            (2, 0, -1.0),
            (2, 1, 3.0),
            (2, 2, 4.0),
        ])
        .unwrap();
        let x = sparse_lsolve(&l, &[2.0, 3.0, 13.0]).unwrap().unwrap();
        assert_close(&x, &[1.0, 2.0, 2.0], 1e-14);

        // Lᵀ x = b
        let xt = sparse_ltsolve(&l, &[1.0, 7.0, 8.0]).unwrap().unwrap();
        assert_close(&xt, &[1.0, 1.0, 2.0], 1e-14);

        let u = l.transpose();
        let xu = sparse_usolve(&u, &[1.0, 7.0, 8.0]).unwrap().unwrap();
        assert_close(&xu, &xt, 1e-14);

        let singular = CscMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (1, 0, 1.0)]).unwrap();
        assert!(sparse_lsolve(&singular, &[1.0, 1.0]).unwrap().is_none());
    }

    #[test]
    fn test_spsolve_touches_only_reach() {
        // Lower bidiagonal on rows 0..3, row 4 decoupled
        let l = CscMatrix::from_triplets(5, 5, &[
            (0, 0, 1.0),
            (1, 0, -1.0),
            (1, 1, 1.0),
            (2, 1, -1.0),
            (2, 2, 1.0),
            (3, 3, 1.0),
            (4, 4, 1.0),
        ])
        .unwrap();
        let b = CscMatrix::from_triplets(5, 1, &[(1, 0, 2.0)]).unwrap();
        let sol = spsolve(&l, &b, 0, true).unwrap().unwrap();
        assert_eq!(sol.pattern, vec![1, 2]);
        assert_eq!(sol.x, vec![0.0, 2.0, 2.0, 0.0, 0.0]);
        assert!(spsolve(&l, &b, 1, true).is_err());
    }

    #[test]
    fn test_sparse_lu_reconstructs() {
        let a = unsymmetric();
        for mode in [AmdMode::Natural, AmdMode::Lu, AmdMode::Qr] {
            let symbolic = SymbolicAnalysis::analyze(&a, mode).unwrap();
            let lu = sparse_lu(&a, &symbolic, 1.0).unwrap();
            assert!(!lu.singular);
            let prod = lu.l.to_dense().matmul(&lu.u.to_dense()).unwrap();
            let dense = a.to_dense();
            for i in 0..5 {
                for k in 0..5 {
                    let expected = dense.get(i, lu.q[k]);
                    assert!((prod.get(lu.pinv[i], k) - expected).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_sparse_lusolve_matches_dense() {
        let a = unsymmetric();
        let b = [1.0, -2.0, 3.0, 0.5, 4.0];
        let x = sparse_lusolve(&a, &b, AmdMode::Lu, 0.1).unwrap().unwrap();
        let expected = lusolve(&a.to_dense(), &b, 1).unwrap().unwrap();
        assert_close(&x, &expected, 1e-10);
    }

    #[test]
    fn test_threshold_controls_pivot_choice() {
        let a = CscMatrix::from_dense(
            &DenseMatrix::from_rows(&[vec![1e-3, 1.0], vec![1.0, 1.0]]).unwrap(),
        );
        let symbolic = SymbolicAnalysis::analyze(&a, AmdMode::Natural).unwrap();
        let partial = sparse_lu(&a, &symbolic, 1.0).unwrap();
        assert_eq!(partial.pinv, vec![1, 0]);
        let relaxed = sparse_lu(&a, &symbolic, 1e-3).unwrap();
        assert_eq!(relaxed.pinv, vec![0, 1]);
        assert!(sparse_lu(&a, &symbolic, 1.5).is_err());
    }

    #[test]
    fn test_singular_lu_is_flagged() {
        let a = CscMatrix::from_dense(
            &DenseMatrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 4.0]]).unwrap(),
        );
        let symbolic = SymbolicAnalysis::analyze(&a, AmdMode::Natural).unwrap();
        let lu = sparse_lu(&a, &symbolic, 1.0).unwrap();
        assert!(lu.singular);
        assert_eq!(lu.solve(&[1.0, 1.0]).unwrap(), None);

        let zero_col = CscMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (1, 0, 1.0)]).unwrap();
        let symbolic = SymbolicAnalysis::analyze(&zero_col, AmdMode::Natural).unwrap();
        assert!(sparse_lu(&zero_col, &symbolic, 1.0).unwrap().singular);
    }

    #[test]
    fn test_cholesky_solves_and_counts() {
        let a = spd_tridiagonal(8);
        let symbolic = SymbolicAnalysis::analyze(&a, AmdMode::Cholesky).unwrap();
        assert_eq!(symbolic.lnz, symbolic_fill(&a, &symbolic.order).unwrap());

        let chol = sparse_cholesky(&a, &symbolic).unwrap();
        assert!(chol.positive_definite);
        assert_eq!(chol.l.nnz(), symbolic.lnz);

        let b: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let x = chol.solve(&b).unwrap().unwrap();
        let expected = lusolve(&a.to_dense(), &b, 1).unwrap().unwrap();
        assert_close(&x, &expected, 1e-12);
    }

    #[test]
    fn test_cholesky_with_lu_analysis() {
        let a = spd_tridiagonal(5);
        let symbolic = SymbolicAnalysis::analyze(&a, AmdMode::Natural).unwrap();
        assert!(symbolic.col_counts.is_empty());
        let chol = sparse_cholesky(&a, &symbolic).unwrap();
        assert!(chol.positive_definite);
        let llt = chol.l.to_dense().matmul(&chol.l.to_dense().transpose()).unwrap();
        let dense = a.to_dense();
        for i in 0..5 {
            for j in 0..5 {
                assert!((llt.get(i, j) - dense.get(i, j)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_cholesky_not_positive_definite() {
        let a = CscMatrix::from_dense(
            &DenseMatrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 1.0]]).unwrap(),
        );
        let symbolic = SymbolicAnalysis::analyze(&a, AmdMode::Natural).unwrap();
        let chol = sparse_cholesky(&a, &symbolic).unwrap();
        assert!(!chol.positive_definite);
        assert_eq!(chol.solve(&[1.0, 1.0]).unwrap(), None);
    }
}
