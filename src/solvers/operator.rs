//! The [`LinearOperator`] seam between iterative solvers and matrix storage

use super::types::{ConvergenceReason, IterativeOptions, SolverState};
use crate::dense::DenseMatrix;
use crate::error::{Error, Result};
use crate::sparse::CscMatrix;

/// Row-major compressed copy of an operator, for methods that sweep rows
#[derive(Debug, Clone, PartialEq)]
pub struct RowMajor {
    ptrs: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<f64>,
}

impl RowMajor {
    /// Entries `(col, value)` of row `i`
    #[inline]
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.ptrs[i]..self.ptrs[i + 1];
        self.cols[range.clone()].iter().copied().zip(self.vals[range].iter().copied())
    }

    /// Number of rows
    #[inline]
    pub fn rows(&self) -> usize {
        self.ptrs.len() - 1
    }
}

/// A square linear operator `A` on `f64` vectors
///
/// Krylov methods only need [`apply`](LinearOperator::apply); stationary
/// methods also sweep rows through [`row_major`](LinearOperator::row_major).
pub trait LinearOperator {
    /// Order `n` of the operator
    fn dim(&self) -> usize;

    /// Reject operators the solvers cannot use (non-square, pattern-only)
    fn validate(&self) -> Result<()>;

    /// `y = A x`; `y` is overwritten
    fn apply(&self, x: &[f64], y: &mut [f64]);

    /// The main diagonal
    fn diagonal(&self) -> Vec<f64>;

    /// Row-major copy of the stored entries
    fn row_major(&self) -> RowMajor;
}

impl LinearOperator for DenseMatrix {
    fn dim(&self) -> usize {
        self.rows()
    }

    fn validate(&self) -> Result<()> {
        if !self.is_square() {
            return Err(Error::NotSquare {
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        Ok(())
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        let n = self.cols();
        crate::dense::matmul::matvec_rows(self.data(), x, y, 0..self.rows(), n);
    }

    fn diagonal(&self) -> Vec<f64> {
        (0..self.rows()).map(|i| self.get(i, i)).collect()
    }

    fn row_major(&self) -> RowMajor {
        let mut ptrs = Vec::with_capacity(self.rows() + 1);
        let mut cols = Vec::new();
        let mut vals = Vec::new();
        ptrs.push(0);
        for i in 0..self.rows() {
            for (j, &v) in self.row(i).iter().enumerate() {
                if v != 0.0 {
                    cols.push(j);
                    vals.push(v);
                }
            }
            ptrs.push(cols.len());
        }
        RowMajor { ptrs, cols, vals }
    }
}

impl LinearOperator for CscMatrix {
    fn dim(&self) -> usize {
        self.rows()
    }

    fn validate(&self) -> Result<()> {
        if self.rows() != self.cols() {
            return Err(Error::NotSquare {
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.numeric_values("iterative solve")?;
        Ok(())
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        y.fill(0.0);
        let Some(values) = self.values() else {
            return;
        };
        for (j, &xj) in x.iter().enumerate() {
            for p in self.col_range(j) {
                y[self.row_indices()[p]] += values[p] * xj;
            }
        }
    }

    fn diagonal(&self) -> Vec<f64> {
        (0..self.rows()).map(|i| self.get(i, i)).collect()
    }

    fn row_major(&self) -> RowMajor {
        // CSC of the transpose is CSR of the original
        let t = self.transpose();
        let ptrs = t.col_ptrs().to_vec();
        let cols = t.row_indices().to_vec();
        let vals = t
            .values()
            .map(<[f64]>::to_vec)
            .unwrap_or_else(|| vec![0.0; cols.len()]);
        RowMajor { ptrs, cols, vals }
    }
}

/// Validate the operator and right-hand side, returning `n`
pub(crate) fn validate_system(a: &dyn LinearOperator, b: &[f64], x0: Option<&[f64]>) -> Result<usize> {
    a.validate()?;
    let n = a.dim();
    if b.len() != n {
        return Err(Error::dimension_mismatch("b", &[n], &[b.len()]));
    }
    if let Some(x0) = x0 {
        if x0.len() != n {
            return Err(Error::dimension_mismatch("x0", &[n], &[x0.len()]));
        }
    }
    Ok(n)
}

/// `r = b - A x`, returning `||r||₂`
pub(crate) fn residual(a: &dyn LinearOperator, x: &[f64], b: &[f64], r: &mut [f64]) -> f64 {
    a.apply(x, r);
    for (ri, &bi) in r.iter_mut().zip(b) {
        *ri = bi - *ri;
    }
    crate::dense::elementwise::norm2(r)
}

/// State of a solve after validation and the initial residual check
pub(crate) enum Start {
    /// Already solved (zero right-hand side or a good enough guess)
    Finished(SolverState),
    /// Iterate from `x` with residual `r = b - A x` of norm `norm`
    Running { x: Vec<f64>, r: Vec<f64>, norm: f64 },
}

/// Validate, build the initial iterate and test it
pub(crate) fn start(
    a: &dyn LinearOperator,
    b: &[f64],
    x0: Option<&[f64]>,
    options: &IterativeOptions,
) -> Result<Start> {
    let n = validate_system(a, b, x0)?;
    let x = x0.map_or_else(|| vec![0.0; n], <[f64]>::to_vec);
    if x0.is_none() && b.iter().all(|&v| v == 0.0) {
        return Ok(Start::Finished(SolverState::finish(
            x,
            0.0,
            0,
            ConvergenceReason::ZeroRhs,
        )));
    }
    let mut r = vec![0.0; n];
    let norm = residual(a, &x, b, &mut r);
    if norm < options.tolerance {
        return Ok(Start::Finished(SolverState::finish(
            x,
            norm,
            0,
            ConvergenceReason::Tolerance,
        )));
    }
    Ok(Start::Running { x, r, norm })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense() -> DenseMatrix {
        DenseMatrix::from_rows(&[vec![4.0, 1.0, 0.0], vec![1.0, 3.0, 0.0], vec![0.0, 0.0, 2.0]])
            .unwrap()
    }

    #[test]
    fn test_dense_and_sparse_agree() {
        let d = dense();
        let s = CscMatrix::from_dense(&d);
        let x = [1.0, -2.0, 0.5];
        let mut yd = vec![0.0; 3];
        let mut ys = vec![7.0; 3];
        d.apply(&x, &mut yd);
        s.apply(&x, &mut ys);
        assert_eq!(yd, ys);
        assert_eq!(d.diagonal(), s.diagonal());
        assert_eq!(d.row_major(), s.row_major());
    }

    #[test]
    fn test_row_major_rows() {
        let r = dense().row_major();
        assert_eq!(r.rows(), 3);
        assert_eq!(r.row(0).collect::<Vec<_>>(), vec![(0, 4.0), (1, 1.0)]);
        assert_eq!(r.row(2).collect::<Vec<_>>(), vec![(2, 2.0)]);
    }

    #[test]
    fn test_validate_system() {
        let d = dense();
        assert_eq!(validate_system(&d, &[1.0; 3], None).unwrap(), 3);
        assert!(validate_system(&d, &[1.0; 2], None).is_err());
        assert!(validate_system(&d, &[1.0; 3], Some(&[0.0])).is_err());
        let rect = DenseMatrix::zeros(2, 3);
        assert!(matches!(rect.validate(), Err(Error::NotSquare { .. })));
        let pattern = CscMatrix::identity(3).pattern();
        assert!(matches!(LinearOperator::validate(&pattern), Err(Error::PatternMatrix { .. })));
    }

    #[test]
    fn test_residual() {
        let d = dense();
        let mut r = vec![0.0; 3];
        let norm = residual(&d, &[1.0, 1.0, 1.0], &[5.0, 4.0, 3.0], &mut r);
        assert_eq!(r, vec![0.0, 0.0, 1.0]);
        assert_eq!(norm, 1.0);
    }
}
