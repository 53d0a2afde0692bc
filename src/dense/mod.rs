//! Dense kernel library
//!
//! Pure numeric routines on flat row-major `f64` buffers. Every routine takes
//! its inputs by shared reference and returns freshly allocated results; the
//! few in-place helpers say so in their name.
//!
//! # Layout
//!
//! Element `(i, j)` of an `rows x cols` matrix lives at `data[i * cols + j]`.

pub mod complex;
pub mod decompositions;
pub mod eigen;
pub mod elementwise;
pub(crate) mod jacobi;
pub mod matmul;
pub mod matrix_functions;
pub mod polynomial;
pub mod select;
pub mod solve;
pub mod svd;

pub use complex::Complex64;
pub use decompositions::{
    CholeskyDecomposition, LuDecomposition, QrDecomposition, cholesky_decompose, lu_decompose,
    qr_decompose,
};
pub use eigen::{SymmetricEigen, eigenvalues, symmetric_eigen};
pub use elementwise::{
    ElementwiseOp, add, dot_divide, dot_multiply, identity, norm_frobenius, norm_inf, norm_one,
    scale, subtract, transpose,
};
pub use matmul::{matmul, matmul_rows, matmul_simd, matvec};
pub use matrix_functions::{expm, pinv, sqrtm};
pub use polynomial::{PolynomialRoots, durand_kerner, polynomial_roots, polyval};
pub use select::{median, partition_select, select_k_smallest};
pub use solve::{det, inverse, lu_solve, lusolve, qr_solve};
pub use svd::{SvdDecomposition, svd};

use crate::error::{Error, Result};

/// Relative pivot threshold below which a pivot counts as numerically zero
pub const PIVOT_EPSILON: f64 = 1e-14;

/// Row-major dense matrix of `f64`
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl DenseMatrix {
    /// Create a matrix from row-major data
    pub fn new(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::dimension_mismatch(
                "data",
                &[rows * cols],
                &[data.len()],
            ));
        }
        Ok(Self { data, rows, cols })
    }

    /// Create a matrix by copying a row-major slice
    pub fn from_slice(data: &[f64], rows: usize, cols: usize) -> Result<Self> {
        Self::new(data.to_vec(), rows, cols)
    }

    /// Create a matrix from nested rows
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for row in rows {
            if row.len() != n_cols {
                return Err(Error::dimension_mismatch("row", &[n_cols], &[row.len()]));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: n_rows,
            cols: n_cols,
        })
    }

    /// All-zero matrix
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    /// Identity matrix of order `n`
    pub fn identity(n: usize) -> Self {
        Self {
            data: identity(n),
            rows: n,
            cols: n,
        }
    }

    /// Number of rows
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Whether the matrix is square
    #[inline]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Row-major data
    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Mutable row-major data
    #[inline]
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Consume the matrix and return its buffer
    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Element `(i, j)`
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    /// Set element `(i, j)`
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] = value;
    }

    /// Row `i` as a slice
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Matrix product `self @ other`
    pub fn matmul(&self, other: &DenseMatrix) -> Result<DenseMatrix> {
        validate_matmul(self.cols, other.rows, other.cols)?;
        let out = matmul(&self.data, &other.data, self.rows, self.cols, other.cols);
        DenseMatrix::new(out, self.rows, other.cols)
    }

    /// Transposed copy
    pub fn transpose(&self) -> DenseMatrix {
        DenseMatrix {
            data: transpose(&self.data, self.rows, self.cols),
            rows: self.cols,
            cols: self.rows,
        }
    }

    /// Nested-row representation
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.rows).map(|i| self.row(i).to_vec()).collect()
    }
}

/// Validate that a buffer holds `rows * cols` elements
pub fn validate_buffer(operand: &'static str, data: &[f64], rows: usize, cols: usize) -> Result<()> {
    if data.len() != rows * cols {
        return Err(Error::dimension_mismatch(
            operand,
            &[rows, cols],
            &[data.len()],
        ));
    }
    Ok(())
}

/// Validate a square matrix, returning its order
pub fn validate_square(a: &DenseMatrix) -> Result<usize> {
    if !a.is_square() {
        return Err(Error::NotSquare {
            rows: a.rows,
            cols: a.cols,
        });
    }
    Ok(a.rows)
}

/// Validate inner dimensions of a matrix product
pub fn validate_matmul(a_cols: usize, b_rows: usize, b_cols: usize) -> Result<()> {
    if a_cols != b_rows {
        return Err(Error::dimension_mismatch(
            "rhs",
            &[a_cols, b_cols],
            &[b_rows, b_cols],
        ));
    }
    Ok(())
}
