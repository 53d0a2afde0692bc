//! Numerical solver suite
//!
//! - Dense direct: triangular, diagonal, tridiagonal (Thomas) and banded LU
//! - Sparse direct: CSC triangular solves, symbolic analysis, left-looking
//!   LU and up-looking Cholesky
//! - Iterative: Jacobi, Gauss-Seidel, SOR, CG, GMRES and BiCGSTAB over any
//!   [`LinearOperator`]
//!
//! Iterative solvers never fail for lack of convergence: they return a
//! [`SolverState`] whose [`ConvergenceReason`] says why they stopped.
//!
//! ```
//! use numr_engine::dense::DenseMatrix;
//! use numr_engine::solvers::{IterativeOptions, conjugate_gradient};
//!
//! let a = DenseMatrix::from_rows(&[vec![4.0, 1.0], vec![1.0, 3.0]]).unwrap();
//! let state = conjugate_gradient(&a, &[1.0, 2.0], None, IterativeOptions::default()).unwrap();
//! assert!(state.converged);
//! ```

mod banded;
mod krylov;
mod operator;
mod sparse_direct;
mod stationary;
mod triangular;
mod types;

pub use banded::{solve_banded, solve_tridiagonal, to_band_storage};
pub use krylov::{bicgstab, conjugate_gradient, gmres};
pub use operator::{LinearOperator, RowMajor};
pub use sparse_direct::{
    SparseCholesky, SparseLu, SparseSolution, SymbolicAnalysis, sparse_cholesky, sparse_lsolve,
    sparse_ltsolve, sparse_lu, sparse_lusolve, sparse_usolve, spsolve,
};
pub use stationary::{gauss_seidel, jacobi, sor};
pub use triangular::{backward_substitution, forward_substitution, solve_diagonal};
pub use types::{
    ConvergenceReason, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE, IterativeOptions, SolverState,
};
