//! # numr-engine
//!
//! **Adaptive dense and sparse matrix engine.**
//!
//! numr-engine implements the linear algebra behind a numeric expression
//! layer and decides, per call, where that work runs: directly on the host,
//! inside a native kernel module with its own memory arena, or split across a
//! worker pool.
//!
//! ## Components
//!
//! - **Dense kernels** ([`dense`]): matmul, elementwise ops, LU, QR,
//!   Cholesky, SVD, eigenvalues, `expm`/`sqrtm`/`pinv`, polynomial roots and
//!   selection
//! - **Sparse kernels** ([`sparse`]): CSC matrices, graph routines and
//!   fill-reducing orderings (AMD, RCM, nested dissection)
//! - **Solvers** ([`solvers`]): triangular, banded and sparse direct solvers
//!   plus stationary and Krylov iterations
//! - **Runtime** ([`runtime`]): the native module arena, the parallel
//!   coordinator and the backend selection [`Bridge`](runtime::Bridge)
//!
//! ## Quick Start
//!
//! ```
//! use numr_engine::prelude::*;
//!
//! let bridge = Bridge::new(ExecutionConfig::default())?;
//! let out = bridge.execute(
//!     KernelOp::Multiply,
//!     &[&[1.0, 2.0, 3.0, 4.0], &[5.0, 6.0, 7.0, 8.0]],
//!     &[2, 2, 2],
//! )?;
//! assert_eq!(out.values(), Some(&[19.0, 22.0, 43.0, 50.0][..]));
//! # Ok::<(), numr_engine::error::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `rayon` (default): run partitioned operations on a thread pool; without
//!   it partitions run on the calling thread

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dense;
pub mod error;
pub mod runtime;
pub mod solvers;
pub mod sparse;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ConfigValue, ExecutionConfig};
    pub use crate::dense::{Complex64, DenseMatrix};
    pub use crate::error::{Error, Result};
    pub use crate::runtime::{Bridge, ExecutionPath, KernelOp, KernelOutput};
    pub use crate::solvers::{ConvergenceReason, IterativeOptions, SolverState};
    pub use crate::sparse::{AmdMode, CscMatrix, Permutation};
}
