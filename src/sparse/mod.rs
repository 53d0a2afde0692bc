//! Sparse kernel library
//!
//! Compressed sparse column matrices and the routines built on them.
//!
//! # Format
//!
//! A [`CscMatrix`] stores, for each column `j`, the row indices and values of
//! its entries in `col_ptrs[j]..col_ptrs[j + 1]`. A matrix without values is a
//! *pattern*: graph routines and orderings accept it, arithmetic rejects it.
//!
//! # Modules
//!
//! - [`kernels`]: index marking (`cs_flip`), prefix sums, scatter/gather
//!   workspace and entry filtering
//! - [`permute`]: permutation vectors and permuted copies
//! - [`graph`]: elimination tree, postorder, reachability
//! - [`ordering`]: AMD, reverse Cuthill-McKee and nested dissection
//! - [`elementwise`]: sparse ⊕ sparse merges and dense ⊕ sparse operations
//! - [`matmul`]: matrix-vector and matrix-matrix products
//!
//! # Example
//!
//! ```
//! use numr_engine::sparse::{CscMatrix, spmv};
//!
//! let a = CscMatrix::from_triplets(2, 2, &[(0, 0, 2.0), (1, 1, 3.0), (0, 1, 1.0)])?;
//! assert_eq!(spmv(&a, &[1.0, 1.0])?, vec![3.0, 3.0]);
//! # Ok::<(), numr_engine::error::Error>(())
//! ```

pub mod csc;
pub mod elementwise;
pub mod graph;
pub mod kernels;
pub mod matmul;
pub mod ordering;
pub mod permute;

pub use csc::CscMatrix;
pub use elementwise::{
    ElementwiseResult, MergeStats, MergeStrategy, ZeroBehavior, add, apply_dense_sparse, multiply,
    subtract,
};
pub use graph::{ereach, etree, postorder, reach};
pub use kernels::{
    Workspace, cs_flip, cs_mark, cs_marked, cs_unflip, cumsum, drop_tolerance, dropzeros, fkeep,
};
pub use matmul::{sparse_dense_multiply, sparse_multiply, spmv, spmv_transpose};
pub use ordering::{AmdMode, amd, bandwidth, nested_dissection, rcm, symbolic_fill};
pub use permute::{Permutation, inverse_permutation, ipvec, permute, pvec, symperm};
