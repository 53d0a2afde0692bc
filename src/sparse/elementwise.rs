//! Elementwise operations on sparse matrices
//!
//! Sparse ⊕ sparse combines the two nonzero sets column by column with a
//! [`MergeStrategy`]: addition and subtraction keep the union, multiplication
//! the intersection. Every stored entry of each operand is touched once, so a
//! merge visits at most `nnz(A) + nnz(B)` entries; [`MergeStats`] reports the
//! count.
//!
//! Explicit zeros produced by cancellation are kept. Use
//! [`dropzeros`](super::kernels::dropzeros) to remove them.

use super::csc::CscMatrix;
use super::kernels::Workspace;
use crate::dense::{DenseMatrix, ElementwiseOp};
use crate::error::{Error, Result};

/// Which positions a sparse merge keeps
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Positions stored in either operand (add, subtract)
    Union,
    /// Positions stored in both operands (multiply)
    Intersection,
}

/// Work done by a sparse merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Stored entries of the operands that were read
    pub visited: usize,
    /// Entries in the result
    pub output_nnz: usize,
}

fn check_same_shape(a: &CscMatrix, b: &CscMatrix) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(Error::dimension_mismatch(
            "b",
            &[a.rows, a.cols],
            &[b.rows, b.cols],
        ));
    }
    Ok(())
}

/// Merge `a` and `b` column by column, evaluating `op(a_ij, b_ij)` on the
/// kept positions (a missing operand entry reads as zero)
pub fn merge<F>(
    a: &CscMatrix,
    b: &CscMatrix,
    strategy: MergeStrategy,
    op: F,
) -> Result<(CscMatrix, MergeStats)>
where
    F: Fn(f64, f64) -> f64,
{
    check_same_shape(a, b)?;
    a.numeric_values("merge")?;
    b.numeric_values("merge")?;

    let (rows, cols) = a.shape();
    let mut wa = Workspace::new(rows);
    let mut wb = Workspace::new(rows);
    let mut pattern_a = Vec::new();
    let mut pattern_b = Vec::new();
    let mut entries: Vec<(usize, f64)> = Vec::new();

    let mut stats = MergeStats::default();
    let mut col_ptrs = Vec::with_capacity(cols + 1);
    let mut row_indices = Vec::new();
    let mut values = Vec::new();
    col_ptrs.push(0);

    for j in 0..cols {
        wa.next_generation();
        wb.next_generation();
        pattern_a.clear();
        pattern_b.clear();
        stats.visited += wa.scatter(a, j, 1.0, &mut pattern_a);
        stats.visited += wb.scatter(b, j, 1.0, &mut pattern_b);

        entries.clear();
        for &i in &pattern_a {
            if strategy == MergeStrategy::Union || wb.is_marked(i) {
                entries.push((i, op(wa.value(i), wb.value(i))));
            }
        }
        if strategy == MergeStrategy::Union {
            for &i in &pattern_b {
                if !wa.is_marked(i) {
                    entries.push((i, op(0.0, wb.value(i))));
                }
            }
        }
        entries.sort_unstable_by_key(|&(i, _)| i);
        for &(i, v) in &entries {
            row_indices.push(i);
            values.push(v);
        }
        col_ptrs.push(row_indices.len());
    }

    stats.output_nnz = row_indices.len();
    Ok((
        CscMatrix::from_parts(Some(values), row_indices, col_ptrs, rows, cols),
        stats,
    ))
}

/// `A + B`
pub fn add(a: &CscMatrix, b: &CscMatrix) -> Result<(CscMatrix, MergeStats)> {
    merge(a, b, MergeStrategy::Union, |x, y| x + y)
}

/// `A - B`
pub fn subtract(a: &CscMatrix, b: &CscMatrix) -> Result<(CscMatrix, MergeStats)> {
    merge(a, b, MergeStrategy::Union, |x, y| x - y)
}

/// Elementwise `A .* B`
pub fn multiply(a: &CscMatrix, b: &CscMatrix) -> Result<(CscMatrix, MergeStats)> {
    merge(a, b, MergeStrategy::Intersection, |x, y| x * y)
}

// ============================================================================
// Dense ⊕ sparse
// ============================================================================

/// How an operator treats an implicit zero on the sparse side
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ZeroBehavior {
    /// `op(d, 0) == 0` for every `d`: the result keeps the sparse pattern
    Annihilating,
    /// `op(d, 0)` may be nonzero: every position must be evaluated
    Dense,
}

impl ZeroBehavior {
    /// Zero behavior of `op(dense, sparse)`
    pub fn for_op(op: ElementwiseOp) -> Self {
        match op {
            ElementwiseOp::Multiply => ZeroBehavior::Annihilating,
            // d / 0 is ±inf or NaN, never zero
            ElementwiseOp::Add | ElementwiseOp::Subtract | ElementwiseOp::Divide => {
                ZeroBehavior::Dense
            }
        }
    }
}

/// Result of a dense ⊕ sparse operation
#[derive(Debug, Clone, PartialEq)]
pub enum ElementwiseResult {
    /// Only the sparse operand's pattern can be nonzero
    Sparse(CscMatrix),
    /// Every position was evaluated
    Dense(DenseMatrix),
}

impl ElementwiseResult {
    /// Dense view of the result
    pub fn to_dense(&self) -> DenseMatrix {
        match self {
            ElementwiseResult::Sparse(s) => s.to_dense(),
            ElementwiseResult::Dense(d) => d.clone(),
        }
    }
}

/// Evaluate `op(dense[i, j], sparse[i, j])`
///
/// With [`ZeroBehavior::Annihilating`] only the stored entries of `sparse` are
/// evaluated and the result stays sparse. Otherwise the result is dense.
pub fn apply_dense_sparse(
    dense: &DenseMatrix,
    sparse: &CscMatrix,
    op: ElementwiseOp,
    zero_behavior: ZeroBehavior,
) -> Result<ElementwiseResult> {
    if dense.shape() != sparse.shape() {
        return Err(Error::dimension_mismatch(
            "sparse",
            &[dense.rows(), dense.cols()],
            &[sparse.rows, sparse.cols],
        ));
    }
    let svals = sparse.numeric_values("apply_dense_sparse")?;

    match zero_behavior {
        ZeroBehavior::Annihilating => {
            let values = (0..sparse.cols)
                .flat_map(|j| sparse.col_range(j).map(move |p| (j, p)))
                .map(|(j, p)| op.apply(dense.get(sparse.row_indices[p], j), svals[p]))
                .collect();
            Ok(ElementwiseResult::Sparse(CscMatrix::from_parts(
                Some(values),
                sparse.row_indices.clone(),
                sparse.col_ptrs.clone(),
                sparse.rows,
                sparse.cols,
            )))
        }
        ZeroBehavior::Dense => {
            let expanded = sparse.to_dense();
            let data = crate::dense::elementwise::elementwise(op, dense.data(), expanded.data());
            Ok(ElementwiseResult::Dense(DenseMatrix::new(
                data,
                dense.rows(),
                dense.cols(),
            )?))
        }
    }
}
