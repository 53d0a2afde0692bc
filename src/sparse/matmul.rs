//! Sparse products: matrix-vector, sparse × dense, sparse × sparse

use super::csc::CscMatrix;
use super::kernels::Workspace;
use crate::dense::DenseMatrix;
use crate::error::{Error, Result};

/// `y = A x`
pub fn spmv(a: &CscMatrix, x: &[f64]) -> Result<Vec<f64>> {
    if x.len() != a.cols {
        return Err(Error::dimension_mismatch("x", &[a.cols], &[x.len()]));
    }
    let values = a.numeric_values("spmv")?;
    let mut y = vec![0.0; a.rows];
    for (j, &xj) in x.iter().enumerate() {
        if xj == 0.0 {
            continue;
        }
        for p in a.col_range(j) {
            y[a.row_indices[p]] += values[p] * xj;
        }
    }
    Ok(y)
}

/// `y = Aᵀ x`
pub fn spmv_transpose(a: &CscMatrix, x: &[f64]) -> Result<Vec<f64>> {
    if x.len() != a.rows {
        return Err(Error::dimension_mismatch("x", &[a.rows], &[x.len()]));
    }
    let values = a.numeric_values("spmv_transpose")?;
    Ok((0..a.cols)
        .map(|j| a.col_range(j).map(|p| values[p] * x[a.row_indices[p]]).sum())
        .collect())
}

/// `C = A B` with `B` dense; the result is dense
pub fn sparse_dense_multiply(a: &CscMatrix, b: &DenseMatrix) -> Result<DenseMatrix> {
    if b.rows() != a.cols {
        return Err(Error::dimension_mismatch(
            "b",
            &[a.cols, b.cols()],
            &[b.rows(), b.cols()],
        ));
    }
    let values = a.numeric_values("sparse_dense_multiply")?;
    let n = b.cols();
    let mut out = DenseMatrix::zeros(a.rows, n);
    let out_data = out.data_mut();
    // Row k of B scales column k of A into the output rows
    for k in 0..a.cols {
        let b_row = b.row(k);
        for p in a.col_range(k) {
            let i = a.row_indices[p];
            let aik = values[p];
            let out_row = &mut out_data[i * n..(i + 1) * n];
            for (o, &bkj) in out_row.iter_mut().zip(b_row) {
                *o += aik * bkj;
            }
        }
    }
    Ok(out)
}

/// `C = A B` for two sparse matrices (Gustavson's column algorithm)
///
/// Column `j` of `C` accumulates `b_kj * A[:, k]` over the entries of
/// `B[:, j]` in a [`Workspace`]. Output row indices are sorted.
pub fn sparse_multiply(a: &CscMatrix, b: &CscMatrix) -> Result<CscMatrix> {
    if a.cols != b.rows {
        return Err(Error::dimension_mismatch(
            "b",
            &[a.cols, b.cols],
            &[b.rows, b.cols],
        ));
    }
    a.numeric_values("sparse_multiply")?;
    let b_values = b.numeric_values("sparse_multiply")?;

    let mut ws = Workspace::new(a.rows);
    let mut pattern = Vec::new();
    let mut col_ptrs = Vec::with_capacity(b.cols + 1);
    let mut row_indices = Vec::new();
    let mut values = Vec::new();
    col_ptrs.push(0);

    for j in 0..b.cols {
        ws.next_generation();
        pattern.clear();
        for p in b.col_range(j) {
            ws.scatter(a, b.row_indices[p], b_values[p], &mut pattern);
        }
        pattern.sort_unstable();
        values.extend(ws.gather(&pattern));
        row_indices.extend_from_slice(&pattern);
        col_ptrs.push(row_indices.len());
    }

    Ok(CscMatrix::from_parts(
        Some(values),
        row_indices,
        col_ptrs,
        a.rows,
        b.cols,
    ))
}
