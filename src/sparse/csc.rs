//! Compressed sparse column matrix: construction, conversion, accessors

use std::ops::Range;

use crate::dense::DenseMatrix;
use crate::error::{Error, Result};

/// CSC (Compressed Sparse Column) matrix of `f64`
///
/// Column `j` occupies `col_ptrs[j]..col_ptrs[j + 1]` of `row_indices` (and of
/// `values`). Row indices inside a column need not be sorted unless a routine
/// says otherwise. A matrix without `values` is a pattern: a 0/1 structure
/// that arithmetic routines reject with [`Error::PatternMatrix`].
#[derive(Debug, Clone, PartialEq)]
pub struct CscMatrix {
    pub(crate) values: Option<Vec<f64>>,
    pub(crate) row_indices: Vec<usize>,
    pub(crate) col_ptrs: Vec<usize>,
    pub(crate) rows: usize,
    pub(crate) cols: usize,
}

impl CscMatrix {
    /// Create a matrix from its three arrays, validating the structure
    pub fn new(
        values: Option<Vec<f64>>,
        row_indices: Vec<usize>,
        col_ptrs: Vec<usize>,
        rows: usize,
        cols: usize,
    ) -> Result<Self> {
        let m = Self {
            values,
            row_indices,
            col_ptrs,
            rows,
            cols,
        };
        m.validate()?;
        Ok(m)
    }

    /// Build without validation; callers guarantee the CSC invariants
    pub(crate) fn from_parts(
        values: Option<Vec<f64>>,
        row_indices: Vec<usize>,
        col_ptrs: Vec<usize>,
        rows: usize,
        cols: usize,
    ) -> Self {
        debug_assert_eq!(col_ptrs.len(), cols + 1);
        debug_assert_eq!(col_ptrs[cols], row_indices.len());
        Self {
            values,
            row_indices,
            col_ptrs,
            rows,
            cols,
        }
    }

    /// All-zero `rows x cols` matrix
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::from_parts(Some(Vec::new()), Vec::new(), vec![0; cols + 1], rows, cols)
    }

    /// Sparse identity of order `n`
    pub fn identity(n: usize) -> Self {
        Self::from_parts(
            Some(vec![1.0; n]),
            (0..n).collect(),
            (0..=n).collect(),
            n,
            n,
        )
    }

    /// Compress `(row, col, value)` triplets, summing duplicates
    ///
    /// The sum of all values is preserved. Row indices come out sorted within
    /// each column.
    pub fn from_triplets(rows: usize, cols: usize, triplets: &[(usize, usize, f64)]) -> Result<Self> {
        for &(i, j, _) in triplets {
            if i >= rows || j >= cols {
                return Err(Error::invalid_argument(
                    "triplets",
                    format!("entry ({i}, {j}) outside a {rows}x{cols} matrix"),
                ));
            }
        }

        // Count entries per column, then place them
        let mut col_ptrs = vec![0usize; cols + 1];
        let mut counts = vec![0usize; cols];
        for &(_, j, _) in triplets {
            counts[j] += 1;
        }
        super::kernels::cumsum(&mut col_ptrs, &mut counts);
        let mut row_indices = vec![0usize; triplets.len()];
        let mut values = vec![0.0; triplets.len()];
        for &(i, j, v) in triplets {
            let dst = counts[j];
            row_indices[dst] = i;
            values[dst] = v;
            counts[j] += 1;
        }

        let mut m = Self::from_parts(Some(values), row_indices, col_ptrs, rows, cols);
        m.sum_duplicates();
        Ok(m)
    }

    /// Convert a dense matrix, keeping entries that are not exactly zero
    pub fn from_dense(a: &DenseMatrix) -> Self {
        let (rows, cols) = a.shape();
        let mut col_ptrs = Vec::with_capacity(cols + 1);
        let mut row_indices = Vec::new();
        let mut values = Vec::new();
        col_ptrs.push(0);
        for j in 0..cols {
            for i in 0..rows {
                let v = a.get(i, j);
                if v != 0.0 {
                    row_indices.push(i);
                    values.push(v);
                }
            }
            col_ptrs.push(row_indices.len());
        }
        Self::from_parts(Some(values), row_indices, col_ptrs, rows, cols)
    }

    /// Expand to a dense matrix; a pattern expands to ones on its structure
    ///
    /// Duplicate entries are summed.
    pub fn to_dense(&self) -> DenseMatrix {
        let mut out = DenseMatrix::zeros(self.rows, self.cols);
        for j in 0..self.cols {
            for p in self.col_range(j) {
                let i = self.row_indices[p];
                let v = self.values.as_ref().map_or(1.0, |vals| vals[p]);
                let cur = out.get(i, j);
                out.set(i, j, cur + v);
            }
        }
        out
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

    /// Number of stored entries
    #[inline]
    pub fn nnz(&self) -> usize {
        self.col_ptrs[self.cols]
    }

    /// Whether this is a pattern (structure-only) matrix
    #[inline]
    pub fn is_pattern(&self) -> bool {
        self.values.is_none()
    }

    /// Column pointers, length `cols + 1`
    #[inline]
    pub fn col_ptrs(&self) -> &[usize] {
        &self.col_ptrs
    }

    /// Row index of every stored entry
    #[inline]
    pub fn row_indices(&self) -> &[usize] {
        &self.row_indices
    }

    /// Stored values, `None` for a pattern
    #[inline]
    pub fn values(&self) -> Option<&[f64]> {
        self.values.as_deref()
    }

    /// Stored values, or `Error::PatternMatrix` naming `op`
    #[inline]
    pub fn numeric_values(&self, op: &'static str) -> Result<&[f64]> {
        self.values.as_deref().ok_or(Error::PatternMatrix { op })
    }

    /// Index range of column `j` into `row_indices` / `values`
    #[inline]
    pub fn col_range(&self, j: usize) -> Range<usize> {
        self.col_ptrs[j]..self.col_ptrs[j + 1]
    }

    /// Value at `(i, j)`, summing duplicates; zero when not stored
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.col_range(j)
            .filter(|&p| self.row_indices[p] == i)
            .map(|p| self.values.as_ref().map_or(1.0, |v| v[p]))
            .sum()
    }

    /// Structure-only copy
    pub fn pattern(&self) -> CscMatrix {
        Self::from_parts(
            None,
            self.row_indices.clone(),
            self.col_ptrs.clone(),
            self.rows,
            self.cols,
        )
    }

    /// Transpose; a pattern stays a pattern
    ///
    /// Row indices of the result are sorted within each column.
    pub fn transpose(&self) -> CscMatrix {
        let mut counts = vec![0usize; self.rows];
        for &i in &self.row_indices {
            counts[i] += 1;
        }
        let mut col_ptrs = vec![0usize; self.rows + 1];
        super::kernels::cumsum(&mut col_ptrs, &mut counts);

        let nnz = self.nnz();
        let mut row_indices = vec![0usize; nnz];
        let mut values = self.values.as_ref().map(|_| vec![0.0; nnz]);
        for j in 0..self.cols {
            for p in self.col_range(j) {
                let dst = counts[self.row_indices[p]];
                counts[self.row_indices[p]] += 1;
                row_indices[dst] = j;
                if let (Some(out), Some(src)) = (values.as_mut(), self.values.as_ref()) {
                    out[dst] = src[p];
                }
            }
        }
        Self::from_parts(values, row_indices, col_ptrs, self.cols, self.rows)
    }

    /// Sort row indices within every column
    pub fn sort_indices(&mut self) {
        let mut scratch: Vec<(usize, f64)> = Vec::new();
        for j in 0..self.cols {
            let range = self.col_range(j);
            if range.len() < 2 {
                continue;
            }
            match self.values.as_mut() {
                Some(values) => {
                    scratch.clear();
                    scratch.extend(
                        range
                            .clone()
                            .map(|p| (self.row_indices[p], values[p])),
                    );
                    scratch.sort_by_key(|&(i, _)| i);
                    for (offset, &(i, v)) in scratch.iter().enumerate() {
                        self.row_indices[range.start + offset] = i;
                        values[range.start + offset] = v;
                    }
                }
                None => self.row_indices[range].sort_unstable(),
            }
        }
    }

    /// Whether row indices are strictly increasing within every column
    pub fn is_sorted(&self) -> bool {
        (0..self.cols).all(|j| {
            self.row_indices[self.col_range(j)]
                .windows(2)
                .all(|w| w[0] < w[1])
        })
    }

    /// Merge duplicate entries in each column, summing their values
    pub fn sum_duplicates(&mut self) {
        self.sort_indices();
        let mut write = 0;
        let mut start = 0;
        for j in 0..self.cols {
            let end = self.col_ptrs[j + 1];
            let col_start = write;
            for p in start..end {
                let i = self.row_indices[p];
                if write > col_start && self.row_indices[write - 1] == i {
                    if let Some(v) = self.values.as_mut() {
                        let dup = v[p];
                        v[write - 1] += dup;
                    }
                    continue;
                }
                self.row_indices[write] = i;
                if let Some(v) = self.values.as_mut() {
                    let keep = v[p];
                    v[write] = keep;
                }
                write += 1;
            }
            start = end;
            self.col_ptrs[j + 1] = write;
        }
        self.row_indices.truncate(write);
        if let Some(v) = self.values.as_mut() {
            v.truncate(write);
        }
    }

    /// Check the CSC invariants
    pub fn validate(&self) -> Result<()> {
        if self.col_ptrs.len() != self.cols + 1 {
            return Err(Error::dimension_mismatch(
                "col_ptrs",
                &[self.cols + 1],
                &[self.col_ptrs.len()],
            ));
        }
        if self.col_ptrs[0] != 0 {
            return Err(Error::invalid_argument("col_ptrs", "col_ptrs[0] must be 0"));
        }
        if self.col_ptrs.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::invalid_argument("col_ptrs", "must be non-decreasing"));
        }
        let nnz = self.col_ptrs[self.cols];
        if self.row_indices.len() != nnz {
            return Err(Error::dimension_mismatch(
                "row_indices",
                &[nnz],
                &[self.row_indices.len()],
            ));
        }
        if let Some(values) = &self.values {
            if values.len() != nnz {
                return Err(Error::dimension_mismatch("values", &[nnz], &[values.len()]));
            }
        }
        if let Some(&bad) = self.row_indices.iter().find(|&&i| i >= self.rows) {
            return Err(Error::invalid_argument(
                "row_indices",
                format!("row index {bad} out of range for {} rows", self.rows),
            ));
        }
        Ok(())
    }

    /// Consume into `(values, row_indices, col_ptrs, rows, cols)`
    pub fn into_parts(self) -> (Option<Vec<f64>>, Vec<usize>, Vec<usize>, usize, usize) {
        (self.values, self.row_indices, self.col_ptrs, self.rows, self.cols)
    }
}
