//! Permutation vectors and permuted copies of sparse matrices
//!
//! Convention: a permutation `p` maps new positions to old ones, so
//! `x_new[k] = x_old[p[k]]`. The inverse `pinv` maps old positions to new
//! ones: `pinv[p[k]] = k`.

use super::csc::CscMatrix;
use crate::error::{Error, Result};

/// A validated bijection on `[0, n)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    perm: Vec<usize>,
}

impl Permutation {
    /// Wrap `perm`, checking that it holds every index in `[0, n)` exactly once
    pub fn new(perm: Vec<usize>) -> Result<Self> {
        let n = perm.len();
        let mut seen = vec![false; n];
        for (k, &i) in perm.iter().enumerate() {
            if i >= n {
                return Err(Error::InvalidPermutation {
                    reason: format!("entry {k} is {i}, outside [0, {n})"),
                });
            }
            if seen[i] {
                return Err(Error::InvalidPermutation {
                    reason: format!("index {i} appears more than once"),
                });
            }
            seen[i] = true;
        }
        Ok(Self { perm })
    }

    /// Wrap a vector known to be a bijection
    pub(crate) fn from_vec_unchecked(perm: Vec<usize>) -> Self {
        debug_assert!(Self::new(perm.clone()).is_ok());
        Self { perm }
    }

    /// The identity permutation on `n` elements
    pub fn identity(n: usize) -> Self {
        Self {
            perm: (0..n).collect(),
        }
    }

    /// The inverse permutation
    pub fn inverse(&self) -> Self {
        Self {
            perm: inverse_permutation(&self.perm),
        }
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.perm.len()
    }

    /// Whether the permutation is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.perm.is_empty()
    }

    /// Whether every element maps to itself
    pub fn is_identity(&self) -> bool {
        self.perm.iter().enumerate().all(|(k, &i)| k == i)
    }

    /// The underlying index vector
    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.perm
    }

    /// Consume into the index vector
    #[inline]
    pub fn into_vec(self) -> Vec<usize> {
        self.perm
    }
}

impl AsRef<[usize]> for Permutation {
    fn as_ref(&self) -> &[usize] {
        &self.perm
    }
}

/// `pinv` with `pinv[p[k]] = k`
pub fn inverse_permutation(p: &[usize]) -> Vec<usize> {
    let mut pinv = vec![0; p.len()];
    for (k, &i) in p.iter().enumerate() {
        pinv[i] = k;
    }
    pinv
}

/// `x[k] = b[p[k]]`; `None` means the identity
pub fn pvec(p: Option<&[usize]>, b: &[f64]) -> Vec<f64> {
    match p {
        Some(p) => p.iter().map(|&i| b[i]).collect(),
        None => b.to_vec(),
    }
}

/// `x[p[k]] = b[k]`; `None` means the identity
pub fn ipvec(p: Option<&[usize]>, b: &[f64]) -> Vec<f64> {
    match p {
        Some(p) => {
            let mut x = vec![0.0; b.len()];
            for (k, &i) in p.iter().enumerate() {
                x[i] = b[k];
            }
            x
        }
        None => b.to_vec(),
    }
}

fn check_len(arg: &'static str, p: Option<&[usize]>, n: usize) -> Result<()> {
    match p {
        Some(p) if p.len() != n => Err(Error::dimension_mismatch(arg, &[n], &[p.len()])),
        _ => Ok(()),
    }
}

/// `C = P A Q` where `pinv` is the inverse row permutation and `q` the
/// column permutation (`C[:, k] = A[:, q[k]]`, row `i` of A lands on
/// `pinv[i]`); `None` means the identity
pub fn permute(a: &CscMatrix, pinv: Option<&[usize]>, q: Option<&[usize]>) -> Result<CscMatrix> {
    check_len("pinv", pinv, a.rows)?;
    check_len("q", q, a.cols)?;

    let mut col_ptrs = Vec::with_capacity(a.cols + 1);
    let mut row_indices = Vec::with_capacity(a.nnz());
    let mut values = a.values.as_ref().map(|_| Vec::with_capacity(a.nnz()));
    col_ptrs.push(0);
    for k in 0..a.cols {
        let j = q.map_or(k, |q| q[k]);
        for p in a.col_range(j) {
            let i = a.row_indices[p];
            row_indices.push(pinv.map_or(i, |pinv| pinv[i]));
            if let (Some(out), Some(src)) = (values.as_mut(), a.values.as_ref()) {
                out.push(src[p]);
            }
        }
        col_ptrs.push(row_indices.len());
    }
    Ok(CscMatrix::from_parts(values, row_indices, col_ptrs, a.rows, a.cols))
}

/// `C = P A Pᵀ` for a symmetric `A` stored as its upper triangle; the result
/// is again upper triangular
pub fn symperm(a: &CscMatrix, pinv: Option<&[usize]>) -> Result<CscMatrix> {
    if a.rows != a.cols {
        return Err(Error::NotSquare {
            rows: a.rows,
            cols: a.cols,
        });
    }
    let n = a.cols;
    check_len("pinv", pinv, n)?;
    let map = |i: usize| pinv.map_or(i, |pinv| pinv[i]);

    // Count entries per column of C
    let mut counts = vec![0usize; n];
    for j in 0..n {
        let j2 = map(j);
        for p in a.col_range(j) {
            let i = a.row_indices[p];
            if i > j {
                continue;
            }
            let i2 = map(i);
            counts[i2.max(j2)] += 1;
        }
    }
    let mut col_ptrs = vec![0usize; n + 1];
    let nz = super::kernels::cumsum(&mut col_ptrs, &mut counts);

    let mut row_indices = vec![0usize; nz];
    let mut values = a.values.as_ref().map(|_| vec![0.0; nz]);
    for j in 0..n {
        let j2 = map(j);
        for p in a.col_range(j) {
            let i = a.row_indices[p];
            if i > j {
                continue;
            }
            let i2 = map(i);
            let col = i2.max(j2);
            let dst = counts[col];
            counts[col] += 1;
            row_indices[dst] = i2.min(j2);
            if let (Some(out), Some(src)) = (values.as_mut(), a.values.as_ref()) {
                out[dst] = src[p];
            }
        }
    }
    Ok(CscMatrix::from_parts(values, row_indices, col_ptrs, n, n))
}
