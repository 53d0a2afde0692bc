//! Dense triangular and diagonal solves
//!
//! A zero on the diagonal means no unique solution: these routines return
//! `Ok(None)` for it and keep `Err` for shape mistakes.

use crate::dense::DenseMatrix;
use crate::dense::validate_square;
use crate::error::{Error, Result};

fn check_rhs(n: usize, b: &[f64]) -> Result<()> {
    if b.len() != n {
        return Err(Error::dimension_mismatch("b", &[n], &[b.len()]));
    }
    Ok(())
}

/// Solve `L x = b` for lower-triangular `L`; entries above the diagonal are
/// ignored
pub fn forward_substitution(l: &DenseMatrix, b: &[f64]) -> Result<Option<Vec<f64>>> {
    let n = validate_square(l)?;
    check_rhs(n, b)?;
    let mut x = b.to_vec();
    for i in 0..n {
        let row = l.row(i);
        let mut sum = x[i];
        for (j, &lij) in row[..i].iter().enumerate() {
            sum -= lij * x[j];
        }
        if row[i] == 0.0 {
            return Ok(None);
        }
        x[i] = sum / row[i];
    }
    Ok(Some(x))
}

/// Solve `U x = b` for upper-triangular `U`; entries below the diagonal are
/// ignored
pub fn backward_substitution(u: &DenseMatrix, b: &[f64]) -> Result<Option<Vec<f64>>> {
    let n = validate_square(u)?;
    check_rhs(n, b)?;
    let mut x = b.to_vec();
    for i in (0..n).rev() {
        let row = u.row(i);
        let mut sum = x[i];
        for (j, &uij) in row.iter().enumerate().skip(i + 1) {
            sum -= uij * x[j];
        }
        if row[i] == 0.0 {
            return Ok(None);
        }
        x[i] = sum / row[i];
    }
    Ok(Some(x))
}

/// Solve `D x = b` for the diagonal `d`
pub fn solve_diagonal(d: &[f64], b: &[f64]) -> Result<Option<Vec<f64>>> {
    check_rhs(d.len(), b)?;
    if d.contains(&0.0) {
        return Ok(None);
    }
    Ok(Some(b.iter().zip(d).map(|(bi, di)| bi / di).collect()))
}
