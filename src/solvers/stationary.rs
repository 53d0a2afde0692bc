//! Stationary iterations: Jacobi, Gauss-Seidel and SOR
//!
//! Each iteration is one full sweep over the rows. Convergence is checked on
//! the true residual `||b - A x||₂` after every sweep. A zero diagonal entry
//! stops the solve with [`ConvergenceReason::NumericalBreakdown`].

use super::operator::{LinearOperator, Start, residual, start};
use super::types::{ConvergenceReason, IterativeOptions, SolverState};
use crate::error::{Error, Result};

/// Jacobi iteration: `x_i ← (b_i - Σ_{j≠i} a_ij x_j) / a_ii` using the
/// previous iterate for every `j`
pub fn jacobi(
    a: &dyn LinearOperator,
    b: &[f64],
    x0: Option<&[f64]>,
    options: IterativeOptions,
) -> Result<SolverState> {
    let (mut x, mut r, mut norm) = match start(a, b, x0, &options)? {
        Start::Running { x, r, norm } => (x, r, norm),
        Start::Finished(done) => return Ok(done),
    };
    let rows = a.row_major();
    let diag = a.diagonal();
    let n = x.len();
    if diag.contains(&0.0) {
        return Ok(SolverState::finish(x, norm, 0, ConvergenceReason::NumericalBreakdown));
    }

    let mut next = vec![0.0; n];
    for iter in 1..=options.max_iterations {
        for i in 0..n {
            let off: f64 = rows.row(i).filter(|&(j, _)| j != i).map(|(j, v)| v * x[j]).sum();
            next[i] = (b[i] - off) / diag[i];
        }
        std::mem::swap(&mut x, &mut next);
        norm = residual(a, &x, b, &mut r);
        if !norm.is_finite() {
            return Ok(SolverState::finish(x, norm, iter, ConvergenceReason::NumericalBreakdown));
        }
        if norm < options.tolerance {
            return Ok(SolverState::finish(x, norm, iter, ConvergenceReason::Tolerance));
        }
    }
    Ok(SolverState::finish(
        x,
        norm,
        options.max_iterations,
        ConvergenceReason::MaxIterationsReached,
    ))
}

/// Gauss-Seidel iteration: Jacobi with each update used immediately
pub fn gauss_seidel(
    a: &dyn LinearOperator,
    b: &[f64],
    x0: Option<&[f64]>,
    options: IterativeOptions,
) -> Result<SolverState> {
    relaxed_sweeps(a, b, x0, 1.0, options)
}

/// Successive over-relaxation with factor `omega` in `(0, 2)`
///
/// `omega = 1` is Gauss-Seidel.
pub fn sor(
    a: &dyn LinearOperator,
    b: &[f64],
    x0: Option<&[f64]>,
    omega: f64,
    options: IterativeOptions,
) -> Result<SolverState> {
    if !(omega > 0.0 && omega < 2.0) {
        return Err(Error::invalid_argument(
            "omega",
            format!("relaxation factor must lie in (0, 2), got {omega}"),
        ));
    }
    relaxed_sweeps(a, b, x0, omega, options)
}

fn relaxed_sweeps(
    a: &dyn LinearOperator,
    b: &[f64],
    x0: Option<&[f64]>,
    omega: f64,
    options: IterativeOptions,
) -> Result<SolverState> {
    let (mut x, mut r, mut norm) = match start(a, b, x0, &options)? {
        Start::Running { x, r, norm } => (x, r, norm),
        Start::Finished(done) => return Ok(done),
    };
    let rows = a.row_major();
    let diag = a.diagonal();
    let n = x.len();
    if diag.contains(&0.0) {
        return Ok(SolverState::finish(x, norm, 0, ConvergenceReason::NumericalBreakdown));
    }

    for iter in 1..=options.max_iterations {
        for i in 0..n {
            let off: f64 = rows.row(i).filter(|&(j, _)| j != i).map(|(j, v)| v * x[j]).sum();
            let gs = (b[i] - off) / diag[i];
            x[i] += omega * (gs - x[i]);
        }
        norm = residual(a, &x, b, &mut r);
        if !norm.is_finite() {
            return Ok(SolverState::finish(x, norm, iter, ConvergenceReason::NumericalBreakdown));
        }
        if norm < options.tolerance {
            return Ok(SolverState::finish(x, norm, iter, ConvergenceReason::Tolerance));
        }
    }
    Ok(SolverState::finish(
        x,
        norm,
        options.max_iterations,
        ConvergenceReason::MaxIterationsReached,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::DenseMatrix;
    use crate::sparse::CscMatrix;

    fn diag_dominant() -> DenseMatrix {
        DenseMatrix::from_rows(&[
            vec![10.0, -1.0, 2.0, 0.0],
            vec![-1.0, 11.0, -1.0, 3.0],
            vec![2.0, -1.0, 10.0, -1.0],
            vec![0.0, 3.0, -1.0, 8.0],
        ])
        .unwrap()
    }

    const B: [f64; 4] = [6.0, 25.0, -11.0, 15.0];
    const X: [f64; 4] = [1.0, 2.0, -1.0, 1.0];

    fn assert_solution(state: &SolverState) {
        assert!(state.converged, "{}", state.reason);
        for (xi, ei) in state.x.iter().zip(X) {
            assert!((xi - ei).abs() < 1e-8, "{xi} vs {ei}");
        }
    }

    #[test]
    fn test_jacobi_converges() {
        let s = jacobi(&diag_dominant(), &B, None, IterativeOptions::default()).unwrap();
        assert_solution(&s);
        assert!(s.iterations > 1);
    }

    #[test]
    fn test_gauss_seidel_faster_than_jacobi() {
        let a = diag_dominant();
        let j = jacobi(&a, &B, None, IterativeOptions::default()).unwrap();
        let g = gauss_seidel(&a, &B, None, IterativeOptions::default()).unwrap();
        assert_solution(&g);
        assert!(g.iterations < j.iterations);
    }

    #[test]
    fn test_sor_on_sparse_operator() {
        let a = CscMatrix::from_dense(&diag_dominant());
        let s = sor(&a, &B, None, 1.1, IterativeOptions::default()).unwrap();
        assert_solution(&s);
        assert!(sor(&a, &B, None, 2.0, IterativeOptions::default()).is_err());
    }

    #[test]
    fn test_iteration_cap_is_data() {
        let opts = IterativeOptions::default().with_max_iterations(2);
        let s = jacobi(&diag_dominant(), &B, None, opts).unwrap();
        assert!(!s.converged);
        assert_eq!(s.reason, ConvergenceReason::MaxIterationsReached);
        assert_eq!(s.iterations, 2);
    }

    #[test]
    fn test_zero_diagonal_breakdown() {
        let a = DenseMatrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        let s = gauss_seidel(&a, &[1.0, 1.0], None, IterativeOptions::default()).unwrap();
        assert_eq!(s.reason, ConvergenceReason::NumericalBreakdown);
    }

    #[test]
    fn test_zero_rhs() {
        let s = jacobi(&diag_dominant(), &[0.0; 4], None, IterativeOptions::default()).unwrap();
        assert_eq!(s.reason, ConvergenceReason::ZeroRhs);
        assert_eq!(s.x, vec![0.0; 4]);
    }
}
