//! Krylov subspace methods: CG, restarted GMRES and BiCGSTAB
//!
//! These only touch the operator through [`LinearOperator::apply`], so they
//! work unchanged on dense and sparse storage. One iteration is one step of
//! the method; BiCGSTAB does two operator applications per step.

use super::operator::{LinearOperator, Start, residual, start};
use super::types::{ConvergenceReason, IterativeOptions, SolverState};
use crate::dense::elementwise::{dot, norm2};
use crate::error::{Error, Result};

/// `y += alpha * x`
#[inline]
fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

// ============================================================================
// Conjugate gradient
// ============================================================================

/// Conjugate gradient for symmetric positive-definite `A`
///
/// The operator is not checked for symmetry or definiteness. On unsuitable
/// input the iteration may stall, diverge or break down; that outcome is
/// reported through [`SolverState::reason`], not as an error. The reported
/// residual is the recurrence residual.
pub fn conjugate_gradient(
    a: &dyn LinearOperator,
    b: &[f64],
    x0: Option<&[f64]>,
    options: IterativeOptions,
) -> Result<SolverState> {
    let (mut x, mut r, mut norm) = match start(a, b, x0, &options)? {
        Start::Running { x, r, norm } => (x, r, norm),
        Start::Finished(done) => return Ok(done),
    };
    let n = x.len();
    let mut p = r.clone();
    let mut ap = vec![0.0; n];
    let mut rr = norm * norm;

    for iter in 1..=options.max_iterations {
        a.apply(&p, &mut ap);
        let pap = dot(&p, &ap);
        if pap == 0.0 || !pap.is_finite() {
            return Ok(SolverState::finish(x, norm, iter, ConvergenceReason::NumericalBreakdown));
        }
        let alpha = rr / pap;
        axpy(alpha, &p, &mut x);
        axpy(-alpha, &ap, &mut r);

        norm = norm2(&r);
        if !norm.is_finite() {
            return Ok(SolverState::finish(x, norm, iter, ConvergenceReason::NumericalBreakdown));
        }
        if norm < options.tolerance {
            return Ok(SolverState::finish(x, norm, iter, ConvergenceReason::Tolerance));
        }

        let rr_new = norm * norm;
        let beta = rr_new / rr;
        for (pi, &ri) in p.iter_mut().zip(&r) {
            *pi = ri + beta * *pi;
        }
        rr = rr_new;
    }
    Ok(SolverState::finish(
        x,
        norm,
        options.max_iterations,
        ConvergenceReason::MaxIterationsReached,
    ))
}

// ============================================================================
// GMRES
// ============================================================================

/// Compute Givens rotation coefficients
///
/// Given a and b, computes c, s, r such that:
/// [c  s] [a]   [r]
/// [-s c] [b] = [0]
///
/// where c^2 + s^2 = 1 and r = sqrt(a^2 + b^2) >= 0
#[inline]
fn givens_rotation(a: f64, b: f64) -> (f64, f64, f64) {
    if b.abs() < 1e-15 {
        if a >= 0.0 { (1.0, 0.0, a) } else { (-1.0, 0.0, -a) }
    } else if a.abs() < 1e-15 {
        (0.0, b.signum(), b.abs())
    } else {
        let r = a.hypot(b);
        (a / r, b / r, r)
    }
}

/// Back substitution on the rotated Hessenberg matrix; `h[j]` is column `j`
fn solve_hessenberg(h: &[Vec<f64>], g: &[f64]) -> Vec<f64> {
    let m = g.len();
    let mut y = vec![0.0; m];
    for i in (0..m).rev() {
        let mut sum = g[i];
        for j in (i + 1)..m {
            sum -= h[j][i] * y[j];
        }
        if h[i][i].abs() > 1e-15 {
            y[i] = sum / h[i][i];
        }
    }
    y
}

/// Restarted GMRES(`restart`) for general nonsingular `A`
///
/// Arnoldi with modified Gram-Schmidt builds the Krylov basis; Givens
/// rotations keep the least-squares residual estimate current. Each cycle
/// ends by recomputing the true residual, which decides convergence.
pub fn gmres(
    a: &dyn LinearOperator,
    b: &[f64],
    x0: Option<&[f64]>,
    restart: usize,
    options: IterativeOptions,
) -> Result<SolverState> {
    if restart == 0 {
        return Err(Error::invalid_argument("restart", "must be at least 1"));
    }
    let (mut x, mut r, mut beta) = match start(a, b, x0, &options)? {
        Start::Running { x, r, norm } => (x, r, norm),
        Start::Finished(done) => return Ok(done),
    };
    let n = x.len();
    let mut w = vec![0.0; n];
    let mut total = 0;

    loop {
        if !beta.is_finite() {
            return Ok(SolverState::finish(x, beta, total, ConvergenceReason::NumericalBreakdown));
        }
        if beta < options.tolerance {
            return Ok(SolverState::finish(x, beta, total, ConvergenceReason::Tolerance));
        }
        if total >= options.max_iterations {
            return Ok(SolverState::finish(
                x,
                beta,
                total,
                ConvergenceReason::MaxIterationsReached,
            ));
        }

        let mut basis: Vec<Vec<f64>> = vec![r.iter().map(|v| v / beta).collect()];
        let mut h: Vec<Vec<f64>> = Vec::with_capacity(restart);
        let mut cs: Vec<f64> = Vec::with_capacity(restart);
        let mut sn: Vec<f64> = Vec::with_capacity(restart);
        let mut g = vec![beta];
        let mut lucky = false;

        let mut j = 0;
        while j < restart && total < options.max_iterations {
            total += 1;
            a.apply(&basis[j], &mut w);

            // Modified Gram-Schmidt
            let mut col = Vec::with_capacity(j + 2);
            for v in &basis {
                let hij = dot(&w, v);
                axpy(-hij, v, &mut w);
                col.push(hij);
            }
            let h_next = norm2(&w);
            col.push(h_next);

            for i in 0..j {
                let t = cs[i] * col[i] + sn[i] * col[i + 1];
                col[i + 1] = -sn[i] * col[i] + cs[i] * col[i + 1];
                col[i] = t;
            }
            let (c, s, rr) = givens_rotation(col[j], col[j + 1]);
            cs.push(c);
            sn.push(s);
            col[j] = rr;
            col[j + 1] = 0.0;
            let gj = g[j];
            g.push(-s * gj);
            g[j] = c * gj;
            h.push(col);
            j += 1;

            if g[j].abs() < options.tolerance {
                break;
            }
            if h_next < 1e-14 {
                lucky = true;
                break;
            }
            basis.push(w.iter().map(|v| v / h_next).collect());
        }

        let y = solve_hessenberg(&h, &g[..j]);
        for (yi, v) in y.iter().zip(&basis) {
            axpy(*yi, v, &mut x);
        }
        beta = residual(a, &x, b, &mut r);
        if lucky && beta.is_finite() {
            let reason = if beta < options.tolerance {
                ConvergenceReason::LuckyBreakdown
            } else {
                ConvergenceReason::NumericalBreakdown
            };
            return Ok(SolverState::finish(x, beta, total, reason));
        }
    }
}

// ============================================================================
// BiCGSTAB
// ============================================================================

/// Stabilized bi-conjugate gradient for general nonsingular `A`
pub fn bicgstab(
    a: &dyn LinearOperator,
    b: &[f64],
    x0: Option<&[f64]>,
    options: IterativeOptions,
) -> Result<SolverState> {
    let (mut x, mut r, mut norm) = match start(a, b, x0, &options)? {
        Start::Running { x, r, norm } => (x, r, norm),
        Start::Finished(done) => return Ok(done),
    };
    let n = x.len();
    let r_hat = r.clone();
    let (mut rho, mut alpha, mut omega) = (1.0, 1.0, 1.0);
    let mut v = vec![0.0; n];
    let mut p = vec![0.0; n];
    let mut s = vec![0.0; n];
    let mut t = vec![0.0; n];

    for iter in 1..=options.max_iterations {
        let rho_new = dot(&r_hat, &r);
        if rho_new == 0.0 || !rho_new.is_finite() {
            return Ok(SolverState::finish(x, norm, iter, ConvergenceReason::NumericalBreakdown));
        }
        let beta = (rho_new / rho) * (alpha / omega);
        for i in 0..n {
            p[i] = r[i] + beta * (p[i] - omega * v[i]);
        }
        a.apply(&p, &mut v);
        let denom = dot(&r_hat, &v);
        if denom == 0.0 {
            return Ok(SolverState::finish(x, norm, iter, ConvergenceReason::NumericalBreakdown));
        }
        alpha = rho_new / denom;
        for i in 0..n {
            s[i] = r[i] - alpha * v[i];
        }

        let s_norm = norm2(&s);
        if s_norm < options.tolerance {
            axpy(alpha, &p, &mut x);
            return Ok(SolverState::finish(x, s_norm, iter, ConvergenceReason::Tolerance));
        }

        a.apply(&s, &mut t);
        let tt = dot(&t, &t);
        if tt == 0.0 {
            axpy(alpha, &p, &mut x);
            return Ok(SolverState::finish(x, s_norm, iter, ConvergenceReason::NumericalBreakdown));
        }
        omega = dot(&t, &s) / tt;
        axpy(alpha, &p, &mut x);
        axpy(omega, &s, &mut x);
        for i in 0..n {
            r[i] = s[i] - omega * t[i];
        }

        norm = norm2(&r);
        if !norm.is_finite() {
            return Ok(SolverState::finish(x, norm, iter, ConvergenceReason::NumericalBreakdown));
        }
        if norm < options.tolerance {
            return Ok(SolverState::finish(x, norm, iter, ConvergenceReason::Tolerance));
        }
        if omega == 0.0 {
            return Ok(SolverState::finish(x, norm, iter, ConvergenceReason::NumericalBreakdown));
        }
        rho = rho_new;
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

    /// SPD tridiagonal `tridiag(-1, 4, -1)` of order `n`
    fn spd(n: usize) -> DenseMatrix {
        let mut a = DenseMatrix::zeros(n, n);
        for i in 0..n {
            a.set(i, i, 4.0);
            if i + 1 < n {
                a.set(i, i + 1, -1.0);
                a.set(i + 1, i, -1.0);
            }
        }
        a
    }

    fn nonsymmetric() -> DenseMatrix {
        DenseMatrix::from_rows(&[
            vec![4.0, 1.0, 0.0, 0.0],
            vec![2.0, 5.0, 1.0, 0.0],
            vec![0.0, 3.0, 6.0, -1.0],
            vec![1.0, 0.0, -2.0, 7.0],
        ])
        .unwrap()
    }

    fn rhs(a: &dyn LinearOperator, x: &[f64]) -> Vec<f64> {
        let mut b = vec![0.0; x.len()];
        a.apply(x, &mut b);
        b
    }

    fn assert_close(a: &[f64], b: &[f64], tol: f64) {
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < tol, "{x} vs {y}");
        }
    }

    #[test]
    fn test_cg_spd_converges() {
        let a = spd(10);
        let expected: Vec<f64> = (0..10).map(|i| i as f64 - 4.5).collect();
        let b = rhs(&a, &expected);
        let s = conjugate_gradient(&a, &b, None, IterativeOptions::default()).unwrap();
        assert!(s.converged, "{}", s.reason);
        assert!(s.iterations <= 10);
        assert_close(&s.x, &expected, 1e-8);
    }

    #[test]
    fn test_cg_sparse_with_initial_guess() {
        let a = CscMatrix::from_dense(&spd(6));
        let b = rhs(&a, &[1.0; 6]);
        let s = conjugate_gradient(&a, &b, Some(&[0.5; 6]), IterativeOptions::default()).unwrap();
        assert!(s.converged);
        assert_close(&s.x, &[1.0; 6], 1e-8);
    }

    #[test]
    fn test_cg_iteration_cap() {
        let a = spd(10);
        let b = rhs(&a, &[1.0; 10]);
        let opts = IterativeOptions::default().with_max_iterations(1);
        let s = conjugate_gradient(&a, &b, None, opts).unwrap();
        assert!(!s.converged);
        assert_eq!(s.iterations, 1);
        assert_eq!(s.reason, ConvergenceReason::MaxIterationsReached);
    }

    #[test]
    fn test_cg_on_indefinite_input_is_not_an_error() {
        let a = DenseMatrix::from_rows(&[vec![1.0, 2.0], vec![2.0, -3.0]]).unwrap();
        let opts = IterativeOptions::default().with_max_iterations(5);
        assert!(conjugate_gradient(&a, &[1.0, 1.0], None, opts).is_ok());
    }

    #[test]
    fn test_gmres_nonsymmetric() {
        let a = nonsymmetric();
        let expected = [1.0, -1.0, 2.0, 0.5];
        let b = rhs(&a, &expected);
        let s = gmres(&a, &b, None, 4, IterativeOptions::default()).unwrap();
        assert!(s.converged, "{}", s.reason);
        assert!(s.residual_norm < 1e-10);
        assert_close(&s.x, &expected, 1e-8);
    }

    #[test]
    fn test_gmres_short_restart() {
        let a = CscMatrix::from_dense(&nonsymmetric());
        let expected = [0.25, 2.0, -1.0, 3.0];
        let b = rhs(&a, &expected);
        let s = gmres(&a, &b, None, 2, IterativeOptions::default()).unwrap();
        assert!(s.converged, "{}", s.reason);
        assert_close(&s.x, &expected, 1e-8);
        assert!(gmres(&a, &b, None, 0, IterativeOptions::default()).is_err());
    }

    #[test]
    fn test_bicgstab_nonsymmetric() {
        let a = nonsymmetric();
        let expected = [2.0, 0.0, -1.0, 1.0];
        let b = rhs(&a, &expected);
        let s = bicgstab(&a, &b, None, IterativeOptions::default()).unwrap();
        assert!(s.converged, "{}", s.reason);
        assert_close(&s.x, &expected, 1e-8);
    }

    #[test]
    fn test_zero_rhs_short_circuits() {
        let a = nonsymmetric();
        for s in [
            conjugate_gradient(&a, &[0.0; 4], None, IterativeOptions::default()).unwrap(),
            gmres(&a, &[0.0; 4], None, 3, IterativeOptions::default()).unwrap(),
            bicgstab(&a, &[0.0; 4], None, IterativeOptions::default()).unwrap(),
        ] {
            assert_eq!(s.reason, ConvergenceReason::ZeroRhs);
            assert_eq!(s.iterations, 0);
        }
    }

    #[test]
    fn test_givens_rotation() {
        let (c, s, r) = givens_rotation(3.0, 4.0);
        assert!((r - 5.0).abs() < 1e-15);
        assert!((c * 3.0 + s * 4.0 - 5.0).abs() < 1e-14);
        assert!((-s * 3.0 + c * 4.0).abs() < 1e-14);
        assert_eq!(givens_rotation(-2.0, 0.0), (-1.0, 0.0, 2.0));
    }
}
