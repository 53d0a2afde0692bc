//! Shared types for the iterative solvers: options, convergence diagnostics
//! and the solver result record

/// Default iteration cap
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// Default absolute residual tolerance
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

/// Termination controls shared by every iterative solver
///
/// A solve stops once `||b - A x||₂ < tolerance` or after `max_iterations`
/// iterations, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterativeOptions {
    /// Maximum number of iterations (matrix-vector products for Krylov methods)
    pub max_iterations: usize,
    /// Absolute residual tolerance
    pub tolerance: f64,
}

impl Default for IterativeOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl IterativeOptions {
    /// Set the iteration cap
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the residual tolerance
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Reason why an iterative solver terminated
///
/// Provides actionable information about solver behavior for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceReason {
    /// Converged: ||r|| < tolerance
    Tolerance,

    /// Converged: ||b|| = 0 and no starting guess, so x = 0 is the solution
    ZeroRhs,

    /// Converged: Krylov subspace spans exact solution (lucky breakdown)
    LuckyBreakdown,

    /// Did not converge: maximum iterations reached
    ///
    /// **Hint**: Increase `max_iterations` or loosen the tolerance
    MaxIterationsReached,

    /// Did not converge: numerical breakdown (zero diagonal, zero denominator or NaN)
    ///
    /// **Hint**: Matrix may be singular, indefinite or have zeros on the diagonal
    NumericalBreakdown,
}

impl ConvergenceReason {
    /// Returns true if this reason indicates successful convergence
    #[inline]
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceReason::Tolerance
                | ConvergenceReason::ZeroRhs
                | ConvergenceReason::LuckyBreakdown
        )
    }

    /// Returns a human-readable hint for non-converged cases
    pub fn hint(&self) -> &'static str {
        match self {
            ConvergenceReason::Tolerance
            | ConvergenceReason::ZeroRhs
            | ConvergenceReason::LuckyBreakdown => "Converged successfully",

            ConvergenceReason::MaxIterationsReached => {
                "Increase max_iterations or loosen the tolerance"
            }

            ConvergenceReason::NumericalBreakdown => {
                "Matrix may be singular or indefinite, or has a zero on the diagonal"
            }
        }
    }
}

impl std::fmt::Display for ConvergenceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConvergenceReason::Tolerance => write!(f, "tolerance met"),
            ConvergenceReason::ZeroRhs => write!(f, "zero RHS"),
            ConvergenceReason::LuckyBreakdown => write!(f, "lucky breakdown"),
            ConvergenceReason::MaxIterationsReached => write!(f, "max iterations reached"),
            ConvergenceReason::NumericalBreakdown => write!(f, "numerical breakdown"),
        }
    }
}

/// Outcome of an iterative solve
///
/// Non-convergence is data: `x` holds the last iterate and `reason` says why
/// the solver stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverState {
    /// Final iterate
    pub x: Vec<f64>,
    /// `||b - A x||₂` at the final iterate
    pub residual_norm: f64,
    /// Iterations performed
    pub iterations: usize,
    /// Whether the tolerance was met
    pub converged: bool,
    /// Why the solver stopped
    pub reason: ConvergenceReason,
}

impl SolverState {
    pub(crate) fn finish(
        x: Vec<f64>,
        residual_norm: f64,
        iterations: usize,
        reason: ConvergenceReason,
    ) -> Self {
        Self {
            x,
            residual_norm,
            iterations,
            converged: reason.is_converged(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = IterativeOptions::default();
        assert_eq!(opts.max_iterations, 1000);
        assert_eq!(opts.tolerance, 1e-10);
        let opts = opts.with_max_iterations(5).with_tolerance(1e-3);
        assert_eq!(opts.max_iterations, 5);
        assert_eq!(opts.tolerance, 1e-3);
    }

    #[test]
    fn test_reason_classification() {
        assert!(ConvergenceReason::Tolerance.is_converged());
        assert!(ConvergenceReason::LuckyBreakdown.is_converged());
        assert!(!ConvergenceReason::MaxIterationsReached.is_converged());
        assert!(!ConvergenceReason::NumericalBreakdown.is_converged());
        assert_eq!(ConvergenceReason::ZeroRhs.to_string(), "zero RHS");
        assert!(ConvergenceReason::MaxIterationsReached.hint().contains("max_iterations"));
    }

    #[test]
    fn test_finish_sets_converged_flag() {
        let s = SolverState::finish(vec![1.0], 0.5, 3, ConvergenceReason::MaxIterationsReached);
        assert!(!s.converged);
        let s = SolverState::finish(vec![1.0], 0.0, 3, ConvergenceReason::Tolerance);
        assert!(s.converged);
    }
}
