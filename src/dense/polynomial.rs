//! Polynomial evaluation and root finding
//!
//! Coefficients are ordered from the highest degree down to the constant term,
//! so `[1.0, -5.0, 6.0]` is `x² - 5x + 6`. Roots are always returned as
//! [`Complex64`] values, including real roots.
//!
//! Degrees up to four use closed forms (quadratic formula, Cardano, Ferrari);
//! higher degrees use the Durand-Kerner simultaneous iteration.

use super::Complex64;
use crate::error::{Error, Result};

/// Default iteration cap for [`polynomial_roots`]
pub const DEFAULT_MAX_ITERATIONS: usize = 500;

/// Default convergence tolerance for [`polynomial_roots`]
pub const DEFAULT_TOLERANCE: f64 = 1e-12;

/// Roots together with the iteration outcome
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialRoots {
    /// One root per degree, with multiplicity
    pub roots: Vec<Complex64>,
    /// Iterations spent (0 for closed forms)
    pub iterations: usize,
    /// Whether the largest root update fell below the tolerance
    pub converged: bool,
}

/// Evaluate a real polynomial at `x` (Horner)
pub fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().fold(0.0, |acc, &c| acc * x + c)
}

/// Evaluate a real polynomial at complex `z` (Horner)
pub fn polyval_complex(coeffs: &[f64], z: Complex64) -> Complex64 {
    coeffs
        .iter()
        .fold(Complex64::ZERO, |acc, &c| acc * z + Complex64::real(c))
}

/// Drop leading zero coefficients; an all-zero polynomial has no degree
fn trim_leading_zeros(coeffs: &[f64]) -> Result<&[f64]> {
    if coeffs.iter().any(|c| !c.is_finite()) {
        return Err(Error::invalid_argument("coeffs", "coefficients must be finite"));
    }
    match coeffs.iter().position(|&c| c != 0.0) {
        Some(first) => Ok(&coeffs[first..]),
        None => Err(Error::invalid_argument(
            "coeffs",
            "the zero polynomial has no well-defined roots",
        )),
    }
}

/// Roots of `a x² + b x + c`
///
/// Uses the cancellation-free form `q = -(b + sign(b)√Δ) / 2`, roots `q/a` and
/// `c/q`. With `a == 0` the single linear root is returned.
pub fn quadratic_roots(a: f64, b: f64, c: f64) -> Result<Vec<Complex64>> {
    if a == 0.0 {
        return linear_root(b, c);
    }
    let disc = b * b - 4.0 * a * c;
    if disc >= 0.0 {
        let sqrt_disc = disc.sqrt();
        let q = -0.5 * (b + if b >= 0.0 { sqrt_disc } else { -sqrt_disc });
        if q == 0.0 {
            // b == 0 and c == 0
            return Ok(vec![Complex64::ZERO, Complex64::ZERO]);
        }
        Ok(vec![Complex64::real(q / a), Complex64::real(c / q)])
    } else {
        let re = -b / (2.0 * a);
        let im = (-disc).sqrt() / (2.0 * a).abs();
        Ok(vec![Complex64::new(re, im), Complex64::new(re, -im)])
    }
}

fn linear_root(b: f64, c: f64) -> Result<Vec<Complex64>> {
    if b == 0.0 {
        if c == 0.0 {
            return Err(Error::invalid_argument(
                "coeffs",
                "the zero polynomial has no well-defined roots",
            ));
        }
        return Ok(Vec::new());
    }
    Ok(vec![Complex64::real(-c / b)])
}

/// Roots of `a x³ + b x² + c x + d` (Cardano with the trigonometric form for
/// three real roots)
pub fn cubic_roots(a: f64, b: f64, c: f64, d: f64) -> Result<Vec<Complex64>> {
    if a == 0.0 {
        return quadratic_roots(b, c, d);
    }
    let (b, c, d) = (b / a, c / a, d / a);
    let shift = b / 3.0;

    // Depressed cubic t³ + p t + q with x = t - b/3
    let p = c - b * b / 3.0;
    let q = 2.0 * b * b * b / 27.0 - b * c / 3.0 + d;
    let half_q = q / 2.0;
    let third_p = p / 3.0;
    let disc = half_q * half_q + third_p * third_p * third_p;
    let disc_scale = (half_q * half_q).max((third_p * third_p * third_p).abs());

    let roots = if disc.abs() <= 1e-14 * disc_scale || (p == 0.0 && q == 0.0) {
        let real: Vec<f64> = if p == 0.0 {
            vec![-shift; 3]
        } else {
            let simple = 3.0 * q / p;
            let double = -3.0 * q / (2.0 * p);
            vec![simple - shift, double - shift, double - shift]
        };
        real.into_iter().map(Complex64::real).collect()
    } else if disc > 0.0 {
        let sqrt_disc = disc.sqrt();
        let u = (-half_q + sqrt_disc).cbrt();
        let v = (-half_q - sqrt_disc).cbrt();
        let re = -(u + v) / 2.0 - shift;
        let im = 3f64.sqrt() / 2.0 * (u - v);
        vec![
            Complex64::real(u + v - shift),
            Complex64::new(re, im),
            Complex64::new(re, -im),
        ]
    } else {
        let r = 2.0 * (-third_p).sqrt();
        let cos_arg = (3.0 * q / (2.0 * p) * (-3.0 / p).sqrt()).clamp(-1.0, 1.0);
        let phi = cos_arg.acos() / 3.0;
        (0..3)
            .map(|k| {
                let t = r * (phi - 2.0 * std::f64::consts::PI * k as f64 / 3.0).cos();
                Complex64::real(t - shift)
            })
            .collect()
    };

    Ok(polish(&[1.0, b, c, d], roots))
}

/// Roots of `a x⁴ + b x³ + c x² + d x + e` (Ferrari's method)
pub fn quartic_roots(a: f64, b: f64, c: f64, d: f64, e: f64) -> Result<Vec<Complex64>> {
    if a == 0.0 {
        return cubic_roots(b, c, d, e);
    }
    let (b, c, d, e) = (b / a, c / a, d / a, e / a);
    let shift = b / 4.0;

    // Depressed quartic y⁴ + p y² + q y + r with x = y - b/4
    let b2 = b * b;
    let p = c - 3.0 * b2 / 8.0;
    let q = d - b * c / 2.0 + b2 * b / 8.0;
    let r = e - b * d / 4.0 + b2 * c / 16.0 - 3.0 * b2 * b2 / 256.0;

    let scale = 1.0 + p.abs() + r.abs().sqrt();
    let ys: Vec<Complex64> = if q.abs() <= 1e-14 * scale * scale.sqrt() {
        // Biquadratic: z = y² solves z² + p z + r = 0
        quadratic_roots(1.0, p, r)?
            .into_iter()
            .flat_map(|z| {
                let s = z.sqrt();
                [s, -s]
            })
            .collect()
    } else {
        // Resolvent cubic 8m³ + 8p m² + (2p² - 8r) m - q² = 0; any nonzero
        // root makes both sides of Ferrari's identity perfect squares
        let resolvent = cubic_roots(8.0, 8.0 * p, 2.0 * p * p - 8.0 * r, -q * q)?;
        let m = resolvent
            .into_iter()
            .max_by(|x, y| x.magnitude().total_cmp(&y.magnitude()))
            .unwrap_or(Complex64::ZERO);
        let s = (m.scale(2.0)).sqrt();
        let base = Complex64::real(-2.0 * p) - m.scale(2.0);
        let q_over_s = Complex64::real(2.0 * q) / s;
        let plus = (base - q_over_s).sqrt();
        let minus = (base + q_over_s).sqrt();
        vec![
            (s + plus).scale(0.5),
            (s - plus).scale(0.5),
            (-s + minus).scale(0.5),
            (-s - minus).scale(0.5),
        ]
    };

    let roots = ys
        .into_iter()
        .map(|y| y - Complex64::real(shift))
        .collect();
    Ok(polish(&[1.0, b, c, d, e], roots))
}

/// A few Newton steps on each root, kept only when they reduce `|f|`
fn polish(coeffs: &[f64], roots: Vec<Complex64>) -> Vec<Complex64> {
    let deriv: Vec<f64> = {
        let deg = coeffs.len() - 1;
        coeffs[..deg]
            .iter()
            .enumerate()
            .map(|(i, &c)| c * (deg - i) as f64)
            .collect()
    };
    roots
        .into_iter()
        .map(|mut z| {
            for _ in 0..3 {
                let f = polyval_complex(coeffs, z);
                let df = polyval_complex(&deriv, z);
                if df.magnitude_squared() == 0.0 {
                    break;
                }
                let next = z - f / df;
                if !next.is_finite()
                    || polyval_complex(coeffs, next).magnitude() >= f.magnitude()
                {
                    break;
                }
                z = next;
            }
            // Snap numerically real roots onto the real axis
            if z.im.abs() <= 1e-14 * z.re.abs().max(1.0) {
                z.im = 0.0;
            }
            z
        })
        .collect()
}

/// Durand-Kerner (Weierstrass) iteration for all roots simultaneously
///
/// Degrees 1 through 4 are answered by the closed forms without iterating.
/// Non-convergence within `max_iterations` is reported through
/// [`PolynomialRoots::converged`], not as an error.
pub fn durand_kerner(
    coeffs: &[f64],
    max_iterations: usize,
    tolerance: f64,
) -> Result<PolynomialRoots> {
    let coeffs = trim_leading_zeros(coeffs)?;
    let degree = coeffs.len() - 1;

    let closed = match coeffs {
        [_] => Some(Vec::new()),
        &[b, c] => Some(linear_root(b, c)?),
        &[a, b, c] => Some(quadratic_roots(a, b, c)?),
        &[a, b, c, d] => Some(cubic_roots(a, b, c, d)?),
        &[a, b, c, d, e] => Some(quartic_roots(a, b, c, d, e)?),
        _ => None,
    };
    if let Some(roots) = closed {
        return Ok(PolynomialRoots {
            roots,
            iterations: 0,
            converged: true,
        });
    }

    let lead = coeffs[0];
    let monic: Vec<f64> = coeffs.iter().map(|&c| c / lead).collect();

    // Cauchy bound on root magnitude for the starting circle
    let radius = 1.0 + monic[1..].iter().fold(0.0f64, |acc, c| acc.max(c.abs()));
    let seed = Complex64::new(0.4, 0.9);
    let mut roots: Vec<Complex64> = (0..degree)
        .map(|k| seed.powi(k as u32 + 1).scale(radius / seed.magnitude().powi(k as i32 + 1)))
        .collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < max_iterations {
        iterations += 1;
        let mut max_delta = 0.0f64;
        for i in 0..degree {
            let zi = roots[i];
            let mut denom = Complex64::ONE;
            for (j, &zj) in roots.iter().enumerate() {
                if j != i {
                    denom = denom * (zi - zj);
                }
            }
            if denom.magnitude_squared() == 0.0 {
                // Coincident estimates: nudge apart
                roots[i] = zi + Complex64::new(tolerance.max(1e-8), tolerance.max(1e-8));
                max_delta = f64::INFINITY;
                continue;
            }
            let delta = polyval_complex(&monic, zi) / denom;
            roots[i] = zi - delta;
            max_delta = max_delta.max(delta.magnitude());
        }
        if max_delta < tolerance {
            converged = true;
            break;
        }
    }

    Ok(PolynomialRoots {
        roots: polish(&monic, roots),
        iterations,
        converged,
    })
}

/// All roots of a real polynomial, dispatching to the closed forms for degree
/// four and below
pub fn polynomial_roots(coeffs: &[f64]) -> Result<Vec<Complex64>> {
    let result = durand_kerner(coeffs, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE)?;
    if !result.converged {
        tracing::debug!(
            iterations = result.iterations,
            "durand-kerner hit the iteration cap"
        );
    }
    Ok(result.roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_re(roots: &[Complex64]) -> Vec<f64> {
        let mut re: Vec<f64> = roots.iter().map(|z| z.re).collect();
        re.sort_by(f64::total_cmp);
        re
    }

    fn assert_roots_of(coeffs: &[f64], roots: &[Complex64], tol: f64) {
        for &z in roots {
            let f = polyval_complex(coeffs, z);
            assert!(f.magnitude() < tol, "|f({z})| = {}", f.magnitude());
        }
    }

    #[test]
    fn test_polyval() {
        assert_eq!(polyval(&[1.0, -5.0, 6.0], 2.0), 0.0);
        assert_eq!(polyval(&[2.0, 0.0, 1.0], 3.0), 19.0);
        assert_eq!(polyval(&[], 3.0), 0.0);
    }

    #[test]
    fn test_quadratic_vieta() {
        let roots = quadratic_roots(1.0, -5.0, 6.0).unwrap();
        assert_eq!(sorted_re(&roots), vec![2.0, 3.0]);
        let sum = roots[0] + roots[1];
        let prod = roots[0] * roots[1];
        assert!((sum.re - 5.0).abs() < 1e-12);
        assert!((prod.re - 6.0).abs() < 1e-12);
        assert!(roots.iter().all(|z| z.im == 0.0));
    }

    #[test]
    fn test_quadratic_complex() {
        let roots = quadratic_roots(1.0, 0.0, 1.0).unwrap();
        assert_eq!(roots[0], Complex64::new(0.0, 1.0));
        assert_eq!(roots[1], Complex64::new(0.0, -1.0));
    }

    #[test]
    fn test_quadratic_degenerates_to_linear() {
        let roots = quadratic_roots(0.0, 2.0, -4.0).unwrap();
        assert_eq!(roots, vec![Complex64::real(2.0)]);
        assert!(quadratic_roots(0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_cubic_three_real() {
        // (x-1)(x-2)(x-3)
        let roots = cubic_roots(1.0, -6.0, 11.0, -6.0).unwrap();
        let re = sorted_re(&roots);
        for (x, e) in re.iter().zip([1.0, 2.0, 3.0]) {
            assert!((x - e).abs() < 1e-10);
        }
    }

    #[test]
    fn test_cubic_complex_pair() {
        // (x-2)(x²+1)
        let coeffs = [1.0, -2.0, 1.0, -2.0];
        let roots = cubic_roots(1.0, -2.0, 1.0, -2.0).unwrap();
        assert_roots_of(&coeffs, &roots, 1e-10);
        assert_eq!(roots.iter().filter(|z| z.im == 0.0).count(), 1);
    }

    #[test]
    fn test_cubic_triple_root() {
        let roots = cubic_roots(1.0, -3.0, 3.0, -1.0).unwrap();
        for z in roots {
            assert!((z.re - 1.0).abs() < 1e-6);
            assert!(z.im.abs() < 1e-6);
        }
    }

    #[test]
    fn test_quartic_real_and_complex() {
        // (x-1)(x+2)(x²+4) = x⁴ + x³ + 2x² + 4x - 8
        let coeffs = [1.0, 1.0, 2.0, 4.0, -8.0];
        let roots = quartic_roots(1.0, 1.0, 2.0, 4.0, -8.0).unwrap();
        assert_eq!(roots.len(), 4);
        assert_roots_of(&coeffs, &roots, 1e-9);
    }

    #[test]
    fn test_quartic_biquadratic() {
        // x⁴ - 5x² + 4 = (x²-1)(x²-4)
        let roots = quartic_roots(1.0, 0.0, -5.0, 0.0, 4.0).unwrap();
        let re = sorted_re(&roots);
        for (x, e) in re.iter().zip([-2.0, -1.0, 1.0, 2.0]) {
            assert!((x - e).abs() < 1e-12);
        }
    }

    #[test]
    fn test_durand_kerner_degree_five() {
        // (x-1)(x-2)(x-3)(x-4)(x-5)
        let coeffs = [1.0, -15.0, 85.0, -225.0, 274.0, -120.0];
        let result = durand_kerner(&coeffs, 500, 1e-12).unwrap();
        assert!(result.converged);
        assert!(result.iterations > 0);
        let re = sorted_re(&result.roots);
        for (x, e) in re.iter().zip([1.0, 2.0, 3.0, 4.0, 5.0]) {
            assert!((x - e).abs() < 1e-8);
        }
    }

    #[test]
    fn test_durand_kerner_uses_closed_form_for_low_degree() {
        let result = durand_kerner(&[0.0, 1.0, -5.0, 6.0], 10, 1e-12).unwrap();
        assert_eq!(result.iterations, 0);
        assert_eq!(sorted_re(&result.roots), vec![2.0, 3.0]);
    }

    #[test]
    fn test_polynomial_roots_rejects_zero_polynomial() {
        assert!(polynomial_roots(&[0.0, 0.0]).is_err());
        assert!(polynomial_roots(&[3.0]).unwrap().is_empty());
    }
}
