//! Matrix functions: square root, exponential and pseudoinverse
//!
//! All three are approximations with a stated tolerance, not exact
//! arithmetic.

use super::solve::lusolve;
use super::svd::svd;
use super::{DenseMatrix, identity, matmul, norm_one, validate_square};
use crate::error::{Error, Result};

// ============================================================================
// Convergence Constants
// ============================================================================

/// Maximum iterations for Denman-Beavers square root iteration
pub const SQRTM_MAX_ITER: usize = 50;

/// Relative change in the iterate below which Denman-Beavers stops
pub const SQRTM_TOLERANCE: f64 = 1e-12;

// ============================================================================
// Matrix Square Root
// ============================================================================

/// Principal matrix square root by Denman-Beavers iteration
///
/// ```text
/// Y₀ = A, Z₀ = I
/// Yₖ₊₁ = (Yₖ + Zₖ⁻¹) / 2
/// Zₖ₊₁ = (Zₖ + Yₖ⁻¹) / 2
/// ```
///
/// `Y` converges to `√A` and `Z` to `√A⁻¹` when `A` has no eigenvalues on the
/// closed negative real axis. Iteration stops on a relative Frobenius change
/// below [`SQRTM_TOLERANCE`] or after [`SQRTM_MAX_ITER`] steps; in the second
/// case the last iterate is returned. A singular iterate or a non-finite value
/// is reported as `Error::NotConverged`.
pub fn sqrtm(a: &DenseMatrix) -> Result<DenseMatrix> {
    let n = validate_square(a)?;
    if n == 0 {
        return Ok(DenseMatrix::zeros(0, 0));
    }

    let mut y = a.clone();
    let mut z = DenseMatrix::identity(n);

    for iter in 0..SQRTM_MAX_ITER {
        let not_converged = || Error::NotConverged {
            op: "sqrtm",
            iterations: iter,
        };
        let y_inv = super::inverse(&y)?.ok_or_else(not_converged)?;
        let z_inv = super::inverse(&z)?.ok_or_else(not_converged)?;

        let mut diff = 0.0;
        let mut y_norm = 0.0;
        for i in 0..n * n {
            let y_new = (y.data[i] + z_inv.data[i]) / 2.0;
            let z_new = (z.data[i] + y_inv.data[i]) / 2.0;
            diff += (y_new - y.data[i]) * (y_new - y.data[i]);
            y_norm += y.data[i] * y.data[i];
            y.data[i] = y_new;
            z.data[i] = z_new;
        }

        if !diff.is_finite() || y.data.iter().any(|v| !v.is_finite()) {
            return Err(not_converged());
        }
        if diff.sqrt() / y_norm.sqrt().max(1.0) < SQRTM_TOLERANCE {
            break;
        }
    }

    Ok(y)
}

// ============================================================================
// Matrix Exponential
// ============================================================================

/// Padé [13/13] numerator coefficients
const PADE13: [f64; 14] = [
    64764752532480000.0,
    32382376266240000.0,
    7771770303897600.0,
    1187353796428800.0,
    129060195264000.0,
    10559470521600.0,
    670442572800.0,
    33522128640.0,
    1323241920.0,
    40840800.0,
    960960.0,
    16380.0,
    182.0,
    1.0,
];

/// Low-order Padé coefficients paired with the 1-norm bound up to which each
/// order is accurate to double precision (Higham 2005)
const PADE_LOW: [(f64, &[f64]); 4] = [
    (1.495585217958292e-2, &[120.0, 60.0, 12.0, 1.0]),
    (
        2.539398330063230e-1,
        &[30240.0, 15120.0, 3360.0, 420.0, 30.0, 1.0],
    ),
    (
        9.504178996162932e-1,
        &[17297280.0, 8648640.0, 1995840.0, 277200.0, 25200.0, 1512.0, 56.0, 1.0],
    ),
    (
        2.097847961257068,
        &[
            17643225600.0,
            8821612800.0,
            2075673600.0,
            302702400.0,
            30270240.0,
            2162160.0,
            110880.0,
            3960.0,
            90.0,
            1.0,
        ],
    ),
];

const THETA_13: f64 = 5.371920351148152;

/// `Σ c_k M_k` over equally shaped buffers
fn linear_combination<M: AsRef<[f64]>>(terms: &[(f64, M)], len: usize) -> Vec<f64> {
    let mut out = vec![0.0; len];
    for (coeff, m) in terms {
        for (o, &v) in out.iter_mut().zip(m.as_ref()) {
            *o += coeff * v;
        }
    }
    out
}

/// Matrix exponential by scaling and squaring with a Padé approximant
///
/// The Padé order (3, 5, 7, 9 or 13) and the number of squarings are chosen
/// from the 1-norm of `A`. Input with NaN or infinite entries, or whose norm
/// overflows, is rejected with [`Error::InvalidArgument`].
pub fn expm(a: &DenseMatrix) -> Result<DenseMatrix> {
    let n = validate_square(a)?;
    if n == 0 {
        return Ok(DenseMatrix::zeros(0, 0));
    }
    let a_norm = norm_one(a.data(), n, n);
    if !a_norm.is_finite() || a.data().iter().any(|v| !v.is_finite()) {
        return Err(Error::invalid_argument("a", "expm needs finite entries"));
    }

    let len = n * n;
    let eye = identity(n);

    for (theta, coeffs) in PADE_LOW {
        if a_norm <= theta {
            let a2 = matmul(a.data(), a.data(), n, n, n);
            // Powers A⁰, A², A⁴, ...
            let mut even_powers = vec![eye.clone(), a2.clone()];
            while even_powers.len() * 2 < coeffs.len() {
                let next = matmul(&even_powers[even_powers.len() - 1], &a2, n, n, n);
                even_powers.push(next);
            }
            let odd: Vec<(f64, &[f64])> = even_powers
                .iter()
                .enumerate()
                .filter_map(|(i, p)| coeffs.get(2 * i + 1).map(|&c| (c, p.as_slice())))
                .collect();
            let even: Vec<(f64, &[f64])> = even_powers
                .iter()
                .enumerate()
                .filter_map(|(i, p)| coeffs.get(2 * i).map(|&c| (c, p.as_slice())))
                .collect();
            let u = matmul(a.data(), &linear_combination(&odd, len), n, n, n);
            let v = linear_combination(&even, len);
            return pade_solve(&u, &v, n);
        }
    }

    // Scale so that ‖A / 2ˢ‖₁ <= θ₁₃
    let squarings = (a_norm / THETA_13).log2().ceil().max(0.0);
    if squarings > f64::from(f64::MAX_EXP) {
        return Err(Error::Internal(format!("expm scaling of {squarings} squarings")));
    }
    let s = squarings as i32;
    let factor = 0.5f64.powi(s);
    let a_s: Vec<f64> = a.data().iter().map(|&x| x * factor).collect();
    let a2 = matmul(&a_s, &a_s, n, n, n);
    let a4 = matmul(&a2, &a2, n, n, n);
    let a6 = matmul(&a4, &a2, n, n, n);
    let b = &PADE13;

    let u_inner = matmul(
        &a6,
        &linear_combination(&[(b[13], &a6), (b[11], &a4), (b[9], &a2)], len),
        n,
        n,
        n,
    );
    let u_sum = linear_combination(
        &[
            (1.0, &u_inner),
            (b[7], &a6),
            (b[5], &a4),
            (b[3], &a2),
            (b[1], &eye),
        ],
        len,
    );
    let u = matmul(&a_s, &u_sum, n, n, n);

    let v_inner = matmul(
        &a6,
        &linear_combination(&[(b[12], &a6), (b[10], &a4), (b[8], &a2)], len),
        n,
        n,
        n,
    );
    let v = linear_combination(
        &[
            (1.0, &v_inner),
            (b[6], &a6),
            (b[4], &a4),
            (b[2], &a2),
            (b[0], &eye),
        ],
        len,
    );

    let mut r = pade_solve(&u, &v, n)?;
    for _ in 0..s {
        r.data = matmul(&r.data, &r.data, n, n, n);
    }
    Ok(r)
}

/// Solve `(V - U) X = (V + U)`
fn pade_solve(u: &[f64], v: &[f64], n: usize) -> Result<DenseMatrix> {
    let den: Vec<f64> = v.iter().zip(u).map(|(v, u)| v - u).collect();
    let num: Vec<f64> = v.iter().zip(u).map(|(v, u)| v + u).collect();
    let den = DenseMatrix {
        data: den,
        rows: n,
        cols: n,
    };
    let x = lusolve(&den, &num, n)?
        .ok_or_else(|| Error::Internal("expm: Padé denominator is singular".to_string()))?;
    Ok(DenseMatrix {
        data: x,
        rows: n,
        cols: n,
    })
}

// ============================================================================
// Pseudoinverse
// ============================================================================

/// Moore-Penrose pseudoinverse via SVD
///
/// Singular values at or below `max(m, n) * σ_max * ε` are treated as zero.
/// The result is `n x m`.
pub fn pinv(a: &DenseMatrix) -> Result<DenseMatrix> {
    let (m, n) = a.shape();
    if m == 0 || n == 0 {
        return Ok(DenseMatrix::zeros(n, m));
    }
    let d = svd(a)?;
    let k = d.s.len();
    let sigma_max = d.s.first().copied().unwrap_or(0.0);
    let cutoff = m.max(n) as f64 * sigma_max * f64::EPSILON;

    // A⁺ = V · diag(1/s) · Uᵀ
    let mut out = vec![0.0; n * m];
    for (p, &sp) in d.s.iter().enumerate().take(k) {
        if sp <= cutoff {
            continue;
        }
        let inv = 1.0 / sp;
        for i in 0..n {
            let v_ip = d.vt.get(p, i) * inv;
            if v_ip == 0.0 {
                continue;
            }
            for j in 0..m {
                out[i * m + j] += v_ip * d.u.get(j, p);
            }
        }
    }

    Ok(DenseMatrix {
        data: out,
        rows: n,
        cols: m,
    })
}
