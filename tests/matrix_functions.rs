//! Integration tests for expm, sqrtm and pinv

use numr_engine::dense::{DenseMatrix, expm, pinv, sqrtm};
use numr_engine::error::Error;

mod common;
use common::{assert_allclose, random_matrix, random_spd, rng};

fn mul(a: &DenseMatrix, b: &DenseMatrix) -> DenseMatrix {
    a.matmul(b).unwrap()
}

fn negate(a: &DenseMatrix) -> DenseMatrix {
    let data = a.data().iter().map(|v| -v).collect();
    DenseMatrix::new(data, a.rows(), a.cols()).unwrap()
}

// ============================================================================
// expm
// ============================================================================

#[test]
fn test_expm_zero_and_diagonal() {
    let z = expm(&DenseMatrix::zeros(4, 4)).unwrap();
    assert_allclose(z.data(), DenseMatrix::identity(4).data(), 0.0, 1e-15, "exp(0)");

    let d = DenseMatrix::from_rows(&[vec![1.0, 0.0], vec![0.0, -2.0]]).unwrap();
    let e = expm(&d).unwrap();
    let expected = [1f64.exp(), 0.0, 0.0, (-2f64).exp()];
    assert_allclose(e.data(), &expected, 1e-13, 1e-15, "exp(diag)");
}

#[test]
fn test_expm_inverse_pair() {
    let mut rng = rng(151);
    for (n, scale) in [(3, 0.1), (5, 1.0), (6, 2.0)] {
        let base = random_matrix(&mut rng, n, n);
        let data = base.data().iter().map(|v| v * scale).collect();
        let a = DenseMatrix::new(data, n, n).unwrap();
        let prod = mul(&expm(&a).unwrap(), &expm(&negate(&a)).unwrap());
        assert_allclose(prod.data(), DenseMatrix::identity(n).data(), 0.0, 1e-8, "e^A e^-A");
    }
}

#[test]
fn test_expm_nilpotent_is_exact_series() {
    // N² = 0, so exp(N) = I + N
    let n = DenseMatrix::from_rows(&[vec![0.0, 3.0], vec![0.0, 0.0]]).unwrap();
    let e = expm(&n).unwrap();
    assert_allclose(e.data(), &[1.0, 3.0, 0.0, 1.0], 0.0, 1e-14, "exp(N)");
    assert!(matches!(expm(&DenseMatrix::zeros(2, 3)), Err(Error::NotSquare { .. })));
}

#[test]
fn test_expm_rejects_non_finite_entries_promptly() {
    for bad in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
        let a = DenseMatrix::from_rows(&[vec![1.0, bad], vec![0.0, 1.0]]).unwrap();
        assert!(matches!(expm(&a), Err(Error::InvalidArgument { arg: "a", .. })));
    }
    // Finite entries whose column sum overflows
    let huge = DenseMatrix::from_rows(&[vec![f64::MAX, 0.0], vec![f64::MAX, 0.0]]).unwrap();
    assert!(matches!(expm(&huge), Err(Error::InvalidArgument { .. })));

    // Large but finite norms take many squarings and still finish
    let big = DenseMatrix::from_rows(&[vec![1e300]]).unwrap();
    let e = expm(&big).unwrap();
    assert_eq!(e.get(0, 0), f64::INFINITY);
}

// ============================================================================
// sqrtm
// ============================================================================

#[test]
fn test_sqrtm_squares_back_and_is_symmetric() {
    let mut rng = rng(157);
    let a = random_spd(&mut rng, 6);
    let s = sqrtm(&a).unwrap();
    assert_allclose(mul(&s, &s).data(), a.data(), 1e-10, 1e-10, "√A·√A");
    assert_allclose(s.data(), s.transpose().data(), 0.0, 1e-10, "√A symmetric");
}

#[test]
fn test_sqrtm_singular_reports_not_converged() {
    let a = DenseMatrix::from_rows(&[vec![0.0, 1.0], vec![0.0, 0.0]]).unwrap();
    assert!(matches!(sqrtm(&a), Err(Error::NotConverged { .. })));
}

// ============================================================================
// pinv
// ============================================================================

#[test]
fn test_pinv_penrose_conditions() {
    let mut rng = rng(163);
    // Rank 2 matrix of shape 5x4
    let u = random_matrix(&mut rng, 5, 2);
    let v = random_matrix(&mut rng, 2, 4);
    let a = mul(&u, &v);
    let p = pinv(&a).unwrap();
    assert_eq!(p.shape(), (4, 5));

    let apa = mul(&mul(&a, &p), &a);
    assert_allclose(apa.data(), a.data(), 0.0, 1e-10, "A A⁺ A = A");
    let pap = mul(&mul(&p, &a), &p);
    assert_allclose(pap.data(), p.data(), 0.0, 1e-8, "A⁺ A A⁺ = A⁺");
    let ap = mul(&a, &p);
    assert_allclose(ap.data(), ap.transpose().data(), 0.0, 1e-10, "A A⁺ symmetric");
    let pa = mul(&p, &a);
    assert_allclose(pa.data(), pa.transpose().data(), 0.0, 1e-10, "A⁺ A symmetric");
}

#[test]
fn test_pinv_of_invertible_is_inverse() {
    let a = DenseMatrix::from_rows(&[vec![4.0, 7.0], vec![2.0, 6.0]]).unwrap();
    let p = pinv(&a).unwrap();
    assert_allclose(p.data(), &[0.6, -0.7, -0.2, 0.4], 0.0, 1e-13, "pinv = inv");
    assert_eq!(pinv(&DenseMatrix::zeros(0, 3)).unwrap().shape(), (3, 0));
}
