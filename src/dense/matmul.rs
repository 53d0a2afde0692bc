//! Dense matrix multiplication kernels
//!
//! Three kernels share one accumulation order: for each output element the
//! products `a[i,p] * b[p,j]` are added in increasing `p`, starting from `0.0`.
//! That makes [`matmul`], [`matmul_simd`] and any row partition computed with
//! [`matmul_rows`] bitwise identical, which is what lets the bridge pick a path
//! without changing results.
//!
//! # Loop Orders
//!
//! ```text
//! matmul       i, j, p   (dot product per output element)
//! matmul_simd  i, p, j   (row axpy, 4-lane unrolled over j)
//! ```

/// Lanes processed per unrolled step in the SIMD-oriented kernel
const LANES: usize = 4;

/// Standard triple-loop matmul: C = A @ B
///
/// `a` is `m x k`, `b` is `k x n`, both row-major. Buffer lengths are the
/// caller's responsibility (see [`super::validate_buffer`]).
pub fn matmul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    let mut out = vec![0.0; m * n];
    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        for j in 0..n {
            let mut sum = 0.0;
            for (p, &a_ip) in a_row.iter().enumerate() {
                sum += a_ip * b[p * n + j];
            }
            out[i * n + j] = sum;
        }
    }
    out
}

/// SIMD-oriented matmul: C = A @ B
///
/// ikj loop with the inner loop unrolled over `LANES` output columns, which the
/// compiler turns into vector adds. No fused multiply-add is used so results
/// match [`matmul`] exactly.
pub fn matmul_simd(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    let mut out = vec![0.0; m * n];
    matmul_rows(a, b, &mut out, 0..m, k, n);
    out
}

/// Compute rows `rows` of C = A @ B into `out`
///
/// `out` holds exactly `rows.len() * n` elements (the block for this row
/// range); `a` is the full left operand.
pub fn matmul_rows(
    a: &[f64],
    b: &[f64],
    out: &mut [f64],
    rows: std::ops::Range<usize>,
    k: usize,
    n: usize,
) {
    debug_assert_eq!(out.len(), rows.len() * n);
    out.fill(0.0);
    for (local, i) in rows.enumerate() {
        let c_row = &mut out[local * n..(local + 1) * n];
        let a_row = &a[i * k..(i + 1) * k];
        for (p, &a_ip) in a_row.iter().enumerate() {
            let b_row = &b[p * n..(p + 1) * n];
            axpy_unrolled(a_ip, b_row, c_row);
        }
    }
}

/// c += alpha * b, unrolled by `LANES`
#[inline]
fn axpy_unrolled(alpha: f64, b: &[f64], c: &mut [f64]) {
    let n = c.len();
    let chunks = n / LANES;
    for chunk in 0..chunks {
        let base = chunk * LANES;
        let cb = &mut c[base..base + LANES];
        let bb = &b[base..base + LANES];
        cb[0] += alpha * bb[0];
        cb[1] += alpha * bb[1];
        cb[2] += alpha * bb[2];
        cb[3] += alpha * bb[3];
    }
    for j in chunks * LANES..n {
        c[j] += alpha * b[j];
    }
}

/// Matrix-vector product: y = A @ x, with `a` of shape `m x n`
pub fn matvec(a: &[f64], x: &[f64], m: usize, n: usize) -> Vec<f64> {
    let mut y = vec![0.0; m];
    matvec_rows(a, x, &mut y, 0..m, n);
    y
}

/// Compute entries `rows` of y = A @ x into `out`
pub fn matvec_rows(a: &[f64], x: &[f64], out: &mut [f64], rows: std::ops::Range<usize>, n: usize) {
    debug_assert_eq!(out.len(), rows.len());
    for (local, i) in rows.enumerate() {
        let a_row = &a[i * n..(i + 1) * n];
        let mut sum = 0.0;
        for (p, &a_ip) in a_row.iter().enumerate() {
            sum += a_ip * x[p];
        }
        out[local] = sum;
    }
}
