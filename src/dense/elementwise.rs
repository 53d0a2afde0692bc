//! Elementwise operations, transpose and norms on flat buffers

/// Binary elementwise operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementwiseOp {
    /// a + b
    Add,
    /// a - b
    Subtract,
    /// a * b
    Multiply,
    /// a / b
    Divide,
}

impl ElementwiseOp {
    /// Apply the operator to a pair of scalars
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ElementwiseOp::Add => a + b,
            ElementwiseOp::Subtract => a - b,
            ElementwiseOp::Multiply => a * b,
            ElementwiseOp::Divide => a / b,
        }
    }
}

/// Apply `op` pairwise into `out`; all three slices share a length
#[inline]
pub fn elementwise_into(op: ElementwiseOp, a: &[f64], b: &[f64], out: &mut [f64]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = op.apply(x, y);
    }
}

/// Pairwise `op(a, b)` into a new buffer
pub fn elementwise(op: ElementwiseOp, a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len()];
    elementwise_into(op, a, b, &mut out);
    out
}

/// a + b
pub fn add(a: &[f64], b: &[f64]) -> Vec<f64> {
    elementwise(ElementwiseOp::Add, a, b)
}

/// a - b
pub fn subtract(a: &[f64], b: &[f64]) -> Vec<f64> {
    elementwise(ElementwiseOp::Subtract, a, b)
}

/// Hadamard product a .* b
pub fn dot_multiply(a: &[f64], b: &[f64]) -> Vec<f64> {
    elementwise(ElementwiseOp::Multiply, a, b)
}

/// Elementwise quotient a ./ b
pub fn dot_divide(a: &[f64], b: &[f64]) -> Vec<f64> {
    elementwise(ElementwiseOp::Divide, a, b)
}

/// alpha * a
pub fn scale(a: &[f64], alpha: f64) -> Vec<f64> {
    a.iter().map(|&x| alpha * x).collect()
}

/// Transpose a `rows x cols` matrix
pub fn transpose(a: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut out = vec![0.0; rows * cols];
    transpose_rows(a, &mut out, 0..cols, rows, cols);
    out
}

/// Write output rows `out_rows` of the transpose of a `rows x cols` matrix
///
/// Output row `r` is input column `r`; `out` holds `out_rows.len() * rows`
/// elements.
pub fn transpose_rows(
    a: &[f64],
    out: &mut [f64],
    out_rows: std::ops::Range<usize>,
    rows: usize,
    cols: usize,
) {
    debug_assert_eq!(out.len(), out_rows.len() * rows);
    for (local, j) in out_rows.enumerate() {
        for i in 0..rows {
            out[local * rows + i] = a[i * cols + j];
        }
    }
}

/// Identity matrix of order `n` as a flat buffer
pub fn identity(n: usize) -> Vec<f64> {
    let mut out = vec![0.0; n * n];
    for i in 0..n {
        out[i * n + i] = 1.0;
    }
    out
}

/// Frobenius norm
pub fn norm_frobenius(a: &[f64]) -> f64 {
    a.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Infinity norm (max absolute row sum) of a `rows x cols` matrix
pub fn norm_inf(a: &[f64], rows: usize, cols: usize) -> f64 {
    (0..rows)
        .map(|i| a[i * cols..(i + 1) * cols].iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// One norm (max absolute column sum) of a `rows x cols` matrix
pub fn norm_one(a: &[f64], rows: usize, cols: usize) -> f64 {
    (0..cols)
        .map(|j| (0..rows).map(|i| a[i * cols + j].abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Dot product of two vectors
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean norm of a vector
#[inline]
pub fn norm2(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}
