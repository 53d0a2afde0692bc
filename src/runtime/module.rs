//! Native kernel module
//!
//! A [`NativeModule`] owns an [`Arena`] and exposes the dense kernels as
//! numbered exports over it. The ABI is deliberately flat: every export takes
//! a list of arena pointers (inputs first, then outputs) and a list of integer
//! dimensions, writes its results into the output blocks and returns a
//! [`Status`] code.
//!
//! # Export table
//!
//! ```text
//! export        pointers                      dims
//! matmul        a, b, c                       m, k, n
//! matvec        a, x, y                       m, n
//! add/sub/mul   a, b, c                       rows, cols
//! transpose     a, out                        rows, cols
//! lu            a, l, u, perm:i32             n
//! qr            a, q, r                       m, n
//! cholesky      a, l                          n
//! lusolve       a, b, x                       n, nrhs
//! det           a, out[1]                     n
//! inv           a, out                        n
//! eigenvalues   a, out[2n] (re, im pairs)     n
//! expm/sqrtm    a, out                        n
//! pinv          a, out (n x m)                m, n
//! ```
//!
//! # Faults
//!
//! A trap inside an export (bad pointer, wrong element type, short block,
//! kernel panic) poisons the instance: the call returns
//! [`Error::ModuleFault`] and so does every later call. The caller is
//! expected to drop the instance and load a fresh one.
//!
//! A kernel that rejects its input is not a trap. The export returns
//! [`Status::NotConverged`] or [`Status::Rejected`] and the kernel's error is
//! kept for [`NativeModule::take_diagnostic`].

use std::panic::{AssertUnwindSafe, catch_unwind};

use super::arena::{Arena, ArenaConfig, ArenaElement, Ptr};
use super::scope::ArenaHost;
use crate::dense::{
    self, DenseMatrix, cholesky_decompose, complex::interleave, det, eigenvalues, expm, inverse,
    lu_decompose, lusolve, pinv, qr_decompose, sqrtm,
};
use crate::dense::elementwise::{ElementwiseOp, elementwise};
use crate::error::{Error, Result};

/// Environment variable that, when set to anything but `0`, makes
/// [`DefaultLoader`] refuse to load the module
pub const DISABLE_NATIVE_ENV: &str = "NUMR_ENGINE_DISABLE_NATIVE";

// ============================================================================
// Exports and status codes
// ============================================================================

/// Exported kernel entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Export {
    /// `C = A @ B`
    Matmul,
    /// `y = A @ x`
    Matvec,
    /// Elementwise sum
    Add,
    /// Elementwise difference
    Subtract,
    /// Elementwise product
    DotMultiply,
    /// Transpose
    Transpose,
    /// LU with partial pivoting
    Lu,
    /// Householder QR
    Qr,
    /// Cholesky factor
    Cholesky,
    /// Solve through LU
    LuSolve,
    /// Determinant
    Det,
    /// Inverse
    Inverse,
    /// Eigenvalues of a general matrix
    Eigenvalues,
    /// Matrix exponential
    Expm,
    /// Principal square root
    Sqrtm,
    /// Pseudoinverse
    Pinv,
}

impl Export {
    /// Every export, in table order
    pub const ALL: [Export; 16] = [
        Export::Matmul,
        Export::Matvec,
        Export::Add,
        Export::Subtract,
        Export::DotMultiply,
        Export::Transpose,
        Export::Lu,
        Export::Qr,
        Export::Cholesky,
        Export::LuSolve,
        Export::Det,
        Export::Inverse,
        Export::Eigenvalues,
        Export::Expm,
        Export::Sqrtm,
        Export::Pinv,
    ];

    /// Symbol name of the export
    pub const fn name(self) -> &'static str {
        match self {
            Export::Matmul => "matmul",
            Export::Matvec => "matvec",
            Export::Add => "add",
            Export::Subtract => "subtract",
            Export::DotMultiply => "dot_multiply",
            Export::Transpose => "transpose",
            Export::Lu => "lu",
            Export::Qr => "qr",
            Export::Cholesky => "cholesky",
            Export::LuSolve => "lusolve",
            Export::Det => "det",
            Export::Inverse => "inv",
            Export::Eigenvalues => "eigenvalues",
            Export::Expm => "expm",
            Export::Sqrtm => "sqrtm",
            Export::Pinv => "pinv",
        }
    }

    /// Number of pointer and dimension arguments
    pub const fn arity(self) -> (usize, usize) {
        match self {
            Export::Matmul => (3, 3),
            Export::Matvec => (3, 2),
            Export::Add | Export::Subtract | Export::DotMultiply => (3, 2),
            Export::Transpose => (2, 2),
            Export::Lu => (4, 1),
            Export::Qr => (3, 2),
            Export::Cholesky => (2, 1),
            Export::LuSolve => (3, 2),
            Export::Det | Export::Inverse | Export::Eigenvalues => (2, 1),
            Export::Expm | Export::Sqrtm => (2, 1),
            Export::Pinv => (2, 2),
        }
    }
}

impl std::fmt::Display for Export {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Status code returned by an export that did not trap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    /// Outputs are complete
    Ok = 0,
    /// Input was singular; outputs are partial or untouched
    Singular = 1,
    /// Cholesky hit a non-positive pivot; the factor is partial
    NotPositiveDefinite = 2,
    /// An inner iteration hit its limit
    NotConverged = 3,
    /// The kernel rejected its input; outputs are untouched
    Rejected = 4,
}

impl Status {
    /// Numeric code as it crosses the ABI
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Decode a numeric status
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Status::Ok),
            1 => Some(Status::Singular),
            2 => Some(Status::NotPositiveDefinite),
            3 => Some(Status::NotConverged),
            4 => Some(Status::Rejected),
            _ => None,
        }
    }
}

// ============================================================================
// Module instance
// ============================================================================

/// Loaded kernel module with its own arena
#[derive(Debug)]
pub struct NativeModule {
    arena: Arena,
    fault: Option<Error>,
    /// Kernel error behind the last `NotConverged` or `Rejected` status
    diagnostic: Option<Error>,
    armed_trap: Option<Export>,
}

impl NativeModule {
    /// Instantiate a module with a fresh arena
    pub fn new(config: ArenaConfig) -> Result<Self> {
        Ok(Self {
            arena: Arena::new(config)?,
            fault: None,
            diagnostic: None,
            armed_trap: None,
        })
    }

    /// Whether an earlier call trapped
    #[inline]
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// The fault that poisoned this instance, if any
    pub fn fault(&self) -> Option<&Error> {
        self.fault.as_ref()
    }

    /// Take the kernel error behind the last [`Status::NotConverged`] or
    /// [`Status::Rejected`]
    pub fn take_diagnostic(&mut self) -> Option<Error> {
        self.diagnostic.take()
    }

    /// Make the next call to `export` trap
    ///
    /// Used to exercise fault recovery in the layers above.
    #[doc(hidden)]
    pub fn arm_trap(&mut self, export: Export) {
        self.armed_trap = Some(export);
    }

    /// Invoke an export
    ///
    /// `ptrs` and `dims` follow the export table in the module docs. Any
    /// trap poisons the instance and is returned as [`Error::ModuleFault`].
    pub fn call(&mut self, export: Export, ptrs: &[Ptr], dims: &[usize]) -> Result<Status> {
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }
        self.diagnostic = None;

        let trap = self.armed_trap.take_if(|armed| *armed == export).is_some();
        let arena = &mut self.arena;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if trap {
                panic!("trap armed on '{export}'");
            }
            dispatch(arena, export, ptrs, dims)
        }));

        let reason = match outcome {
            Ok(Ok(Exit::Done(status))) => return Ok(status),
            Ok(Ok(Exit::Kernel(detail))) => {
                let status = match detail {
                    Error::NotConverged { .. } => Status::NotConverged,
                    _ => Status::Rejected,
                };
                tracing::debug!(
                    export = export.name(),
                    error = %detail,
                    ?status,
                    "kernel returned an error"
                );
                self.diagnostic = Some(detail);
                return Ok(status);
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        let fault = Error::module_fault(export.name(), reason);
        tracing::error!(export = export.name(), error = %fault, "native module trapped");
        self.fault = Some(fault.clone());
        Err(fault)
    }
}

impl ArenaHost for NativeModule {
    fn arena(&self) -> &Arena {
        &self.arena
    }

    fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "kernel panicked".to_string()
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Source of module instances
///
/// The bridge calls [`ModuleLoader::load`] lazily on first native use and
/// again when an instance faults.
pub trait ModuleLoader: Send + Sync {
    /// Instantiate a fresh module
    fn load(&self) -> Result<NativeModule>;
}

/// Loader for the built-in module
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLoader {
    /// Arena configuration for every loaded instance
    pub config: ArenaConfig,
}

impl DefaultLoader {
    /// Loader with the given arena configuration
    pub fn new(config: ArenaConfig) -> Self {
        Self { config }
    }
}

fn disabled_by_env() -> bool {
    std::env::var_os(DISABLE_NATIVE_ENV).is_some_and(|v| !v.is_empty() && v != "0")
}

impl ModuleLoader for DefaultLoader {
    fn load(&self) -> Result<NativeModule> {
        if disabled_by_env() {
            return Err(Error::ModuleUnavailable(format!(
                "disabled by {DISABLE_NATIVE_ENV}"
            )));
        }
        let module = NativeModule::new(self.config)
            .map_err(|e| Error::ModuleUnavailable(format!("arena setup failed: {e}")))?;
        tracing::debug!(
            initial_pages = self.config.initial_pages,
            max_pages = self.config.max_pages,
            "native module loaded"
        );
        Ok(module)
    }
}

// ============================================================================
// Dispatch
// ============================================================================

enum Exit {
    Done(Status),
    /// Error raised by the kernel itself rather than by the frame
    Kernel(Error),
}

/// Unwrap a kernel result, leaving the export with [`Exit::Kernel`] on error
macro_rules! kernel {
    ($call:expr) => {
        match $call {
            Ok(value) => value,
            Err(e) => return Ok(Exit::Kernel(e)),
        }
    };
}

/// Argument frame of one export call
struct Frame<'a> {
    arena: &'a mut Arena,
    ptrs: &'a [Ptr],
    dims: &'a [usize],
}

impl Frame<'_> {
    fn view<T: ArenaElement>(&self, slot: usize, len: usize) -> Result<&[T]> {
        let block = self.arena.view::<T>(self.ptrs[slot])?;
        if block.len() < len {
            return Err(Error::Internal(format!(
                "pointer {slot} addresses {} elements, export needs {len}",
                block.len()
            )));
        }
        Ok(&block[..len])
    }

    fn matrix(&self, slot: usize, rows: usize, cols: usize) -> Result<DenseMatrix> {
        DenseMatrix::from_slice(self.view::<f64>(slot, rows * cols)?, rows, cols)
    }

    fn store<T: ArenaElement>(&mut self, slot: usize, data: &[T]) -> Result<()> {
        let block = self.arena.view_mut::<T>(self.ptrs[slot])?;
        if block.len() < data.len() {
            return Err(Error::Internal(format!(
                "output pointer {slot} addresses {} elements, export writes {}",
                block.len(),
                data.len()
            )));
        }
        block[..data.len()].copy_from_slice(data);
        Ok(())
    }
}

fn dispatch(arena: &mut Arena, export: Export, ptrs: &[Ptr], dims: &[usize]) -> Result<Exit> {
    let (n_ptrs, n_dims) = export.arity();
    if ptrs.len() != n_ptrs || dims.len() != n_dims {
        return Err(Error::Internal(format!(
            "expected {n_ptrs} pointers and {n_dims} dims, got {} and {}",
            ptrs.len(),
            dims.len()
        )));
    }
    let mut f = Frame { arena, ptrs, dims };
    let d = f.dims;

    let status = match export {
        Export::Matmul => {
            let (m, k, n) = (d[0], d[1], d[2]);
            let c = dense::matmul(f.view::<f64>(0, m * k)?, f.view::<f64>(1, k * n)?, m, k, n);
            f.store(2, &c)?;
            Status::Ok
        }
        Export::Matvec => {
            let (m, n) = (d[0], d[1]);
            let y = dense::matvec(f.view::<f64>(0, m * n)?, f.view::<f64>(1, n)?, m, n);
            f.store(2, &y)?;
            Status::Ok
        }
        Export::Add | Export::Subtract | Export::DotMultiply => {
            let len = d[0] * d[1];
            let op = match export {
                Export::Add => ElementwiseOp::Add,
                Export::Subtract => ElementwiseOp::Subtract,
                _ => ElementwiseOp::Multiply,
            };
            let c = elementwise(op, f.view::<f64>(0, len)?, f.view::<f64>(1, len)?);
            f.store(2, &c)?;
            Status::Ok
        }
        Export::Transpose => {
            let (rows, cols) = (d[0], d[1]);
            let t = dense::transpose(f.view::<f64>(0, rows * cols)?, rows, cols);
            f.store(1, &t)?;
            Status::Ok
        }
        Export::Lu => {
            let n = d[0];
            let lu = lu_decompose(&f.matrix(0, n, n)?);
            let perm = lu
                .permutation
                .iter()
                .map(|&p| {
                    i32::try_from(p).map_err(|_| Error::Internal(format!("row {p} overflows i32")))
                })
                .collect::<Result<Vec<i32>>>()?;
            f.store(1, lu.l.data())?;
            f.store(2, lu.u.data())?;
            f.store(3, &perm)?;
            if lu.singular { Status::Singular } else { Status::Ok }
        }
        Export::Qr => {
            let (m, n) = (d[0], d[1]);
            let qr = qr_decompose(&f.matrix(0, m, n)?);
            f.store(1, qr.q.data())?;
            f.store(2, qr.r.data())?;
            Status::Ok
        }
        Export::Cholesky => {
            let n = d[0];
            let chol = kernel!(cholesky_decompose(&f.matrix(0, n, n)?));
            f.store(1, chol.l.data())?;
            if chol.positive_definite { Status::Ok } else { Status::NotPositiveDefinite }
        }
        Export::LuSolve => {
            let (n, nrhs) = (d[0], d[1]);
            let a = f.matrix(0, n, n)?;
            let b = f.view::<f64>(1, n * nrhs)?.to_vec();
            match kernel!(lusolve(&a, &b, nrhs)) {
                Some(x) => {
                    f.store(2, &x)?;
                    Status::Ok
                }
                None => Status::Singular,
            }
        }
        Export::Det => {
            let n = d[0];
            let value = kernel!(det(&f.matrix(0, n, n)?));
            f.store(1, &[value])?;
            Status::Ok
        }
        Export::Inverse => {
            let n = d[0];
            match kernel!(inverse(&f.matrix(0, n, n)?)) {
                Some(inv) => {
                    f.store(1, inv.data())?;
                    Status::Ok
                }
                None => Status::Singular,
            }
        }
        Export::Eigenvalues => {
            let n = d[0];
            let values = kernel!(eigenvalues(&f.matrix(0, n, n)?));
            f.store(1, &interleave(&values))?;
            Status::Ok
        }
        Export::Expm => {
            let n = d[0];
            let e = kernel!(expm(&f.matrix(0, n, n)?));
            f.store(1, e.data())?;
            Status::Ok
        }
        Export::Sqrtm => {
            let n = d[0];
            let root = kernel!(sqrtm(&f.matrix(0, n, n)?));
            f.store(1, root.data())?;
            Status::Ok
        }
        Export::Pinv => {
            let (m, n) = (d[0], d[1]);
            let p = kernel!(pinv(&f.matrix(0, m, n)?));
            f.store(1, p.data())?;
            Status::Ok
        }
    };
    Ok(Exit::Done(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ArenaScope;

    fn module() -> NativeModule {
        NativeModule::new(ArenaConfig {
            initial_pages: 1,
            max_pages: 8,
        })
        .unwrap()
    }

    #[test]
    fn test_matmul_export() {
        let mut m = module();
        let mut scope = ArenaScope::new(&mut m);
        let a = scope.write_f64(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = scope.write_f64(&[5.0, 6.0, 7.0, 8.0]).unwrap();
        let c = scope.alloc_f64(4).unwrap();
        let status = scope.call(Export::Matmul, &[a, b, c], &[2, 2, 2]).unwrap();
        assert_eq!(status, Status::Ok);
        assert_eq!(scope.read_f64(c).unwrap(), vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_lu_export_singular_status() {
        let mut m = module();
        let mut scope = ArenaScope::new(&mut m);
        let a = scope.write_f64(&[1.0, 2.0, 2.0, 4.0]).unwrap();
        let l = scope.alloc_f64(4).unwrap();
        let u = scope.alloc_f64(4).unwrap();
        let p = scope.alloc_i32(2).unwrap();
        let status = scope.call(Export::Lu, &[a, l, u, p], &[2]).unwrap();
        assert_eq!(status, Status::Singular);
        assert_eq!(scope.read_i32(p).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_lusolve_singular_leaves_output_untouched() {
        let mut m = module();
        let mut scope = ArenaScope::new(&mut m);
        let a = scope.write_f64(&[1.0, 1.0, 1.0, 1.0]).unwrap();
        let b = scope.write_f64(&[1.0, 2.0]).unwrap();
        let x = scope.alloc_f64(2).unwrap();
        let status = scope.call(Export::LuSolve, &[a, b, x], &[2, 1]).unwrap();
        assert_eq!(status, Status::Singular);
        assert_eq!(scope.read_f64(x).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_cholesky_not_positive_definite() {
        let mut m = module();
        let mut scope = ArenaScope::new(&mut m);
        let a = scope.write_f64(&[1.0, 2.0, 2.0, 1.0]).unwrap();
        let l = scope.alloc_f64(4).unwrap();
        let status = scope.call(Export::Cholesky, &[a, l], &[2]).unwrap();
        assert_eq!(status, Status::NotPositiveDefinite);
    }

    #[test]
    fn test_eigenvalues_export_interleaves() {
        let mut m = module();
        let mut scope = ArenaScope::new(&mut m);
        let a = scope.write_f64(&[0.0, -1.0, 1.0, 0.0]).unwrap();
        let out = scope.alloc_f64(4).unwrap();
        scope.call(Export::Eigenvalues, &[a, out], &[2]).unwrap();
        let v = scope.read_f64(out).unwrap();
        assert!(v[0].abs() < 1e-12 && v[2].abs() < 1e-12);
        assert!((v[1].abs() - 1.0).abs() < 1e-12);
        assert!((v[1] + v[3]).abs() < 1e-12);
    }

    #[test]
    fn test_kernel_error_is_not_a_fault() {
        let mut m = module();
        let mut scope = ArenaScope::new(&mut m);
        let a = scope.write_f64(&[f64::INFINITY, 0.0, 0.0, 1.0]).unwrap();
        let out = scope.alloc_f64(4).unwrap();
        let status = scope.call(Export::Expm, &[a, out], &[2]).unwrap();
        assert_eq!(status, Status::Rejected);
        assert!(matches!(scope.take_diagnostic(), Some(Error::InvalidArgument { .. })));
        assert_eq!(scope.read_f64(out).unwrap(), vec![0.0; 4]);

        let ok = scope.write_f64(&[0.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(scope.call(Export::Expm, &[ok, out], &[2]).unwrap(), Status::Ok);
        assert_eq!(scope.read_f64(out).unwrap(), vec![1.0, 0.0, 0.0, 1.0]);
        drop(scope);
        assert!(!m.is_faulted());
    }

    #[test]
    fn test_bad_pointer_poisons_instance() {
        let mut m = module();
        let bogus = Ptr::from_offset(4096);
        let err = m.call(Export::Transpose, &[bogus, bogus], &[1, 1]).unwrap_err();
        assert!(matches!(err, Error::ModuleFault { export: "transpose", .. }));
        assert!(m.is_faulted());

        let mut scope = ArenaScope::new(&mut m);
        let a = scope.write_f64(&[1.0]).unwrap();
        let out = scope.alloc_f64(1).unwrap();
        let again = scope.call(Export::Transpose, &[a, out], &[1, 1]).unwrap_err();
        assert_eq!(again, err);
    }

    #[test]
    fn test_wrong_type_tag_traps() {
        let mut m = module();
        let mut scope = ArenaScope::new(&mut m);
        let a = scope.write_i32(&[1, 2, 3, 4]).unwrap();
        let out = scope.alloc_f64(4).unwrap();
        let err = scope.call(Export::Transpose, &[a, out], &[2, 2]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_short_output_block_traps() {
        let mut m = module();
        let mut scope = ArenaScope::new(&mut m);
        let a = scope.write_f64(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        let out = scope.alloc_f64(2).unwrap();
        assert!(scope.call(Export::Transpose, &[a, out], &[2, 2]).is_err());
    }

    #[test]
    fn test_armed_trap_catches_panic() {
        let mut m = module();
        m.arm_trap(Export::Det);
        let mut scope = ArenaScope::new(&mut m);
        let a = scope.write_f64(&[2.0]).unwrap();
        let out = scope.alloc_f64(1).unwrap();
        let err = scope.call(Export::Det, &[a, out], &[1]).unwrap_err();
        match err {
            Error::ModuleFault { export, reason } => {
                assert_eq!(export, "det");
                assert!(reason.contains("trap armed"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        drop(scope);
        assert_eq!(m.arena().stats().pinned_bytes, 0);
    }

    #[test]
    fn test_arity_checked() {
        let mut m = module();
        assert!(m.call(Export::Matmul, &[], &[1, 1, 1]).is_err());
    }

    #[test]
    fn test_status_codes() {
        for status in [
            Status::Ok,
            Status::Singular,
            Status::NotPositiveDefinite,
            Status::NotConverged,
            Status::Rejected,
        ] {
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
        assert_eq!(Status::from_code(7), None);
    }

    #[test]
    fn test_export_names_unique() {
        let mut names: Vec<_> = Export::ALL.iter().map(|e| e.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Export::ALL.len());
    }
}
