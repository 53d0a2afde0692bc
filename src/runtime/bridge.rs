//! Backend selection bridge
//!
//! The single entry point collaborators call. For every operation the bridge
//! validates operand lengths against the declared dimensions, then picks one
//! of three execution paths:
//!
//! ```text
//! host      dense kernels called directly
//! native    buffers marshalled into the module arena, export called
//! parallel  partitionable ops split by the ParallelCoordinator
//! ```
//!
//! The [`ExecutionStrategy`] is fixed per configuration and per probed
//! capability; each call only compares sizes against the thresholds. All
//! three paths run the same kernels with the same accumulation order.
//!
//! # Failure handling
//!
//! - Capability problems (module cannot load, arena exhausted) downgrade the
//!   call to the host path with a warning.
//! - A module fault fails the call. The faulted instance is dropped and one
//!   fresh instance is loaded; once [`MAX_MODULE_RELOADS`] is spent the
//!   native path stays disabled for the lifetime of the bridge.
//! - Worker failures fail the call.

use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use super::arena::{ArenaConfig, ArenaStats, CollectStats, Ptr};
use super::module::{DefaultLoader, Export, ModuleLoader, NativeModule, Status};
use super::parallel::ParallelCoordinator;
use super::scope::{ArenaHost, ArenaScope};
use crate::config::{ConfigValue, ExecutionConfig};
use crate::dense::complex::interleave;
use crate::dense::elementwise::ElementwiseOp;
use crate::dense::{self, CholeskyDecomposition, DenseMatrix, LuDecomposition, QrDecomposition};
use crate::error::{Error, Result};

/// Fresh module instances loaded after a fault before the native path is
/// disabled for good
pub const MAX_MODULE_RELOADS: usize = 1;

/// Collect after a call once unpinned blocks fill `1 / AUTO_COLLECT_DIVISOR`
/// of the arena
const AUTO_COLLECT_DIVISOR: usize = 2;

// ============================================================================
// Operations and outputs
// ============================================================================

/// Operation the bridge can route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelOp {
    /// `a (m x k) @ b (k x n)`, dims `[m, k, n]`
    Multiply,
    /// `a (m x n) @ x (n)`, dims `[m, n]`
    MultiplyVector,
    /// Elementwise sum, dims `[rows, cols]`
    Add,
    /// Elementwise difference, dims `[rows, cols]`
    Subtract,
    /// Elementwise product, dims `[rows, cols]`
    DotMultiply,
    /// Transpose, dims `[rows, cols]`
    Transpose,
    /// LU decomposition, dims `[n]`
    Lu,
    /// QR decomposition, dims `[m, n]`
    Qr,
    /// Cholesky decomposition, dims `[n]`
    Cholesky,
    /// Solve `A·X = B`, dims `[n, nrhs]`
    LuSolve,
    /// Determinant, dims `[n]`
    Det,
    /// Inverse, dims `[n]`
    Inverse,
    /// Eigenvalues, dims `[n]`
    Eigenvalues,
    /// Matrix exponential, dims `[n]`
    Expm,
    /// Matrix square root, dims `[n]`
    Sqrtm,
    /// Pseudoinverse, dims `[m, n]`
    Pinv,
}

impl KernelOp {
    /// Every routable operation
    pub const ALL: [KernelOp; 16] = [
        KernelOp::Multiply,
        KernelOp::MultiplyVector,
        KernelOp::Add,
        KernelOp::Subtract,
        KernelOp::DotMultiply,
        KernelOp::Transpose,
        KernelOp::Lu,
        KernelOp::Qr,
        KernelOp::Cholesky,
        KernelOp::LuSolve,
        KernelOp::Det,
        KernelOp::Inverse,
        KernelOp::Eigenvalues,
        KernelOp::Expm,
        KernelOp::Sqrtm,
        KernelOp::Pinv,
    ];

    /// Name accepted by [`Bridge::execute_named`]
    pub const fn name(self) -> &'static str {
        match self {
            KernelOp::Multiply => "multiply",
            KernelOp::MultiplyVector => "multiply_vector",
            KernelOp::Add => "add",
            KernelOp::Subtract => "subtract",
            KernelOp::DotMultiply => "dot_multiply",
            KernelOp::Transpose => "transpose",
            KernelOp::Lu => "lu",
            KernelOp::Qr => "qr",
            KernelOp::Cholesky => "cholesky",
            KernelOp::LuSolve => "lusolve",
            KernelOp::Det => "det",
            KernelOp::Inverse => "inv",
            KernelOp::Eigenvalues => "eigenvalues",
            KernelOp::Expm => "expm",
            KernelOp::Sqrtm => "sqrtm",
            KernelOp::Pinv => "pinv",
        }
    }

    /// Module export implementing this operation
    pub const fn export(self) -> Export {
        match self {
            KernelOp::Multiply => Export::Matmul,
            KernelOp::MultiplyVector => Export::Matvec,
            KernelOp::Add => Export::Add,
            KernelOp::Subtract => Export::Subtract,
            KernelOp::DotMultiply => Export::DotMultiply,
            KernelOp::Transpose => Export::Transpose,
            KernelOp::Lu => Export::Lu,
            KernelOp::Qr => Export::Qr,
            KernelOp::Cholesky => Export::Cholesky,
            KernelOp::LuSolve => Export::LuSolve,
            KernelOp::Det => Export::Det,
            KernelOp::Inverse => Export::Inverse,
            KernelOp::Eigenvalues => Export::Eigenvalues,
            KernelOp::Expm => Export::Expm,
            KernelOp::Sqrtm => Export::Sqrtm,
            KernelOp::Pinv => Export::Pinv,
        }
    }

    /// Whether the parallel coordinator can split this operation by rows
    pub const fn is_partitionable(self) -> bool {
        matches!(
            self,
            KernelOp::Multiply
                | KernelOp::MultiplyVector
                | KernelOp::Add
                | KernelOp::Subtract
                | KernelOp::DotMultiply
                | KernelOp::Transpose
        )
    }

    fn dims_len(self) -> usize {
        self.export().arity().1
    }

    /// Operand names and their `(rows, cols)` shapes for `dims`
    fn operand_layout(self, d: &[usize]) -> SmallVec<[(&'static str, usize, usize); 2]> {
        let mut layout = SmallVec::new();
        match self {
            KernelOp::Multiply => {
                layout.push(("a", d[0], d[1]));
                layout.push(("b", d[1], d[2]));
            }
            KernelOp::MultiplyVector => {
                layout.push(("a", d[0], d[1]));
                layout.push(("x", d[1], 1));
            }
            KernelOp::Add | KernelOp::Subtract | KernelOp::DotMultiply => {
                layout.push(("a", d[0], d[1]));
                layout.push(("b", d[0], d[1]));
            }
            KernelOp::Transpose | KernelOp::Qr | KernelOp::Pinv => {
                layout.push(("a", d[0], d[1]));
            }
            KernelOp::LuSolve => {
                layout.push(("a", d[0], d[0]));
                layout.push(("b", d[0], d[1]));
            }
            KernelOp::Lu
            | KernelOp::Cholesky
            | KernelOp::Det
            | KernelOp::Inverse
            | KernelOp::Eigenvalues
            | KernelOp::Expm
            | KernelOp::Sqrtm => {
                layout.push(("a", d[0], d[0]));
            }
        }
        layout
    }

    /// Output shape when it is not bounded by an operand's
    fn unbounded_output(self, d: &[usize]) -> Option<(usize, usize)> {
        match self {
            KernelOp::Multiply => Some((d[0], d[2])),
            KernelOp::Qr => Some((d[0], d[0])),
            _ => None,
        }
    }
}

impl std::fmt::Display for KernelOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KernelOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let op = match s {
            "multiply" => KernelOp::Multiply,
            "multiply_vector" | "multiplyVector" => KernelOp::MultiplyVector,
            "add" => KernelOp::Add,
            "subtract" => KernelOp::Subtract,
            "dot_multiply" | "dotMultiply" => KernelOp::DotMultiply,
            "transpose" => KernelOp::Transpose,
            "lu" => KernelOp::Lu,
            "qr" => KernelOp::Qr,
            "cholesky" => KernelOp::Cholesky,
            "lusolve" => KernelOp::LuSolve,
            "det" => KernelOp::Det,
            "inv" => KernelOp::Inverse,
            "eigenvalues" | "eigs" => KernelOp::Eigenvalues,
            "expm" => KernelOp::Expm,
            "sqrtm" => KernelOp::Sqrtm,
            "pinv" => KernelOp::Pinv,
            other => {
                return Err(Error::invalid_argument(
                    "op",
                    format!("unknown kernel operation '{other}'"),
                ));
            }
        };
        Ok(op)
    }
}

/// Result of a routed operation
#[derive(Debug, Clone, PartialEq)]
pub enum KernelOutput {
    /// Dense matrix result
    Matrix(DenseMatrix),
    /// Vector result (`multiply_vector`)
    Vector(Vec<f64>),
    /// Scalar result (`det`)
    Scalar(f64),
    /// LU factors
    Lu(LuDecomposition),
    /// QR factors
    Qr(QrDecomposition),
    /// Cholesky factor
    Cholesky(CholeskyDecomposition),
    /// Eigenvalues as flat `[re, im]` pairs
    Eigenvalues(Vec<f64>),
    /// `lusolve` or `inv` on a singular matrix
    Singular,
}

impl KernelOutput {
    /// The matrix payload, if any
    pub fn as_matrix(&self) -> Option<&DenseMatrix> {
        match self {
            KernelOutput::Matrix(m) => Some(m),
            _ => None,
        }
    }

    /// The flat numeric payload of matrix, vector, scalar and eigenvalue results
    pub fn values(&self) -> Option<&[f64]> {
        match self {
            KernelOutput::Matrix(m) => Some(m.data()),
            KernelOutput::Vector(v) | KernelOutput::Eigenvalues(v) => Some(v),
            KernelOutput::Scalar(s) => Some(std::slice::from_ref(s)),
            _ => None,
        }
    }
}

// ============================================================================
// Strategy
// ============================================================================

/// Execution strategy fixed for one configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStrategy {
    /// Every call runs on the host
    HostOnly,
    /// Large calls go to the native module
    Native,
    /// Large calls go to the module, large partitionable calls to the pool
    NativeParallel,
    /// The module is gone but partitionable calls may still use the pool
    ParallelOnly,
}

/// Path a single call took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionPath {
    /// Dense kernels on the calling thread
    Host,
    /// Native module export
    Native,
    /// Partitioned on the worker pool
    Parallel,
}

/// Lifecycle of the native module inside a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeStatus {
    /// Not loaded yet; loads on first native call
    Unloaded,
    /// Loaded and healthy
    Ready,
    /// The loader refused; calls run on the host
    Unavailable,
    /// Faulted past the reload budget; calls run on the host
    Disabled,
}

impl NativeStatus {
    fn usable(self) -> bool {
        matches!(self, NativeStatus::Unloaded | NativeStatus::Ready)
    }
}

/// Configuration snapshot plus the capabilities probed for it
#[derive(Debug)]
struct Plan {
    config: Arc<ExecutionConfig>,
    strategy: ExecutionStrategy,
    coordinator: Option<Arc<ParallelCoordinator>>,
}

impl Plan {
    fn build(
        config: Arc<ExecutionConfig>,
        native: NativeStatus,
        previous: Option<&Plan>,
    ) -> Self {
        let coordinator = if config.use_native_module && config.use_parallel {
            let reusable = previous
                .and_then(|p| p.coordinator.as_ref())
                .filter(|c| {
                    c.workers() == config.max_workers
                        && c.uses_shared_memory() == config.use_shared_memory
                })
                .cloned();
            let coordinator = reusable.unwrap_or_else(|| {
                Arc::new(ParallelCoordinator::new(
                    config.max_workers,
                    config.use_shared_memory,
                ))
            });
            if coordinator.is_pooled() || coordinator.workers() == 1 {
                Some(coordinator)
            } else {
                tracing::warn!(
                    workers = config.max_workers,
                    "worker pool unavailable, parallel path downgraded to host"
                );
                None
            }
        } else {
            None
        };

        let native_ok = config.use_native_module && native.usable();
        let strategy = match (native_ok, coordinator.is_some()) {
            (true, true) => ExecutionStrategy::NativeParallel,
            (true, false) => ExecutionStrategy::Native,
            (false, true) => ExecutionStrategy::ParallelOnly,
            (false, false) => ExecutionStrategy::HostOnly,
        };
        tracing::debug!(?strategy, ?native, "execution strategy planned");

        Self {
            config,
            strategy,
            coordinator,
        }
    }

    fn select(&self, op: KernelOp, dims: &[usize], total: usize) -> ExecutionPath {
        let size = dims.iter().copied().max().unwrap_or(0);
        let large = size >= self.config.min_size_for_native_module;
        let split = op.is_partitionable() && total >= self.config.min_size_for_parallel;
        match self.strategy {
            ExecutionStrategy::HostOnly => ExecutionPath::Host,
            ExecutionStrategy::Native if large => ExecutionPath::Native,
            ExecutionStrategy::NativeParallel if large && split => ExecutionPath::Parallel,
            ExecutionStrategy::NativeParallel if large => ExecutionPath::Native,
            ExecutionStrategy::ParallelOnly if large && split => ExecutionPath::Parallel,
            _ => ExecutionPath::Host,
        }
    }
}

/// The module instance and its reload bookkeeping
struct NativeSlot {
    module: Option<NativeModule>,
    status: NativeStatus,
    reloads: usize,
}

// ============================================================================
// Bridge
// ============================================================================

/// Routes operations to the host, the native module or the worker pool
pub struct Bridge {
    plan: RwLock<Arc<Plan>>,
    native: Mutex<NativeSlot>,
    loader: Box<dyn ModuleLoader>,
    last_path: Mutex<Option<ExecutionPath>>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // `native` before `plan`, matching the writers
        let native = self.native.lock().status;
        let plan = Arc::clone(&*self.plan.read());
        f.debug_struct("Bridge")
            .field("config", &plan.config)
            .field("strategy", &plan.strategy)
            .field("native", &native)
            .finish()
    }
}

impl Bridge {
    /// Bridge with the built-in module loader and default arena sizing
    pub fn new(config: ExecutionConfig) -> Result<Self> {
        Self::with_loader(config, DefaultLoader::new(ArenaConfig::default()))
    }

    /// Bridge with a custom module loader
    pub fn with_loader(config: ExecutionConfig, loader: impl ModuleLoader + 'static) -> Result<Self> {
        config.validate()?;
        let plan = Plan::build(Arc::new(config), NativeStatus::Unloaded, None);
        Ok(Self {
            plan: RwLock::new(Arc::new(plan)),
            native: Mutex::new(NativeSlot {
                module: None,
                status: NativeStatus::Unloaded,
                reloads: 0,
            }),
            loader: Box::new(loader),
            last_path: Mutex::new(None),
        })
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<ExecutionConfig> {
        Arc::clone(&self.plan.read().config)
    }

    /// Strategy derived from the current configuration and capabilities
    pub fn strategy(&self) -> ExecutionStrategy {
        self.plan.read().strategy
    }

    /// Path taken by the most recent successful call
    pub fn last_path(&self) -> Option<ExecutionPath> {
        *self.last_path.lock()
    }

    /// Native module lifecycle state
    pub fn native_status(&self) -> NativeStatus {
        self.native.lock().status
    }

    /// Usage of the module arena, once the module is loaded
    pub fn arena_stats(&self) -> Option<ArenaStats> {
        self.native.lock().module.as_ref().map(|m| m.arena().stats())
    }

    /// Apply key/value options on top of the current configuration
    ///
    /// Calls already running keep the snapshot they started with.
    pub fn configure<'a, I, V>(&self, options: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Into<ConfigValue>,
    {
        let next = self.config().with_options(options)?;
        self.set_config(next)
    }

    /// Replace the configuration snapshot
    pub fn set_config(&self, config: ExecutionConfig) -> Result<()> {
        config.validate()?;
        let slot = self.native.lock();
        let mut plan = self.plan.write();
        let next = Plan::build(Arc::new(config), slot.status, Some(&**plan));
        *plan = Arc::new(next);
        Ok(())
    }

    /// Compact the module arena
    ///
    /// `Ok(None)` when the module was never loaded.
    pub fn collect(&self) -> Result<Option<CollectStats>> {
        let mut slot = self.native.lock();
        match slot.module.as_mut() {
            Some(module) => module.arena_mut().collect().map(Some),
            None => Ok(None),
        }
    }

    /// Run `op` selected by name
    pub fn execute_named(
        &self,
        name: &str,
        operands: &[&[f64]],
        dims: &[usize],
    ) -> Result<KernelOutput> {
        self.execute(name.parse()?, operands, dims)
    }

    /// Run `op` on `operands` shaped by `dims`
    pub fn execute(&self, op: KernelOp, operands: &[&[f64]], dims: &[usize]) -> Result<KernelOutput> {
        validate_operands(op, operands, dims)?;
        let plan = Arc::clone(&*self.plan.read());
        let total: usize = operands.iter().map(|o| o.len()).sum();
        let path = plan.select(op, dims, total);
        tracing::debug!(op = op.name(), ?dims, ?path, "execution path selected");

        let (output, taken) = match (path, plan.coordinator.as_deref()) {
            (ExecutionPath::Parallel, Some(coordinator)) => (
                run_parallel(coordinator, op, operands, dims)?,
                ExecutionPath::Parallel,
            ),
            (ExecutionPath::Native, _) => match self.run_native(op, operands, dims) {
                Ok(output) => (output, ExecutionPath::Native),
                Err(e) if e.is_capability_error() => {
                    tracing::warn!(op = op.name(), error = %e, "native path unavailable, running on host");
                    (run_host(op, operands, dims)?, ExecutionPath::Host)
                }
                Err(e) => return Err(e),
            },
            _ => (run_host(op, operands, dims)?, ExecutionPath::Host),
        };

        *self.last_path.lock() = Some(taken);
        Ok(output)
    }

    fn run_native(&self, op: KernelOp, operands: &[&[f64]], dims: &[usize]) -> Result<KernelOutput> {
        let mut slot = self.native.lock();
        if slot.module.is_none() {
            if !slot.status.usable() {
                return Err(Error::ModuleUnavailable(format!(
                    "native module is {:?}",
                    slot.status
                )));
            }
            match self.loader.load() {
                Ok(module) => {
                    slot.module = Some(module);
                    slot.status = NativeStatus::Ready;
                }
                Err(e) => {
                    self.set_native_status(&mut slot, NativeStatus::Unavailable);
                    return Err(match e {
                        Error::ModuleUnavailable(_) => e,
                        other => Error::ModuleUnavailable(other.to_string()),
                    });
                }
            }
        }

        let Some(module) = slot.module.as_mut() else {
            return Err(Error::Internal("native module slot empty after load".into()));
        };
        let result = marshal_reclaiming(module, op, operands, dims);
        if matches!(&result, Err(e) if e.is_fatal()) {
            self.recover(&mut slot);
        }
        result
    }

    /// Replace a faulted instance, or disable the native path for good
    fn recover(&self, slot: &mut NativeSlot) {
        slot.module = None;
        if slot.reloads >= MAX_MODULE_RELOADS {
            tracing::error!(reloads = slot.reloads, "native module reload budget spent, disabling");
            self.set_native_status(slot, NativeStatus::Disabled);
            return;
        }
        slot.reloads += 1;
        match self.loader.load() {
            Ok(module) => {
                tracing::warn!(reload = slot.reloads, "native module reloaded after fault");
                slot.module = Some(module);
                slot.status = NativeStatus::Ready;
            }
            Err(e) => {
                tracing::error!(error = %e, "native module reload failed, disabling");
                self.set_native_status(slot, NativeStatus::Disabled);
            }
        }
    }

    fn set_native_status(&self, slot: &mut NativeSlot, status: NativeStatus) {
        slot.status = status;
        let mut plan = self.plan.write();
        let next = Plan::build(Arc::clone(&plan.config), status, Some(&**plan));
        *plan = Arc::new(next);
    }
}

// ============================================================================
// Paths
// ============================================================================

fn validate_operands(op: KernelOp, operands: &[&[f64]], dims: &[usize]) -> Result<()> {
    if dims.len() != op.dims_len() {
        return Err(Error::dimension_mismatch("dims", &[op.dims_len()], &[dims.len()]));
    }
    let layout = op.operand_layout(dims);
    if operands.len() != layout.len() {
        return Err(Error::dimension_mismatch(
            "operands",
            &[layout.len()],
            &[operands.len()],
        ));
    }
    for (&(name, rows, cols), operand) in layout.iter().zip(operands) {
        let Some(expected) = rows.checked_mul(cols) else {
            return Err(Error::dimension_mismatch(name, &[rows, cols], &[operand.len()]));
        };
        if operand.len() != expected {
            return Err(Error::dimension_mismatch(name, &[expected], &[operand.len()]));
        }
    }
    if let Some((rows, cols)) = op.unbounded_output(dims) {
        let fits = rows
            .checked_mul(cols)
            .and_then(|len| len.checked_mul(std::mem::size_of::<f64>()))
            .is_some_and(|bytes| bytes <= isize::MAX as usize);
        if !fits {
            return Err(Error::dimension_mismatch("out", &[rows, cols], &[]));
        }
    }
    Ok(())
}

fn square(a: &[f64], n: usize) -> Result<DenseMatrix> {
    DenseMatrix::from_slice(a, n, n)
}

fn solved(x: Option<DenseMatrix>) -> KernelOutput {
    x.map_or(KernelOutput::Singular, KernelOutput::Matrix)
}

fn run_host(op: KernelOp, operands: &[&[f64]], d: &[usize]) -> Result<KernelOutput> {
    let a = operands[0];
    let matrix = |data: Vec<f64>, rows: usize, cols: usize| {
        DenseMatrix::new(data, rows, cols).map(KernelOutput::Matrix)
    };
    match op {
        KernelOp::Multiply => matrix(dense::matmul(a, operands[1], d[0], d[1], d[2]), d[0], d[2]),
        KernelOp::MultiplyVector => Ok(KernelOutput::Vector(dense::matvec(a, operands[1], d[0], d[1]))),
        KernelOp::Add => matrix(dense::add(a, operands[1]), d[0], d[1]),
        KernelOp::Subtract => matrix(dense::subtract(a, operands[1]), d[0], d[1]),
        KernelOp::DotMultiply => matrix(dense::dot_multiply(a, operands[1]), d[0], d[1]),
        KernelOp::Transpose => matrix(dense::transpose(a, d[0], d[1]), d[1], d[0]),
        KernelOp::Lu => Ok(KernelOutput::Lu(dense::lu_decompose(&square(a, d[0])?))),
        KernelOp::Qr => {
            let qr = dense::qr_decompose(&DenseMatrix::from_slice(a, d[0], d[1])?);
            Ok(KernelOutput::Qr(qr))
        }
        KernelOp::Cholesky => {
            let chol = dense::cholesky_decompose(&square(a, d[0])?)?;
            Ok(KernelOutput::Cholesky(chol))
        }
        KernelOp::LuSolve => {
            let x = dense::lusolve(&square(a, d[0])?, operands[1], d[1])?;
            Ok(solved(x.map(|x| DenseMatrix::new(x, d[0], d[1])).transpose()?))
        }
        KernelOp::Det => Ok(KernelOutput::Scalar(dense::det(&square(a, d[0])?)?)),
        KernelOp::Inverse => Ok(solved(dense::inverse(&square(a, d[0])?)?)),
        KernelOp::Eigenvalues => {
            let values = dense::eigenvalues(&square(a, d[0])?)?;
            Ok(KernelOutput::Eigenvalues(interleave(&values)))
        }
        KernelOp::Expm => Ok(KernelOutput::Matrix(dense::expm(&square(a, d[0])?)?)),
        KernelOp::Sqrtm => Ok(KernelOutput::Matrix(dense::sqrtm(&square(a, d[0])?)?)),
        KernelOp::Pinv => {
            let p = dense::pinv(&DenseMatrix::from_slice(a, d[0], d[1])?)?;
            Ok(KernelOutput::Matrix(p))
        }
    }
}

fn run_parallel(
    coordinator: &ParallelCoordinator,
    op: KernelOp,
    operands: &[&[f64]],
    d: &[usize],
) -> Result<KernelOutput> {
    let a = operands[0];
    let elementwise = |op: ElementwiseOp| -> Result<KernelOutput> {
        let out = coordinator.elementwise(op, a, operands[1])?;
        Ok(KernelOutput::Matrix(DenseMatrix::new(out, d[0], d[1])?))
    };
    match op {
        KernelOp::Multiply => {
            let out = coordinator.multiply(a, operands[1], d[0], d[1], d[2])?;
            Ok(KernelOutput::Matrix(DenseMatrix::new(out, d[0], d[2])?))
        }
        KernelOp::MultiplyVector => Ok(KernelOutput::Vector(coordinator.multiply_vector(
            a,
            operands[1],
            d[0],
            d[1],
        )?)),
        KernelOp::Add => elementwise(ElementwiseOp::Add),
        KernelOp::Subtract => elementwise(ElementwiseOp::Subtract),
        KernelOp::DotMultiply => elementwise(ElementwiseOp::Multiply),
        KernelOp::Transpose => {
            let out = coordinator.transpose(a, d[0], d[1])?;
            Ok(KernelOutput::Matrix(DenseMatrix::new(out, d[1], d[0])?))
        }
        other => run_host(other, operands, d),
    }
}

/// Marshal operands into the module, call the export and read results back
/// [`marshal`] with arena reclamation at the call boundary
///
/// Exhaustion with reclaimable blocks collects and retries once. After the
/// call the arena is collected when unpinned blocks fill a large share of it.
fn marshal_reclaiming(
    module: &mut NativeModule,
    op: KernelOp,
    operands: &[&[f64]],
    d: &[usize],
) -> Result<KernelOutput> {
    let result = match marshal(module, op, operands, d) {
        Err(Error::OutOfMemory { requested }) if module.arena().reclaimable_bytes() > 0 => {
            let freed = module.arena_mut().collect()?;
            tracing::debug!(
                op = op.name(),
                requested,
                reclaimed_bytes = freed.reclaimed_bytes,
                "arena exhausted, collected and retrying"
            );
            marshal(module, op, operands, d)
        }
        other => other,
    };

    if !module.is_faulted() {
        let arena = module.arena();
        if arena.reclaimable_bytes() * AUTO_COLLECT_DIVISOR >= arena.capacity() {
            if let Err(e) = module.arena_mut().collect() {
                tracing::warn!(error = %e, "arena collection after call failed");
            }
        }
    }
    result
}

fn marshal(
    module: &mut NativeModule,
    op: KernelOp,
    operands: &[&[f64]],
    d: &[usize],
) -> Result<KernelOutput> {
    let mut scope = ArenaScope::new(module);
    let mut ptrs: SmallVec<[Ptr; 4]> = SmallVec::new();
    for operand in operands {
        ptrs.push(scope.write_f64(operand)?);
    }

    // Output blocks, in export order
    let out_lens: SmallVec<[usize; 3]> = match op {
        KernelOp::Multiply => smallvec::smallvec![d[0] * d[2]],
        KernelOp::MultiplyVector => smallvec::smallvec![d[0]],
        KernelOp::Add | KernelOp::Subtract | KernelOp::DotMultiply | KernelOp::Transpose => {
            smallvec::smallvec![d[0] * d[1]]
        }
        KernelOp::Lu => smallvec::smallvec![d[0] * d[0], d[0] * d[0]],
        KernelOp::Qr => smallvec::smallvec![d[0] * d[0], d[0] * d[1]],
        KernelOp::LuSolve => smallvec::smallvec![d[0] * d[1]],
        KernelOp::Det => smallvec::smallvec![1],
        KernelOp::Eigenvalues => smallvec::smallvec![2 * d[0]],
        KernelOp::Pinv => smallvec::smallvec![d[1] * d[0]],
        KernelOp::Cholesky | KernelOp::Inverse | KernelOp::Expm | KernelOp::Sqrtm => {
            smallvec::smallvec![d[0] * d[0]]
        }
    };
    let first_out = ptrs.len();
    for &len in &out_lens {
        ptrs.push(scope.alloc_f64(len)?);
    }
    if op == KernelOp::Lu {
        ptrs.push(scope.alloc_i32(d[0])?);
    }

    let export = op.export();
    let status = scope.call(export, &ptrs, d)?;
    match status {
        Status::NotConverged => {
            return Err(scope.take_diagnostic().unwrap_or(Error::NotConverged {
                op: export.name(),
                iterations: 0,
            }));
        }
        Status::Rejected => {
            return Err(scope.take_diagnostic().unwrap_or_else(|| {
                Error::Internal(format!("'{export}' rejected its input"))
            }));
        }
        _ => {}
    }

    let out = |i: usize| -> Result<Vec<f64>> { scope.read_f64(ptrs[first_out + i]) };
    let matrix = |i: usize, rows: usize, cols: usize| -> Result<DenseMatrix> {
        DenseMatrix::new(out(i)?, rows, cols)
    };

    let output = match op {
        KernelOp::Multiply => KernelOutput::Matrix(matrix(0, d[0], d[2])?),
        KernelOp::MultiplyVector => KernelOutput::Vector(out(0)?),
        KernelOp::Add | KernelOp::Subtract | KernelOp::DotMultiply => {
            KernelOutput::Matrix(matrix(0, d[0], d[1])?)
        }
        KernelOp::Transpose => KernelOutput::Matrix(matrix(0, d[1], d[0])?),
        KernelOp::Lu => {
            let permutation = scope
                .read_i32(ptrs[first_out + 2])?
                .into_iter()
                .map(|p| {
                    usize::try_from(p)
                        .map_err(|_| Error::module_fault(export.name(), format!("negative row {p}")))
                })
                .collect::<Result<Vec<usize>>>()?;
            KernelOutput::Lu(LuDecomposition {
                l: matrix(0, d[0], d[0])?,
                u: matrix(1, d[0], d[0])?,
                permutation,
                singular: status == Status::Singular,
            })
        }
        KernelOp::Qr => KernelOutput::Qr(QrDecomposition {
            q: matrix(0, d[0], d[0])?,
            r: matrix(1, d[0], d[1])?,
        }),
        KernelOp::Cholesky => KernelOutput::Cholesky(CholeskyDecomposition {
            l: matrix(0, d[0], d[0])?,
            positive_definite: status == Status::Ok,
        }),
        KernelOp::LuSolve if status == Status::Singular => KernelOutput::Singular,
        KernelOp::LuSolve => KernelOutput::Matrix(matrix(0, d[0], d[1])?),
        KernelOp::Det => KernelOutput::Scalar(out(0)?[0]),
        KernelOp::Inverse if status == Status::Singular => KernelOutput::Singular,
        KernelOp::Inverse | KernelOp::Expm | KernelOp::Sqrtm => {
            KernelOutput::Matrix(matrix(0, d[0], d[0])?)
        }
        KernelOp::Eigenvalues => KernelOutput::Eigenvalues(out(0)?),
        KernelOp::Pinv => KernelOutput::Matrix(matrix(0, d[1], d[0])?),
    };
    Ok(output)
}
