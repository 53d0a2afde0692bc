//! Parallel execution coordinator
//!
//! Row-partitioned execution of the partitionable dense kernels. The output is
//! split into contiguous row blocks ([`partition_ranges`]), every block is
//! computed by the same row-range kernel the host path uses, and the blocks
//! are concatenated in partition order. Accumulation order inside a row never
//! changes, so the result is bitwise identical to the single-threaded kernel.
//!
//! The right-hand operand is read-only for the whole call. With shared memory
//! enabled every worker reads one `Arc<[f64]>`; otherwise each worker gets its
//! own copy.
//!
//! A panicking worker fails the whole call with [`Error::WorkerFailed`].
//! There are no retries.

use std::ops::{Deref, Range};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::dense::elementwise::{ElementwiseOp, elementwise_into, transpose_rows};
use crate::dense::matmul::{matmul_rows, matvec_rows};
use crate::error::{Error, Result};

/// Split `len` rows into at most `parts` contiguous, non-empty ranges
///
/// Earlier ranges take the remainder, so sizes differ by at most one.
pub fn partition_ranges(len: usize, parts: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let parts = parts.clamp(1, len);
    let base = len / parts;
    let extra = len % parts;
    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

/// Right-hand operand as seen by one worker
enum RhsHandle {
    Shared(Arc<[f64]>),
    Owned(Vec<f64>),
}

impl Deref for RhsHandle {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        match self {
            RhsHandle::Shared(data) => data,
            RhsHandle::Owned(data) => data,
        }
    }
}

struct Job {
    partition: usize,
    rows: Range<usize>,
    rhs: RhsHandle,
}

/// Worker pool running row-partitioned kernels
pub struct ParallelCoordinator {
    workers: usize,
    use_shared_memory: bool,
    #[cfg(feature = "rayon")]
    pool: Option<rayon::ThreadPool>,
}

impl std::fmt::Debug for ParallelCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelCoordinator")
            .field("workers", &self.workers)
            .field("use_shared_memory", &self.use_shared_memory)
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

impl ParallelCoordinator {
    /// Build a coordinator with up to `max_workers` threads
    ///
    /// If the pool cannot be built (or the `rayon` feature is off, or
    /// `max_workers` is 1) partitions run one after another on the caller's
    /// thread.
    pub fn new(max_workers: usize, use_shared_memory: bool) -> Self {
        let workers = max_workers.max(1);

        #[cfg(feature = "rayon")]
        let pool = if workers > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("numr-worker-{i}"))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    tracing::warn!(error = %e, workers, "worker pool unavailable, running inline");
                    None
                }
            }
        } else {
            None
        };

        Self {
            workers,
            use_shared_memory,
            #[cfg(feature = "rayon")]
            pool,
        }
    }

    /// Number of partitions a call is split into
    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Whether the RHS is shared between workers rather than copied
    #[inline]
    pub fn uses_shared_memory(&self) -> bool {
        self.use_shared_memory
    }

    /// Whether partitions actually run on a thread pool
    pub fn is_pooled(&self) -> bool {
        #[cfg(feature = "rayon")]
        {
            self.pool.is_some()
        }
        #[cfg(not(feature = "rayon"))]
        {
            false
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// `C = A @ B` with `a` of shape `m x k` and `b` of shape `k x n`
    pub fn multiply(&self, a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Result<Vec<f64>> {
        check_len("a", a, m * k)?;
        check_len("b", b, k * n)?;
        self.run(m, n, b, |rhs, rows, out| matmul_rows(a, rhs, out, rows, k, n))
    }

    /// `y = A @ x` with `a` of shape `m x n`
    pub fn multiply_vector(&self, a: &[f64], x: &[f64], m: usize, n: usize) -> Result<Vec<f64>> {
        check_len("a", a, m * n)?;
        check_len("x", x, n)?;
        self.run(m, 1, x, |rhs, rows, out| matvec_rows(a, rhs, out, rows, n))
    }

    /// Pairwise `op(a, b)`
    pub fn elementwise(&self, op: ElementwiseOp, a: &[f64], b: &[f64]) -> Result<Vec<f64>> {
        check_len("b", b, a.len())?;
        self.run(a.len(), 1, b, |rhs, rows, out| {
            elementwise_into(op, &a[rows.clone()], &rhs[rows], out)
        })
    }

    /// Transpose of a `rows x cols` matrix
    pub fn transpose(&self, a: &[f64], rows: usize, cols: usize) -> Result<Vec<f64>> {
        check_len("a", a, rows * cols)?;
        self.run(cols, rows, a, |src, out_rows, out| {
            transpose_rows(src, out, out_rows, rows, cols)
        })
    }

    // ========================================================================
    // Partitioned execution
    // ========================================================================

    /// Compute `total_rows` output rows of `width` elements each
    ///
    /// `kernel(rhs, rows, out)` fills `out` (exactly `rows.len() * width`
    /// elements) for the given row range.
    fn run<F>(&self, total_rows: usize, width: usize, rhs: &[f64], kernel: F) -> Result<Vec<f64>>
    where
        F: Fn(&[f64], Range<usize>, &mut [f64]) + Sync,
    {
        let ranges = partition_ranges(total_rows, self.workers);
        if ranges.is_empty() || width == 0 {
            return Ok(Vec::new());
        }

        let shared: Option<Arc<[f64]>> = self.use_shared_memory.then(|| Arc::from(rhs));
        let jobs: Vec<Job> = ranges
            .into_iter()
            .enumerate()
            .map(|(partition, rows)| Job {
                partition,
                rows,
                rhs: match &shared {
                    Some(data) => RhsHandle::Shared(Arc::clone(data)),
                    None => RhsHandle::Owned(rhs.to_vec()),
                },
            })
            .collect();
        tracing::debug!(
            partitions = jobs.len(),
            total_rows,
            shared = self.use_shared_memory,
            "dispatching partitioned kernel"
        );

        let worker = |job: Job| {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                let mut block = vec![0.0; job.rows.len() * width];
                kernel(&job.rhs, job.rows.clone(), &mut block);
                block
            }));
            (job.partition, outcome.ok())
        };
        let finished = self.map_jobs(jobs, worker);

        merge(finished, total_rows * width)
    }

    fn map_jobs<W>(&self, jobs: Vec<Job>, worker: W) -> Vec<(usize, Option<Vec<f64>>)>
    where
        W: Fn(Job) -> (usize, Option<Vec<f64>>) + Sync + Send,
    {
        #[cfg(feature = "rayon")]
        {
            if let Some(pool) = &self.pool {
                return pool.install(|| jobs.into_par_iter().map(&worker).collect());
            }
        }
        jobs.into_iter().map(worker).collect()
    }
}

fn check_len(operand: &'static str, data: &[f64], expected: usize) -> Result<()> {
    if data.len() != expected {
        return Err(Error::dimension_mismatch(operand, &[expected], &[data.len()]));
    }
    Ok(())
}

/// Place every finished block in its partition slot and concatenate
fn merge(finished: Vec<(usize, Option<Vec<f64>>)>, total: usize) -> Result<Vec<f64>> {
    let mut slots: Vec<Option<Vec<f64>>> = vec![None; finished.len()];
    for (partition, block) in finished {
        match block {
            Some(block) => slots[partition] = Some(block),
            None => {
                tracing::warn!(partition, "worker panicked, rejecting partitioned call");
                return Err(Error::WorkerFailed { partition });
            }
        }
    }

    let mut out = Vec::with_capacity(total);
    for (partition, slot) in slots.into_iter().enumerate() {
        let block = slot.ok_or(Error::WorkerFailed { partition })?;
        out.extend_from_slice(&block);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::{matmul, matvec, transpose};

    fn ramp(len: usize, scale: f64) -> Vec<f64> {
        (0..len).map(|i| (i as f64 * scale).sin()).collect()
    }

    #[test]
    fn test_partition_ranges_cover_rows() {
        let ranges = partition_ranges(10, 4);
        assert_eq!(ranges, vec![0..3, 3..6, 6..8, 8..10]);
        assert_eq!(partition_ranges(3, 8).len(), 3);
        assert_eq!(partition_ranges(5, 0), vec![0..5]);
        assert!(partition_ranges(0, 4).is_empty());
    }

    #[test]
    fn test_multiply_matches_host_bitwise() {
        let (m, k, n) = (37, 19, 23);
        let a = ramp(m * k, 0.37);
        let b = ramp(k * n, 0.11);
        let host = matmul(&a, &b, m, k, n);
        for shared in [true, false] {
            let coordinator = ParallelCoordinator::new(4, shared);
            assert_eq!(coordinator.multiply(&a, &b, m, k, n).unwrap(), host);
        }
    }

    #[test]
    fn test_multiply_vector_and_transpose() {
        let coordinator = ParallelCoordinator::new(3, true);
        let a = ramp(7 * 5, 0.5);
        let x = ramp(5, 1.3);
        assert_eq!(coordinator.multiply_vector(&a, &x, 7, 5).unwrap(), matvec(&a, &x, 7, 5));
        assert_eq!(coordinator.transpose(&a, 7, 5).unwrap(), transpose(&a, 7, 5));
    }

    #[test]
    fn test_elementwise_ops() {
        let coordinator = ParallelCoordinator::new(4, false);
        let a = ramp(101, 0.2);
        let b = ramp(101, 0.9);
        let out = coordinator.elementwise(ElementwiseOp::Subtract, &a, &b).unwrap();
        for i in 0..101 {
            assert_eq!(out[i], a[i] - b[i]);
        }
    }

    #[test]
    fn test_single_worker_runs_inline() {
        let coordinator = ParallelCoordinator::new(1, true);
        assert!(!coordinator.is_pooled());
        let out = coordinator.elementwise(ElementwiseOp::Add, &[1.0, 2.0], &[3.0, 4.0]).unwrap();
        assert_eq!(out, vec![4.0, 6.0]);
    }

    #[test]
    fn test_length_validation() {
        let coordinator = ParallelCoordinator::new(2, true);
        let err = coordinator.multiply(&[1.0; 6], &[1.0; 5], 2, 3, 2).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { operand: "b", .. }));
        assert!(coordinator.elementwise(ElementwiseOp::Add, &[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_panicking_worker_rejects_call() {
        let coordinator = ParallelCoordinator::new(4, true);
        let rhs = vec![0.0; 8];
        let err = coordinator
            .run(8, 1, &rhs, |_, rows, out| {
                if rows.start == 2 {
                    panic!("partition failure");
                }
                out.fill(1.0);
            })
            .unwrap_err();
        assert_eq!(err, Error::WorkerFailed { partition: 1 });
    }

    #[test]
    fn test_empty_output() {
        let coordinator = ParallelCoordinator::new(4, true);
        assert!(coordinator.multiply(&[], &[], 0, 0, 0).unwrap().is_empty());
    }
}
