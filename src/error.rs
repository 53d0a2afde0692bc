//! Error types for numr-engine
//!
//! Numerically expected outcomes (singular matrices, non positive definite
//! Cholesky input, iterative non-convergence) are *not* errors: they are
//! reported as flags on the result records. The variants here cover caller
//! mistakes, resource exhaustion and native module faults.

use thiserror::Error;

/// Result type alias using numr-engine's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in engine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Operand length or shape does not match the declared dimensions
    #[error("Dimension mismatch for '{operand}': expected {expected:?}, got {got:?}")]
    DimensionMismatch {
        /// Name of the offending operand
        operand: &'static str,
        /// Expected dimensions (or element count)
        expected: Vec<usize>,
        /// Actual dimensions (or element count)
        got: Vec<usize>,
    },

    /// Operation requires a square matrix
    #[error("Matrix must be square, got {rows}x{cols}")]
    NotSquare {
        /// Number of rows
        rows: usize,
        /// Number of columns
        cols: usize,
    },

    /// A pattern-only sparse matrix was passed to a routine that needs values
    #[error("Pattern-only sparse matrix cannot be used in '{op}'")]
    PatternMatrix {
        /// The operation name
        op: &'static str,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Invalid execution configuration value
    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// The configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// A vector that should be a permutation is not a bijection on [0, n)
    #[error("Invalid permutation: {reason}")]
    InvalidPermutation {
        /// Reason for invalidity
        reason: String,
    },

    /// Pointer does not address a live arena block
    #[error("Invalid arena pointer {ptr:#x}")]
    InvalidPointer {
        /// The offending byte offset
        ptr: usize,
    },

    /// Arena could not grow to satisfy an allocation
    #[error("Out of memory: failed to allocate {requested} bytes in native arena")]
    OutOfMemory {
        /// Requested size in bytes
        requested: usize,
    },

    /// Arena compaction requested while a call still holds live pointers
    #[error("Arena is busy: cannot collect while a marshalling scope is open")]
    ArenaBusy,

    /// Native module aborted; the instance must not be used again
    #[error("Native module fault in '{export}': {reason}")]
    ModuleFault {
        /// Export that trapped
        export: &'static str,
        /// Description of the trap
        reason: String,
    },

    /// Native module could not be loaded
    #[error("Native module unavailable: {0}")]
    ModuleUnavailable(String),

    /// A worker in the parallel coordinator failed
    #[error("Worker for partition {partition} failed")]
    WorkerFailed {
        /// Index of the failed partition
        partition: usize,
    },

    /// An iteration that has no data-level non-convergence flag failed to converge
    #[error("'{op}' did not converge after {iterations} iterations")]
    NotConverged {
        /// The operation name
        op: &'static str,
        /// Iterations performed
        iterations: usize,
    },

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a dimension mismatch error
    pub fn dimension_mismatch(operand: &'static str, expected: &[usize], got: &[usize]) -> Self {
        Self::DimensionMismatch {
            operand,
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a module fault error
    pub fn module_fault(export: &'static str, reason: impl Into<String>) -> Self {
        Self::ModuleFault {
            export,
            reason: reason.into(),
        }
    }

    /// Returns true for errors after which the native module instance is unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ModuleFault { .. })
    }

    /// Returns true for errors that should downgrade a call to the host path
    /// instead of failing it
    pub fn is_capability_error(&self) -> bool {
        matches!(
            self,
            Self::ModuleUnavailable(_) | Self::OutOfMemory { .. } | Self::ArenaBusy
        )
    }
}
