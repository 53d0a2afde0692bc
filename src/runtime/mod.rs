//! Execution runtime
//!
//! Everything between a caller's buffers and the dense kernels:
//!
//! ```text
//! Bridge (path selection, fault recovery)
//! ├── NativeModule (exports over an Arena)
//! │   └── ArenaScope (marshalling, RAII unpin)
//! └── ParallelCoordinator (row-partitioned kernels on a rayon pool)
//! ```
//!
//! Most callers only need [`Bridge`]; the lower layers are public so they can
//! be driven and inspected directly.

pub mod arena;
pub mod bridge;
pub mod module;
pub mod parallel;
pub mod scope;

pub use arena::{Arena, ArenaConfig, ArenaStats, CollectStats, PAGE_SIZE, Ptr, TypeTag};
pub use bridge::{
    Bridge, ExecutionPath, ExecutionStrategy, KernelOp, KernelOutput, MAX_MODULE_RELOADS,
    NativeStatus,
};
pub use module::{DISABLE_NATIVE_ENV, DefaultLoader, Export, ModuleLoader, NativeModule, Status};
pub use parallel::{ParallelCoordinator, partition_ranges};
pub use scope::{ArenaHost, ArenaScope};
