//! Execution configuration
//!
//! An [`ExecutionConfig`] is an immutable snapshot of the options that steer
//! backend selection. The bridge holds it behind an `Arc` and swaps the whole
//! snapshot on reconfiguration, so calls already in flight keep the snapshot
//! they started with.
//!
//! The public layer passes options as loosely typed key/value pairs with
//! camelCase keys. [`ExecutionConfig::from_options`] and
//! [`ExecutionConfig::with_options`] parse those pairs: unknown keys are
//! ignored, known keys with a wrong value type are rejected.

use crate::error::{Error, Result};

/// Default minimum of `max(dims)` for routing a call to the native module
pub const DEFAULT_MIN_SIZE_FOR_NATIVE: usize = 100;

/// Default minimum total element count for routing a call to the worker pool
pub const DEFAULT_MIN_SIZE_FOR_PARALLEL: usize = 1000;

/// A loosely typed configuration value as received from the public layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigValue {
    /// Boolean flag
    Bool(bool),
    /// Integer value; negative values are rejected for size keys
    Int(i64),
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<usize> for ConfigValue {
    fn from(v: usize) -> Self {
        ConfigValue::Int(v as i64)
    }
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        ConfigValue::Int(v as i64)
    }
}

/// Recognized configuration keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigKey {
    UseNativeModule,
    UseParallel,
    MinSizeForNativeModule,
    MinSizeForParallel,
    MaxWorkers,
    UseSharedMemory,
}

impl ConfigKey {
    fn parse(key: &str) -> Option<Self> {
        match key {
            "useNativeModule" | "use_native_module" => Some(Self::UseNativeModule),
            "useParallel" | "use_parallel" => Some(Self::UseParallel),
            "minSizeForNativeModule" | "min_size_for_native_module" => {
                Some(Self::MinSizeForNativeModule)
            }
            "minSizeForParallel" | "min_size_for_parallel" => Some(Self::MinSizeForParallel),
            "maxWorkers" | "max_workers" => Some(Self::MaxWorkers),
            "useSharedMemory" | "use_shared_memory" => Some(Self::UseSharedMemory),
            _ => None,
        }
    }
}

/// Immutable snapshot of the execution options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Route eligible calls through the native kernel module
    pub use_native_module: bool,
    /// Allow partitioned execution on the worker pool
    pub use_parallel: bool,
    /// Minimum `max(dims)` for the native path
    pub min_size_for_native_module: usize,
    /// Minimum total operand element count for the parallel path
    pub min_size_for_parallel: usize,
    /// Worker pool size (at least 1)
    pub max_workers: usize,
    /// Share the right-hand operand between workers instead of copying it
    pub use_shared_memory: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            use_native_module: true,
            use_parallel: true,
            min_size_for_native_module: DEFAULT_MIN_SIZE_FOR_NATIVE,
            min_size_for_parallel: DEFAULT_MIN_SIZE_FOR_PARALLEL,
            max_workers: default_max_workers(),
            use_shared_memory: true,
        }
    }
}

/// Number of workers used when the caller does not set `maxWorkers`
pub fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl ExecutionConfig {
    /// Configuration that never leaves the host path
    pub fn host_only() -> Self {
        Self {
            use_native_module: false,
            use_parallel: false,
            ..Self::default()
        }
    }

    /// Build a configuration from key/value options on top of the defaults
    pub fn from_options<'a, I, V>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Into<ConfigValue>,
    {
        Self::default().with_options(options)
    }

    /// Produce a new snapshot with `options` applied on top of `self`
    ///
    /// `self` is left untouched; reconfiguration always yields a fresh value.
    pub fn with_options<'a, I, V>(&self, options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Into<ConfigValue>,
    {
        let mut next = self.clone();
        for (key, value) in options {
            let value = value.into();
            let Some(parsed) = ConfigKey::parse(key) else {
                tracing::debug!(key, "ignoring unrecognized execution option");
                continue;
            };
            match parsed {
                ConfigKey::UseNativeModule => next.use_native_module = expect_bool(key, value)?,
                ConfigKey::UseParallel => next.use_parallel = expect_bool(key, value)?,
                ConfigKey::UseSharedMemory => next.use_shared_memory = expect_bool(key, value)?,
                ConfigKey::MinSizeForNativeModule => {
                    next.min_size_for_native_module = expect_size(key, value)?
                }
                ConfigKey::MinSizeForParallel => {
                    next.min_size_for_parallel = expect_size(key, value)?
                }
                ConfigKey::MaxWorkers => next.max_workers = expect_size(key, value)?,
            }
        }
        next.validate()?;
        Ok(next)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::invalid_config(
                "maxWorkers",
                "worker pool needs at least one worker",
            ));
        }
        Ok(())
    }
}

fn expect_bool(key: &str, value: ConfigValue) -> Result<bool> {
    match value {
        ConfigValue::Bool(b) => Ok(b),
        ConfigValue::Int(i) => Err(Error::invalid_config(
            key,
            format!("expected a boolean, got integer {}", i),
        )),
    }
}

fn expect_size(key: &str, value: ConfigValue) -> Result<usize> {
    match value {
        ConfigValue::Int(i) if i >= 0 => Ok(i as usize),
        ConfigValue::Int(i) => Err(Error::invalid_config(
            key,
            format!("expected a non-negative integer, got {}", i),
        )),
        ConfigValue::Bool(b) => Err(Error::invalid_config(
            key,
            format!("expected an integer, got boolean {}", b),
        )),
    }
}
