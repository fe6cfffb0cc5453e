use crate::{
    access::{Access, AccessKind},
    queue::{Deque, TaskQueue},
    task::{Deallocate, Disposal},
};
use core::{num::NonZeroUsize, str::FromStr};
use derive_more::Display;
use thiserror::Error;

/// Configuration entry-point for instantiating the runtime.
///
/// A concrete `Config` binds the strategies used by one runtime: the set of
/// access kinds tasks may declare, the per-worker queue implementation and the
/// policy releasing finished tasks.
pub trait Config: Sized + Send + Sync + 'static {
    /// The closed set of access kinds tasks may declare.
    type AccessKind: AccessKind;
    /// The per-worker ready queue.
    type Queue: TaskQueue<Self>;
    /// What happens to a task once it has executed.
    type Disposal: Disposal<Self>;
}

/// Read/Write/Add accesses, plain deques, immediate deallocation.
#[derive(Debug, Copy, Clone, Default)]
pub struct DefaultConfig;

impl Config for DefaultConfig {
    type AccessKind = Access;
    type Queue = Deque<Self>;
    type Disposal = Deallocate;
}

/// When the readiness of a task is verified.
#[derive(Debug, Display, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum Readiness {
    /// Check at submission; only fully solved tasks are ever queued.
    #[default]
    #[display("eager")]
    Eager,
    /// Queue tasks optimistically and check right before execution.
    #[display("lazy")]
    Lazy,
}

impl FromStr for Readiness {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eager" => Ok(Self::Eager),
            "lazy" => Ok(Self::Lazy),
            _ => Err(ConfigError::InvalidValue {
                var: ENV_READINESS,
                value: s.to_owned(),
            }),
        }
    }
}

/// Errors produced while reading runtime options.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A variable holds a value that cannot be parsed.
    #[error("invalid value {value:?} for {var}")]
    InvalidValue {
        /// Name of the variable.
        var: &'static str,
        /// Raw value found.
        value: String,
    },
    /// The worker count must be at least one.
    #[error("worker count must be at least 1")]
    ZeroWorkers,
}

const ENV_NUM_WORKERS: &str = "VTG_NUM_WORKERS";
const ENV_PIN_WORKERS: &str = "VTG_PIN_WORKERS";
const ENV_START_PAUSED: &str = "VTG_START_PAUSED";
const ENV_READINESS: &str = "VTG_READINESS";

/// Run-time options of a [`Runtime`](crate::executor::Runtime).
#[must_use]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Total number of executors including the caller's own. `None` uses the
    /// available parallelism of the machine.
    pub num_workers: Option<NonZeroUsize>,
    /// Pin worker threads to cores.
    pub pin_workers: bool,
    /// Keep workers idle until [`Runtime::start_executing`] is called.
    ///
    /// [`Runtime::start_executing`]: crate::executor::Runtime::start_executing
    pub start_paused: bool,
    /// Readiness checking discipline.
    pub readiness: Readiness,
}

impl RuntimeOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total number of executors.
    ///
    /// # Panics
    /// If `num_workers` is zero.
    pub fn num_workers(mut self, num_workers: usize) -> Self {
        let num_workers = NonZeroUsize::new(num_workers).expect("worker count must be at least 1");
        self.num_workers = Some(num_workers);
        self
    }

    /// Pin worker threads to cores.
    pub fn pin_workers(mut self, pin: bool) -> Self {
        self.pin_workers = pin;
        self
    }

    /// Start with idle workers.
    pub fn start_paused(mut self, paused: bool) -> Self {
        self.start_paused = paused;
        self
    }

    /// Select the readiness checking discipline.
    pub fn readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    /// Read options from the process environment.
    ///
    /// Recognized variables: `VTG_NUM_WORKERS`, `VTG_PIN_WORKERS`,
    /// `VTG_START_PAUSED`, `VTG_READINESS` (`eager` or `lazy`). Unset
    /// variables keep their defaults.
    ///
    /// # Errors
    /// If a variable is set to a value that cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read options through an arbitrary lookup function.
    ///
    /// # Errors
    /// If a variable is set to a value that cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut options = Self::default();
        if let Some(value) = lookup(ENV_NUM_WORKERS) {
            let count: usize = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                var: ENV_NUM_WORKERS,
                value: value.clone(),
            })?;
            options.num_workers = Some(NonZeroUsize::new(count).ok_or(ConfigError::ZeroWorkers)?);
        }
        if let Some(value) = lookup(ENV_PIN_WORKERS) {
            options.pin_workers = parse_flag(ENV_PIN_WORKERS, &value)?;
        }
        if let Some(value) = lookup(ENV_START_PAUSED) {
            options.start_paused = parse_flag(ENV_START_PAUSED, &value)?;
        }
        if let Some(value) = lookup(ENV_READINESS) {
            options.readiness = value.parse()?;
        }
        Ok(options)
    }
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_owned(),
        }),
    }
}
