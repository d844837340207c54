//! Logging and memory profiling for agent checks
//!
//! - [`LoggingConfig`] installs the process-wide `tracing` subscriber.
//! - [`HeapTracer`] and [`MemorySnapshot`] record what a check run holds on
//!   to and compare it with the previous run.
//! - [`MemoryProfiler`] writes the top-N snapshot report, the diff against
//!   the last run and the baseline for the next one.
//!
//! # Example
//!
//! ```rust,no_run
//! use agent_checks_logging::{profile_memory, ProfilingConfig};
//!
//! let config = ProfilingConfig::default();
//! let (_, outcome) = profile_memory(&config, "openstack", |tracer| {
//!     tracer.record_here(4096);
//! })
//! .expect("profiling failed");
//! println!("report written to {}", outcome.snapshot_path.display());
//! ```

pub mod logging;
pub mod profiling;
pub mod report;
pub mod units;

pub use logging::{LogFormat, LogOutput, LoggingConfig};
pub use profiling::{
    Frame, HeapTracer, KeyType, MemorySnapshot, Statistic, StatisticDiff, Trace, TraceFilter,
    diff,
};
pub use report::{
    MemoryProfiler, ProfileOutcome, ProfilingConfig, profile_memory, timestamp_filename,
    write_pretty_top,
};
pub use units::{BinaryUnit, UnitFormatter};

/// Result type for logging setup
pub type Result<T> = std::result::Result<T, LoggingError>;

/// Logging setup errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tracing error: {0}")]
    Tracing(String),
}

/// Result type for profiling operations
pub type ProfilingResult<T> = std::result::Result<T, ProfilingError>;

/// Memory profiling errors
#[derive(Debug, thiserror::Error)]
pub enum ProfilingError {
    #[error("Memory tracing is not started")]
    NotTracing,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
