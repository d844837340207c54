//! Go expvar endpoint check
//!
//! Polls the JSON a Go process publishes on `/debug/vars` and reports:
//! - runtime `memstats` gauges and rates, always collected
//! - every GC pause since the previous run, as a histogram
//! - user metrics selected by slash-separated paths
//!
//! Path segments are matched literally when alphanumeric and as anchored
//! regexes otherwise, so `counters/.*_total` or `workers/*/busy` select
//! several values at once. At most `max_returned_metrics` values are
//! submitted per run.

pub mod check;
pub mod config;
pub mod path;

pub use check::GoExpvarCheck;
pub use config::{ExpvarMetric, ExpvarMetricType, GoExpvarInstance};
pub use path::{ExpvarPath, normalize};
