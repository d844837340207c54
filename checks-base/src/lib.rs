//! Shared building blocks for agent checks
//!
//! This crate provides what every check polling a third-party HTTP API needs:
//! - The [`AgentCheck`] trait and service-check statuses
//! - An in-memory [`Aggregator`] for gauges, counts and service checks
//! - The [`HttpClient`] seam with a `reqwest` implementation
//! - A [`CheckError`] taxonomy separating transport from HTTP status failures
//! - [`SubCheck`] outcomes for optional, admin-only sub-resources
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use agent_checks_base::{Aggregator, AgentCheck};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut check = build_my_check()?;
//!     let mut aggregator = Aggregator::new();
//!
//!     check.check(&mut aggregator).await?;
//!     for metric in aggregator.metrics() {
//!         println!("{} = {}", metric.name, metric.value);
//!     }
//!     Ok(())
//! }
//! ```

pub mod check;
pub mod collector;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use check::{AgentCheck, RetainedState, ServiceCheckStatus, SubCheck, skip_if_forbidden};
pub use collector::RunCollector;
pub use config::InstanceSettings;
pub use error::{CheckError, CheckResult};
pub use http::{HttpClient, HttpSettings, ReqwestClient};
pub use metrics::{Aggregator, InstanceMetrics, MetricKind, MetricSample, ServiceCheckSample};

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Default seconds between two runs of an instance
pub const DEFAULT_INTERVAL_SECONDS: u64 = 15;

/// Default instance settings
pub fn default_settings() -> InstanceSettings {
    InstanceSettings::default()
}

#[cfg(test)]
mod metrics_tests;
