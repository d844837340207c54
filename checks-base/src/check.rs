//! The check trait and the status values checks report

use crate::error::{CheckError, CheckResult};
use crate::metrics::Aggregator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Status of a service check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCheckStatus {
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
}

impl ServiceCheckStatus {
    /// `Ok` when the condition holds, `Critical` otherwise
    pub fn ok_or_critical(healthy: bool) -> Self {
        if healthy { Self::Ok } else { Self::Critical }
    }
}

/// Outcome of an optional sub-check
#[derive(Debug, Clone, PartialEq)]
pub enum SubCheck<T> {
    /// The sub-resource was reachable and produced a value
    Completed(T),
    /// The sub-resource was deliberately not collected
    Skipped(String),
}

impl<T> SubCheck<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, SubCheck::Skipped(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            SubCheck::Completed(value) => Some(value),
            SubCheck::Skipped(_) => None,
        }
    }
}

/// Turn a 403 on an admin-only resource into `SubCheck::Skipped`.
///
/// Every other error is propagated unchanged.
pub fn skip_if_forbidden<T>(
    result: CheckResult<T>,
    resource: &str,
) -> Result<SubCheck<T>, CheckError> {
    match result {
        Ok(value) => Ok(SubCheck::Completed(value)),
        Err(e) if e.is_authorization() => {
            debug!(error = %e, resource, "authorization refused");
            Ok(SubCheck::Skipped(format!(
                "configured user is not an admin user, ignoring {resource}"
            )))
        }
        Err(e) => Err(e),
    }
}

/// A monitoring plugin polling one target system
#[async_trait]
pub trait AgentCheck: Send {
    /// Name of the check, used in logs
    fn name(&self) -> &str;

    /// Run one collection pass and submit everything into `aggregator`
    async fn check(&mut self, aggregator: &mut Aggregator) -> CheckResult<()>;

    /// Approximate heap footprint of state the check keeps between runs
    fn retained_state(&self) -> Vec<RetainedState> {
        Vec::new()
    }
}

/// A piece of state kept across runs, reported to the memory profiler
#[derive(Debug, Clone, PartialEq)]
pub struct RetainedState {
    pub location: String,
    pub bytes: u64,
    pub entries: u64,
}
