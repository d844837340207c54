//! Settings every check instance shares

use crate::error::{CheckError, CheckResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduling and connection settings common to all instances
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceSettings {
    /// Seconds between two runs of the instance
    pub interval_secs: u64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Verify TLS certificates of the polled API
    pub ssl_verify: bool,
    /// Tags attached to every sample the instance emits
    pub tags: Vec<String>,
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            interval_secs: crate::DEFAULT_INTERVAL_SECONDS,
            timeout_secs: crate::DEFAULT_TIMEOUT_SECONDS,
            ssl_verify: true,
            tags: Vec::new(),
        }
    }
}

impl InstanceSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate scheduling settings
    pub fn validate(&self) -> CheckResult<()> {
        if self.interval_secs == 0 {
            return Err(CheckError::configuration(
                "interval_secs must be greater than 0",
            ));
        }
        if self.timeout_secs == 0 {
            return Err(CheckError::configuration(
                "timeout_secs must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Validate that `url` is an absolute http(s) URL
pub fn validate_http_url(field: &str, url: &str) -> CheckResult<url::Url> {
    let parsed = url::Url::parse(url)
        .map_err(|e| CheckError::configuration(format!("Invalid {field} '{url}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CheckError::configuration(format!(
            "{field} must start with http or https"
        )));
    }
    Ok(parsed)
}

/// Join `base` and `path` with exactly one slash between them
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
