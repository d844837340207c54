//! Configuration and scheduling for the `agent-checks` binary
//!
//! A TOML file lists the instances to poll:
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [profiling]
//! profile_memory = true
//! location = "/var/lib/agent-checks/profiles"
//!
//! [[openstack]]
//! keystone_server_url = "http://keystone:5000"
//! nova_api_url = "http://nova:8774/v2.1"
//! auth_token = "..."
//! interval_secs = 60
//!
//! [[harbor]]
//! url = "https://harbor.example.com"
//! username = "admin"
//! password = "..."
//!
//! [[go_expvar]]
//! expvar_url = "http://localhost:8079"
//! metrics = [{ path = "num_calls", type = "monotonic_counter" }]
//! ```
//!
//! Every instance runs as its own task on its own interval. See
//! [`Scheduler`].

use thiserror::Error;

pub mod config;
pub mod scheduler;

pub use config::{AgentConfig, ProfilingSettings};
pub use scheduler::{ScheduledCheck, Scheduler, build_checks, run_once};

/// Error types for configuration and startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to parse {path}: {message}")]
    Parsing { path: String, message: String },

    #[error("Invalid instance '{instance}': {source}")]
    Instance {
        instance: String,
        #[source]
        source: agent_checks_base::CheckError,
    },

    #[error("Logging setup error: {0}")]
    Logging(#[from] agent_checks_logging::LoggingError),

    #[error("Profiling error: {0}")]
    Profiling(#[from] agent_checks_logging::ProfilingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn parsing(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parsing {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn instance(instance: impl Into<String>, source: agent_checks_base::CheckError) -> Self {
        Self::Instance {
            instance: instance.into(),
            source,
        }
    }
}

#[cfg(test)]
mod config_tests;
