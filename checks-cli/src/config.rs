//! Agent configuration file and environment overrides

use crate::ConfigError;
use agent_checks_go_expvar::GoExpvarInstance;
use agent_checks_harbor::HarborInstance;
use agent_checks_logging::{LoggingConfig, ProfilingConfig};
use agent_checks_openstack::OpenStackInstance;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Overrides `logging.level`
pub const LOG_LEVEL_ENV: &str = "AGENT_CHECKS_LOG_LEVEL";
/// Overrides `profiling.profile_memory`
pub const PROFILE_MEMORY_ENV: &str = "AGENT_CHECKS_PROFILE_MEMORY";

/// `[profiling]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilingSettings {
    /// Wrap every check run in a memory profile
    #[serde(default)]
    pub profile_memory: bool,
    #[serde(flatten)]
    pub report: ProfilingConfig,
}

/// Contents of the agent configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub profiling: ProfilingSettings,
    #[serde(default)]
    pub openstack: Vec<OpenStackInstance>,
    #[serde(default)]
    pub harbor: Vec<HarborInstance>,
    #[serde(default)]
    pub go_expvar: Vec<GoExpvarInstance>,
}

impl AgentConfig {
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::parsing(origin, e.to_string()))
    }

    /// Read the file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::configuration(format!("Failed to read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&content, &path.display().to_string())?;
        config.apply_env_overrides()?;
        debug!(
            path = %path.display(),
            openstack = config.openstack.len(),
            harbor = config.harbor.len(),
            go_expvar = config.go_expvar.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Configuration built from defaults and the environment alone
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(level) = env_utils::get_env(LOG_LEVEL_ENV) {
            self.logging.level = level;
        }
        if let Some(enabled) = env_utils::get_env(PROFILE_MEMORY_ENV) {
            self.profiling.profile_memory = env_utils::parse_flag(PROFILE_MEMORY_ENV, &enabled)?;
        }
        Ok(())
    }

    pub fn instance_count(&self) -> usize {
        self.openstack.len() + self.harbor.len() + self.go_expvar.len()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_count() == 0 {
            return Err(ConfigError::configuration(
                "no [[openstack]], [[harbor]] or [[go_expvar]] instances configured",
            ));
        }
        self.logging.env_filter()?;
        if self.profiling.profile_memory {
            self.profiling.report.validate()?;
        }
        for instance in &self.openstack {
            instance
                .validate()
                .map_err(|e| ConfigError::instance(instance.display_name(), e))?;
        }
        for instance in &self.harbor {
            instance
                .validate()
                .map_err(|e| ConfigError::instance(instance.display_name(), e))?;
        }
        for instance in &self.go_expvar {
            instance
                .validate()
                .map_err(|e| ConfigError::instance(instance.display_name(), e))?;
        }
        Ok(())
    }
}

/// Environment variable utilities
pub mod env_utils {
    use crate::ConfigError;
    use std::env;

    /// Non-empty value of `key`
    pub fn get_env(key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    /// Accepts `true`/`false`, `1`/`0`, `yes`/`no` and `on`/`off`
    pub fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => Err(ConfigError::configuration(format!(
                "Invalid value for {key}: '{other}' is not a boolean"
            ))),
        }
    }
}
