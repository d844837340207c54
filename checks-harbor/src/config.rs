//! Harbor instance configuration

use agent_checks_base::config::validate_http_url;
use agent_checks_base::{CheckError, CheckResult, HttpSettings, InstanceSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One monitored Harbor deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarborInstance {
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(flatten)]
    pub settings: InstanceSettings,
}

impl HarborInstance {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            url: url.into(),
            username: username.into(),
            password: password.into(),
            settings: InstanceSettings::default(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    pub fn validate(&self) -> CheckResult<()> {
        self.settings.validate()?;
        validate_http_url("url", &self.url)?;
        if self.username.is_empty() {
            return Err(CheckError::configuration("username must not be empty"));
        }
        Ok(())
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: self.settings.timeout(),
            ssl_verify: self.settings.ssl_verify,
            headers: HashMap::new(),
            basic_auth: Some((self.username.clone(), self.password.clone())),
        }
    }
}
