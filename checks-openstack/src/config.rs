//! OpenStack controller instance configuration

use agent_checks_base::config::validate_http_url;
use agent_checks_base::{CheckError, CheckResult, HttpSettings, InstanceSettings};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Servers requested per page when no limit is configured
pub const DEFAULT_PAGINATED_SERVER_LIMIT: usize = 1000;

/// One monitored OpenStack deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenStackInstance {
    /// Instance name used in logs; defaults to the keystone URL
    #[serde(default)]
    pub name: Option<String>,

    pub keystone_server_url: String,
    pub nova_api_url: String,
    #[serde(default)]
    pub neutron_api_url: Option<String>,

    /// Token sent as `X-Auth-Token`
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Servers requested per page
    #[serde(default)]
    pub paginated_server_limit: Option<usize>,

    /// Stop fetching after this many servers; the sweep then never evicts
    #[serde(default)]
    pub max_servers: Option<usize>,

    /// Project ids or names whose servers are ignored
    #[serde(default)]
    pub blacklist_projects: Vec<String>,

    /// Regexes matched against server ids
    #[serde(default)]
    pub exclude_server_ids: Vec<String>,

    #[serde(default = "default_true")]
    pub collect_server_diagnostics: bool,

    #[serde(default)]
    pub collect_hypervisor_load: bool,

    #[serde(flatten)]
    pub settings: InstanceSettings,
}

fn default_true() -> bool {
    true
}

impl OpenStackInstance {
    pub fn new(keystone_server_url: impl Into<String>, nova_api_url: impl Into<String>) -> Self {
        Self {
            name: None,
            keystone_server_url: keystone_server_url.into(),
            nova_api_url: nova_api_url.into(),
            neutron_api_url: None,
            auth_token: None,
            paginated_server_limit: None,
            max_servers: None,
            blacklist_projects: Vec::new(),
            exclude_server_ids: Vec::new(),
            collect_server_diagnostics: true,
            collect_hypervisor_load: false,
            settings: InstanceSettings::default(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.keystone_server_url)
    }

    pub fn page_size(&self) -> usize {
        self.paginated_server_limit
            .unwrap_or(DEFAULT_PAGINATED_SERVER_LIMIT)
    }

    pub fn validate(&self) -> CheckResult<()> {
        self.settings.validate()?;
        validate_http_url("keystone_server_url", &self.keystone_server_url)?;
        validate_http_url("nova_api_url", &self.nova_api_url)?;
        if let Some(neutron) = &self.neutron_api_url {
            validate_http_url("neutron_api_url", neutron)?;
        }
        if self.paginated_server_limit == Some(0) {
            return Err(CheckError::configuration(
                "paginated_server_limit must be greater than 0",
            ));
        }
        if self.max_servers == Some(0) {
            return Err(CheckError::configuration(
                "max_servers must be greater than 0",
            ));
        }
        ServerExclusions::compile(&self.exclude_server_ids)?;
        Ok(())
    }

    /// Connection settings for the instance's HTTP client
    pub fn http_settings(&self) -> HttpSettings {
        let mut headers = HashMap::new();
        if let Some(token) = &self.auth_token {
            headers.insert("X-Auth-Token".to_string(), token.clone());
        }
        HttpSettings {
            timeout: self.settings.timeout(),
            ssl_verify: self.settings.ssl_verify,
            headers,
            basic_auth: None,
        }
    }
}

/// Compiled `exclude_server_ids` patterns
#[derive(Debug, Clone, Default)]
pub struct ServerExclusions {
    patterns: Vec<Regex>,
}

impl ServerExclusions {
    pub fn compile(patterns: &[String]) -> CheckResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("^(?:{p})$")).map_err(|e| {
                    CheckError::configuration(format!("Invalid exclude_server_ids pattern '{p}': {e}"))
                })
            })
            .collect::<CheckResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Whether `server_id` is fully matched by any pattern
    pub fn is_excluded(&self, server_id: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(server_id))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
