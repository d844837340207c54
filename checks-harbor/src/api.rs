//! Typed access to the Harbor REST API

use agent_checks_base::config::join_url;
use agent_checks_base::{CheckError, CheckResult, HttpClient};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Status string Harbor uses for healthy components
pub const HEALTHY: &str = "healthy";

/// Projects requested per page
pub const PROJECTS_PAGE_SIZE: usize = 100;

/// Upper bound on pages walked for one collection
const MAX_PAGES: usize = 1000;

/// A `major.minor.patch` Harbor release
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HarborVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// First release with `/api/ping`
pub const VERSION_1_5: HarborVersion = HarborVersion::new(1, 5, 0);
/// First release with `/api/health` and `/api/registries`
pub const VERSION_1_8: HarborVersion = HarborVersion::new(1, 8, 0);

impl HarborVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse versions such as `v1.8.1-5d3c6a1a`
    pub fn parse(raw: &str) -> CheckResult<Self> {
        let release = raw
            .trim()
            .trim_start_matches('v')
            .split(['-', '+'])
            .next()
            .unwrap_or_default();
        let mut parts = release.split('.').map(str::parse::<u32>);
        let invalid = || CheckError::invalid_response(format!("unrecognized Harbor version '{raw}'"));

        let major = parts.next().and_then(Result::ok).ok_or_else(invalid)?;
        let minor = parts.next().and_then(Result::ok).ok_or_else(invalid)?;
        let patch = match parts.next() {
            Some(patch) => patch.map_err(|_| invalid())?,
            None => 0,
        };
        Ok(Self::new(major, minor, patch))
    }
}

impl fmt::Display for HarborVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Deserialize)]
struct SystemInfo {
    harbor_version: String,
    #[serde(default)]
    with_chartmuseum: bool,
}

/// Overall and per-component health, Harbor 1.8+
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub components: Vec<ComponentHealth>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
}

/// A replication registry (a "target" before 1.8)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Registry {
    pub id: Value,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HarborProject {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl HarborProject {
    /// The `public` metadata flag as Harbor reports it
    pub fn public(&self) -> Option<String> {
        self.metadata.get("public").map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Registry storage usage in bytes
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Storage {
    pub free: f64,
    pub total: f64,
}

#[derive(Debug, Deserialize)]
struct VolumeInfo {
    storage: Storage,
}

/// A connected Harbor API
pub struct HarborApi {
    base_url: String,
    client: Arc<dyn HttpClient>,
    timeout: Option<Duration>,
    pub version: HarborVersion,
    pub with_chartrepo: bool,
}

impl HarborApi {
    /// Read `/api/systeminfo` to learn the version and enabled components
    pub async fn connect(
        base_url: impl Into<String>,
        client: Arc<dyn HttpClient>,
        timeout: Option<Duration>,
    ) -> CheckResult<Self> {
        let base_url = base_url.into();
        let url = join_url(&base_url, "api/systeminfo");
        let info: SystemInfo = decode(&url, client.get(&url, &[], timeout).await?)?;
        let version = HarborVersion::parse(&info.harbor_version)?;
        debug!(%version, with_chartrepo = info.with_chartmuseum, "connected to Harbor");

        Ok(Self {
            base_url,
            client,
            timeout,
            version,
            with_chartrepo: info.with_chartmuseum,
        })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> CheckResult<T> {
        let url = self.url(path);
        decode(&url, self.client.get(&url, &[], self.timeout).await?)
    }

    /// `"Pong"` when the API is up
    pub async fn ping(&self) -> CheckResult<String> {
        let url = self.url("api/ping");
        Ok(match self.client.get(&url, &[], self.timeout).await? {
            Value::String(body) => body,
            other => other.to_string(),
        })
    }

    pub async fn health(&self) -> CheckResult<Health> {
        self.get("api/health").await
    }

    /// Whether chartmuseum reports itself healthy
    pub async fn chartrepo_health(&self) -> CheckResult<bool> {
        let body: Value = self.get("api/chartrepo/health").await?;
        Ok(body.get(HEALTHY).and_then(Value::as_bool).unwrap_or(false))
    }

    fn registries_path(&self) -> &'static str {
        if self.version >= VERSION_1_8 {
            "api/registries"
        } else {
            "api/targets"
        }
    }

    pub async fn registries(&self) -> CheckResult<Vec<Registry>> {
        self.get(self.registries_path()).await
    }

    /// Ask Harbor to ping a registry; any error means unreachable
    pub async fn registry_health(&self, id: &Value) -> CheckResult<()> {
        let url = self.url(&format!("{}/ping", self.registries_path()));
        self.client
            .post_json(&url, &json!({ "id": id }), self.timeout)
            .await?;
        Ok(())
    }

    pub async fn projects(&self) -> CheckResult<Vec<HarborProject>> {
        self.get_paginated("api/projects", PROJECTS_PAGE_SIZE).await
    }

    pub async fn volume_info(&self) -> CheckResult<Storage> {
        let info: VolumeInfo = self.get("api/systeminfo/volumes").await?;
        Ok(info.storage)
    }

    /// Walk `page`/`page_size` pages until a short or empty page
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        path: &str,
        page_size: usize,
    ) -> CheckResult<Vec<T>> {
        let url = self.url(path);
        let mut items = Vec::new();

        for page in 1..=MAX_PAGES {
            let params = vec![
                ("page".to_string(), page.to_string()),
                ("page_size".to_string(), page_size.to_string()),
            ];
            let batch: Vec<T> = decode(&url, self.client.get(&url, &params, self.timeout).await?)?;
            let len = batch.len();
            items.extend(batch);
            if len < page_size {
                break;
            }
        }
        Ok(items)
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: Value) -> CheckResult<T> {
    serde_json::from_value(body)
        .map_err(|e| CheckError::invalid_response(format!("unexpected payload from '{url}': {e}")))
}
