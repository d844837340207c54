//! Go expvar instance configuration

use crate::path::ExpvarPath;
use agent_checks_base::config::validate_http_url;
use agent_checks_base::{CheckError, CheckResult, HttpSettings, InstanceSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Values submitted per run when no limit is configured
pub const DEFAULT_MAX_METRICS: usize = 350;

/// Prefix of every metric name that is not aliased
pub const DEFAULT_METRIC_NAMESPACE: &str = "go_expvar";

/// Path used when `expvar_url` has none
pub const GO_EXPVAR_URL_PATH: &str = "/debug/vars";

/// `runtime.MemStats` fields reported as gauges
pub const DEFAULT_GAUGE_MEMSTATS: [&str; 8] = [
    "Alloc",
    "TotalAlloc",
    "HeapAlloc",
    "HeapSys",
    "HeapIdle",
    "HeapInuse",
    "HeapReleased",
    "HeapObjects",
];

/// `runtime.MemStats` fields reported as rates
pub const DEFAULT_RATE_MEMSTATS: [&str; 5] = ["Lookups", "Mallocs", "Frees", "PauseTotalNs", "NumGC"];

/// How a selected value is submitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpvarMetricType {
    #[default]
    Gauge,
    Rate,
    Counter,
    MonotonicCounter,
}

/// A user-selected expvar value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpvarMetric {
    /// Slash-separated keys, e.g. `memstats/BySize/1/Mallocs`
    pub path: String,

    /// Submit under this name and tag each value with `path:<keys>`
    #[serde(default)]
    pub alias: Option<String>,

    #[serde(default, rename = "type")]
    pub metric_type: ExpvarMetricType,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl ExpvarMetric {
    pub fn new(path: impl Into<String>, metric_type: ExpvarMetricType) -> Self {
        Self {
            path: path.into(),
            alias: None,
            metric_type,
            tags: Vec::new(),
        }
    }
}

/// The memstats selection every instance reports
pub fn default_metrics() -> Vec<ExpvarMetric> {
    let gauges = DEFAULT_GAUGE_MEMSTATS
        .iter()
        .map(|field| ExpvarMetric::new(format!("memstats/{field}"), ExpvarMetricType::Gauge));
    let rates = DEFAULT_RATE_MEMSTATS
        .iter()
        .map(|field| ExpvarMetric::new(format!("memstats/{field}"), ExpvarMetricType::Rate));
    gauges.chain(rates).collect()
}

/// One monitored Go process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoExpvarInstance {
    /// Instance name used in logs; defaults to the expvar URL
    #[serde(default)]
    pub name: Option<String>,

    pub expvar_url: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Reported in addition to the default memstats selection
    #[serde(default)]
    pub metrics: Vec<ExpvarMetric>,

    #[serde(default = "default_max_metrics")]
    pub max_returned_metrics: usize,

    #[serde(flatten)]
    pub settings: InstanceSettings,
}

fn default_namespace() -> String {
    DEFAULT_METRIC_NAMESPACE.to_string()
}

fn default_max_metrics() -> usize {
    DEFAULT_MAX_METRICS
}

impl GoExpvarInstance {
    pub fn new(expvar_url: impl Into<String>) -> Self {
        Self {
            name: None,
            expvar_url: expvar_url.into(),
            namespace: default_namespace(),
            metrics: Vec::new(),
            max_returned_metrics: DEFAULT_MAX_METRICS,
            settings: InstanceSettings::default(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.expvar_url)
    }

    pub fn validate(&self) -> CheckResult<()> {
        self.settings.validate()?;
        self.resolved_url()?;
        for metric in &self.metrics {
            if metric.path.is_empty() {
                return Err(CheckError::configuration(format!(
                    "metric {} has no path",
                    metric.alias.as_deref().unwrap_or("<unnamed>")
                )));
            }
            ExpvarPath::compile(&metric.path)?;
        }
        Ok(())
    }

    /// `expvar_url`, with `/debug/vars` when it names no path
    pub fn resolved_url(&self) -> CheckResult<String> {
        let mut url = validate_http_url("expvar_url", &self.expvar_url)?;
        if url.path().is_empty() || url.path() == "/" {
            url.set_path(GO_EXPVAR_URL_PATH);
        }
        Ok(url.to_string())
    }

    /// Instance tags plus `expvar_url:<url>`
    pub fn tags_for(&self, url: &str) -> Vec<String> {
        let mut tags = self.settings.tags.clone();
        let url_tag = format!("expvar_url:{url}");
        if !tags.contains(&url_tag) {
            tags.push(url_tag);
        }
        tags
    }

    /// Default memstats selection followed by the configured metrics
    pub fn all_metrics(&self) -> Vec<ExpvarMetric> {
        let mut metrics = default_metrics();
        metrics.extend(self.metrics.iter().cloned());
        metrics
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: self.settings.timeout(),
            ssl_verify: self.settings.ssl_verify,
            headers: HashMap::new(),
            basic_auth: None,
        }
    }
}
