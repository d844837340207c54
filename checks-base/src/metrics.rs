//! Metric samples and the in-memory aggregator checks submit into

use crate::check::ServiceCheckStatus;
use serde::{Deserialize, Serialize};
use tracing::info;

/// How the metrics pipeline should interpret a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Gauge,
    Count,
    MonotonicCount,
    Rate,
    Histogram,
}

/// A single numeric sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    pub tags: Vec<String>,
    /// Host the sample is attributed to, when it is not the agent host
    pub hostname: Option<String>,
}

/// A discrete up/down status signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCheckSample {
    pub name: String,
    pub status: ServiceCheckStatus,
    pub tags: Vec<String>,
    pub message: Option<String>,
}

/// Collects everything a check emits during one run
#[derive(Debug, Default, Clone)]
pub struct Aggregator {
    metrics: Vec<MetricSample>,
    service_checks: Vec<ServiceCheckSample>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a gauge
    pub fn gauge(&mut self, name: impl Into<String>, value: f64, tags: &[String]) {
        self.submit(name.into(), MetricKind::Gauge, value, tags, None);
    }

    /// Submit a gauge attributed to another host
    pub fn gauge_for_host(
        &mut self,
        name: impl Into<String>,
        value: f64,
        tags: &[String],
        hostname: impl Into<String>,
    ) {
        self.submit(
            name.into(),
            MetricKind::Gauge,
            value,
            tags,
            Some(hostname.into()),
        );
    }

    /// Submit a count
    pub fn count(&mut self, name: impl Into<String>, value: f64, tags: &[String]) {
        self.submit(name.into(), MetricKind::Count, value, tags, None);
    }

    /// Submit a monotonic count
    pub fn monotonic_count(&mut self, name: impl Into<String>, value: f64, tags: &[String]) {
        self.submit(name.into(), MetricKind::MonotonicCount, value, tags, None);
    }

    /// Submit a rate
    pub fn rate(&mut self, name: impl Into<String>, value: f64, tags: &[String]) {
        self.submit(name.into(), MetricKind::Rate, value, tags, None);
    }

    /// Submit one value of a distribution
    pub fn histogram(&mut self, name: impl Into<String>, value: f64, tags: &[String]) {
        self.submit(name.into(), MetricKind::Histogram, value, tags, None);
    }

    /// Submit a service check
    pub fn service_check(
        &mut self,
        name: impl Into<String>,
        status: ServiceCheckStatus,
        tags: &[String],
        message: Option<String>,
    ) {
        self.service_checks.push(ServiceCheckSample {
            name: name.into(),
            status,
            tags: tags.to_vec(),
            message,
        });
    }

    fn submit(
        &mut self,
        name: String,
        kind: MetricKind,
        value: f64,
        tags: &[String],
        hostname: Option<String>,
    ) {
        self.metrics.push(MetricSample {
            name,
            kind,
            value,
            tags: tags.to_vec(),
            hostname,
        });
    }

    /// All metric samples submitted so far
    pub fn metrics(&self) -> &[MetricSample] {
        &self.metrics
    }

    /// All service checks submitted so far
    pub fn service_checks(&self) -> &[ServiceCheckSample] {
        &self.service_checks
    }

    /// Metric samples with the given name
    pub fn metrics_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MetricSample> {
        self.metrics.iter().filter(move |m| m.name == name)
    }

    /// Service checks with the given name
    pub fn service_checks_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a ServiceCheckSample> {
        self.service_checks.iter().filter(move |s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.service_checks.is_empty()
    }

    /// Number of buffered samples, metrics and service checks together
    pub fn len(&self) -> usize {
        self.metrics.len() + self.service_checks.len()
    }

    /// Approximate bytes held by the buffered samples
    pub fn heap_size(&self) -> u64 {
        fn strings(tags: &[String]) -> usize {
            tags.iter().map(String::capacity).sum()
        }
        let metrics: usize = self
            .metrics
            .iter()
            .map(|m| {
                std::mem::size_of::<MetricSample>()
                    + m.name.capacity()
                    + strings(&m.tags)
                    + m.hostname.as_ref().map_or(0, String::capacity)
            })
            .sum();
        let service_checks: usize = self
            .service_checks
            .iter()
            .map(|s| {
                std::mem::size_of::<ServiceCheckSample>()
                    + s.name.capacity()
                    + strings(&s.tags)
                    + s.message.as_ref().map_or(0, String::capacity)
            })
            .sum();
        (metrics + service_checks) as u64
    }

    /// Take every submitted sample, leaving the aggregator empty
    pub fn drain(&mut self) -> (Vec<MetricSample>, Vec<ServiceCheckSample>) {
        (
            std::mem::take(&mut self.metrics),
            std::mem::take(&mut self.service_checks),
        )
    }

    /// Forward every submitted sample to the log and clear the aggregator
    pub fn flush_to_log(&mut self, instance: &str) {
        let (metrics, service_checks) = self.drain();
        for m in &metrics {
            info!(
                instance,
                metric = %m.name,
                kind = ?m.kind,
                value = m.value,
                tags = ?m.tags,
                hostname = m.hostname.as_deref().unwrap_or(""),
                "metric"
            );
        }
        for s in &service_checks {
            info!(
                instance,
                service_check = %s.name,
                status = ?s.status,
                tags = ?s.tags,
                "service check"
            );
        }
    }
}

/// Snapshot of run statistics for one check instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceMetrics {
    pub runs_total: u64,
    pub runs_failed: u64,
    pub failure_rate: f64,
    pub last_run_duration_ms: u64,
    pub uptime_seconds: u64,
}

impl Default for InstanceMetrics {
    fn default() -> Self {
        Self {
            runs_total: 0,
            runs_failed: 0,
            failure_rate: 0.0,
            last_run_duration_ms: 0,
            uptime_seconds: 0,
        }
    }
}
