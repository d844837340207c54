//! The Go expvar check

use crate::config::{ExpvarMetric, ExpvarMetricType, GoExpvarInstance};
use crate::path::{ExpvarPath, normalize, numeric_value};
use agent_checks_base::{AgentCheck, Aggregator, CheckError, CheckResult, HttpClient, ReqwestClient};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Dotted path the GC pause histogram is named after
pub const PAUSE_HISTOGRAM_PATH: &str = "memstats.PauseNs";

/// Length of the `PauseNs` circular buffer in `runtime.MemStats`
const PAUSE_RING_SIZE: u64 = 256;

/// Polls one Go process
pub struct GoExpvarCheck {
    instance: GoExpvarInstance,
    client: Arc<dyn HttpClient>,
    url: String,
    tags: Vec<String>,
    metrics: Vec<(ExpvarMetric, ExpvarPath)>,
    last_gc_count: u64,
}

impl GoExpvarCheck {
    pub fn new(instance: GoExpvarInstance) -> CheckResult<Self> {
        let client = ReqwestClient::new(instance.http_settings())?;
        Self::with_client(instance, Arc::new(client))
    }

    pub fn with_client(instance: GoExpvarInstance, client: Arc<dyn HttpClient>) -> CheckResult<Self> {
        instance.validate()?;
        let url = instance.resolved_url()?;
        let tags = instance.tags_for(&url);
        let metrics = instance
            .all_metrics()
            .into_iter()
            .map(|metric| ExpvarPath::compile(&metric.path).map(|path| (metric, path)))
            .collect::<CheckResult<Vec<_>>>()?;
        Ok(Self {
            instance,
            client,
            url,
            tags,
            metrics,
            last_gc_count: 0,
        })
    }

    /// URL polled by the check
    pub fn url(&self) -> &str {
        &self.url
    }

    /// GC count seen on the previous run
    pub fn last_gc_count(&self) -> u64 {
        self.last_gc_count
    }

    pub async fn fetch(&self) -> CheckResult<Value> {
        let data = self
            .client
            .get(&self.url, &[], Some(self.instance.settings.timeout()))
            .await?;
        if !data.is_object() {
            return Err(CheckError::invalid_response(format!(
                "expected a JSON object from '{}'",
                self.url
            )));
        }
        Ok(data)
    }

    /// Submit every GC pause recorded since the previous run.
    ///
    /// `PauseNs` is a ring of the most recent 256 pauses indexed by GC
    /// number, so only the slots written since `last_gc_count` are new.
    pub fn submit_gc_pauses(&mut self, data: &Value, aggregator: &mut Aggregator) {
        let memstats = data.get("memstats");
        let Some(num_gc) = memstats.and_then(|m| m.get("NumGC")).and_then(Value::as_u64) else {
            debug!(instance = %self.instance.display_name(), "no memstats.NumGC in payload");
            return;
        };
        if num_gc < self.last_gc_count {
            debug!(
                instance = %self.instance.display_name(),
                num_gc,
                last_gc_count = self.last_gc_count,
                "GC count went backwards, process restarted"
            );
            self.last_gc_count = 0;
        }
        if num_gc == self.last_gc_count {
            return;
        }
        let Some(pauses) = memstats.and_then(|m| m.get("PauseNs")).and_then(Value::as_array) else {
            debug!(instance = %self.instance.display_name(), "no memstats.PauseNs in payload");
            return;
        };

        let start = (self.last_gc_count % PAUSE_RING_SIZE) as usize;
        let end = ((num_gc + PAUSE_RING_SIZE - 1) % PAUSE_RING_SIZE + 1) as usize;
        let fresh: Vec<&Value> = if start < end {
            pauses.iter().skip(start).take(end - start).collect()
        } else {
            pauses.iter().skip(start).chain(pauses.iter().take(end)).collect()
        };
        self.last_gc_count = num_gc;

        let name = normalize(PAUSE_HISTOGRAM_PATH, &self.instance.namespace);
        for pause in fresh.into_iter().filter_map(numeric_value) {
            aggregator.histogram(name.as_str(), pause, &self.tags);
        }
    }

    /// Submit the configured selection, stopping at `max_returned_metrics`.
    ///
    /// Returns how many values were submitted.
    pub fn submit_metrics(&self, data: &Value, aggregator: &mut Aggregator) -> usize {
        let max = self.instance.max_returned_metrics;
        let mut submitted = 0;

        for (metric, path) in &self.metrics {
            let values = path.resolve(data);
            if values.is_empty() {
                warn!(instance = %self.instance.display_name(), path = path.as_str(), "no results matching path");
                continue;
            }
            let mut tags = metric.tags.clone();
            tags.extend(self.tags.iter().cloned());

            for (keys, value) in values {
                let actual_path = keys.join(".");
                let Some(number) = numeric_value(value) else {
                    warn!(path = path.as_str(), value = %value, "unreportable value");
                    continue;
                };
                if submitted >= max {
                    warn!(
                        instance = %self.instance.display_name(),
                        max_returned_metrics = max,
                        "reporting more metrics than the allowed maximum"
                    );
                    return submitted;
                }

                let mut sample_tags = tags.clone();
                let name = match &metric.alias {
                    Some(alias) => {
                        sample_tags.push(format!("path:{actual_path}"));
                        alias.clone()
                    }
                    None => normalize(&actual_path, &self.instance.namespace),
                };
                match metric.metric_type {
                    ExpvarMetricType::Gauge => aggregator.gauge(name, number, &sample_tags),
                    ExpvarMetricType::Rate => aggregator.rate(name, number, &sample_tags),
                    ExpvarMetricType::Counter => aggregator.count(name, number, &sample_tags),
                    ExpvarMetricType::MonotonicCounter => {
                        aggregator.monotonic_count(name, number, &sample_tags)
                    }
                }
                submitted += 1;
            }
        }
        submitted
    }
}

#[async_trait]
impl AgentCheck for GoExpvarCheck {
    fn name(&self) -> &str {
        self.instance.display_name()
    }

    async fn check(&mut self, aggregator: &mut Aggregator) -> CheckResult<()> {
        let data = self.fetch().await?;
        self.submit_gc_pauses(&data, aggregator);
        let submitted = self.submit_metrics(&data, aggregator);
        debug!(instance = %self.instance.display_name(), submitted, "expvar values submitted");
        Ok(())
    }
}
