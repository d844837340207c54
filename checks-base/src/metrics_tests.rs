//! Unit tests for metric samples and the aggregator

#[cfg(test)]
mod tests {
    use super::super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_aggregator_records_samples() {
        let mut aggregator = Aggregator::new();
        assert!(aggregator.is_empty());

        aggregator.gauge("harbor.disk.free", 5e5, &tags(&["tag1:val1"]));
        aggregator.count("harbor.projects.count", 1.0, &tags(&["public:true"]));
        aggregator.monotonic_count("checks.runs", 3.0, &[]);
        aggregator.rate("checks.rate", 0.5, &[]);
        aggregator.histogram("checks.pause", 120.0, &[]);

        assert_eq!(aggregator.metrics().len(), 5);
        let gauge = aggregator.metrics_named("harbor.disk.free").next().unwrap();
        assert_eq!(gauge.kind, MetricKind::Gauge);
        assert_eq!(gauge.value, 5e5);
        assert_eq!(gauge.tags, tags(&["tag1:val1"]));
        assert_eq!(gauge.hostname, None);

        let count = aggregator.metrics_named("harbor.projects.count").next().unwrap();
        assert_eq!(count.kind, MetricKind::Count);
        let pause = aggregator.metrics_named("checks.pause").next().unwrap();
        assert_eq!(pause.kind, MetricKind::Histogram);
    }

    #[test]
    fn test_gauge_for_host() {
        let mut aggregator = Aggregator::new();
        aggregator.gauge_for_host("openstack.nova.server.memory", 524288.0, &[], "server-1");

        let sample = &aggregator.metrics()[0];
        assert_eq!(sample.hostname.as_deref(), Some("server-1"));
    }

    #[test]
    fn test_service_checks() {
        let mut aggregator = Aggregator::new();
        aggregator.service_check("harbor.status", ServiceCheckStatus::Ok, &[], None);
        aggregator.service_check(
            "harbor.registry.status",
            ServiceCheckStatus::Critical,
            &tags(&["registry:demo"]),
            Some("unreachable".to_string()),
        );

        assert_eq!(aggregator.service_checks().len(), 2);
        let registry = aggregator
            .service_checks_named("harbor.registry.status")
            .next()
            .unwrap();
        assert_eq!(registry.status, ServiceCheckStatus::Critical);
        assert_eq!(registry.message.as_deref(), Some("unreachable"));
    }

    #[test]
    fn test_drain_empties_aggregator() {
        let mut aggregator = Aggregator::new();
        aggregator.gauge("a", 1.0, &[]);
        aggregator.service_check("b", ServiceCheckStatus::Ok, &[], None);

        let (metrics, service_checks) = aggregator.drain();
        assert_eq!(metrics.len(), 1);
        assert_eq!(service_checks.len(), 1);
        assert!(aggregator.is_empty());
    }

    #[test]
    fn test_flush_to_log_clears() {
        let mut aggregator = Aggregator::new();
        aggregator.gauge("a", 1.0, &[]);
        aggregator.flush_to_log("openstack:test");
        assert!(aggregator.is_empty());
    }

    #[test]
    fn test_metric_sample_serialization() {
        let sample = MetricSample {
            name: "openstack.nova.server.rx".to_string(),
            kind: MetricKind::MonotonicCount,
            value: 2070139.0,
            tags: tags(&["interface:vnet1"]),
            hostname: Some("server-1".to_string()),
        };

        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains("\"monotonic_count\""));

        let deserialized: MetricSample = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, sample);
    }

    #[test]
    fn test_instance_metrics_default() {
        let metrics = InstanceMetrics::default();
        assert_eq!(metrics.runs_total, 0);
        assert_eq!(metrics.runs_failed, 0);
        assert_eq!(metrics.failure_rate, 0.0);
        assert_eq!(metrics.uptime_seconds, 0);
    }

    #[test]
    fn test_heap_size_grows_with_samples() {
        let mut aggregator = Aggregator::new();
        assert_eq!(aggregator.heap_size(), 0);
        assert_eq!(aggregator.len(), 0);

        aggregator.gauge("openstack.nova.server.memory", 1.0, &tags(&["nova_managed_server"]));
        let one = aggregator.heap_size();
        assert!(one >= std::mem::size_of::<MetricSample>() as u64 + 28 + 19);

        aggregator.service_check("openstack.nova.api.up", ServiceCheckStatus::Ok, &[], None);
        assert_eq!(aggregator.len(), 2);
        assert!(aggregator.heap_size() > one);

        aggregator.drain();
        assert_eq!(aggregator.heap_size(), 0);
    }
}
