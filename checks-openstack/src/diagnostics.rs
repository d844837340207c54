//! Per-server metrics from the flat (pre-2.48) diagnostics payload
//!
//! Nova returns diagnostics as a flat object such as
//! `{"cpu0_time": 17300000000, "vda_read": 262144, "vnet1_rx": 2070139}`.
//! Disk, CPU and memory keys map to `openstack.nova.server.<key>`; interface
//! keys are split on their `_rx`/`_tx` marker so every interface reports
//! under the same metric names with an `interface:<name>` tag.

use crate::model::InventoryItem;
use agent_checks_base::Aggregator;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

pub const SERVER_METRIC_PREFIX: &str = "openstack.nova.server";

static CPU_TIME_REGEX: OnceLock<Regex> = OnceLock::new();

fn cpu_time_regex() -> &'static Regex {
    CPU_TIME_REGEX.get_or_init(|| Regex::new(r"^cpu\d+_time$").expect("Invalid cpu time regex"))
}

const MEMORY_KEYS: [&str; 3] = ["memory", "memory-actual", "memory-rss"];
const DISK_PREFIXES: [&str; 2] = ["vda_", "hdd_"];

/// Where a diagnostics key lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKey<'a> {
    /// Reported under its own name
    Server(&'a str),
    /// Per-interface counter, e.g. `vnet1_rx_drop` is `rx_drop` on `vnet1`
    Interface { interface: &'a str, metric: String },
}

impl<'a> DiagnosticKey<'a> {
    pub fn classify(key: &'a str) -> Option<Self> {
        if MEMORY_KEYS.contains(&key)
            || cpu_time_regex().is_match(key)
            || DISK_PREFIXES.iter().any(|p| key.starts_with(p))
        {
            return Some(Self::Server(key));
        }

        let (marker, at) = ["_rx", "_tx"]
            .iter()
            .filter_map(|m| key.find(m).map(|at| (*m, at)))
            .min_by_key(|(_, at)| *at)?;
        let interface = &key[..at];
        if interface.is_empty() {
            return None;
        }
        let metric = format!("{}{}", &marker[1..], &key[at + marker.len()..]);
        Some(Self::Interface { interface, metric })
    }
}

/// Tags every diagnostics sample of `server` carries
pub fn server_tags(server: &InventoryItem, instance_tags: &[String]) -> Vec<String> {
    let mut tags = vec![
        "nova_managed_server".to_string(),
        format!(
            "availability_zone:{}",
            server
                .availability_zone
                .as_deref()
                .filter(|az| !az.is_empty())
                .unwrap_or("NA")
        ),
    ];
    if let Some(project) = &server.project_name {
        tags.push(format!("project_name:{project}"));
    }
    if let Some(hypervisor) = &server.hypervisor_hostname {
        tags.push(format!("hypervisor:{hypervisor}"));
    }
    if let Some(name) = &server.name {
        tags.push(format!("server_name:{name}"));
    }
    tags.extend(instance_tags.iter().cloned());
    tags
}

/// Submit one gauge per numeric diagnostics entry; returns how many were sent
pub fn submit_diagnostics(
    aggregator: &mut Aggregator,
    server: &InventoryItem,
    diagnostics: &Value,
    instance_tags: &[String],
) -> usize {
    let Some(entries) = diagnostics.as_object() else {
        debug!(server = %server.id, "diagnostics payload is not an object");
        return 0;
    };
    let tags = server_tags(server, instance_tags);

    let mut submitted = 0;
    for (key, value) in entries {
        let Some(value) = value.as_f64() else {
            continue;
        };
        match DiagnosticKey::classify(key) {
            Some(DiagnosticKey::Server(name)) => {
                aggregator.gauge_for_host(
                    format!("{SERVER_METRIC_PREFIX}.{name}"),
                    value,
                    &tags,
                    server.id.as_str(),
                );
            }
            Some(DiagnosticKey::Interface { interface, metric }) => {
                let mut tags = tags.clone();
                tags.push(format!("interface:{interface}"));
                aggregator.gauge_for_host(
                    format!("{SERVER_METRIC_PREFIX}.{metric}"),
                    value,
                    &tags,
                    server.id.as_str(),
                );
            }
            None => continue,
        }
        submitted += 1;
    }
    submitted
}
