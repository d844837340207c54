//! Hypervisor load averages from `os-hypervisors/{id}/uptime`

use regex::Regex;
use std::sync::OnceLock;

static LOAD_AVERAGE_REGEX: OnceLock<Regex> = OnceLock::new();

fn load_average_regex() -> &'static Regex {
    LOAD_AVERAGE_REGEX.get_or_init(|| {
        Regex::new(r"load average:\s*([\d.]+),\s*([\d.]+),\s*([\d.]+)")
            .expect("Invalid load average regex")
    })
}

/// Metric names for the 1, 5 and 15 minute load averages
pub const LOAD_METRICS: [&str; 3] = [
    "openstack.nova.hypervisor_load.1",
    "openstack.nova.hypervisor_load.5",
    "openstack.nova.hypervisor_load.15",
];

/// Extract the three load averages from an `uptime` line.
///
/// Returns `None` when the line carries no load average.
pub fn parse_uptime_load(uptime: &str) -> Option<[f64; 3]> {
    let captures = load_average_regex().captures(uptime)?;
    let mut loads = [0.0; 3];
    for (slot, load) in loads.iter_mut().enumerate() {
        *load = captures.get(slot + 1)?.as_str().parse().ok()?;
    }
    Some(loads)
}
