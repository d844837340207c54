//! Runs every configured check instance on its own interval

use crate::{AgentConfig, ConfigError};
use agent_checks_base::{AgentCheck, Aggregator, CheckResult, InstanceSettings, RunCollector};
use agent_checks_go_expvar::GoExpvarCheck;
use agent_checks_harbor::HarborCheck;
use agent_checks_logging::{Frame, HeapTracer, MemoryProfiler, ProfilingConfig};
use agent_checks_openstack::OpenStackControllerCheck;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// A check instance with its schedule and run statistics
pub struct ScheduledCheck {
    pub check: Box<dyn AgentCheck>,
    pub settings: InstanceSettings,
    pub collector: RunCollector,
}

impl ScheduledCheck {
    pub fn new(check: Box<dyn AgentCheck>, settings: InstanceSettings) -> Self {
        let collector = RunCollector::new(settings.clone());
        Self {
            check,
            settings,
            collector,
        }
    }

    pub fn name(&self) -> &str {
        self.check.name()
    }
}

/// Build one check per configured instance
pub fn build_checks(config: &AgentConfig) -> Result<Vec<ScheduledCheck>, ConfigError> {
    let mut checks = Vec::with_capacity(config.instance_count());
    for instance in &config.openstack {
        let check = OpenStackControllerCheck::new(instance.clone())
            .map_err(|e| ConfigError::instance(instance.display_name(), e))?;
        checks.push(ScheduledCheck::new(
            Box::new(check),
            instance.settings.clone(),
        ));
    }
    for instance in &config.harbor {
        let check = HarborCheck::new(instance.clone())
            .map_err(|e| ConfigError::instance(instance.display_name(), e))?;
        checks.push(ScheduledCheck::new(
            Box::new(check),
            instance.settings.clone(),
        ));
    }
    for instance in &config.go_expvar {
        let check = GoExpvarCheck::new(instance.clone())
            .map_err(|e| ConfigError::instance(instance.display_name(), e))?;
        checks.push(ScheduledCheck::new(
            Box::new(check),
            instance.settings.clone(),
        ));
    }
    Ok(checks)
}

/// Per-instance report directory
fn profile_location(profiling: &ProfilingConfig, name: &str) -> ProfilingConfig {
    let dir: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    ProfilingConfig {
        location: profiling.location.join(dir),
        ..profiling.clone()
    }
}

/// Record what the run left behind: the check's cross-run state and the
/// samples it submitted
pub fn record_run_footprint(tracer: &mut HeapTracer, check: &dyn AgentCheck, aggregator: &Aggregator) {
    for state in check.retained_state() {
        tracer.record_allocations(vec![Frame::new(state.location, 0)], state.bytes, state.entries);
    }
    if !aggregator.is_empty() {
        tracer.record_allocations(
            vec![Frame::new(format!("aggregator::samples[{}]", check.name()), 0)],
            aggregator.heap_size(),
            aggregator.len() as u64,
        );
    }
}

/// Run `scheduled` once and log everything it submitted.
///
/// With `profiling`, the run happens between tracer start and snapshot and
/// its reports land in a directory named after the instance.
pub async fn run_once(
    scheduled: &mut ScheduledCheck,
    profiling: Option<&ProfilingConfig>,
) -> CheckResult<()> {
    let profiler = profiling.and_then(|config| {
        MemoryProfiler::new(profile_location(config, scheduled.name()))
            .inspect_err(|e| warn!(instance = %scheduled.name(), error = %e, "memory profiling disabled"))
            .ok()
    });
    let mut tracer = profiler.as_ref().map(MemoryProfiler::start);

    let mut aggregator = Aggregator::new();
    let started = Instant::now();
    let result = scheduled.check.check(&mut aggregator).await;
    let elapsed = started.elapsed();

    if let Some(tracer) = tracer.as_mut() {
        record_run_footprint(tracer, scheduled.check.as_ref(), &aggregator);
    }
    scheduled.collector.record_run(elapsed, result.is_ok());
    aggregator.flush_to_log(scheduled.check.name());

    match &result {
        Ok(()) => debug!(
            instance = %scheduled.name(),
            duration_ms = elapsed.as_millis() as u64,
            "check run completed"
        ),
        Err(e) => error!(instance = %scheduled.name(), error = %e, "check run failed"),
    }
    if scheduled.collector.is_overrunning() {
        warn!(
            instance = %scheduled.name(),
            duration_ms = elapsed.as_millis() as u64,
            interval_secs = scheduled.settings.interval_secs,
            "check run took longer than its interval"
        );
    }

    if let (Some(profiler), Some(tracer)) = (profiler, tracer) {
        if let Err(e) = profiler.finish(tracer, scheduled.name()) {
            warn!(instance = %scheduled.name(), error = %e, "memory profile not written");
        }
    }
    result
}

/// Run one instance on its interval, forever
async fn run_scheduled(mut scheduled: ScheduledCheck, profiling: Option<ProfilingConfig>) {
    let mut ticker = tokio::time::interval(scheduled.settings.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        instance = %scheduled.name(),
        interval_secs = scheduled.settings.interval_secs,
        "instance scheduled"
    );
    loop {
        ticker.tick().await;
        let _ = run_once(&mut scheduled, profiling.as_ref()).await;
    }
}

/// Drives every configured instance until shutdown
pub struct Scheduler {
    checks: Vec<ScheduledCheck>,
    profiling: Option<ProfilingConfig>,
}

impl Scheduler {
    pub fn from_config(config: &AgentConfig) -> Result<Self, ConfigError> {
        let profiling = config
            .profiling
            .profile_memory
            .then(|| config.profiling.report.clone());
        Ok(Self {
            checks: build_checks(config)?,
            profiling,
        })
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// One run of every instance, one after the other
    pub async fn run_all_once(&mut self) -> usize {
        let mut failed = 0;
        for scheduled in &mut self.checks {
            if run_once(scheduled, self.profiling.as_ref()).await.is_err() {
                failed += 1;
            }
        }
        failed
    }

    /// Run every instance on its interval; returns when all tasks end
    pub async fn run(self) {
        let mut tasks = JoinSet::new();
        for scheduled in self.checks {
            tasks.spawn(run_scheduled(scheduled, self.profiling.clone()));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "check task ended unexpectedly");
            }
        }
    }
}
