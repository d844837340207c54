//! Run statistics for a scheduled check instance

use crate::{config::InstanceSettings, metrics::InstanceMetrics};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Counts runs and failures of one check instance
#[derive(Clone)]
pub struct RunCollector {
    settings: InstanceSettings,
    start_time: Instant,
    run_count: Arc<AtomicU64>,
    failure_count: Arc<AtomicU64>,
    last_run_ms: Arc<AtomicU64>,
}

impl RunCollector {
    pub fn new(settings: InstanceSettings) -> Self {
        Self {
            settings,
            start_time: Instant::now(),
            run_count: Arc::new(AtomicU64::new(0)),
            failure_count: Arc::new(AtomicU64::new(0)),
            last_run_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record the outcome of one run
    pub fn record_run(&self, duration: Duration, succeeded: bool) {
        self.run_count.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        self.last_run_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Whether the last run took longer than the scheduling interval
    pub fn is_overrunning(&self) -> bool {
        self.last_run_ms.load(Ordering::Relaxed) > self.settings.interval().as_millis() as u64
    }

    pub fn get_current_metrics(&self) -> InstanceMetrics {
        let runs_total = self.run_count.load(Ordering::Relaxed);
        let runs_failed = self.failure_count.load(Ordering::Relaxed);

        InstanceMetrics {
            runs_total,
            runs_failed,
            failure_rate: if runs_total > 0 {
                runs_failed as f64 / runs_total as f64
            } else {
                0.0
            },
            last_run_duration_ms: self.last_run_ms.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}
