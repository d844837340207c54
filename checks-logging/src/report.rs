//! Memory profiling reports written between check runs
//!
//! Layout under the configured location:
//!
//! ```text
//! <location>/snapshots/snapshot_<timestamp>   "Top N lines" report
//! <location>/diffs/diff_<timestamp>           changes since the previous run
//! <location>/last-snapshot                    baseline for the next diff
//! ```
//!
//! `last-snapshot` is a single slot overwritten on every run.

use crate::profiling::{HeapTracer, KeyType, MemorySnapshot, TraceFilter};
use crate::units::UnitFormatter;
use crate::{ProfilingError, ProfilingResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

pub const SNAPSHOTS_DIR: &str = "snapshots";
pub const DIFFS_DIR: &str = "diffs";
pub const LAST_SNAPSHOT_FILE: &str = "last-snapshot";

/// Memory profiling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    /// Directory receiving snapshots, diffs and the baseline
    pub location: PathBuf,
    /// Frames kept per traceback
    pub depth: usize,
    /// Keep internal frames in reports
    pub verbose: bool,
    /// Statistics grouping
    pub sorting: KeyType,
    /// Entries per report
    pub lines: usize,
    /// `highest` or a pinned unit such as `KiB`
    pub unit: String,
    /// Directory name after which report paths are shortened
    pub source_root_marker: Option<String>,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            location: PathBuf::from("./profiles"),
            depth: 25,
            verbose: false,
            sorting: KeyType::Lineno,
            lines: 40,
            unit: "highest".to_string(),
            source_root_marker: None,
        }
    }
}

impl ProfilingConfig {
    pub fn validate(&self) -> ProfilingResult<()> {
        if self.depth == 0 {
            return Err(ProfilingError::Configuration(
                "depth must be greater than 0".to_string(),
            ));
        }
        if self.location.as_os_str().is_empty() {
            return Err(ProfilingError::Configuration(
                "location must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// `<prefix>_<UTC timestamp with microseconds>`
pub fn timestamp_filename(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{prefix}_{}", now.format("%Y-%m-%dT%H-%M-%S_%6f"))
}

/// Drop everything up to and including the `marker` directory
fn shorten_path(filename: &str, marker: Option<&str>) -> String {
    let Some(marker) = marker else {
        return filename.to_string();
    };
    let path = Path::new(filename);
    let components: Vec<Component<'_>> = path.components().collect();
    match components
        .iter()
        .position(|c| c.as_os_str() == marker)
    {
        Some(index) if index + 1 < components.len() => components[index + 1..]
            .iter()
            .collect::<PathBuf>()
            .display()
            .to_string(),
        _ => filename.to_string(),
    }
}

/// Source lines read while writing one report
#[derive(Default)]
struct SourceLines {
    files: HashMap<String, Option<Vec<String>>>,
}

impl SourceLines {
    fn line(&mut self, filename: &str, lineno: u32) -> Option<String> {
        let lines = self
            .files
            .entry(filename.to_string())
            .or_insert_with(|| {
                fs::read_to_string(filename)
                    .ok()
                    .map(|source| source.lines().map(str::to_string).collect())
            })
            .as_ref()?;
        let line = lines.get((lineno as usize).checked_sub(1)?)?.trim();
        (!line.is_empty()).then(|| line.to_string())
    }
}

/// Write the biggest `limit` statistics of `snapshot` to `path`
pub fn write_pretty_top(
    path: &Path,
    snapshot: &MemorySnapshot,
    formatter: &UnitFormatter,
    key_type: KeyType,
    limit: usize,
    source_root_marker: Option<&str>,
) -> ProfilingResult<()> {
    let stats = snapshot.statistics(key_type);
    let mut out = BufWriter::new(fs::File::create(path)?);
    let mut sources = SourceLines::default();

    writeln!(out, "Top {limit} lines")?;
    for (index, stat) in stats.iter().take(limit).enumerate() {
        let frame = stat.frame();
        let (amount, unit) = formatter.format(stat.size);
        writeln!(
            out,
            "#{}: {}:{}: {amount} {unit}",
            index + 1,
            shorten_path(&frame.filename, source_root_marker),
            frame.lineno
        )?;
        if let Some(line) = sources.line(&frame.filename, frame.lineno) {
            writeln!(out, "    {line}")?;
        }
    }

    let other = stats.get(limit..).unwrap_or_default();
    if !other.is_empty() {
        let (amount, unit) = formatter.format(other.iter().map(|s| s.size).sum());
        writeln!(out, "{} other: {amount} {unit}", other.len())?;
    }

    let (amount, unit) = formatter.format(stats.iter().map(|s| s.size).sum());
    writeln!(out, "Total allocated size: {amount} {unit}")?;
    out.flush()?;
    Ok(())
}

/// Files written by one profiled run
#[derive(Debug, Clone)]
pub struct ProfileOutcome {
    pub snapshot_path: PathBuf,
    pub diff_path: Option<PathBuf>,
    pub snapshot: MemorySnapshot,
}

/// Starts tracing before a run and writes its reports afterwards
#[derive(Debug, Clone)]
pub struct MemoryProfiler {
    config: ProfilingConfig,
}

impl MemoryProfiler {
    pub fn new(config: ProfilingConfig) -> ProfilingResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ProfilingConfig {
        &self.config
    }

    /// A started tracer for one run
    pub fn start(&self) -> HeapTracer {
        let mut tracer = HeapTracer::new();
        tracer.start(self.config.depth);
        tracer
    }

    /// Snapshot `tracer`, stop it, and write the run's reports
    pub fn finish(&self, mut tracer: HeapTracer, label: &str) -> ProfilingResult<ProfileOutcome> {
        let captured = tracer.capture(label);
        tracer.stop();
        let mut snapshot = captured?;

        if !self.config.verbose {
            snapshot = snapshot.filter_traces(&TraceFilter::internal_frames()?);
        }
        self.write_reports(snapshot, Utc::now())
    }

    fn write_reports(
        &self,
        snapshot: MemorySnapshot,
        now: DateTime<Utc>,
    ) -> ProfilingResult<ProfileOutcome> {
        let location = &self.config.location;
        let formatter = UnitFormatter::new(&self.config.unit);
        let marker = self.config.source_root_marker.as_deref();

        let snapshot_dir = location.join(SNAPSHOTS_DIR);
        fs::create_dir_all(&snapshot_dir)?;
        let snapshot_path = snapshot_dir.join(timestamp_filename("snapshot", now));
        write_pretty_top(
            &snapshot_path,
            &snapshot,
            &formatter,
            self.config.sorting,
            self.config.lines,
            marker,
        )?;

        let baseline = location.join(LAST_SNAPSHOT_FILE);
        let diff_path = if baseline.is_file() {
            let previous = MemorySnapshot::load(&baseline)?;
            let diff_dir = location.join(DIFFS_DIR);
            fs::create_dir_all(&diff_dir)?;
            let path = diff_dir.join(timestamp_filename("diff", now));

            let mut out = BufWriter::new(fs::File::create(&path)?);
            for stat in snapshot
                .compare_to(&previous, self.config.sorting)
                .iter()
                .take(self.config.lines)
            {
                writeln!(out, "{stat}")?;
            }
            out.flush()?;
            Some(path)
        } else {
            debug!(path = %baseline.display(), "no baseline snapshot, skipping diff");
            None
        };

        snapshot.persist(&baseline)?;
        info!(
            snapshot = %snapshot_path.display(),
            diff = ?diff_path,
            total_bytes = snapshot.total_size(),
            "memory profile written"
        );

        Ok(ProfileOutcome {
            snapshot_path,
            diff_path,
            snapshot,
        })
    }
}

/// Run `run` under a tracer and write its memory reports.
///
/// The tracer is stopped even when reporting fails.
pub fn profile_memory<T, F>(config: &ProfilingConfig, label: &str, run: F) -> ProfilingResult<(T, ProfileOutcome)>
where
    F: FnOnce(&mut HeapTracer) -> T,
{
    let profiler = MemoryProfiler::new(config.clone())?;
    let mut tracer = profiler.start();
    let value = run(&mut tracer);
    let outcome = profiler.finish(tracer, label)?;
    Ok((value, outcome))
}
