//! Allocation snapshots and snapshot diffs
//!
//! A [`HeapTracer`] receives allocation records while it is started and
//! turns them into [`MemorySnapshot`]s. Snapshots group their traces into
//! [`Statistic`]s by source line, file or whole traceback, and two snapshots
//! compare into [`StatisticDiff`]s ordered by the size that changed most.
//! Snapshots persist as JSON so a later process can diff against them.
//!
//! The tracer only knows what is recorded into it. It does not hook the
//! global allocator, so callers report the footprint they can measure
//! (cached state, buffered samples) rather than every allocation a run makes.

use crate::units::format_size;
use crate::{ProfilingError, ProfilingResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Frame recorded when a trace has no location
pub const UNKNOWN_FILE: &str = "<unknown>";

/// A source location in an allocation traceback
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Frame {
    pub filename: String,
    pub lineno: u32,
}

impl Frame {
    pub fn new(filename: impl Into<String>, lineno: u32) -> Self {
        Self {
            filename: filename.into(),
            lineno,
        }
    }

    fn unknown() -> Self {
        Self::new(UNKNOWN_FILE, 0)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.lineno)
    }
}

/// Allocations sharing one traceback, most recent frame first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub traceback: Vec<Frame>,
    pub size: u64,
    pub count: u64,
}

impl Trace {
    fn top(&self) -> Frame {
        self.traceback.first().cloned().unwrap_or_else(Frame::unknown)
    }
}

/// How traces are grouped into statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Most recent frame
    #[default]
    Lineno,
    /// File of the most recent frame
    Filename,
    /// Whole traceback
    Traceback,
}

impl KeyType {
    fn key(self, trace: &Trace) -> Vec<Frame> {
        match self {
            KeyType::Lineno => vec![trace.top()],
            KeyType::Filename => vec![Frame::new(trace.top().filename, 0)],
            KeyType::Traceback if trace.traceback.is_empty() => vec![Frame::unknown()],
            KeyType::Traceback => trace.traceback.clone(),
        }
    }
}

impl FromStr for KeyType {
    type Err = ProfilingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lineno" => Ok(KeyType::Lineno),
            "filename" => Ok(KeyType::Filename),
            "traceback" => Ok(KeyType::Traceback),
            other => Err(ProfilingError::Configuration(format!(
                "unknown sort key '{other}', expected lineno, filename or traceback"
            ))),
        }
    }
}

/// Allocated size and count for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistic {
    pub traceback: Vec<Frame>,
    pub size: u64,
    pub count: u64,
}

impl Statistic {
    /// The frame reported for this statistic
    pub fn frame(&self) -> Frame {
        self.traceback.first().cloned().unwrap_or_else(Frame::unknown)
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: size={}, count={}",
            self.frame(),
            format_size(self.size as f64, false),
            self.count
        )?;
        if self.count > 0 {
            write!(
                f,
                ", average={}",
                format_size(self.size as f64 / self.count as f64, false)
            )?;
        }
        Ok(())
    }
}

/// Change of one key between two snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticDiff {
    pub traceback: Vec<Frame>,
    pub size: u64,
    pub size_diff: i64,
    pub count: u64,
    pub count_diff: i64,
}

impl StatisticDiff {
    pub fn frame(&self) -> Frame {
        self.traceback.first().cloned().unwrap_or_else(Frame::unknown)
    }
}

impl fmt::Display for StatisticDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: size={} ({}), count={} ({:+})",
            self.frame(),
            format_size(self.size as f64, false),
            format_size(self.size_diff as f64, true),
            self.count,
            self.count_diff
        )?;
        if self.count > 0 {
            write!(
                f,
                ", average={}",
                format_size(self.size as f64 / self.count as f64, false)
            )?;
        }
        Ok(())
    }
}

/// Include or exclude traces whose most recent frame matches a file pattern.
///
/// Patterns are globs where `*` matches any run of characters.
#[derive(Debug, Clone)]
pub struct TraceFilter {
    inclusive: bool,
    pattern: Regex,
}

impl TraceFilter {
    pub fn include(pattern: &str) -> ProfilingResult<Self> {
        Self::new(true, pattern)
    }

    pub fn exclude(pattern: &str) -> ProfilingResult<Self> {
        Self::new(false, pattern)
    }

    fn new(inclusive: bool, pattern: &str) -> ProfilingResult<Self> {
        let glob = regex::escape(pattern).replace(r"\*", ".*");
        let pattern = Regex::new(&format!("^{glob}$")).map_err(|e| {
            ProfilingError::Configuration(format!("invalid trace filter '{pattern}': {e}"))
        })?;
        Ok(Self { inclusive, pattern })
    }

    fn keeps(&self, trace: &Trace) -> bool {
        self.pattern.is_match(&trace.top().filename) == self.inclusive
    }

    /// Frames hidden from reports unless verbose output is requested
    pub fn internal_frames() -> ProfilingResult<Vec<Self>> {
        [UNKNOWN_FILE, "/rustc/*", file!(), concat!("*/", file!())]
            .into_iter()
            .map(Self::exclude)
            .collect()
    }
}

/// Allocation traces captured at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub label: String,
    pub timestamp: DateTime<Utc>,
    /// Maximum frames kept per traceback
    pub traceback_limit: usize,
    pub traces: Vec<Trace>,
}

impl MemorySnapshot {
    /// Keep only traces every filter accepts
    pub fn filter_traces(&self, filters: &[TraceFilter]) -> MemorySnapshot {
        MemorySnapshot {
            traces: self
                .traces
                .iter()
                .filter(|trace| filters.iter().all(|f| f.keeps(trace)))
                .cloned()
                .collect(),
            ..self.clone()
        }
    }

    fn grouped(&self, key_type: KeyType) -> BTreeMap<Vec<Frame>, (u64, u64)> {
        let mut groups: BTreeMap<Vec<Frame>, (u64, u64)> = BTreeMap::new();
        for trace in &self.traces {
            let entry = groups.entry(key_type.key(trace)).or_default();
            entry.0 += trace.size;
            entry.1 += trace.count;
        }
        groups
    }

    /// Statistics sorted by size, then count, biggest first
    pub fn statistics(&self, key_type: KeyType) -> Vec<Statistic> {
        let mut stats: Vec<Statistic> = self
            .grouped(key_type)
            .into_iter()
            .map(|(traceback, (size, count))| Statistic {
                traceback,
                size,
                count,
            })
            .collect();
        stats.sort_by(|a, b| {
            b.size
                .cmp(&a.size)
                .then(b.count.cmp(&a.count))
                .then_with(|| a.traceback.cmp(&b.traceback))
        });
        stats
    }

    /// Total bytes held by the snapshot's traces
    pub fn total_size(&self) -> u64 {
        self.traces.iter().map(|t| t.size).sum()
    }

    /// Differences from `previous`, see [`diff`]
    pub fn compare_to(&self, previous: &MemorySnapshot, key_type: KeyType) -> Vec<StatisticDiff> {
        diff(self, previous, key_type)
    }

    /// Write the snapshot to `path` as JSON, replacing any existing file
    pub fn persist(&self, path: &Path) -> ProfilingResult<()> {
        let json = serde_json::to_vec(self)?;
        fs::write(path, json)?;
        debug!(path = %path.display(), traces = self.traces.len(), "snapshot persisted");
        Ok(())
    }

    pub fn load(path: &Path) -> ProfilingResult<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Keys whose size or count changed between `previous` and `current`.
///
/// Sorted by absolute size change, then current size, then absolute count
/// change, biggest first.
pub fn diff(current: &MemorySnapshot, previous: &MemorySnapshot, key_type: KeyType) -> Vec<StatisticDiff> {
    let mut before = previous.grouped(key_type);
    let mut diffs = Vec::new();

    for (traceback, (size, count)) in current.grouped(key_type) {
        let (old_size, old_count) = before.remove(&traceback).unwrap_or_default();
        diffs.push(StatisticDiff {
            traceback,
            size,
            size_diff: size as i64 - old_size as i64,
            count,
            count_diff: count as i64 - old_count as i64,
        });
    }
    for (traceback, (old_size, old_count)) in before {
        diffs.push(StatisticDiff {
            traceback,
            size: 0,
            size_diff: -(old_size as i64),
            count: 0,
            count_diff: -(old_count as i64),
        });
    }

    diffs.retain(|d| d.size_diff != 0 || d.count_diff != 0);
    diffs.sort_by(|a, b| {
        b.size_diff
            .unsigned_abs()
            .cmp(&a.size_diff.unsigned_abs())
            .then(b.size.cmp(&a.size))
            .then(b.count_diff.unsigned_abs().cmp(&a.count_diff.unsigned_abs()))
            .then(b.count.cmp(&a.count))
            .then_with(|| a.traceback.cmp(&b.traceback))
    });
    diffs
}

/// Collects allocation records between `start` and `stop`
#[derive(Debug, Default)]
pub struct HeapTracer {
    depth: Option<usize>,
    traces: BTreeMap<Vec<Frame>, (u64, u64)>,
}

impl HeapTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracing, keeping at most `depth` frames per traceback
    pub fn start(&mut self, depth: usize) {
        self.depth = Some(depth.max(1));
        self.traces.clear();
    }

    /// Stop tracing and forget every record
    pub fn stop(&mut self) {
        self.depth = None;
        self.traces.clear();
    }

    pub fn is_tracing(&self) -> bool {
        self.depth.is_some()
    }

    /// Record one allocation of `size` bytes; ignored while stopped
    pub fn record(&mut self, traceback: Vec<Frame>, size: u64) {
        self.record_allocations(traceback, size, 1);
    }

    /// Record `count` allocations totalling `size` bytes
    pub fn record_allocations(&mut self, mut traceback: Vec<Frame>, size: u64, count: u64) {
        let Some(depth) = self.depth else {
            return;
        };
        traceback.truncate(depth);
        let entry = self.traces.entry(traceback).or_default();
        entry.0 += size;
        entry.1 += count;
    }

    /// Record an allocation at the caller's source location
    #[track_caller]
    pub fn record_here(&mut self, size: u64) {
        let caller = std::panic::Location::caller();
        self.record(vec![Frame::new(caller.file(), caller.line())], size);
    }

    /// Snapshot of everything recorded since `start`
    pub fn capture(&self, label: impl Into<String>) -> ProfilingResult<MemorySnapshot> {
        let depth = self.depth.ok_or(ProfilingError::NotTracing)?;
        Ok(MemorySnapshot {
            label: label.into(),
            timestamp: Utc::now(),
            traceback_limit: depth,
            traces: self
                .traces
                .iter()
                .map(|(traceback, (size, count))| Trace {
                    traceback: traceback.clone(),
                    size: *size,
                    count: *count,
                })
                .collect(),
        })
    }
}
