//! Merging a fetched server batch into the inventory cache
//!
//! Rules applied for every pass:
//! - a fetched server is cached only when its project resolves through the
//!   pass's [`ProjectMap`] to a project with a display name, and that
//!   project is not blacklisted
//! - a cached server missing from the batch is evicted only when its project
//!   is present in the pass's [`ProjectMap`] and is not blacklisted
//!
//! Everything else is left untouched, so the cache never loses a server
//! whose absence this pass is inconclusive.

use crate::cache::ServerCache;
use crate::model::{Blacklist, InventoryItem, Project, ProjectMap};
use std::collections::HashSet;
use tracing::debug;

/// What one pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub updated: usize,
    pub evicted: usize,
    pub skipped_blacklisted: usize,
    pub skipped_unknown_project: usize,
}

/// The cache produced by a pass and what the pass did
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub cache: ServerCache,
    pub report: ReconcileReport,
}

/// Applies one pass's project map and blacklist to the cache
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    project_map: &'a ProjectMap,
    blacklist: &'a Blacklist,
}

impl<'a> Reconciler<'a> {
    pub fn new(project_map: &'a ProjectMap, blacklist: &'a Blacklist) -> Self {
        Self {
            project_map,
            blacklist,
        }
    }

    /// Merge a batch from a complete sweep, evicting servers it no longer lists
    pub fn reconcile(&self, cache: ServerCache, fetched: &[InventoryItem]) -> Reconciliation {
        self.apply(cache, fetched, true)
    }

    /// Merge a batch from a partial sweep; nothing is evicted
    pub fn merge(&self, cache: ServerCache, fetched: &[InventoryItem]) -> Reconciliation {
        self.apply(cache, fetched, false)
    }

    fn apply(
        &self,
        mut cache: ServerCache,
        fetched: &[InventoryItem],
        evict: bool,
    ) -> Reconciliation {
        let mut report = ReconcileReport::default();

        for item in fetched {
            let Some(project) = self.resolve(item) else {
                debug!(server = %item.id, project = ?item.project_id, "unresolved project, skipping");
                report.skipped_unknown_project += 1;
                continue;
            };
            if self.blacklist.matches(project) {
                report.skipped_blacklisted += 1;
                continue;
            }

            let mut item = item.clone();
            item.project_name = project.display_name().map(str::to_string);
            match cache.insert(item) {
                Some(_) => report.updated += 1,
                None => report.added += 1,
            }
        }

        if evict {
            let seen: HashSet<&str> = fetched.iter().map(|i| i.id.as_str()).collect();
            cache.retain(|id, previous| {
                if seen.contains(id.as_str()) || !self.is_evictable(previous) {
                    return true;
                }
                debug!(server = %id, "server no longer listed, evicting");
                report.evicted += 1;
                false
            });
        }

        Reconciliation { cache, report }
    }

    fn resolve(&self, item: &InventoryItem) -> Option<&'a Project> {
        self.project_map
            .get(item.project_id.as_deref())
            .filter(|p| p.display_name().is_some())
    }

    fn is_evictable(&self, previous: &InventoryItem) -> bool {
        let Some(project) = self.project_map.get(previous.project_id.as_deref()) else {
            return false;
        };
        let recorded = Project {
            id: project.id.clone(),
            name: previous.project_name.clone(),
        };
        !self.blacklist.matches(project) && !self.blacklist.matches(&recorded)
    }
}

/// Merge a complete sweep's batch into `cache`
pub fn reconcile(
    cache: ServerCache,
    fetched: &[InventoryItem],
    project_map: &ProjectMap,
    blacklist: &Blacklist,
) -> ServerCache {
    Reconciler::new(project_map, blacklist)
        .reconcile(cache, fetched)
        .cache
}

/// Merge a partial sweep's batch into `cache` without evicting
pub fn merge(
    cache: ServerCache,
    fetched: &[InventoryItem],
    project_map: &ProjectMap,
    blacklist: &Blacklist,
) -> ServerCache {
    Reconciler::new(project_map, blacklist)
        .merge(cache, fetched)
        .cache
}
