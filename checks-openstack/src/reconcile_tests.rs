//! Unit tests for cache reconciliation

#[cfg(test)]
mod tests {
    use crate::cache::ServerCache;
    use crate::model::{Blacklist, InventoryItem, Project, ProjectMap};
    use crate::reconcile::*;

    const TESTPROJ_ID: &str = "6f70656e737461636b20342065766572";

    fn item(id: &str, project: Option<&str>) -> InventoryItem {
        InventoryItem::new(id, project)
    }

    fn cached(id: &str, project: &str, name: &str) -> InventoryItem {
        let mut item = item(id, Some(project));
        item.project_name = Some(name.to_string());
        item
    }

    fn projects(entries: &[(&str, Option<&str>)]) -> ProjectMap {
        entries
            .iter()
            .map(|(id, name)| Project::new(*id, *name))
            .collect()
    }

    fn ids(cache: &ServerCache) -> Vec<&str> {
        cache.ids().collect()
    }

    /// The cache two runs ago: one testproj server and two servers of a
    /// project the current pass does not know about
    fn previous_run_cache() -> ServerCache {
        [
            cached("server-1", TESTPROJ_ID, "testproj"),
            cached("other-1", "b5b9b8fb77bc4f1a9f4c9c4c7b7e7f11", "otherproj"),
            cached("other-2", "b5b9b8fb77bc4f1a9f4c9c4c7b7e7f11", "otherproj"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_eviction_limited_to_mapped_projects() {
        let cache: ServerCache = [
            cached("A", "proj1", "proj1"),
            cached("B", "proj1", "proj1"),
            cached("C", "proj2", "proj2"),
        ]
        .into_iter()
        .collect();
        let project_map = projects(&[("proj1", Some("proj1"))]);

        let result = reconcile(
            cache,
            &[item("A", Some("proj1"))],
            &project_map,
            &Blacklist::new(),
        );

        assert_eq!(ids(&result), vec!["A", "C"]);
        assert_eq!(result.get("A").unwrap().project_name.as_deref(), Some("proj1"));
        assert_eq!(result.get("C").unwrap().project_name.as_deref(), Some("proj2"));
    }

    #[test]
    fn test_unresolved_project_is_not_added_and_evicts_nothing() {
        let cache: ServerCache = [cached("A", "proj1", "proj1")].into_iter().collect();
        let project_map = projects(&[("proj2", Some("proj2"))]);

        let fetched = [item("X", Some("")), item("Y", None), item("Z", Some("unmapped"))];
        let reconciliation = Reconciler::new(&project_map, &Blacklist::new())
            .reconcile(cache, &fetched);

        assert_eq!(ids(&reconciliation.cache), vec!["A"]);
        assert_eq!(reconciliation.report.skipped_unknown_project, 3);
        assert_eq!(reconciliation.report.evicted, 0);
        assert_eq!(reconciliation.report.added, 0);
    }

    #[test]
    fn test_unresolved_item_keeps_existing_entry_with_same_id() {
        let cache: ServerCache = [cached("A", "proj1", "proj1")].into_iter().collect();
        let project_map = projects(&[("proj1", Some("proj1"))]);

        let mut moved = item("A", Some("vanished"));
        moved.name = Some("renamed".to_string());
        let result = reconcile(cache.clone(), &[moved], &project_map, &Blacklist::new());

        assert_eq!(result, cache);
    }

    #[test]
    fn test_project_without_display_name_is_unresolved() {
        let project_map = projects(&[(TESTPROJ_ID, None)]);

        let result = reconcile(
            previous_run_cache(),
            &[item("server_newly_added", Some(TESTPROJ_ID))],
            &project_map,
            &Blacklist::new(),
        );

        assert!(!result.contains("server_newly_added"));
        assert!(!result.contains("server-1"));
        assert!(result.contains("other-1"));
        assert!(result.contains("other-2"));
    }

    #[test]
    fn test_cache_between_runs() {
        let project_map = projects(&[
            (TESTPROJ_ID, Some("testproj")),
            ("blacklist_1", Some("blacklist_1")),
            ("blacklist_2", Some("blacklist_2")),
        ]);

        let mut newly_added = item("server_newly_added", Some(TESTPROJ_ID));
        newly_added.name = Some("server_newly_added".to_string());
        let result = reconcile(
            previous_run_cache(),
            &[newly_added],
            &project_map,
            &Blacklist::new(),
        );

        assert!(!result.contains("server-1"));
        assert!(result.contains("server_newly_added"));
        assert!(result.contains("other-1"));
        assert!(result.contains("other-2"));
    }

    #[test]
    fn test_blacklisted_projects_are_opaque() {
        let cache: ServerCache = [
            cached("kept-by-id", "blacklist_1", "blacklist_1"),
            cached("kept-by-name", "p2", "admin"),
            cached("evicted", "p3", "regular"),
        ]
        .into_iter()
        .collect();
        let project_map = projects(&[
            ("blacklist_1", Some("blacklist_1")),
            ("p2", Some("admin")),
            ("p3", Some("regular")),
        ]);
        let blacklist: Blacklist = ["blacklist_1", "admin"].into_iter().collect();

        let fetched = [
            item("new-blacklisted", Some("blacklist_1")),
            item("new-admin", Some("p2")),
            item("new-regular", Some("p3")),
        ];
        let reconciliation =
            Reconciler::new(&project_map, &blacklist).reconcile(cache, &fetched);
        let cache = &reconciliation.cache;

        assert!(!cache.contains("new-blacklisted"));
        assert!(!cache.contains("new-admin"));
        assert!(cache.contains("new-regular"));
        assert!(cache.contains("kept-by-id"));
        assert!(cache.contains("kept-by-name"));
        assert!(!cache.contains("evicted"));
        assert_eq!(reconciliation.report.skipped_blacklisted, 2);
        assert_eq!(reconciliation.report.evicted, 1);
    }

    #[test]
    fn test_blacklisted_refetch_does_not_overwrite() {
        let cache: ServerCache = [cached("A", "blacklist_1", "blacklist_1")]
            .into_iter()
            .collect();
        let project_map = projects(&[("blacklist_1", Some("blacklist_1"))]);
        let blacklist: Blacklist = ["blacklist_1"].into_iter().collect();

        let mut refetched = item("A", Some("blacklist_1"));
        refetched.status = Some("SHUTOFF".to_string());
        let result = reconcile(cache.clone(), &[refetched], &project_map, &blacklist);

        assert_eq!(result, cache);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let project_map = projects(&[
            (TESTPROJ_ID, Some("testproj")),
            ("p2", Some("admin")),
            ("p3", None),
        ]);
        let blacklist: Blacklist = ["admin"].into_iter().collect();
        let fetched = [
            item("server-1", Some(TESTPROJ_ID)),
            item("server-2", Some("p2")),
            item("server-3", Some("p3")),
            item("server-4", None),
            item("server-5", Some(TESTPROJ_ID)),
        ];
        let mut cache = previous_run_cache();
        cache.insert(cached("stale", TESTPROJ_ID, "testproj"));
        cache.insert(cached("admin-vm", "p2", "admin"));

        let once = reconcile(cache, &fetched, &project_map, &blacklist);
        let twice = reconcile(once.clone(), &fetched, &project_map, &blacklist);

        assert_eq!(once, twice);
        assert!(!once.contains("stale"));
        assert!(once.contains("admin-vm"));
    }

    #[test]
    fn test_merge_never_evicts() {
        let project_map = projects(&[(TESTPROJ_ID, Some("testproj"))]);

        let result = merge(
            previous_run_cache(),
            &[item("server-2", Some(TESTPROJ_ID))],
            &project_map,
            &Blacklist::new(),
        );

        assert_eq!(ids(&result), vec!["other-1", "other-2", "server-1", "server-2"]);
    }

    #[test]
    fn test_report_counts() {
        let project_map = projects(&[(TESTPROJ_ID, Some("testproj"))]);
        let fetched = [
            item("server-1", Some(TESTPROJ_ID)),
            item("server-2", Some(TESTPROJ_ID)),
        ];

        let reconciliation = Reconciler::new(&project_map, &Blacklist::new())
            .reconcile(previous_run_cache(), &fetched);

        assert_eq!(
            reconciliation.report,
            ReconcileReport {
                added: 1,
                updated: 1,
                evicted: 0,
                skipped_blacklisted: 0,
                skipped_unknown_project: 0,
            }
        );
    }

    #[test]
    fn test_empty_batch_evicts_every_mapped_server() {
        let project_map = projects(&[(TESTPROJ_ID, Some("testproj"))]);

        let result = reconcile(previous_run_cache(), &[], &project_map, &Blacklist::new());

        assert_eq!(ids(&result), vec!["other-1", "other-2"]);
    }
}
