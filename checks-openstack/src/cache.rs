//! The server inventory kept between check runs

use crate::model::InventoryItem;
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Last known servers, keyed by server id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerCache {
    servers: BTreeMap<String, InventoryItem>,
}

impl ServerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&InventoryItem> {
        self.servers.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.servers.contains_key(id)
    }

    /// Insert or overwrite the entry for `item.id`
    pub fn insert(&mut self, item: InventoryItem) -> Option<InventoryItem> {
        self.servers.insert(item.id.clone(), item)
    }

    /// Drop a server the API reported as gone
    pub fn evict(&mut self, id: &str) -> Option<InventoryItem> {
        self.servers.remove(id)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.servers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Values<'_, String, InventoryItem> {
        self.servers.values()
    }

    pub(crate) fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&String, &mut InventoryItem) -> bool,
    {
        self.servers.retain(keep);
    }

    /// Number of cached servers per project display name
    pub fn count_by_project(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for item in self.servers.values() {
            let project = item
                .project_name
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            *counts.entry(project).or_insert(0) += 1;
        }
        counts
    }

    /// Approximate heap bytes held by the cached items
    pub fn heap_size(&self) -> u64 {
        self.servers
            .iter()
            .map(|(k, v)| k.capacity() as u64 + v.heap_size())
            .sum()
    }
}

impl FromIterator<InventoryItem> for ServerCache {
    fn from_iter<I: IntoIterator<Item = InventoryItem>>(iter: I) -> Self {
        let mut cache = ServerCache::new();
        for item in iter {
            cache.insert(item);
        }
        cache
    }
}

impl<'a> IntoIterator for &'a ServerCache {
    type Item = &'a InventoryItem;
    type IntoIter = btree_map::Values<'a, String, InventoryItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.servers.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, project: &str, project_name: Option<&str>) -> InventoryItem {
        let mut item = InventoryItem::new(id, Some(project));
        item.project_name = project_name.map(str::to_string);
        item
    }

    #[test]
    fn test_insert_overwrites() {
        let mut cache = ServerCache::new();
        assert!(cache.insert(item("a", "p1", None)).is_none());

        let mut renamed = item("a", "p1", None);
        renamed.name = Some("web".to_string());
        let previous = cache.insert(renamed).unwrap();

        assert_eq!(previous.name, None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").unwrap().name.as_deref(), Some("web"));
    }

    #[test]
    fn test_evict() {
        let mut cache: ServerCache = [item("a", "p1", None), item("b", "p1", None)]
            .into_iter()
            .collect();

        assert!(cache.evict("a").is_some());
        assert!(cache.evict("a").is_none());
        assert!(!cache.contains("a"));
        assert_eq!(cache.ids().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_count_by_project() {
        let cache: ServerCache = [
            item("a", "p1", Some("testproj")),
            item("b", "p1", Some("testproj")),
            item("c", "p2", None),
        ]
        .into_iter()
        .collect();

        let counts = cache.count_by_project();
        assert_eq!(counts.get("testproj"), Some(&2));
        assert_eq!(counts.get("unknown"), Some(&1));
    }

    #[test]
    fn test_heap_size_grows_with_entries() {
        let mut cache = ServerCache::new();
        assert_eq!(cache.heap_size(), 0);
        cache.insert(item("a", "p1", Some("testproj")));
        assert!(cache.heap_size() > 0);
    }
}
