//! Inventory items, projects and the project blacklist

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// A compute server as listed by `servers/detail`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Owning project; Nova still calls it the tenant
    #[serde(default, rename = "tenant_id")]
    pub project_id: Option<String>,

    /// Project display name, filled in when the item is cached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default, rename = "OS-EXT-SRV-ATTR:hypervisor_hostname")]
    pub hypervisor_hostname: Option<String>,

    #[serde(default, rename = "OS-EXT-AZ:availability_zone")]
    pub availability_zone: Option<String>,

    /// Every other field of the payload, kept opaque
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl InventoryItem {
    /// A bare item, mostly useful for building fixtures
    pub fn new(id: impl Into<String>, project_id: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: None,
            project_id: project_id.map(str::to_string),
            project_name: None,
            status: None,
            hypervisor_hostname: None,
            availability_zone: None,
            metadata: Map::new(),
        }
    }

    /// Approximate number of heap bytes held by the item
    pub fn heap_size(&self) -> u64 {
        let strings = [
            Some(&self.id),
            self.name.as_ref(),
            self.project_id.as_ref(),
            self.project_name.as_ref(),
            self.status.as_ref(),
            self.hypervisor_hostname.as_ref(),
            self.availability_zone.as_ref(),
        ];
        let owned: usize = strings.iter().flatten().map(|s| s.capacity()).sum();
        let metadata: usize = self
            .metadata
            .iter()
            .map(|(k, v)| k.len() + v.to_string().len())
            .sum();
        (owned + metadata) as u64
    }
}

/// An identity-service project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.map(str::to_string),
        }
    }

    /// The display name, if it is present and non-empty
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

/// Projects known for one reconciliation pass, keyed by project id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectMap {
    projects: HashMap<String, Project>,
}

impl ProjectMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, project: Project) {
        self.projects.insert(project.id.clone(), project);
    }

    /// Descriptor for `project_id`; empty ids never resolve
    pub fn get(&self, project_id: Option<&str>) -> Option<&Project> {
        project_id
            .filter(|id| !id.is_empty())
            .and_then(|id| self.projects.get(id))
    }

    pub fn contains(&self, project_id: Option<&str>) -> bool {
        self.get(project_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }
}

impl FromIterator<Project> for ProjectMap {
    fn from_iter<I: IntoIterator<Item = Project>>(iter: I) -> Self {
        let mut map = ProjectMap::new();
        for project in iter {
            map.insert(project);
        }
        map
    }
}

/// Projects whose servers are never cached nor evicted.
///
/// An entry matches a project by id or by display name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blacklist {
    entries: HashSet<String>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matches(&self, project: &Project) -> bool {
        self.entries.contains(&project.id)
            || project
                .display_name()
                .is_some_and(|name| self.entries.contains(name))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Blacklist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(Into::into).collect(),
        }
    }
}
