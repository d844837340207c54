//! OpenStack controller check
//!
//! Polls keystone and nova on every run and keeps an incremental inventory
//! of the deployment's servers between runs:
//!
//! - [`fetch_all`] walks marker-paginated collections such as
//!   `servers/detail`, optionally stopping after `max_servers` items
//! - [`Reconciler`] merges each sweep into the [`ServerCache`], honouring the
//!   project blacklist and never evicting servers whose absence is
//!   inconclusive for the pass
//! - [`OpenStackControllerCheck`] ties both to API health service checks,
//!   per-server diagnostics and hypervisor load averages
//!
//! # Example
//!
//! ```rust,ignore
//! use agent_checks_base::{AgentCheck, Aggregator};
//! use agent_checks_openstack::{OpenStackControllerCheck, OpenStackInstance};
//!
//! let instance = OpenStackInstance::new("http://10.0.2.15:5000", "http://10.0.2.15:8774/v2.1");
//! let mut check = OpenStackControllerCheck::new(instance)?;
//! let mut aggregator = Aggregator::new();
//! check.check(&mut aggregator).await?;
//! println!("{} servers cached", check.cache().len());
//! ```

pub mod cache;
pub mod check;
pub mod config;
pub mod diagnostics;
pub mod model;
pub mod pagination;
pub mod reconcile;
pub mod uptime;

pub use cache::ServerCache;
pub use check::OpenStackControllerCheck;
pub use config::{OpenStackInstance, ServerExclusions};
pub use model::{Blacklist, InventoryItem, Project, ProjectMap};
pub use pagination::{Endpoint, FetchedBatch, Page, fetch_all};
pub use reconcile::{ReconcileReport, Reconciler, Reconciliation, merge, reconcile};
pub use uptime::parse_uptime_load;

#[cfg(test)]
mod reconcile_tests;
