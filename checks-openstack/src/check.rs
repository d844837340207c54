//! The OpenStack controller check
//!
//! One run walks through:
//! 1. API health service checks for keystone, nova and (optionally) neutron
//! 2. The keystone project map for this pass
//! 3. A paginated `servers/detail` sweep, filtered by the exclusion rules
//! 4. Reconciliation of the sweep into the server cache (merge only when
//!    the sweep was truncated by `max_servers`)
//! 5. Cache gauges, per-server diagnostics and hypervisor load
//!
//! A failure in steps 1 to 3 fails the run and leaves the cache untouched.

use crate::cache::ServerCache;
use crate::config::{OpenStackInstance, ServerExclusions};
use crate::diagnostics::submit_diagnostics;
use crate::model::{Blacklist, InventoryItem, Project, ProjectMap};
use crate::pagination::{Endpoint, fetch_all};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::uptime::{LOAD_METRICS, parse_uptime_load};
use agent_checks_base::config::join_url;
use agent_checks_base::{
    AgentCheck, Aggregator, CheckError, CheckResult, HttpClient, ReqwestClient, RetainedState,
    ServiceCheckStatus, SubCheck, skip_if_forbidden,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const KEYSTONE_SERVICE_CHECK: &str = "openstack.keystone.api.up";
pub const NOVA_SERVICE_CHECK: &str = "openstack.nova.api.up";
pub const NEUTRON_SERVICE_CHECK: &str = "openstack.neutron.api.up";

pub const SERVERS_CACHED_METRIC: &str = "openstack.controller.servers.cached";
pub const SERVERS_FETCHED_METRIC: &str = "openstack.controller.servers.fetched";
const REPORT_METRIC_PREFIX: &str = "openstack.controller.reconcile";

#[derive(Debug, Deserialize)]
struct ProjectList {
    projects: Vec<Project>,
}

#[derive(Debug, Deserialize)]
struct Hypervisor {
    id: Value,
    #[serde(default)]
    hypervisor_hostname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HypervisorList {
    hypervisors: Vec<Hypervisor>,
}

/// Polls one OpenStack deployment and keeps its server inventory
pub struct OpenStackControllerCheck {
    instance: OpenStackInstance,
    client: Arc<dyn HttpClient>,
    blacklist: Blacklist,
    exclusions: ServerExclusions,
    cache: ServerCache,
}

impl OpenStackControllerCheck {
    /// Build the check with a `reqwest` client for `instance`
    pub fn new(instance: OpenStackInstance) -> CheckResult<Self> {
        let client = ReqwestClient::new(instance.http_settings())?;
        Self::with_client(instance, Arc::new(client))
    }

    pub fn with_client(instance: OpenStackInstance, client: Arc<dyn HttpClient>) -> CheckResult<Self> {
        instance.validate()?;
        let exclusions = ServerExclusions::compile(&instance.exclude_server_ids)?;
        let blacklist = instance.blacklist_projects.iter().cloned().collect();

        Ok(Self {
            instance,
            client,
            blacklist,
            exclusions,
            cache: ServerCache::new(),
        })
    }

    /// Servers known after the last successful run
    pub fn cache(&self) -> &ServerCache {
        &self.cache
    }

    /// Seed the cache, e.g. from a previous process
    pub fn set_cache(&mut self, cache: ServerCache) {
        self.cache = cache;
    }

    fn tags(&self) -> &[String] {
        &self.instance.settings.tags
    }

    async fn get(&self, url: &str, params: &[(String, String)]) -> CheckResult<Value> {
        self.client
            .get(url, params, Some(self.instance.settings.timeout()))
            .await
    }

    /// Request `url`, emitting `service_check` as OK or CRITICAL
    async fn check_endpoint_up(
        &self,
        aggregator: &mut Aggregator,
        service_check: &str,
        url: &str,
    ) -> CheckResult<()> {
        let mut tags = vec![format!("url:{url}")];
        tags.extend(self.tags().iter().cloned());

        match self.get(url, &[]).await {
            Ok(_) => {
                aggregator.service_check(service_check, ServiceCheckStatus::Ok, &tags, None);
                Ok(())
            }
            Err(e) => {
                aggregator.service_check(
                    service_check,
                    ServiceCheckStatus::Critical,
                    &tags,
                    Some(e.to_string()),
                );
                Err(e)
            }
        }
    }

    async fn check_api_health(&self, aggregator: &mut Aggregator) -> CheckResult<()> {
        let keystone = join_url(&self.instance.keystone_server_url, "v3");
        self.check_endpoint_up(aggregator, KEYSTONE_SERVICE_CHECK, &keystone).await?;
        self.check_endpoint_up(aggregator, NOVA_SERVICE_CHECK, &self.instance.nova_api_url)
            .await?;

        if let Some(neutron) = &self.instance.neutron_api_url {
            // Networking being down does not prevent server collection
            if let Err(e) = self.check_endpoint_up(aggregator, NEUTRON_SERVICE_CHECK, neutron).await {
                warn!(instance = %self.instance.display_name(), error = %e, "neutron API is down");
            }
        }
        Ok(())
    }

    /// Projects known to keystone for this pass
    pub async fn fetch_projects(&self) -> CheckResult<ProjectMap> {
        let url = join_url(&self.instance.keystone_server_url, "v3/projects");
        let body = self.get(&url, &[]).await?;
        let list: ProjectList = serde_json::from_value(body).map_err(|e| {
            CheckError::invalid_response(format!("malformed project list from '{url}': {e}"))
        })?;
        Ok(list.projects.into_iter().collect())
    }

    /// Fetch, filter and reconcile the server inventory
    pub async fn refresh_servers(
        &mut self,
        project_map: &ProjectMap,
    ) -> CheckResult<(usize, ReconcileReport)> {
        let endpoint = Endpoint::new(
            join_url(&self.instance.nova_api_url, "servers/detail"),
            "servers",
        );
        let params = vec![
            ("all_tenants".to_string(), "true".to_string()),
            ("limit".to_string(), self.instance.page_size().to_string()),
        ];
        let batch = fetch_all::<InventoryItem>(
            self.client.as_ref(),
            &endpoint,
            &params,
            self.instance.max_servers,
            Some(self.instance.settings.timeout()),
        )
        .await?;

        let fetched = batch.items.len();
        let mut cache = std::mem::take(&mut self.cache);
        let mut servers = batch.items;
        if !self.exclusions.is_empty() {
            servers.retain(|s| !self.exclusions.is_excluded(&s.id));
            let excluded: Vec<String> = cache
                .ids()
                .filter(|id| self.exclusions.is_excluded(id))
                .map(str::to_string)
                .collect();
            for id in excluded {
                cache.evict(&id);
            }
        }

        let reconciler = Reconciler::new(project_map, &self.blacklist);
        let reconciliation = if batch.truncated {
            info!(
                instance = %self.instance.display_name(),
                limit = ?self.instance.max_servers,
                "server sweep truncated, merging without eviction"
            );
            reconciler.merge(cache, &servers)
        } else {
            reconciler.reconcile(cache, &servers)
        };

        self.cache = reconciliation.cache;
        debug!(
            instance = %self.instance.display_name(),
            requests = batch.requests,
            fetched,
            cached = self.cache.len(),
            report = ?reconciliation.report,
            "server cache reconciled"
        );
        Ok((fetched, reconciliation.report))
    }

    fn submit_cache_metrics(
        &self,
        aggregator: &mut Aggregator,
        fetched: usize,
        report: &ReconcileReport,
    ) {
        let tags = self.tags().to_vec();
        for (project, count) in self.cache.count_by_project() {
            let mut project_tags = vec![format!("project_name:{project}")];
            project_tags.extend(tags.iter().cloned());
            aggregator.gauge(SERVERS_CACHED_METRIC, count as f64, &project_tags);
        }
        aggregator.gauge(SERVERS_FETCHED_METRIC, fetched as f64, &tags);

        for (name, value) in [
            ("added", report.added),
            ("updated", report.updated),
            ("evicted", report.evicted),
            ("skipped_blacklisted", report.skipped_blacklisted),
            ("skipped_unknown_project", report.skipped_unknown_project),
        ] {
            aggregator.gauge(format!("{REPORT_METRIC_PREFIX}.{name}"), value as f64, &tags);
        }
    }

    /// Submit diagnostics for every cached server.
    ///
    /// Servers the API reports as gone (404/409) are evicted.
    pub async fn collect_server_diagnostics(
        &mut self,
        aggregator: &mut Aggregator,
    ) -> CheckResult<()> {
        let servers: Vec<InventoryItem> = self.cache.iter().cloned().collect();
        let tags = self.tags().to_vec();

        for server in servers {
            let url = join_url(
                &self.instance.nova_api_url,
                &format!("servers/{}/diagnostics", server.id),
            );
            let result = self.get(&url, &[]).await;
            match skip_if_forbidden(result, "server diagnostics") {
                Ok(SubCheck::Completed(diagnostics)) => {
                    submit_diagnostics(aggregator, &server, &diagnostics, &tags);
                }
                Ok(SubCheck::Skipped(reason)) => {
                    info!(instance = %self.instance.display_name(), "{reason}");
                    return Ok(());
                }
                Err(e) if e.is_not_found() || e.status_code() == Some(409) => {
                    debug!(server = %server.id, error = %e, "server gone, evicting");
                    self.cache.evict(&server.id);
                }
                Err(e) => {
                    warn!(server = %server.id, error = %e, "failed to collect server diagnostics");
                }
            }
        }
        Ok(())
    }

    /// Submit 1/5/15 minute load averages for every hypervisor
    pub async fn collect_hypervisor_load(&self, aggregator: &mut Aggregator) -> CheckResult<()> {
        let url = join_url(&self.instance.nova_api_url, "os-hypervisors/detail");
        let hypervisors = match skip_if_forbidden(self.get(&url, &[]).await, "hypervisors")? {
            SubCheck::Completed(body) => serde_json::from_value::<HypervisorList>(body)
                .map_err(|e| {
                    CheckError::invalid_response(format!("malformed hypervisor list: {e}"))
                })?
                .hypervisors,
            SubCheck::Skipped(reason) => {
                info!(instance = %self.instance.display_name(), "{reason}");
                return Ok(());
            }
        };

        for hypervisor in hypervisors {
            let id = match &hypervisor.id {
                Value::String(id) => id.clone(),
                other => other.to_string(),
            };
            let url = join_url(
                &self.instance.nova_api_url,
                &format!("os-hypervisors/{id}/uptime"),
            );
            let uptime = match self.get(&url, &[]).await {
                Ok(body) => body
                    .pointer("/hypervisor/uptime")
                    .and_then(Value::as_str)
                    .and_then(parse_uptime_load),
                Err(e) => {
                    warn!(hypervisor = %id, error = %e, "failed to fetch hypervisor uptime");
                    continue;
                }
            };
            let Some(loads) = uptime else {
                debug!(hypervisor = %id, "no load average in uptime");
                continue;
            };

            let hostname = hypervisor.hypervisor_hostname.unwrap_or(id);
            let mut tags = vec![format!("hypervisor:{hostname}")];
            tags.extend(self.tags().iter().cloned());
            for (metric, load) in LOAD_METRICS.iter().zip(loads) {
                aggregator.gauge_for_host(*metric, load, &tags, hostname.as_str());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AgentCheck for OpenStackControllerCheck {
    fn name(&self) -> &str {
        self.instance.display_name()
    }

    async fn check(&mut self, aggregator: &mut Aggregator) -> CheckResult<()> {
        self.check_api_health(aggregator).await?;

        let project_map = self.fetch_projects().await?;
        let (fetched, report) = self.refresh_servers(&project_map).await?;
        self.submit_cache_metrics(aggregator, fetched, &report);

        if self.instance.collect_server_diagnostics {
            self.collect_server_diagnostics(aggregator).await?;
        }
        if self.instance.collect_hypervisor_load {
            self.collect_hypervisor_load(aggregator).await?;
        }
        Ok(())
    }

    fn retained_state(&self) -> Vec<RetainedState> {
        vec![RetainedState {
            location: format!("openstack::server_cache[{}]", self.instance.display_name()),
            bytes: self.cache.heap_size(),
            entries: self.cache.len() as u64,
        }]
    }
}
