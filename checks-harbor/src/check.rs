//! The Harbor check

use crate::api::{HEALTHY, HarborApi, VERSION_1_5, VERSION_1_8};
use crate::config::HarborInstance;
use agent_checks_base::{
    AgentCheck, Aggregator, CheckResult, HttpClient, ReqwestClient, ServiceCheckStatus, SubCheck,
    skip_if_forbidden,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const STATUS_SERVICE_CHECK: &str = "harbor.status";
pub const REGISTRY_SERVICE_CHECK: &str = "harbor.registry.status";
pub const PROJECTS_METRIC: &str = "harbor.projects.count";
pub const DISK_FREE_METRIC: &str = "harbor.disk.free";
pub const DISK_TOTAL_METRIC: &str = "harbor.disk.total";

fn component_service_check(component: &str) -> String {
    format!("harbor.component.{component}.status")
}

fn is_healthy(status: &str) -> bool {
    status == HEALTHY
}

/// Polls one Harbor deployment
pub struct HarborCheck {
    instance: HarborInstance,
    client: Arc<dyn HttpClient>,
}

impl HarborCheck {
    pub fn new(instance: HarborInstance) -> CheckResult<Self> {
        let client = ReqwestClient::new(instance.http_settings())?;
        Self::with_client(instance, Arc::new(client))
    }

    pub fn with_client(instance: HarborInstance, client: Arc<dyn HttpClient>) -> CheckResult<Self> {
        instance.validate()?;
        Ok(Self { instance, client })
    }

    fn tags(&self) -> &[String] {
        &self.instance.settings.tags
    }

    async fn connect_and_check_health(&self, aggregator: &mut Aggregator) -> CheckResult<HarborApi> {
        let api = HarborApi::connect(
            self.instance.url.clone(),
            self.client.clone(),
            Some(self.instance.settings.timeout()),
        )
        .await?;
        self.check_health(&api, aggregator).await?;
        Ok(api)
    }

    /// Overall and component service checks, by API generation
    pub async fn check_health(&self, api: &HarborApi, aggregator: &mut Aggregator) -> CheckResult<()> {
        let tags = self.tags();

        if api.version >= VERSION_1_8 {
            let health = api.health().await?;
            aggregator.service_check(
                STATUS_SERVICE_CHECK,
                ServiceCheckStatus::ok_or_critical(is_healthy(&health.status)),
                tags,
                None,
            );
            for component in &health.components {
                aggregator.service_check(
                    component_service_check(&component.name),
                    ServiceCheckStatus::ok_or_critical(is_healthy(&component.status)),
                    tags,
                    None,
                );
            }
        } else if api.version >= VERSION_1_5 {
            let pong = api.ping().await?;
            aggregator.service_check(
                STATUS_SERVICE_CHECK,
                ServiceCheckStatus::ok_or_critical(pong.trim() == "Pong"),
                tags,
                None,
            );
            if api.with_chartrepo {
                match skip_if_forbidden(api.chartrepo_health().await, "chartrepo health")? {
                    SubCheck::Completed(healthy) => aggregator.service_check(
                        component_service_check("chartmuseum"),
                        ServiceCheckStatus::ok_or_critical(healthy),
                        tags,
                        None,
                    ),
                    SubCheck::Skipped(reason) => info!(instance = %self.instance.display_name(), "{reason}"),
                }
            }
        } else {
            // No health endpoint; reaching systeminfo is the only signal
            aggregator.service_check(STATUS_SERVICE_CHECK, ServiceCheckStatus::Ok, tags, None);
        }
        Ok(())
    }

    pub async fn check_registries_health(
        &self,
        api: &HarborApi,
        aggregator: &mut Aggregator,
    ) -> CheckResult<SubCheck<usize>> {
        let registries = match skip_if_forbidden(api.registries().await, "registries health checks")? {
            SubCheck::Completed(registries) => registries,
            SubCheck::Skipped(reason) => {
                info!(instance = %self.instance.display_name(), "{reason}");
                return Ok(SubCheck::Skipped(reason));
            }
        };
        debug!(count = registries.len(), "found registries");

        for registry in &registries {
            let mut tags = self.tags().to_vec();
            tags.push(format!("registry:{}", registry.name.to_lowercase()));

            let healthy = match registry.status.as_deref().filter(|s| !s.is_empty()) {
                Some(status) => is_healthy(status),
                None => match api.registry_health(&registry.id).await {
                    Ok(()) => true,
                    Err(e) if e.status_code().is_some() => {
                        debug!(registry = %registry.name, error = %e, "registry ping failed");
                        false
                    }
                    Err(e) => return Err(e),
                },
            };
            aggregator.service_check(
                REGISTRY_SERVICE_CHECK,
                ServiceCheckStatus::ok_or_critical(healthy),
                &tags,
                None,
            );
        }
        Ok(SubCheck::Completed(registries.len()))
    }

    pub async fn submit_project_metrics(
        &self,
        api: &HarborApi,
        aggregator: &mut Aggregator,
    ) -> CheckResult<usize> {
        let projects = api.projects().await?;
        for project in &projects {
            let mut tags = self.tags().to_vec();
            if let Some(public) = project.public() {
                tags.push(format!("public:{public}"));
            }
            if let Some(owner) = &project.owner_name {
                tags.push(format!("owner_name:{owner}"));
            }
            aggregator.count(PROJECTS_METRIC, 1.0, &tags);
        }
        debug!(count = projects.len(), "found Harbor projects");
        Ok(projects.len())
    }

    pub async fn submit_disk_metrics(
        &self,
        api: &HarborApi,
        aggregator: &mut Aggregator,
    ) -> CheckResult<SubCheck<()>> {
        let storage = match skip_if_forbidden(api.volume_info().await, "volume metrics")? {
            SubCheck::Completed(storage) => storage,
            SubCheck::Skipped(reason) => {
                warn!(instance = %self.instance.display_name(), "{reason}");
                return Ok(SubCheck::Skipped(reason));
            }
        };
        aggregator.gauge(DISK_FREE_METRIC, storage.free, self.tags());
        aggregator.gauge(DISK_TOTAL_METRIC, storage.total, self.tags());
        Ok(SubCheck::Completed(()))
    }
}

#[async_trait]
impl AgentCheck for HarborCheck {
    fn name(&self) -> &str {
        self.instance.display_name()
    }

    async fn check(&mut self, aggregator: &mut Aggregator) -> CheckResult<()> {
        let api = match self.connect_and_check_health(aggregator).await {
            Ok(api) => api,
            Err(e) => {
                error!(instance = %self.instance.display_name(), error = %e, "Harbor API is not reachable");
                aggregator.service_check(
                    STATUS_SERVICE_CHECK,
                    ServiceCheckStatus::Critical,
                    self.tags(),
                    Some(e.to_string()),
                );
                return Err(e);
            }
        };

        self.check_registries_health(&api, aggregator).await?;
        self.submit_project_metrics(&api, aggregator).await?;
        self.submit_disk_metrics(&api, aggregator).await?;
        Ok(())
    }
}
