//! Unit tests for the Harbor check

#[cfg(test)]
mod tests {
    use crate::check::*;
    use crate::config::HarborInstance;
    use agent_checks_base::testing::{RecordedRequest, ScriptedClient};
    use agent_checks_base::{
        AgentCheck, Aggregator, CheckError, CheckResult, MetricKind, ServiceCheckStatus,
    };
    use serde_json::{Value, json};
    use std::sync::Arc;

    const COMPONENTS: [&str; 7] = [
        "registryctl",
        "database",
        "redis",
        "jobservice",
        "portal",
        "core",
        "registry",
    ];

    fn base_tags() -> Vec<String> {
        vec!["tag1:val1".to_string(), "tag2".to_string()]
    }

    fn instance() -> HarborInstance {
        let mut instance = HarborInstance::new("http://harbor.local", "NotAnAdmin", "Str0ngPassw0rd");
        instance.settings.tags = base_tags();
        instance
    }

    /// Answers like a healthy Harbor of the given version
    fn harbor(
        version: &'static str,
        with_chartmuseum: bool,
        forbidden: &'static [&'static str],
    ) -> impl Fn(&RecordedRequest) -> CheckResult<Value> + Send + Sync {
        move |request| {
            let path = request.url.trim_start_matches("http://harbor.local");
            if forbidden.contains(&path) {
                return Err(CheckError::http(request.url.clone(), 403));
            }
            match path {
                "/api/systeminfo" => Ok(json!({
                    "harbor_version": version,
                    "with_chartmuseum": with_chartmuseum
                })),
                "/api/health" => Ok(json!({
                    "status": "healthy",
                    "components": COMPONENTS
                        .iter()
                        .map(|c| json!({"name": c, "status": "healthy"}))
                        .collect::<Vec<_>>()
                })),
                "/api/ping" => Ok(Value::String("Pong".to_string())),
                "/api/chartrepo/health" => Ok(json!({"healthy": true})),
                "/api/registries" | "/api/targets" => Ok(json!([
                    {"id": 1, "name": "Demo", "status": "healthy"}
                ])),
                "/api/registries/ping" | "/api/targets/ping" => Ok(json!({})),
                "/api/projects" => Ok(json!([
                    {"name": "library", "owner_name": "User1", "metadata": {"public": "true"}},
                    {"name": "private", "owner_name": "User2", "metadata": {"public": "false"}}
                ])),
                "/api/systeminfo/volumes" => Ok(json!({
                    "storage": {"free": 5e5, "total": 1e6}
                })),
                _ => Err(CheckError::http(request.url.clone(), 404)),
            }
        }
    }

    async fn run(client: ScriptedClient) -> (CheckResult<()>, Aggregator) {
        let mut check = HarborCheck::with_client(instance(), Arc::new(client)).unwrap();
        let mut aggregator = Aggregator::new();
        let result = check.check(&mut aggregator).await;
        (result, aggregator)
    }

    fn status_of(aggregator: &Aggregator, name: &str) -> Vec<ServiceCheckStatus> {
        aggregator
            .service_checks_named(name)
            .map(|s| s.status)
            .collect()
    }

    #[tokio::test]
    async fn test_check_health_1_8() {
        let (result, aggregator) = run(ScriptedClient::new(harbor("v1.8.1-5d3c6a1a", true, &[]))).await;
        result.unwrap();

        assert_eq!(status_of(&aggregator, STATUS_SERVICE_CHECK), vec![ServiceCheckStatus::Ok]);
        for component in COMPONENTS {
            let name = format!("harbor.component.{component}.status");
            let samples: Vec<_> = aggregator.service_checks_named(&name).collect();
            assert_eq!(samples.len(), 1, "{name}");
            assert_eq!(samples[0].status, ServiceCheckStatus::Ok);
            assert_eq!(samples[0].tags, base_tags());
        }
        // chartmuseum is reported through /api/health from 1.8 on
        assert!(status_of(&aggregator, "harbor.component.chartmuseum.status").is_empty());
    }

    #[tokio::test]
    async fn test_check_health_1_7_with_chartrepo() {
        let (result, aggregator) = run(ScriptedClient::new(harbor("v1.7.5", true, &[]))).await;
        result.unwrap();

        assert_eq!(status_of(&aggregator, STATUS_SERVICE_CHECK), vec![ServiceCheckStatus::Ok]);
        assert_eq!(
            status_of(&aggregator, "harbor.component.chartmuseum.status"),
            vec![ServiceCheckStatus::Ok]
        );
        assert!(status_of(&aggregator, "harbor.component.core.status").is_empty());
    }

    #[tokio::test]
    async fn test_chartrepo_forbidden_is_skipped() {
        let (result, aggregator) = run(ScriptedClient::new(harbor(
            "v1.6.0",
            true,
            &["/api/chartrepo/health"],
        )))
        .await;
        result.unwrap();

        assert_eq!(status_of(&aggregator, STATUS_SERVICE_CHECK), vec![ServiceCheckStatus::Ok]);
        assert!(status_of(&aggregator, "harbor.component.chartmuseum.status").is_empty());
    }

    #[tokio::test]
    async fn test_check_health_before_1_5() {
        let client = Arc::new(ScriptedClient::new(harbor("v1.4.0", false, &[])));
        let mut check = HarborCheck::with_client(instance(), client.clone()).unwrap();
        let mut aggregator = Aggregator::new();

        check.check(&mut aggregator).await.unwrap();

        assert_eq!(status_of(&aggregator, STATUS_SERVICE_CHECK), vec![ServiceCheckStatus::Ok]);
        assert_eq!(client.count_requests("/api/ping"), 0);
        assert_eq!(client.count_requests("/api/health"), 0);
    }

    #[tokio::test]
    async fn test_check_registries_health() {
        let (result, aggregator) = run(ScriptedClient::new(harbor("v1.8.1", false, &[]))).await;
        result.unwrap();

        let registries: Vec<_> = aggregator
            .service_checks_named(REGISTRY_SERVICE_CHECK)
            .collect();
        assert_eq!(registries.len(), 1);
        assert_eq!(registries[0].status, ServiceCheckStatus::Ok);
        let mut expected = base_tags();
        expected.push("registry:demo".to_string());
        assert_eq!(registries[0].tags, expected);
    }

    #[tokio::test]
    async fn test_registry_without_status_is_pinged() {
        let client = Arc::new(ScriptedClient::new(|request| {
            let path = request.url.trim_start_matches("http://harbor.local");
            match path {
                "/api/systeminfo" => Ok(json!({"harbor_version": "v1.8.1"})),
                "/api/health" => Ok(json!({"status": "healthy", "components": []})),
                "/api/registries" => Ok(json!([
                    {"id": 1, "name": "up"},
                    {"id": 2, "name": "down", "status": ""}
                ])),
                "/api/registries/ping" => match request.body.as_ref().and_then(|b| b.get("id")) {
                    Some(id) if id == &json!(1) => Ok(json!({})),
                    _ => Err(CheckError::http(request.url.clone(), 400)),
                },
                "/api/projects" => Ok(json!([])),
                "/api/systeminfo/volumes" => Ok(json!({"storage": {"free": 1, "total": 2}})),
                _ => Err(CheckError::http(request.url.clone(), 404)),
            }
        }));
        let mut check = HarborCheck::with_client(instance(), client.clone()).unwrap();
        let mut aggregator = Aggregator::new();

        check.check(&mut aggregator).await.unwrap();

        let statuses: Vec<_> = aggregator
            .service_checks_named(REGISTRY_SERVICE_CHECK)
            .map(|s| (s.tags.last().cloned().unwrap(), s.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("registry:up".to_string(), ServiceCheckStatus::Ok),
                ("registry:down".to_string(), ServiceCheckStatus::Critical),
            ]
        );
        assert_eq!(client.count_requests("/api/registries/ping"), 2);
    }

    #[tokio::test]
    async fn test_registry_ping_transport_failure_fails_run() {
        let client = Arc::new(ScriptedClient::new(|request| {
            let path = request.url.trim_start_matches("http://harbor.local");
            match path {
                "/api/systeminfo" => Ok(json!({"harbor_version": "v1.8.1"})),
                "/api/health" => Ok(json!({"status": "healthy", "components": []})),
                "/api/registries" => Ok(json!([{"id": 1, "name": "remote"}])),
                "/api/registries/ping" => Err(CheckError::transport(
                    request.url.clone(),
                    "operation timed out",
                )),
                _ => Err(CheckError::http(request.url.clone(), 404)),
            }
        }));
        let mut check = HarborCheck::with_client(instance(), client.clone()).unwrap();
        let mut aggregator = Aggregator::new();

        let err = check.check(&mut aggregator).await.unwrap_err();

        assert!(err.is_transport());
        assert_eq!(aggregator.service_checks_named(REGISTRY_SERVICE_CHECK).count(), 0);
        assert_eq!(client.count_requests("/api/projects"), 0);
    }

    #[tokio::test]
    async fn test_submit_project_metrics() {
        let (result, aggregator) = run(ScriptedClient::new(harbor("v1.8.1", false, &[]))).await;
        result.unwrap();

        let projects: Vec<_> = aggregator.metrics_named(PROJECTS_METRIC).collect();
        assert_eq!(projects.len(), 2);
        assert!(projects.iter().all(|m| m.kind == MetricKind::Count && m.value == 1.0));

        let mut user1 = base_tags();
        user1.extend(["public:true".to_string(), "owner_name:User1".to_string()]);
        let mut user2 = base_tags();
        user2.extend(["public:false".to_string(), "owner_name:User2".to_string()]);
        assert_eq!(projects[0].tags, user1);
        assert_eq!(projects[1].tags, user2);
    }

    #[tokio::test]
    async fn test_submit_disk_metrics() {
        let (result, aggregator) = run(ScriptedClient::new(harbor("v1.8.1", false, &[]))).await;
        result.unwrap();

        let free: Vec<_> = aggregator.metrics_named(DISK_FREE_METRIC).collect();
        let total: Vec<_> = aggregator.metrics_named(DISK_TOTAL_METRIC).collect();
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].value, 5e5);
        assert_eq!(free[0].tags, base_tags());
        assert_eq!(total[0].value, 1e6);
    }

    #[tokio::test]
    async fn test_non_admin_user_skips_admin_resources() {
        let (result, aggregator) = run(ScriptedClient::new(harbor(
            "v1.8.1",
            false,
            &["/api/registries", "/api/systeminfo/volumes"],
        )))
        .await;
        result.unwrap();

        assert!(aggregator.service_checks_named(REGISTRY_SERVICE_CHECK).next().is_none());
        assert!(aggregator.metrics_named(DISK_FREE_METRIC).next().is_none());
        assert_eq!(aggregator.metrics_named(PROJECTS_METRIC).count(), 2);
        assert_eq!(status_of(&aggregator, STATUS_SERVICE_CHECK), vec![ServiceCheckStatus::Ok]);
    }

    #[tokio::test]
    async fn test_unreachable_api_fails_run() {
        let (result, aggregator) = run(ScriptedClient::new(|request| {
            Err(CheckError::transport(request.url.clone(), "connection refused"))
        }))
        .await;

        assert!(result.unwrap_err().is_transport());
        let status: Vec<_> = aggregator.service_checks_named(STATUS_SERVICE_CHECK).collect();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].status, ServiceCheckStatus::Critical);
        assert!(aggregator.metrics().is_empty());
    }

    #[tokio::test]
    async fn test_project_listing_error_fails_run() {
        let (result, _) = run(ScriptedClient::new(harbor("v1.8.1", false, &["/api/projects"]))).await;

        assert!(result.unwrap_err().is_authorization());
    }

    #[tokio::test]
    async fn test_unhealthy_component() {
        let (result, aggregator) = run(ScriptedClient::new(|request| {
            let path = request.url.trim_start_matches("http://harbor.local");
            match path {
                "/api/systeminfo" => Ok(json!({"harbor_version": "v2.0.0"})),
                "/api/health" => Ok(json!({
                    "status": "unhealthy",
                    "components": [
                        {"name": "redis", "status": "unhealthy", "error": "dial tcp: timeout"},
                        {"name": "core", "status": "healthy"}
                    ]
                })),
                "/api/registries" | "/api/projects" => Ok(json!([])),
                "/api/systeminfo/volumes" => Ok(json!({"storage": {"free": 1, "total": 2}})),
                _ => Err(CheckError::http(request.url.clone(), 404)),
            }
        }))
        .await;
        result.unwrap();

        assert_eq!(
            status_of(&aggregator, STATUS_SERVICE_CHECK),
            vec![ServiceCheckStatus::Critical]
        );
        assert_eq!(
            status_of(&aggregator, "harbor.component.redis.status"),
            vec![ServiceCheckStatus::Critical]
        );
        assert_eq!(
            status_of(&aggregator, "harbor.component.core.status"),
            vec![ServiceCheckStatus::Ok]
        );
    }
}
