//! Tests for configuration loading and environment overrides

#[cfg(test)]
mod tests {
    use crate::ConfigError;
    use crate::config::*;
    use agent_checks_logging::{KeyType, LogFormat};
    use serial_test::serial;
    use std::env;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const FULL_CONFIG: &str = r#"
[logging]
level = "debug"
format = "json"
output = "stderr"

[profiling]
profile_memory = true
location = "/var/lib/agent-checks/profiles"
sorting = "traceback"
lines = 10
unit = "KiB"

[[openstack]]
name = "region-one"
keystone_server_url = "http://keystone:5000"
nova_api_url = "http://nova:8774/v2.1"
auth_token = "secret"
paginated_server_limit = 200
blacklist_projects = ["service"]
exclude_server_ids = ["test-.*"]
interval_secs = 60
tags = ["region:one"]

[[harbor]]
url = "https://harbor.example.com"
username = "admin"
password = "Harbor12345"
ssl_verify = false

[[go_expvar]]
expvar_url = "http://localhost:8079"
max_returned_metrics = 50

[[go_expvar.metrics]]
path = "memstats/BySize/.*/Mallocs"
alias = "go.mallocs_by_size"
type = "rate"
"#;

    fn clear_env() {
        // SAFETY: env tests are serialized with #[serial]
        unsafe {
            env::remove_var(LOG_LEVEL_ENV);
            env::remove_var(PROFILE_MEMORY_ENV);
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: env tests are serialized with #[serial]
        unsafe { env::set_var(key, value) }
    }

    #[test]
    fn test_parse_full_config() {
        let config = AgentConfig::from_toml_str(FULL_CONFIG, "agent.toml").unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);

        assert!(config.profiling.profile_memory);
        assert_eq!(
            config.profiling.report.location,
            PathBuf::from("/var/lib/agent-checks/profiles")
        );
        assert_eq!(config.profiling.report.sorting, KeyType::Traceback);
        assert_eq!(config.profiling.report.lines, 10);
        assert_eq!(config.profiling.report.depth, 25);

        let openstack = &config.openstack[0];
        assert_eq!(openstack.display_name(), "region-one");
        assert_eq!(openstack.page_size(), 200);
        assert_eq!(openstack.settings.interval_secs, 60);
        assert_eq!(openstack.settings.tags, vec!["region:one".to_string()]);
        assert!(openstack.collect_server_diagnostics);

        let harbor = &config.harbor[0];
        assert_eq!(harbor.username, "admin");
        assert!(!harbor.settings.ssl_verify);

        let expvar = &config.go_expvar[0];
        assert_eq!(expvar.max_returned_metrics, 50);
        assert_eq!(expvar.metrics[0].alias.as_deref(), Some("go.mallocs_by_size"));
        assert_eq!(
            expvar.resolved_url().unwrap(),
            "http://localhost:8079/debug/vars"
        );
        assert_eq!(config.instance_count(), 3);
    }

    #[test]
    fn test_defaults_for_missing_tables() {
        let config = AgentConfig::from_toml_str(
            r#"
[[harbor]]
url = "http://harbor"
username = "admin"
password = "pw"
"#,
            "agent.toml",
        )
        .unwrap();

        assert_eq!(config.logging.level, "info");
        assert!(!config.profiling.profile_memory);
        assert_eq!(config.profiling.report.lines, 40);
        assert!(config.openstack.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_error_names_origin() {
        let err = AgentConfig::from_toml_str("[[openstack]]\nnova_api_url = 3", "broken.toml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parsing { ref path, .. } if path == "broken.toml"));
    }

    #[test]
    fn test_validate_rejects_empty_config() {
        let err = AgentConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("no [[openstack]], [[harbor]] or [[go_expvar]] instances"));
    }

    #[test]
    fn test_validate_names_bad_instance() {
        let mut config = AgentConfig::from_toml_str(FULL_CONFIG, "agent.toml").unwrap();
        config.openstack[0].nova_api_url = "nova:8774".to_string();

        match config.validate() {
            Err(ConfigError::Instance { instance, .. }) => assert_eq!(instance, "region-one"),
            other => panic!("expected instance error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_exclusion_regex() {
        let mut config = AgentConfig::from_toml_str(FULL_CONFIG, "agent.toml").unwrap();
        config.openstack[0].exclude_server_ids = vec!["(".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_profiling_only_when_enabled() {
        let mut config = AgentConfig::from_toml_str(FULL_CONFIG, "agent.toml").unwrap();
        config.profiling.report.depth = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Profiling(_))));

        config.profiling.profile_memory = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_from_file_applies_env_overrides() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, FULL_CONFIG).unwrap();

        set_env(LOG_LEVEL_ENV, "warn");
        set_env(PROFILE_MEMORY_ENV, "off");
        let config = AgentConfig::from_file(&path).unwrap();
        clear_env();

        assert_eq!(config.logging.level, "warn");
        assert!(!config.profiling.profile_memory);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        set_env(PROFILE_MEMORY_ENV, "1");
        let config = AgentConfig::from_env().unwrap();
        assert!(config.profiling.profile_memory);
        assert_eq!(config.logging.level, "info");

        set_env(PROFILE_MEMORY_ENV, "sometimes");
        let err = AgentConfig::from_env().unwrap_err();
        clear_env();
        assert!(err.to_string().contains(PROFILE_MEMORY_ENV));
    }

    #[test]
    #[serial]
    fn test_empty_env_values_ignored() {
        clear_env();
        set_env(LOG_LEVEL_ENV, "  ");
        let config = AgentConfig::from_env().unwrap();
        clear_env();
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = AgentConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Configuration(_)));
    }

    #[test]
    fn test_parse_flag() {
        assert!(env_utils::parse_flag("X", "TRUE").unwrap());
        assert!(env_utils::parse_flag("X", "yes").unwrap());
        assert!(!env_utils::parse_flag("X", "0").unwrap());
        assert!(env_utils::parse_flag("X", "maybe").is_err());
    }
}
