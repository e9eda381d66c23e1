//! 配置加载与校验测试

use std::time::Duration;

use rat_dbresolver::{Config, ConfigError, DbResolverError, Dsn, PolicyKind};

const TOML_CONFIG: &str = r#"
host_resolve_interval_ms = 5000
health_check_interval_ms = 3000
health_check_timeout_ms = 1000
db_status_log_interval_ms = 60000
max_health_check_retry = 3
max_open_conns = 50
max_idle_conns = 10
conn_max_lifetime_ms = 3600000
policy = "roundRobin"
trace_resolver_mode = true
role = "orders"
bindings = ["orders", "order_items"]

[[sources]]
host = "primary.db.internal"
username = "app"
password = "secret"
dbname = "shop"

[[replicas]]
host = "replica.db.internal"
port = 3307
params = "charset=utf8mb4&timeout=5s"
"#;

#[test]
fn test_load_toml() {
    let config = Config::from_toml_str(TOML_CONFIG).unwrap();
    config.validate().unwrap();

    assert_eq!(config.sources.len(), 1);
    assert_eq!(config.sources[0].port, 3306);
    assert_eq!(config.replicas[0].port, 3307);
    assert_eq!(config.health_check_interval, Duration::from_secs(3));
    assert_eq!(config.conn_max_lifetime, Duration::from_secs(3600));
    assert_eq!(config.conn_max_idle_time, Duration::ZERO);
    assert_eq!(config.startup_timeout, Duration::from_secs(60));
    assert_eq!(config.host_resolve_timeout, Duration::from_secs(3));
    assert_eq!(config.policy, PolicyKind::RoundRobin);
    assert!(!config.is_global());

    let conn = config.replicas[0].conn_string();
    assert!(conn.ends_with("?charset=utf8mb4&timeout=5s"));
}

#[test]
fn test_load_from_file_by_extension() {
    let dir = std::env::temp_dir().join(format!("rat_dbresolver_cfg_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let toml_path = dir.join("resolver.toml");
    std::fs::write(&toml_path, TOML_CONFIG).unwrap();
    assert_eq!(Config::load_from_file(&toml_path).unwrap().role, "orders");

    let json_path = dir.join("resolver.json");
    let json = serde_json::to_string(&Config::from_toml_str(TOML_CONFIG).unwrap()).unwrap();
    std::fs::write(&json_path, json).unwrap();
    assert_eq!(Config::load_from_file(&json_path).unwrap().bindings, vec!["orders", "order_items"]);

    let yaml_path = dir.join("resolver.yaml");
    std::fs::write(&yaml_path, "role: orders").unwrap();
    assert!(matches!(
        Config::load_from_file(&yaml_path),
        Err(DbResolverError::InvalidConfig(_))
    ));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_missing_interval_is_parse_error() {
    let err = Config::from_toml_str("health_check_interval_ms = 1000").unwrap_err();
    assert!(matches!(err, DbResolverError::Parse(_)));
}

#[test]
fn test_validation_messages() {
    let base = || {
        Config::builder()
            .host_resolve_interval(Duration::from_secs(5))
            .health_check_interval(Duration::from_secs(3))
            .health_check_timeout(Duration::from_secs(1))
            .db_status_log_interval(Duration::from_secs(60))
    };

    let err = base().build().unwrap_err();
    assert_eq!(err.to_string(), "no source or replica");

    let err = base()
        .source(Dsn::new("10.0.0.1", 3306))
        .source(Dsn::new("10.0.0.2", 3306))
        .build()
        .unwrap_err();
    assert_eq!(err.to_string(), "only one source is allowed");

    let err = base()
        .source(Dsn::new("localhost", 3306))
        .replica(Dsn::new("127.0.0.1", 3306))
        .build()
        .unwrap_err();
    assert_eq!(err, ConfigError::SourceEqualsReplica);
    assert_eq!(err.to_string(), "source and replica can't be the same");

    let err = base()
        .source(Dsn::new("10.0.0.1", 3306))
        .replica(Dsn::new("10.0.0.2", 3306))
        .replica(Dsn::new("10.0.0.1", 3306))
        .build()
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "one mysql backend server conflict in source and replica"
    );

    assert!(base()
        .source(Dsn::new("10.0.0.1", 3306))
        .replica(Dsn::new("10.0.0.1", 3307))
        .build()
        .is_ok());

    let err = Config::builder()
        .source(Dsn::new("10.0.0.1", 3306))
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingRequired(_)));
}
