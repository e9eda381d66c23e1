//! 严格配置模式
//!
//! 一个逻辑库的解析器配置：主库/从库 DSN、连接池限制、后台任务间隔与负载均衡策略。
//! 构建器不为间隔类参数提供默认值，必须明确指定。

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dsn::Dsn;
use crate::resolver::policy::PolicyKind;
use crate::utils::duration_ms;
use crate::{DbResolverError, Result};

/// 启动等待实例可用的默认超时
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// 域名解析的默认超时
pub const DEFAULT_HOST_RESOLVE_TIMEOUT: Duration = Duration::from_secs(3);

fn default_startup_timeout() -> Duration {
    DEFAULT_STARTUP_TIMEOUT
}

fn default_host_resolve_timeout() -> Duration {
    DEFAULT_HOST_RESOLVE_TIMEOUT
}

/// 配置错误类型
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// 缺少必需的配置参数
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
    /// 既没有主库也没有从库
    #[error("no source or replica")]
    NoSourceOrReplica,
    /// 配置了多个主库
    #[error("only one source is allowed")]
    OnlyOneSource,
    /// 唯一的主库与唯一的从库地址相同
    #[error("source and replica can't be the same")]
    SourceEqualsReplica,
    /// 主库与某个从库地址冲突
    #[error("one mysql backend server conflict in source and replica")]
    SourceReplicaConflict,
    /// 无效的时间间隔
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),
    /// 无效的配置值
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// 单个逻辑库的解析器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 主库列表（最多一个）
    #[serde(default)]
    pub sources: Vec<Dsn>,
    /// 从库列表
    #[serde(default)]
    pub replicas: Vec<Dsn>,
    /// 最大空闲连接数
    #[serde(default)]
    pub max_idle_conns: usize,
    /// 最大打开连接数
    #[serde(default)]
    pub max_open_conns: usize,
    /// 连接最大空闲时间，零表示不限制
    #[serde(default, rename = "conn_max_idle_time_ms", with = "duration_ms")]
    pub conn_max_idle_time: Duration,
    /// 连接最大存活时间，零表示不限制
    #[serde(default, rename = "conn_max_lifetime_ms", with = "duration_ms")]
    pub conn_max_lifetime: Duration,
    /// 域名重新解析间隔
    #[serde(rename = "host_resolve_interval_ms", with = "duration_ms")]
    pub host_resolve_interval: Duration,
    /// 单次域名解析超时
    #[serde(
        default = "default_host_resolve_timeout",
        rename = "host_resolve_timeout_ms",
        with = "duration_ms"
    )]
    pub host_resolve_timeout: Duration,
    /// 健康检查间隔
    #[serde(rename = "health_check_interval_ms", with = "duration_ms")]
    pub health_check_interval: Duration,
    /// 单次健康检查超时
    #[serde(rename = "health_check_timeout_ms", with = "duration_ms")]
    pub health_check_timeout: Duration,
    /// 实例状态日志输出间隔
    #[serde(rename = "db_status_log_interval_ms", with = "duration_ms")]
    pub db_status_log_interval: Duration,
    /// 连续健康检查失败多少次后移除域名解析出的实例
    #[serde(default)]
    pub max_health_check_retry: u32,
    /// 负载均衡策略
    #[serde(default)]
    pub policy: PolicyKind,
    /// 是否在语句上标记选择的节点模式
    #[serde(default)]
    pub trace_resolver_mode: bool,
    /// 角色标签，用于日志与指标
    #[serde(default)]
    pub role: String,
    /// 绑定的表名或提示名；为空时作为全局解析器
    #[serde(default)]
    pub bindings: Vec<String>,
    /// 启动时等待实例可用的超时
    #[serde(
        default = "default_startup_timeout",
        rename = "startup_timeout_ms",
        with = "duration_ms"
    )]
    pub startup_timeout: Duration,
}

impl Config {
    /// 创建配置构建器
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// 校验配置
    ///
    /// 不尝试修复任何配置问题，而是直接报错
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.sources.is_empty() && self.replicas.is_empty() {
            return Err(ConfigError::NoSourceOrReplica);
        }

        if self.sources.len() > 1 {
            return Err(ConfigError::OnlyOneSource);
        }

        for source in &self.sources {
            if self.replicas.iter().any(|replica| source.equal_addr_to(replica)) {
                if self.sources.len() == 1 && self.replicas.len() == 1 {
                    return Err(ConfigError::SourceEqualsReplica);
                }
                return Err(ConfigError::SourceReplicaConflict);
            }
        }

        for (name, interval) in [
            ("host_resolve_interval", self.host_resolve_interval),
            ("health_check_interval", self.health_check_interval),
            ("db_status_log_interval", self.db_status_log_interval),
        ] {
            if interval.is_zero() {
                return Err(ConfigError::InvalidInterval(format!("{} cannot be zero", name)));
            }
        }

        if self.health_check_timeout.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "health_check_timeout cannot be zero".to_string(),
            ));
        }

        if self.host_resolve_timeout.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "host_resolve_timeout cannot be zero".to_string(),
            ));
        }

        for (i, dsn) in self.sources.iter().chain(self.replicas.iter()).enumerate() {
            if dsn.host.is_empty() {
                return Err(ConfigError::InvalidValue(format!("DSN {} host cannot be empty", i)));
            }
            if dsn.port == 0 {
                return Err(ConfigError::InvalidValue(format!("DSN {} port cannot be zero", i)));
            }
        }

        Ok(())
    }

    /// 是否为全局解析器配置（没有绑定任何表或提示）
    pub fn is_global(&self) -> bool {
        self.bindings.is_empty()
    }

    /// 从 TOML 文本加载
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 从 JSON 文本加载
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// 按扩展名从文件加载（`.toml` 或 `.json`）
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            other => Err(DbResolverError::InvalidConfig(format!(
                "unsupported config file extension: {:?}",
                other
            ))),
        }
    }
}

/// 配置构建器
///
/// 三个后台任务间隔与健康检查超时必须明确指定
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    sources: Vec<Dsn>,
    replicas: Vec<Dsn>,
    max_idle_conns: usize,
    max_open_conns: usize,
    conn_max_idle_time: Duration,
    conn_max_lifetime: Duration,
    host_resolve_interval: Option<Duration>,
    host_resolve_timeout: Option<Duration>,
    health_check_interval: Option<Duration>,
    health_check_timeout: Option<Duration>,
    db_status_log_interval: Option<Duration>,
    max_health_check_retry: u32,
    policy: PolicyKind,
    trace_resolver_mode: bool,
    role: String,
    bindings: Vec<String>,
    startup_timeout: Option<Duration>,
}

impl ConfigBuilder {
    /// 创建新的配置构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加主库
    pub fn source(mut self, dsn: Dsn) -> Self {
        self.sources.push(dsn);
        self
    }

    /// 添加从库
    pub fn replica(mut self, dsn: Dsn) -> Self {
        self.replicas.push(dsn);
        self
    }

    /// 设置最大空闲连接数
    pub fn max_idle_conns(mut self, n: usize) -> Self {
        self.max_idle_conns = n;
        self
    }

    /// 设置最大打开连接数
    pub fn max_open_conns(mut self, n: usize) -> Self {
        self.max_open_conns = n;
        self
    }

    /// 设置连接最大空闲时间
    pub fn conn_max_idle_time(mut self, d: Duration) -> Self {
        self.conn_max_idle_time = d;
        self
    }

    /// 设置连接最大存活时间
    pub fn conn_max_lifetime(mut self, d: Duration) -> Self {
        self.conn_max_lifetime = d;
        self
    }

    /// 设置域名重新解析间隔
    pub fn host_resolve_interval(mut self, d: Duration) -> Self {
        self.host_resolve_interval = Some(d);
        self
    }

    /// 设置单次域名解析超时
    pub fn host_resolve_timeout(mut self, d: Duration) -> Self {
        self.host_resolve_timeout = Some(d);
        self
    }

    /// 设置健康检查间隔
    pub fn health_check_interval(mut self, d: Duration) -> Self {
        self.health_check_interval = Some(d);
        self
    }

    /// 设置健康检查超时
    pub fn health_check_timeout(mut self, d: Duration) -> Self {
        self.health_check_timeout = Some(d);
        self
    }

    /// 设置状态日志间隔
    pub fn db_status_log_interval(mut self, d: Duration) -> Self {
        self.db_status_log_interval = Some(d);
        self
    }

    /// 设置健康检查最大重试次数
    pub fn max_health_check_retry(mut self, n: u32) -> Self {
        self.max_health_check_retry = n;
        self
    }

    /// 设置负载均衡策略
    pub fn policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }

    /// 设置是否追踪节点模式
    pub fn trace_resolver_mode(mut self, enable: bool) -> Self {
        self.trace_resolver_mode = enable;
        self
    }

    /// 设置角色标签
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// 绑定表名或提示名
    pub fn bind(mut self, name: impl Into<String>) -> Self {
        self.bindings.push(name.into());
        self
    }

    /// 设置启动等待超时
    pub fn startup_timeout(mut self, d: Duration) -> Self {
        self.startup_timeout = Some(d);
        self
    }

    /// 构建并校验配置
    pub fn build(self) -> std::result::Result<Config, ConfigError> {
        let config = Config {
            sources: self.sources,
            replicas: self.replicas,
            max_idle_conns: self.max_idle_conns,
            max_open_conns: self.max_open_conns,
            conn_max_idle_time: self.conn_max_idle_time,
            conn_max_lifetime: self.conn_max_lifetime,
            host_resolve_interval: self.host_resolve_interval.ok_or_else(|| {
                ConfigError::MissingRequired("host_resolve_interval".to_string())
            })?,
            host_resolve_timeout: self
                .host_resolve_timeout
                .unwrap_or(DEFAULT_HOST_RESOLVE_TIMEOUT),
            health_check_interval: self.health_check_interval.ok_or_else(|| {
                ConfigError::MissingRequired("health_check_interval".to_string())
            })?,
            health_check_timeout: self.health_check_timeout.ok_or_else(|| {
                ConfigError::MissingRequired("health_check_timeout".to_string())
            })?,
            db_status_log_interval: self.db_status_log_interval.ok_or_else(|| {
                ConfigError::MissingRequired("db_status_log_interval".to_string())
            })?,
            max_health_check_retry: self.max_health_check_retry,
            policy: self.policy,
            trace_resolver_mode: self.trace_resolver_mode,
            role: self.role,
            bindings: self.bindings,
            startup_timeout: self.startup_timeout.unwrap_or(DEFAULT_STARTUP_TIMEOUT),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dsn(host: &str, port: u16) -> Dsn {
        Dsn::new(host, port).with_dbname("app")
    }

    fn builder() -> ConfigBuilder {
        Config::builder()
            .host_resolve_interval(Duration::from_secs(2))
            .health_check_interval(Duration::from_secs(2))
            .health_check_timeout(Duration::from_secs(2))
            .db_status_log_interval(Duration::from_secs(10))
            .max_open_conns(10)
            .max_idle_conns(10)
            .policy(PolicyKind::RoundRobin)
    }

    #[test]
    fn test_builder_missing_required() {
        let result = Config::builder().source(dsn("127.0.0.1", 3306)).build();
        assert_eq!(
            result.unwrap_err(),
            ConfigError::MissingRequired("host_resolve_interval".to_string())
        );
    }

    #[test]
    fn test_no_source_or_replica() {
        let err = builder().build().unwrap_err();
        assert_eq!(err, ConfigError::NoSourceOrReplica);
        assert!(err.to_string().contains("no source or replica"));
    }

    #[test]
    fn test_only_one_source() {
        let err = builder()
            .source(dsn("localhost", 13306))
            .source(dsn("127.0.0.1", 13307))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("only one source is allowed"));
    }

    #[test]
    fn test_source_equals_replica() {
        let err = builder()
            .source(dsn("localhost", 13306))
            .replica(dsn("127.0.0.1", 13306))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::SourceEqualsReplica);
    }

    #[test]
    fn test_source_conflicts_with_one_of_replicas() {
        let err = builder()
            .source(dsn("localhost", 13306))
            .replica(dsn("127.0.0.1", 13307))
            .replica(dsn("127.1", 13306))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::SourceReplicaConflict);
    }

    #[test]
    fn test_valid_config() {
        let config = builder()
            .source(dsn("localhost", 13306))
            .replica(dsn("127.0.0.1", 13307))
            .replica(dsn("127.0.0.1", 13308))
            .build()
            .unwrap();
        assert!(config.is_global());
        assert_eq!(config.startup_timeout, DEFAULT_STARTUP_TIMEOUT);
        assert_eq!(config.host_resolve_timeout, DEFAULT_HOST_RESOLVE_TIMEOUT);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = builder()
            .health_check_interval(Duration::ZERO)
            .source(dsn("10.0.0.1", 3306))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidInterval(_)));
    }

    #[test]
    fn test_from_toml_str() {
        let content = r#"
            host_resolve_interval_ms = 2000
            health_check_interval_ms = 2000
            health_check_timeout_ms = 1000
            db_status_log_interval_ms = 10000
            max_health_check_retry = 3
            policy = "random"
            role = "orders"
            bindings = ["orders", "order_items"]

            [[sources]]
            host = "db-master.internal"
            dbname = "orders"
            username = "app"
            password = "secret"

            [[replicas]]
            host = "10.0.0.12"
            port = 3307
            dbname = "orders"
        "#;
        let config = Config::from_toml_str(content).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].port, 3306);
        assert_eq!(config.replicas[0].port, 3307);
        assert_eq!(config.health_check_timeout, Duration::from_secs(1));
        assert_eq!(config.policy, PolicyKind::Random);
        assert_eq!(config.bindings, vec!["orders", "order_items"]);
        assert!(!config.is_global());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_str() {
        let content = r#"{
            "sources": [{"host": "127.0.0.1", "port": 3306}],
            "host_resolve_interval_ms": 1000,
            "health_check_interval_ms": 1000,
            "health_check_timeout_ms": 500,
            "db_status_log_interval_ms": 5000,
            "policy": "roundRobin"
        }"#;
        let config = Config::from_json_str(content).unwrap();
        assert_eq!(config.policy, PolicyKind::RoundRobin);
        assert!(config.replicas.is_empty());
        assert!(config.validate().is_ok());
    }
}
