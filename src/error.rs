//! 错误类型定义

use std::fmt;
use std::io;

use crate::config::ConfigError;

/// 解析器结果类型
pub type Result<T> = std::result::Result<T, DbResolverError>;

/// 读写分离解析器错误类型
#[derive(Debug, Clone)]
pub enum DbResolverError {
    /// 配置校验错误
    Config(ConfigError),
    /// 无效配置
    InvalidConfig(String),
    /// 重复注册了没有绑定表的全局解析器
    ConflictedGlobalResolver,
    /// 没有可用实例时的空连接池
    EmptyConnPool,
    /// 建立连接失败
    Connect(String),
    /// 语句执行失败
    Query(String),
    /// 域名解析失败
    Resolve(String),
    /// 超时错误
    Timeout,
    /// 启动等待超时
    StartupTimeout(String),
    /// 连接池已关闭
    Closed,
    /// IO错误
    Io(String),
    /// 解析错误
    Parse(String),
    /// 指标注册错误
    Metrics(String),
    /// 多个错误的聚合
    Aggregate(Vec<DbResolverError>),
}

impl fmt::Display for DbResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbResolverError::Config(err) => write!(f, "Config error: {}", err),
            DbResolverError::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
            DbResolverError::ConflictedGlobalResolver => write!(f, "conflicted global resolver"),
            DbResolverError::EmptyConnPool => write!(
                f,
                "empty connection pool, please health check the backend server"
            ),
            DbResolverError::Connect(msg) => write!(f, "Connect error: {}", msg),
            DbResolverError::Query(msg) => write!(f, "Query error: {}", msg),
            DbResolverError::Resolve(msg) => write!(f, "Resolve error: {}", msg),
            DbResolverError::Timeout => write!(f, "Request timeout"),
            DbResolverError::StartupTimeout(msg) => write!(
                f,
                "timeout for database connection, please check the database configuration: {}",
                msg
            ),
            DbResolverError::Closed => write!(f, "Connection pool closed"),
            DbResolverError::Io(msg) => write!(f, "IO error: {}", msg),
            DbResolverError::Parse(msg) => write!(f, "Parse error: {}", msg),
            DbResolverError::Metrics(msg) => write!(f, "Metrics error: {}", msg),
            DbResolverError::Aggregate(errors) => {
                let joined = errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("\n");
                write!(f, "{}", joined)
            }
        }
    }
}

impl std::error::Error for DbResolverError {}

impl DbResolverError {
    /// 是否为空连接池错误
    pub fn is_empty_conn_pool(&self) -> bool {
        matches!(self, DbResolverError::EmptyConnPool)
    }
}

impl From<ConfigError> for DbResolverError {
    fn from(err: ConfigError) -> Self {
        DbResolverError::Config(err)
    }
}

impl From<io::Error> for DbResolverError {
    fn from(err: io::Error) -> Self {
        DbResolverError::Io(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for DbResolverError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        DbResolverError::Timeout
    }
}

impl From<toml::de::Error> for DbResolverError {
    fn from(err: toml::de::Error) -> Self {
        DbResolverError::Parse(err.to_string())
    }
}

impl From<prometheus::Error> for DbResolverError {
    fn from(err: prometheus::Error) -> Self {
        DbResolverError::Metrics(err.to_string())
    }
}

impl From<serde_json::Error> for DbResolverError {
    fn from(err: serde_json::Error) -> Self {
        DbResolverError::Parse(err.to_string())
    }
}

/// 合并多个错误，全部成功时返回 `Ok(())`
///
/// 只有一个错误时原样返回，不额外包装
pub fn join_errors(mut errors: Vec<DbResolverError>) -> Result<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(DbResolverError::Aggregate(errors)),
    }
}
