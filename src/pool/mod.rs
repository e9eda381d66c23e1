//! 连接池抽象
//!
//! 查询引擎通过 [`ConnPool`] 执行语句；解析器只负责决定使用哪个连接池。
//! 真实的数据库驱动由集成层通过 [`Connector`] 提供。

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::dsn::Dsn;
use crate::Result;

pub mod empty;
pub mod prepared;

pub use empty::EmptyConnPool;
pub use prepared::{PreparedStmtCache, PreparedStmtPool};

/// 参数与结果单元格的值类型
pub type Value = serde_json::Value;

/// 一行结果
pub type Row = Vec<Value>;

/// 写语句执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// 影响行数
    pub rows_affected: u64,
    /// 最后插入的自增ID
    pub last_insert_id: Option<u64>,
}

/// 连接池统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// 最大打开连接数
    pub max_open_connections: u64,
    /// 已建立的连接数（使用中与空闲）
    pub open_connections: u64,
    /// 使用中的连接数
    pub in_use: u64,
    /// 空闲连接数
    pub idle: u64,
    /// 等待连接的总次数
    pub wait_count: u64,
    /// 等待连接的总时长
    pub wait_duration: Duration,
    /// 因最大空闲数被关闭的连接数
    pub max_idle_closed: u64,
    /// 因空闲超时被关闭的连接数
    pub max_idle_time_closed: u64,
    /// 因存活超时被关闭的连接数
    pub max_lifetime_closed: u64,
}

/// 连接池限制能力
///
/// 实例创建时查询一次，不支持的连接池返回 `None`
pub trait PoolLimits: Send + Sync {
    /// 设置最大打开连接数
    fn set_max_open_conns(&self, n: usize);
    /// 设置最大空闲连接数
    fn set_max_idle_conns(&self, n: usize);
    /// 设置连接最大存活时间，零表示不限制
    fn set_conn_max_lifetime(&self, d: Duration);
    /// 设置连接最大空闲时间，零表示不限制
    fn set_conn_max_idle_time(&self, d: Duration);
}

/// 预编译语句
#[async_trait]
pub trait PreparedStatement: Send + Sync + Debug {
    /// 执行写语句
    async fn execute(&self, args: &[Value]) -> Result<ExecResult>;
    /// 执行查询
    async fn query(&self, args: &[Value]) -> Result<Vec<Row>>;
    /// 关闭语句
    async fn close(&self) -> Result<()>;
}

/// 连接池
#[async_trait]
pub trait ConnPool: Send + Sync + Debug {
    /// 预编译语句
    async fn prepare(&self, query: &str) -> Result<Arc<dyn PreparedStatement>>;

    /// 执行写语句
    async fn execute(&self, query: &str, args: &[Value]) -> Result<ExecResult>;

    /// 执行查询
    async fn query(&self, query: &str, args: &[Value]) -> Result<Vec<Row>>;

    /// 查询单行
    async fn query_row(&self, query: &str, args: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(query, args).await?.into_iter().next())
    }

    /// 关闭连接池
    async fn close(&self) -> Result<()>;

    /// 是否为事务句柄；事务中的语句不再重新路由
    fn is_transaction(&self) -> bool {
        false
    }

    /// 连接池限制能力
    fn limits(&self) -> Option<&dyn PoolLimits> {
        None
    }

    /// 连接池统计信息
    fn stats(&self) -> Option<PoolStats> {
        None
    }
}

/// 连接器：为已解析的 DSN 打开连接池
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    /// 打开连接池
    async fn open(&self, dsn: &Dsn) -> Result<Arc<dyn ConnPool>>;
}
