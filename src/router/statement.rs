//! 语句模型
//!
//! 查询引擎在执行前把语句的路由相关信息填入 [`Statement`]，路由器据此替换 `conn_pool`

use std::sync::Arc;

use crate::pool::{ConnPool, EmptyConnPool};
use crate::types::{Operation, ResolverMode};

/// 一条待执行的语句
#[derive(Debug, Clone)]
pub struct Statement {
    /// 目标表名
    pub table: String,
    /// 模型对应的表名
    pub schema_table: String,
    /// 原始 SQL
    pub sql: String,
    /// 显式指定的解析器名称
    pub hint: Option<String>,
    /// 显式指定的读写类型
    pub force: Option<Operation>,
    /// 是否带有锁定子句（`FOR UPDATE` 等）
    pub locking: bool,
    /// 是否使用预编译语句
    pub prepare_stmt: bool,
    /// 执行语句使用的连接池
    pub conn_pool: Arc<dyn ConnPool>,
    /// 路由结果标记，只在开启追踪时设置
    pub resolver_mode: Option<ResolverMode>,
}

impl Default for Statement {
    fn default() -> Self {
        Self::new(Arc::new(EmptyConnPool))
    }
}

impl Statement {
    /// 以默认连接池创建语句
    pub fn new(conn_pool: Arc<dyn ConnPool>) -> Self {
        Self {
            table: String::new(),
            schema_table: String::new(),
            sql: String::new(),
            hint: None,
            force: None,
            locking: false,
            prepare_stmt: false,
            conn_pool,
            resolver_mode: None,
        }
    }

    /// 设置表名
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// 设置模型表名
    pub fn schema_table(mut self, table: impl Into<String>) -> Self {
        self.schema_table = table.into();
        self
    }

    /// 设置原始 SQL
    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = sql.into();
        self
    }

    /// 指定使用的解析器
    pub fn using(mut self, name: impl Into<String>) -> Self {
        self.hint = Some(name.into());
        self
    }

    /// 强制走主库
    pub fn write(mut self) -> Self {
        self.force = Some(Operation::Write);
        self
    }

    /// 强制走从库
    pub fn read(mut self) -> Self {
        self.force = Some(Operation::Read);
        self
    }

    /// 标记带锁定子句
    pub fn locking(mut self) -> Self {
        self.locking = true;
        self
    }

    /// 使用预编译语句
    pub fn prepare_stmt(mut self, enable: bool) -> Self {
        self.prepare_stmt = enable;
        self
    }

    /// 当前连接池是否为事务句柄
    pub fn in_transaction(&self) -> bool {
        self.conn_pool.is_transaction()
    }
}
