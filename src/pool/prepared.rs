//! 预编译语句缓存
//!
//! 每个实例持有一份缓存；开启预编译时解析器返回共享该缓存的 [`PreparedStmtPool`]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{ConnPool, ExecResult, PoolLimits, PoolStats, PreparedStatement, Row, Value};
use crate::error::join_errors;
use crate::Result;

/// 预编译语句缓存（SQL -> 语句）
#[derive(Debug, Default)]
pub struct PreparedStmtCache {
    stmts: RwLock<HashMap<String, Arc<dyn PreparedStatement>>>,
}

impl PreparedStmtCache {
    /// 创建空缓存
    pub fn new() -> Self {
        Self::default()
    }

    /// 缓存的语句数量
    pub fn len(&self) -> usize {
        self.stmts.read().len()
    }

    /// 缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.stmts.read().is_empty()
    }

    /// 获取缓存的语句，不存在时在 `pool` 上预编译并缓存
    ///
    /// 并发预编译同一条 SQL 时保留先写入的语句，后到的语句被关闭
    pub async fn get_or_prepare(
        &self,
        pool: &dyn ConnPool,
        query: &str,
    ) -> Result<Arc<dyn PreparedStatement>> {
        let cached = self.stmts.read().get(query).cloned();
        if let Some(stmt) = cached {
            return Ok(stmt);
        }

        let prepared = pool.prepare(query).await?;
        let (stmt, duplicate) = {
            let mut stmts = self.stmts.write();
            match stmts.get(query) {
                Some(existing) => (existing.clone(), Some(prepared)),
                None => {
                    stmts.insert(query.to_string(), prepared.clone());
                    (prepared, None)
                }
            }
        };
        if let Some(duplicate) = duplicate {
            let _ = duplicate.close().await;
        }
        Ok(stmt)
    }

    /// 关闭并清空所有缓存的语句
    pub async fn close_all(&self) -> Result<()> {
        let stmts: Vec<_> = self.stmts.write().drain().map(|(_, stmt)| stmt).collect();
        let mut errors = Vec::new();
        for stmt in stmts {
            if let Err(e) = stmt.close().await {
                errors.push(e);
            }
        }
        join_errors(errors)
    }
}

/// 使用预编译语句执行的连接池包装
///
/// 与实例共享同一份语句缓存；关闭时只关闭缓存的语句，不关闭底层连接池
#[derive(Debug, Clone)]
pub struct PreparedStmtPool {
    pool: Arc<dyn ConnPool>,
    cache: Arc<PreparedStmtCache>,
}

impl PreparedStmtPool {
    /// 创建包装
    pub fn new(pool: Arc<dyn ConnPool>, cache: Arc<PreparedStmtCache>) -> Self {
        Self { pool, cache }
    }

    /// 底层连接池
    pub fn inner(&self) -> &Arc<dyn ConnPool> {
        &self.pool
    }

    /// 共享的语句缓存
    pub fn cache(&self) -> &Arc<PreparedStmtCache> {
        &self.cache
    }
}

#[async_trait]
impl ConnPool for PreparedStmtPool {
    async fn prepare(&self, query: &str) -> Result<Arc<dyn PreparedStatement>> {
        self.cache.get_or_prepare(self.pool.as_ref(), query).await
    }

    async fn execute(&self, query: &str, args: &[Value]) -> Result<ExecResult> {
        let stmt = self.prepare(query).await?;
        stmt.execute(args).await
    }

    async fn query(&self, query: &str, args: &[Value]) -> Result<Vec<Row>> {
        let stmt = self.prepare(query).await?;
        stmt.query(args).await
    }

    async fn close(&self) -> Result<()> {
        self.cache.close_all().await
    }

    fn is_transaction(&self) -> bool {
        self.pool.is_transaction()
    }

    fn limits(&self) -> Option<&dyn PoolLimits> {
        self.pool.limits()
    }

    fn stats(&self) -> Option<PoolStats> {
        self.pool.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPool;

    #[tokio::test]
    async fn test_statement_prepared_once() {
        let pool = MockPool::new("10.0.0.1:3306");
        let cache = Arc::new(PreparedStmtCache::new());
        let wrapped = PreparedStmtPool::new(pool.clone(), cache.clone());

        wrapped.query("SELECT * FROM users WHERE id = ?", &[Value::from(1)]).await.unwrap();
        wrapped.query("SELECT * FROM users WHERE id = ?", &[Value::from(2)]).await.unwrap();
        wrapped.execute("DELETE FROM users WHERE id = ?", &[Value::from(3)]).await.unwrap();

        assert_eq!(pool.prepare_count(), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(pool.executed().len(), 3);
    }

    #[tokio::test]
    async fn test_cache_shared_between_wrappers() {
        let pool = MockPool::new("10.0.0.1:3306");
        let cache = Arc::new(PreparedStmtCache::new());
        let first = PreparedStmtPool::new(pool.clone(), cache.clone());
        let second = PreparedStmtPool::new(pool.clone(), cache.clone());

        first.query("SELECT 1 FROM dual", &[]).await.unwrap();
        second.query("SELECT 1 FROM dual", &[]).await.unwrap();
        assert_eq!(pool.prepare_count(), 1);
    }

    #[tokio::test]
    async fn test_close_clears_cache_only() {
        let pool = MockPool::new("10.0.0.1:3306");
        let cache = Arc::new(PreparedStmtCache::new());
        let wrapped = PreparedStmtPool::new(pool.clone(), cache.clone());

        wrapped.query("SELECT 1 FROM dual", &[]).await.unwrap();
        wrapped.close().await.unwrap();
        assert!(cache.is_empty());
        assert!(!pool.is_closed());
    }
}
