//! 空连接池
//!
//! 没有可用实例时返回给查询引擎的占位连接池，所有操作都返回
//! [`DbResolverError::EmptyConnPool`]，不阻塞、不回退到其他角色

use std::sync::Arc;

use async_trait::async_trait;

use super::{ConnPool, ExecResult, PreparedStatement, Row, Value};
use crate::{DbResolverError, Result};

/// 空连接池
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyConnPool;

#[async_trait]
impl ConnPool for EmptyConnPool {
    async fn prepare(&self, _query: &str) -> Result<Arc<dyn PreparedStatement>> {
        Err(DbResolverError::EmptyConnPool)
    }

    async fn execute(&self, _query: &str, _args: &[Value]) -> Result<ExecResult> {
        Err(DbResolverError::EmptyConnPool)
    }

    async fn query(&self, _query: &str, _args: &[Value]) -> Result<Vec<Row>> {
        Err(DbResolverError::EmptyConnPool)
    }

    async fn query_row(&self, _query: &str, _args: &[Value]) -> Result<Option<Row>> {
        Err(DbResolverError::EmptyConnPool)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_operation_fails() {
        let pool = EmptyConnPool;
        assert!(pool.prepare("SELECT 1").await.unwrap_err().is_empty_conn_pool());
        assert!(pool.execute("DELETE FROM t", &[]).await.unwrap_err().is_empty_conn_pool());
        assert!(pool.query("SELECT 1", &[]).await.unwrap_err().is_empty_conn_pool());
        assert!(pool.query_row("SELECT 1", &[]).await.unwrap_err().is_empty_conn_pool());
        assert!(!pool.is_transaction());
        assert!(pool.close().await.is_ok());
    }
}
