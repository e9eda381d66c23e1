//! 实例健康检查

use std::sync::Arc;
use std::time::Duration;

use crate::error::DbResolverError;
use crate::manager::Instance;
use crate::types::Addr;

/// 健康检查使用的探测语句
pub const SELECT_VERSION_COMMENT: &str = "SELECT @@version_comment LIMIT 1";

/// 单次探测结果
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    /// 探测成功
    Healthy,
    /// 探测语句失败或超时
    Failed(DbResolverError),
}

impl ProbeOutcome {
    /// 是否健康
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }
}

/// 对实例执行一次探测，并据此更新健康状态与重试计数
///
/// 实例还没有连接池时调用方应先尝试重连，这里只把它记为一次失败
pub async fn probe(inst: &Instance, timeout: Duration) -> ProbeOutcome {
    let Some(pool) = inst.conn_pool() else {
        let err = DbResolverError::Closed;
        inst.set_healthy(false);
        inst.increase_retry();
        return ProbeOutcome::Failed(err);
    };

    let query = pool.query(SELECT_VERSION_COMMENT, &[]);
    let result = match tokio::time::timeout(timeout, query).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(DbResolverError::Timeout),
    };

    match result {
        Ok(()) => {
            inst.set_healthy(true);
            inst.reset_retry();
            ProbeOutcome::Healthy
        }
        Err(e) => {
            inst.set_healthy(false);
            inst.increase_retry();
            ProbeOutcome::Failed(e)
        }
    }
}

/// 选出需要移除的实例
///
/// 静态实例永不移除；其余实例在不健康且重试次数达到上限时移除
pub fn select_evictions(instances: &[Arc<Instance>], max_retry: u32) -> Vec<Addr> {
    instances
        .iter()
        .filter(|inst| !inst.is_static() && !inst.healthy() && inst.retry() >= max_retry)
        .map(|inst| inst.addr().clone())
        .collect()
}
