//! 集成测试共用的配置与断言辅助
//!
//! 模拟后端来自 `rat_dbresolver::testing`，每个连接池查询时返回自身地址

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rat_dbresolver::{Config, ConfigBuilder, ConnPool, Result};

/// 后台任务间隔较短的配置
pub fn fast_config() -> ConfigBuilder {
    Config::builder()
        .host_resolve_interval(Duration::from_secs(30))
        .health_check_interval(Duration::from_secs(1))
        .health_check_timeout(Duration::from_millis(500))
        .db_status_log_interval(Duration::from_secs(60))
        .max_health_check_retry(2)
        .startup_timeout(Duration::from_secs(5))
}

/// 执行一次查询，返回处理该查询的实例地址
pub async fn served_by(pool: &Arc<dyn ConnPool>) -> Result<String> {
    let rows = pool.query("SELECT 1", &[]).await?;
    Ok(rows[0][0].as_str().unwrap_or_default().to_string())
}
