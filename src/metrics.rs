//! 连接池指标
//!
//! 定期遍历实例注册表，把每个实例的连接池统计导出为 prometheus 指标，
//! 标签为 `role` 与 `address`

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::manager::InstanceRegistry;
use crate::pool::PoolStats;
use crate::utils::start_cron_job;
use crate::Result;

/// 指标命名空间
pub const METRICS_NAMESPACE: &str = "db_resolver";

const LABELS: [&str; 2] = ["role", "address"];

/// 连接池指标集合
#[derive(Clone)]
pub struct PoolMetrics {
    registry: Registry,
    max_open_connections: GaugeVec,
    open_connections: GaugeVec,
    in_use: GaugeVec,
    idle: GaugeVec,
    wait_count: GaugeVec,
    wait_duration: GaugeVec,
    max_idle_closed: GaugeVec,
    max_idle_time_closed: GaugeVec,
    max_lifetime_closed: GaugeVec,
}

impl fmt::Debug for PoolMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolMetrics").field("namespace", &METRICS_NAMESPACE).finish()
    }
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help).namespace(METRICS_NAMESPACE), &LABELS)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl PoolMetrics {
    /// 在给定的注册表上创建并注册所有指标
    pub fn new(registry: Registry) -> Result<Self> {
        Ok(Self {
            max_open_connections: gauge(
                &registry,
                "sql_max_open_connections",
                "Maximum number of open connections to the database.",
            )?,
            open_connections: gauge(
                &registry,
                "sql_open_connections",
                "The number of established connections both in use and idle.",
            )?,
            in_use: gauge(
                &registry,
                "sql_connections_in_use",
                "The number of connections currently in use.",
            )?,
            idle: gauge(&registry, "sql_connections_idle", "The number of idle connections.")?,
            wait_count: gauge(
                &registry,
                "sql_wait_count",
                "The total number of connections waited for.",
            )?,
            wait_duration: gauge(
                &registry,
                "sql_wait_duration",
                "The total time blocked waiting for a new connection, in seconds.",
            )?,
            max_idle_closed: gauge(
                &registry,
                "sql_max_idle_closed",
                "The total number of connections closed due to SetMaxIdleConns.",
            )?,
            max_idle_time_closed: gauge(
                &registry,
                "sql_max_idle_time_closed",
                "The total number of connections closed due to SetConnMaxIdleTime.",
            )?,
            max_lifetime_closed: gauge(
                &registry,
                "sql_max_life_time_closed",
                "The total number of connections closed due to SetConnMaxLifetime.",
            )?,
            registry,
        })
    }

    /// 指标所在的注册表
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn all(&self) -> [&GaugeVec; 9] {
        [
            &self.max_open_connections,
            &self.open_connections,
            &self.in_use,
            &self.idle,
            &self.wait_count,
            &self.wait_duration,
            &self.max_idle_closed,
            &self.max_idle_time_closed,
            &self.max_lifetime_closed,
        ]
    }

    fn record(&self, role: &str, address: &str, stats: &PoolStats) {
        let labels = [role, address];
        self.max_open_connections.with_label_values(&labels).set(stats.max_open_connections as f64);
        self.open_connections.with_label_values(&labels).set(stats.open_connections as f64);
        self.in_use.with_label_values(&labels).set(stats.in_use as f64);
        self.idle.with_label_values(&labels).set(stats.idle as f64);
        self.wait_count.with_label_values(&labels).set(stats.wait_count as f64);
        self.wait_duration.with_label_values(&labels).set(stats.wait_duration.as_secs_f64());
        self.max_idle_closed.with_label_values(&labels).set(stats.max_idle_closed as f64);
        self.max_idle_time_closed.with_label_values(&labels).set(stats.max_idle_time_closed as f64);
        self.max_lifetime_closed.with_label_values(&labels).set(stats.max_lifetime_closed as f64);
    }

    /// 采集一次：已移除的实例不再出现在指标中
    pub fn observe(&self, instances: &InstanceRegistry) {
        for gauge in self.all() {
            gauge.reset();
        }
        for inst in instances.list() {
            let Some(stats) = inst.conn_pool().and_then(|pool| pool.stats()) else {
                continue;
            };
            self.record(inst.role(), inst.addr().as_str(), &stats);
        }
    }

    /// 启动定时采集任务，直到 `token` 被取消
    pub fn spawn_observer(
        self: Arc<Self>,
        instances: Arc<InstanceRegistry>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            start_cron_job(token, true, interval, "PoolMetrics", || {
                let metrics = self.clone();
                let instances = instances.clone();
                async move { metrics.observe(&instances) }
            })
            .await;
        })
    }

    /// 以 prometheus 文本格式导出
    pub fn gather(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
