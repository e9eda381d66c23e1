//! 测试用的连接池、连接器与域名解析器
//!
//! 单元测试直接使用；集成测试与下游 crate 通过 `testing` feature 引入。
//! 每个连接池查询时返回自身地址，便于断言语句被路由到了哪个实例

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::dsn::Dsn;
use crate::manager::HostResolver;
use crate::pool::{
    ConnPool, Connector, ExecResult, PoolLimits, PoolStats, PreparedStatement, Row, Value,
};
use crate::{DbResolverError, Result};

#[derive(Debug, Default)]
struct MockLimits {
    max_open: AtomicUsize,
    max_idle: AtomicUsize,
}

impl PoolLimits for MockLimits {
    fn set_max_open_conns(&self, n: usize) {
        self.max_open.store(n, Ordering::SeqCst);
    }
    fn set_max_idle_conns(&self, n: usize) {
        self.max_idle.store(n, Ordering::SeqCst);
    }
    fn set_conn_max_lifetime(&self, _d: Duration) {}
    fn set_conn_max_idle_time(&self, _d: Duration) {}
}

#[derive(Debug, Default)]
struct MockState {
    failing: AtomicBool,
    closed: AtomicBool,
    prepared: AtomicUsize,
    executed: Mutex<Vec<String>>,
}

impl MockState {
    fn run(&self, query: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbResolverError::Closed);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(DbResolverError::Query(format!("backend down: {}", query)));
        }
        self.executed.lock().push(query.to_string());
        Ok(())
    }
}

/// 记录执行过的语句的连接池
#[derive(Debug)]
pub struct MockPool {
    addr: String,
    state: Arc<MockState>,
    limits: MockLimits,
}

impl MockPool {
    /// 为该地址创建连接池
    pub fn new(addr: &str) -> Arc<MockPool> {
        Arc::new(MockPool {
            addr: addr.to_string(),
            state: Arc::new(MockState::default()),
            limits: MockLimits::default(),
        })
    }

    /// 连接池对应的 `ip:port`
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// 让后续语句失败或恢复
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    /// 预编译次数
    pub fn prepare_count(&self) -> usize {
        self.state.prepared.load(Ordering::SeqCst)
    }

    /// 已执行的语句
    pub fn executed(&self) -> Vec<String> {
        self.state.executed.lock().clone()
    }

    /// 是否已关闭
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// 被设置的最大连接数
    pub fn max_open_conns(&self) -> usize {
        self.limits.max_open.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct MockStatement {
    query: String,
    state: Arc<MockState>,
}

#[async_trait]
impl PreparedStatement for MockStatement {
    async fn execute(&self, _args: &[Value]) -> Result<ExecResult> {
        self.state.run(&self.query)?;
        Ok(ExecResult { rows_affected: 1, last_insert_id: None })
    }

    async fn query(&self, _args: &[Value]) -> Result<Vec<Row>> {
        self.state.run(&self.query)?;
        Ok(vec![vec![Value::from(1)]])
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ConnPool for MockPool {
    async fn prepare(&self, query: &str) -> Result<Arc<dyn PreparedStatement>> {
        self.state.prepared.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockStatement {
            query: query.to_string(),
            state: self.state.clone(),
        }))
    }

    async fn execute(&self, query: &str, _args: &[Value]) -> Result<ExecResult> {
        self.state.run(query)?;
        Ok(ExecResult { rows_affected: 1, last_insert_id: None })
    }

    async fn query(&self, query: &str, _args: &[Value]) -> Result<Vec<Row>> {
        self.state.run(query)?;
        Ok(vec![vec![Value::from(self.addr.clone())]])
    }

    async fn close(&self) -> Result<()> {
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn limits(&self) -> Option<&dyn PoolLimits> {
        Some(&self.limits)
    }

    fn stats(&self) -> Option<PoolStats> {
        Some(PoolStats {
            max_open_connections: self.max_open_conns() as u64,
            open_connections: 1,
            idle: 1,
            ..PoolStats::default()
        })
    }
}

/// 按地址创建 [`MockPool`] 的连接器
#[derive(Debug, Default)]
pub struct MockConnector {
    pools: Mutex<Vec<Arc<MockPool>>>,
    refused: Mutex<HashSet<String>>,
    open_delay: Mutex<Duration>,
}

impl MockConnector {
    /// 创建连接器
    pub fn new() -> Arc<MockConnector> {
        Arc::new(MockConnector::default())
    }

    /// 拒绝或恢复对某个 `ip:port` 的连接
    pub fn set_refused(&self, addr: &str, refused: bool) {
        let mut set = self.refused.lock();
        if refused {
            set.insert(addr.to_string());
        } else {
            set.remove(addr);
        }
    }

    /// 每次建立连接前等待的时长
    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock() = delay;
    }

    /// 最近一次为该地址创建的连接池
    pub fn pool(&self, addr: &str) -> Option<Arc<MockPool>> {
        self.pools.lock().iter().rev().find(|p| p.addr() == addr).cloned()
    }

    /// 为该地址打开过的连接池数量
    pub fn open_count(&self, addr: &str) -> usize {
        self.pools.lock().iter().filter(|p| p.addr() == addr).count()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, dsn: &Dsn) -> Result<Arc<dyn ConnPool>> {
        let addr = dsn.addr().to_string();
        let delay = *self.open_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.refused.lock().contains(&addr) {
            return Err(DbResolverError::Connect(format!("connection refused: {}", addr)));
        }
        let pool = MockPool::new(&addr);
        self.pools.lock().push(pool.clone());
        Ok(pool)
    }
}

/// 应答可修改的域名解析器
#[derive(Debug, Default)]
pub struct MockHostResolver {
    answers: Mutex<HashMap<String, Vec<IpAddr>>>,
}

impl MockHostResolver {
    /// 创建解析器
    pub fn new() -> Arc<MockHostResolver> {
        Arc::new(MockHostResolver::default())
    }

    /// 设置域名的应答
    pub fn set(&self, host: &str, ips: &[&str]) {
        let ips = ips.iter().filter_map(|ip| ip.parse().ok()).collect();
        self.answers.lock().insert(host.to_string(), ips);
    }
}

#[async_trait]
impl HostResolver for MockHostResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        let ips = self.answers.lock().get(host).cloned();
        ips.ok_or_else(|| DbResolverError::Resolve(format!("no such host: {}", host)))
    }
}
