//! 服务器管理器实现

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::dns::ipv4_only;
use super::health::{probe, select_evictions, ProbeOutcome};
use super::{Instance, ManagerContext, ServerManager};
use crate::config::Config;
use crate::dsn::Dsn;
use crate::error::join_errors;
use crate::pool::ConnPool;
use crate::types::{Addr, DataSourceType};
use crate::utils::start_cron_job;
use crate::{dbr_debug, dbr_error, dbr_info, dbr_warn};
use crate::{DbResolverError, Result};

/// 启动等待时检查实例的间隔
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 服务器管理器
///
/// 可以廉价克隆，克隆体共享同一组实例与后台任务
#[derive(Clone)]
pub struct ServerManagerImpl {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    conf: Config,
    ds_type: DataSourceType,
    ctx: ManagerContext,
    host_dsns: Vec<Dsn>,
    store: DashMap<Addr, Arc<Instance>>,
    // 保证“检查-创建-插入”整体串行，主库最多一个实例
    create_lock: tokio::sync::Mutex<()>,
    is_primary: AtomicBool,
    peer: RwLock<Option<Weak<dyn ServerManager>>>,
    token: CancellationToken,
    started: AtomicBool,
    closed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for ServerManagerImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerManagerImpl")
            .field("role", &self.inner.conf.role)
            .field("ds_type", &self.inner.ds_type)
            .field("instances", &self.inner.store.len())
            .field("is_primary", &self.inner.is_primary.load(Ordering::Acquire))
            .finish()
    }
}

impl ServerManagerImpl {
    /// 创建管理器
    ///
    /// IP 形式的地址不需要解析，立即创建实例（连接失败时以不健康状态保留，等待健康检查重连）；
    /// 域名形式的地址在 [`ServerManager::run_and_wait`] 启动后由解析任务处理
    pub async fn new(
        conf: Config,
        dsns: Vec<Dsn>,
        ds_type: DataSourceType,
        ctx: ManagerContext,
    ) -> Self {
        let mut host_dsns = Vec::new();
        let mut static_dsns = Vec::new();
        for mut dsn in dsns {
            dsn.ds_type = ds_type;
            if dsn.is_ip_literal() {
                dsn.ipv4 = Some(dsn.host.clone());
                static_dsns.push(dsn);
            } else {
                host_dsns.push(dsn);
            }
        }

        let manager = Self {
            inner: Arc::new(ManagerInner {
                conf,
                ds_type,
                ctx,
                host_dsns,
                store: DashMap::new(),
                create_lock: tokio::sync::Mutex::new(()),
                is_primary: AtomicBool::new(false),
                peer: RwLock::new(None),
                token: CancellationToken::new(),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        };
        for dsn in static_dsns {
            manager.inner.create_instance_if_not_exists(dsn).await;
        }
        manager
    }

    /// 数据源类型
    pub fn ds_type(&self) -> DataSourceType {
        self.inner.ds_type
    }

    /// 所有缓存的实例（包括不健康的），按地址排序
    pub fn all_instances(&self) -> Vec<Arc<Instance>> {
        self.inner.all_instances()
    }

    /// 按地址查找实例
    pub fn instance(&self, addr: &Addr) -> Option<Arc<Instance>> {
        self.inner.store.get(addr).map(|e| e.value().clone())
    }

    /// 执行一轮健康检查
    pub async fn health_check_once(&self) {
        self.inner.health_check_once().await
    }

    /// 解析一次域名并为新地址创建实例
    pub async fn resolve_once(&self, dsn: &Dsn) {
        self.inner.resolve_once(dsn).await
    }

    /// 为该 DSN 创建实例，已存在时不做处理，返回是否新建
    pub async fn create_instance_if_not_exists(&self, dsn: Dsn) -> bool {
        self.inner.create_instance_if_not_exists(dsn).await
    }

    /// 关闭并移除所有实例
    pub async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    /// 启动后台任务，只生效一次
    fn run(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let conf = &self.inner.conf;
        let mut tasks = self.inner.tasks.lock();

        let inner = self.inner.clone();
        let interval = conf.health_check_interval;
        tasks.push(tokio::spawn(async move {
            let token = inner.token.clone();
            start_cron_job(token, true, interval, "HealthCheck", || {
                let inner = inner.clone();
                async move { inner.health_check_once().await }
            })
            .await;
        }));

        for dsn in self.inner.host_dsns.iter().cloned() {
            let inner = self.inner.clone();
            let interval = conf.host_resolve_interval;
            tasks.push(tokio::spawn(async move {
                let token = inner.token.clone();
                let name = format!("Resolve: {}", dsn.host);
                start_cron_job(token, true, interval, &name, || {
                    let inner = inner.clone();
                    let dsn = dsn.clone();
                    async move { inner.resolve_once(&dsn).await }
                })
                .await;
            }));
        }

        let inner = self.inner.clone();
        let interval = conf.db_status_log_interval;
        tasks.push(tokio::spawn(async move {
            let token = inner.token.clone();
            start_cron_job(token, true, interval, "DBStatusLog", || {
                let inner = inner.clone();
                async move {
                    dbr_info!("{}", inner.status_summary());
                }
            })
            .await;
        }));
    }
}

impl ManagerInner {
    fn role(&self) -> &str {
        &self.conf.role
    }

    fn all_instances(&self) -> Vec<Arc<Instance>> {
        let mut list: Vec<_> = self.store.iter().map(|e| e.value().clone()).collect();
        list.sort_by(|a, b| a.addr().cmp(b.addr()));
        list
    }

    fn healthy_instances(&self) -> Vec<Arc<Instance>> {
        let mut list: Vec<_> = self
            .store
            .iter()
            .filter(|e| e.value().healthy())
            .map(|e| e.value().clone())
            .collect();
        list.sort_by(|a, b| a.addr().cmp(b.addr()));
        list
    }

    fn status_summary(&self) -> String {
        let details: Vec<String> = self.all_instances().iter().map(|inst| inst.summary()).collect();
        format!(
            "[SUMMARY] cached instances, len={}\tdetails=[{}]\trole={}",
            details.len(),
            details.join(" "),
            self.role()
        )
    }

    /// 打开连接池并应用连接数限制
    async fn open_pool(&self, dsn: &Dsn) -> Result<Arc<dyn ConnPool>> {
        let open = self.ctx.connector.open(dsn);
        let pool = tokio::time::timeout(self.conf.health_check_timeout, open).await??;
        match pool.limits() {
            Some(limits) => {
                limits.set_max_open_conns(self.conf.max_open_conns);
                limits.set_max_idle_conns(self.conf.max_idle_conns);
                limits.set_conn_max_lifetime(self.conf.conn_max_lifetime);
                limits.set_conn_max_idle_time(self.conf.conn_max_idle_time);
            }
            None => dbr_warn!("连接池不支持连接数限制, addr={}\trole={}", dsn.addr(), self.role()),
        }
        Ok(pool)
    }

    async fn new_instance(&self, dsn: Dsn) -> Arc<Instance> {
        match self.open_pool(&dsn).await {
            Ok(pool) => {
                let inst = Arc::new(Instance::with_pool(dsn, self.role(), pool));
                self.ctx.registry.insert(inst.clone());
                dbr_info!(
                    "success to create instance, DSN={{{}}}\trole={}",
                    inst.dsn().describe(),
                    self.role()
                );
                inst
            }
            Err(e) => {
                dbr_error!(
                    "failed to create instance, err={}\tDSN={{{}}}\trole={}",
                    e,
                    dsn.describe(),
                    self.role()
                );
                Arc::new(Instance::new(dsn, self.role()))
            }
        }
    }

    async fn create_instance_if_not_exists(&self, dsn: Dsn) -> bool {
        let _guard = self.create_lock.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let addr = dsn.addr();
        if self.store.contains_key(&addr) {
            return false;
        }

        let inst = self.new_instance(dsn).await;
        if self.is_primary.load(Ordering::Acquire) {
            // 主库只保留最新的一个实例
            let _ = self.clear().await;
        }
        if let Some(previous) = self.store.insert(addr, inst) {
            self.close_instance(&previous).await;
        }
        true
    }

    /// 实例仍由本管理器持有且管理器未关闭
    fn owns(&self, inst: &Arc<Instance>) -> bool {
        !self.closed.load(Ordering::Acquire)
            && self
                .store
                .get(inst.addr())
                .map(|e| Arc::ptr_eq(e.value(), inst))
                .unwrap_or(false)
    }

    async fn close_instance(&self, inst: &Arc<Instance>) -> Option<DbResolverError> {
        self.ctx.registry.delete(inst);
        inst.close().await.err()
    }

    async fn clear(&self) -> Result<()> {
        let keys: Vec<Addr> = self.store.iter().map(|e| e.key().clone()).collect();
        let mut errors = Vec::new();
        for key in keys {
            if let Some((_, inst)) = self.store.remove(&key) {
                if let Some(e) = self.close_instance(&inst).await {
                    errors.push(e);
                }
            }
        }
        join_errors(errors)
    }

    async fn remove(&self, addr: &Addr) {
        if let Some((_, inst)) = self.store.remove(addr) {
            let _ = self.close_instance(&inst).await;
            dbr_info!(
                "success to remove instance, DSN={{{}}}\trole={}",
                inst.dsn().describe(),
                self.role()
            );
        }
    }

    async fn notify_peer(&self, addr: &Addr) {
        let peer = self.peer.read().as_ref().and_then(Weak::upgrade);
        if let Some(peer) = peer {
            peer.remove(addr).await;
        }
    }

    async fn resolve_once(&self, dsn: &Dsn) {
        let lookup = tokio::time::timeout(
            self.conf.host_resolve_timeout,
            self.ctx.host_resolver.resolve(&dsn.host),
        )
        .await;
        let ips = match lookup {
            Ok(Ok(ips)) => ips,
            Ok(Err(e)) => {
                dbr_error!(
                    "fail to resolve host, err={}\tDSN={{{}}}\trole={}",
                    e,
                    dsn.describe(),
                    self.role()
                );
                return;
            }
            Err(_) => {
                dbr_error!(
                    "fail to resolve host, err={}\tDSN={{{}}}\trole={}",
                    DbResolverError::Timeout,
                    dsn.describe(),
                    self.role()
                );
                return;
            }
        };
        dbr_debug!("found ips, ips={:?}\tDSN={{{}}}\trole={}", ips, dsn.describe(), self.role());

        for ip in ipv4_only(&ips) {
            let mut resolved = dsn.clone();
            resolved.ipv4 = Some(ip.to_string());
            let addr = resolved.addr();
            if self.create_instance_if_not_exists(resolved).await {
                self.notify_peer(&addr).await;
            }
        }
    }

    async fn health_check(&self, inst: &Arc<Instance>) {
        if inst.conn_pool().is_none() {
            // 启动时连接失败的实例在这里重连
            match self.open_pool(inst.dsn()).await {
                Ok(pool) => {
                    if !self.owns(inst) {
                        // 重连期间实例已被移除
                        let _ = pool.close().await;
                        return;
                    }
                    inst.swap_pool(pool);
                    self.ctx.registry.insert(inst.clone());
                    if !self.owns(inst) {
                        let _ = self.close_instance(inst).await;
                        return;
                    }
                }
                Err(_) => {
                    inst.increase_retry();
                    return;
                }
            }
        }

        match probe(inst, self.conf.health_check_timeout).await {
            ProbeOutcome::Healthy => {
                dbr_debug!(
                    "instance health check success, DSN={{{}}}\trole={}",
                    inst.dsn().describe(),
                    self.role()
                );
            }
            ProbeOutcome::Failed(e) => {
                dbr_warn!(
                    "instance health check failed, err={}\tDSN={{{}}}\trole={}",
                    e,
                    inst.dsn().describe(),
                    self.role()
                );
            }
        }
    }

    async fn health_check_once(&self) {
        let instances = self.all_instances();
        join_all(instances.iter().map(|inst| self.health_check(inst))).await;

        for addr in select_evictions(&instances, self.conf.max_health_check_retry) {
            self.remove(&addr).await;
        }
    }
}

#[async_trait]
impl ServerManager for ServerManagerImpl {
    async fn run_and_wait(&self) -> Result<()> {
        self.run();
        let wait = async {
            loop {
                tokio::time::sleep(STARTUP_POLL_INTERVAL).await;
                if !self.inner.healthy_instances().is_empty() {
                    return;
                }
            }
        };
        tokio::time::timeout(self.inner.conf.startup_timeout, wait)
            .await
            .map_err(|_| DbResolverError::StartupTimeout(format!("role={}", self.inner.role())))
    }

    fn set_primary(&self, primary: bool) {
        self.inner.is_primary.store(primary, Ordering::Release);
    }

    fn set_peer_manager(&self, peer: Weak<dyn ServerManager>) {
        *self.inner.peer.write() = Some(peer);
    }

    async fn notify_peer(&self, addr: &Addr) {
        self.inner.notify_peer(addr).await
    }

    async fn remove(&self, addr: &Addr) {
        self.inner.remove(addr).await
    }

    fn get_instances(&self) -> Vec<Arc<Instance>> {
        self.inner.healthy_instances()
    }

    fn instance_count(&self) -> usize {
        self.inner.store.len()
    }

    fn status_summary(&self) -> String {
        self.inner.status_summary()
    }

    fn role(&self) -> &str {
        self.inner.role()
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // 先停止后台任务，避免关闭期间创建新连接
        self.inner.token.cancel();
        let tasks: Vec<_> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }
        let _guard = self.inner.create_lock.lock().await;
        self.inner.clear().await
    }
}
