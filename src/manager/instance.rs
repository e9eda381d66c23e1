//! 后端实例与进程级实例注册表

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::dsn::Dsn;
use crate::error::join_errors;
use crate::pool::{ConnPool, PreparedStmtCache};
use crate::types::Addr;
use crate::Result;

/// 实例当前使用的连接池快照
///
/// 快照不可变；重连时整体替换，读取方拿到的快照在替换后仍然有效
#[derive(Debug)]
pub struct PoolSnapshot {
    /// 连接池
    pub pool: Arc<dyn ConnPool>,
    /// 预编译语句缓存
    pub prepared: Arc<PreparedStmtCache>,
    /// 版本号，每次替换递增
    pub version: u64,
}

/// 一个已寻址的后端实例：连接池加健康状态
#[derive(Debug)]
pub struct Instance {
    dsn: Dsn,
    addr: Addr,
    role: String,
    is_static: bool,
    snapshot: ArcSwapOption<PoolSnapshot>,
    version: AtomicU64,
    healthy: AtomicBool,
    retry: AtomicU32,
}

impl Instance {
    /// 创建尚未连接的实例，初始为不健康
    ///
    /// 主机为IP字面量的实例视为静态实例，健康检查不会移除它
    pub fn new(dsn: Dsn, role: impl Into<String>) -> Self {
        let addr = dsn.addr();
        let is_static = dsn.is_ip_literal();
        Self {
            dsn,
            addr,
            role: role.into(),
            is_static,
            snapshot: ArcSwapOption::empty(),
            version: AtomicU64::new(0),
            healthy: AtomicBool::new(false),
            retry: AtomicU32::new(0),
        }
    }

    /// 创建已连接的实例，初始为健康
    pub fn with_pool(dsn: Dsn, role: impl Into<String>, pool: Arc<dyn ConnPool>) -> Self {
        let inst = Self::new(dsn, role);
        inst.swap_pool(pool);
        inst.set_healthy(true);
        inst
    }

    /// 数据源描述
    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }

    /// 实例标识
    pub fn addr(&self) -> &Addr {
        &self.addr
    }

    /// 角色标签
    pub fn role(&self) -> &str {
        &self.role
    }

    /// 是否来自IP字面量配置
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// 当前连接池快照
    pub fn snapshot(&self) -> Option<Arc<PoolSnapshot>> {
        self.snapshot.load_full()
    }

    /// 当前连接池
    pub fn conn_pool(&self) -> Option<Arc<dyn ConnPool>> {
        self.snapshot.load().as_ref().map(|s| s.pool.clone())
    }

    /// 替换连接池，同时换上新的语句缓存，返回被替换的旧快照
    pub fn swap_pool(&self, pool: Arc<dyn ConnPool>) -> Option<Arc<PoolSnapshot>> {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = PoolSnapshot {
            pool,
            prepared: Arc::new(PreparedStmtCache::new()),
            version,
        };
        self.snapshot.swap(Some(Arc::new(snapshot)))
    }

    /// 设置健康状态
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
    }

    /// 是否健康
    pub fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// 重试计数加一
    pub fn increase_retry(&self) {
        self.retry.fetch_add(1, Ordering::AcqRel);
    }

    /// 重置重试计数
    pub fn reset_retry(&self) {
        self.retry.store(0, Ordering::Release);
    }

    /// 当前重试计数
    pub fn retry(&self) -> u32 {
        self.retry.load(Ordering::Acquire)
    }

    /// 状态描述，用于状态日志
    pub fn summary(&self) -> String {
        format!(
            "{{DSN={{{}}}, healthy={}, retry={}}}",
            self.dsn.describe(),
            self.healthy(),
            self.retry()
        )
    }

    /// 关闭实例：关闭语句缓存与连接池
    ///
    /// 快照被取走后再次关闭是空操作
    pub async fn close(&self) -> Result<()> {
        let Some(snapshot) = self.snapshot.swap(None) else {
            return Ok(());
        };
        let mut errors = Vec::new();
        if let Err(e) = snapshot.prepared.close_all().await {
            errors.push(e);
        }
        if let Err(e) = snapshot.pool.close().await {
            tracing::warn!("close db conn err: {}, addr={}", e, self.addr);
            errors.push(e);
        }
        join_errors(errors)
    }
}

static GLOBAL_INSTANCES: Lazy<Arc<InstanceRegistry>> =
    Lazy::new(|| Arc::new(InstanceRegistry::new()));

/// 实例注册表，按地址索引所有存活的实例，供指标与状态查询使用
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: DashMap<Addr, Arc<Instance>>,
}

impl InstanceRegistry {
    /// 创建独立的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级默认注册表
    pub fn global() -> Arc<InstanceRegistry> {
        GLOBAL_INSTANCES.clone()
    }

    /// 登记实例
    pub fn insert(&self, inst: Arc<Instance>) {
        self.instances.insert(inst.addr().clone(), inst);
    }

    /// 注销实例；同地址已被新实例替换时不做处理
    pub fn delete(&self, inst: &Arc<Instance>) {
        self.instances
            .remove_if(inst.addr(), |_, current| Arc::ptr_eq(current, inst));
    }

    /// 按地址查找
    pub fn get(&self, addr: &Addr) -> Option<Arc<Instance>> {
        self.instances.get(addr).map(|entry| entry.value().clone())
    }

    /// 所有实例，按地址排序
    pub fn list(&self) -> Vec<Arc<Instance>> {
        let mut list: Vec<_> = self.instances.iter().map(|e| e.value().clone()).collect();
        list.sort_by(|a, b| a.addr().cmp(b.addr()));
        list
    }

    /// 实例数量
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
