//! 解析器
//!
//! 一个 [`Resolver`] 对应一份配置：一个主库管理器、一个从库管理器和一个负载均衡策略。
//! 读操作在从库的健康实例中选择，写操作在主库的健康实例中选择；没有健康实例时返回空连接池。

use std::fmt;
use std::sync::Arc;

use crate::error::join_errors;
use crate::manager::{Instance, ServerManager};
use crate::pool::{ConnPool, EmptyConnPool, PreparedStmtPool};
use crate::router::Statement;
use crate::types::{Operation, ResolverMode};
use crate::Result;

pub mod policy;

pub use policy::{policy_from, Policy, PolicyKind, RandomPolicy, RoundRobinPolicy};

/// 单份配置的解析器
pub struct Resolver {
    policy: Arc<dyn Policy>,
    primary: Arc<dyn ServerManager>,
    replicas: Arc<dyn ServerManager>,
    trace_resolver_mode: bool,
    role: String,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("role", &self.role)
            .field("policy", &self.policy)
            .field("trace_resolver_mode", &self.trace_resolver_mode)
            .finish()
    }
}

impl Resolver {
    /// 创建解析器；没有从库时 `replicas` 与 `primary` 是同一个管理器
    pub fn new(
        policy: Arc<dyn Policy>,
        primary: Arc<dyn ServerManager>,
        replicas: Arc<dyn ServerManager>,
        trace_resolver_mode: bool,
        role: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            primary,
            replicas,
            trace_resolver_mode,
            role: role.into(),
        }
    }

    /// 角色标签
    pub fn role(&self) -> &str {
        &self.role
    }

    /// 主库管理器
    pub fn primary_manager(&self) -> &Arc<dyn ServerManager> {
        &self.primary
    }

    /// 从库管理器
    pub fn replicas_manager(&self) -> &Arc<dyn ServerManager> {
        &self.replicas
    }

    /// 主库的健康实例
    pub fn sources(&self) -> Vec<Arc<Instance>> {
        self.primary.get_instances()
    }

    /// 从库的健康实例
    pub fn replicas(&self) -> Vec<Arc<Instance>> {
        self.replicas.get_instances()
    }

    /// 为语句选择连接池
    ///
    /// 只有一个候选实例时直接使用，不经过策略；没有候选实例时返回 [`EmptyConnPool`]
    pub fn resolve(&self, stmt: &mut Statement, op: Operation) -> Arc<dyn ConnPool> {
        let (candidates, mode) = match op {
            Operation::Read => (self.replicas(), ResolverMode::Replica),
            Operation::Write => (self.sources(), ResolverMode::Source),
        };

        let inst = match candidates.len() {
            0 => None,
            1 => candidates.into_iter().next(),
            _ => self.policy.resolve(&candidates),
        };
        let Some(inst) = inst else {
            return Arc::new(EmptyConnPool);
        };
        if self.trace_resolver_mode {
            stmt.resolver_mode = Some(mode);
        }

        // 实例刚被关闭时拿不到快照，与没有候选实例同样处理
        let Some(snapshot) = inst.snapshot() else {
            return Arc::new(EmptyConnPool);
        };
        if stmt.prepare_stmt {
            let prepared = PreparedStmtPool::new(snapshot.pool.clone(), snapshot.prepared.clone());
            return Arc::new(prepared);
        }
        snapshot.pool.clone()
    }

    /// 关闭两个管理器
    pub async fn close(&self) -> Result<()> {
        let mut errors = Vec::new();
        if let Err(e) = self.primary.close().await {
            errors.push(e);
        }
        if !Arc::ptr_eq(&self.primary, &self.replicas) {
            if let Err(e) = self.replicas.close().await {
                errors.push(e);
            }
        }
        join_errors(errors)
    }
}
