//! 负载均衡策略
//!
//! 本模块定义了在同一角色的多个健康实例之间选择一个实例的策略

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::manager::Instance;

/// 负载均衡策略
///
/// 每次调用都传入最新的健康实例列表，列表为空时返回 `None`
pub trait Policy: Send + Sync + fmt::Debug {
    /// 从实例列表中选出一个实例
    fn resolve(&self, instances: &[Arc<Instance>]) -> Option<Arc<Instance>>;
}

/// 策略类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicyKind {
    /// 随机选择
    #[default]
    Random,
    /// 轮询选择
    RoundRobin,
}

impl PolicyKind {
    /// 获取策略描述
    pub fn description(&self) -> &'static str {
        match self {
            Self::Random => "均匀随机选择，适合实例数量经常变化的场景",
            Self::RoundRobin => "轮流使用不同实例，实例集合稳定时分布严格均匀",
        }
    }

    /// 创建策略实例
    pub fn build(&self) -> Arc<dyn Policy> {
        match self {
            Self::Random => Arc::new(RandomPolicy),
            Self::RoundRobin => Arc::new(RoundRobinPolicy::new()),
        }
    }
}

/// 按名称创建策略，未知名称使用轮询
pub fn policy_from(name: &str) -> Arc<dyn Policy> {
    match name {
        "random" => PolicyKind::Random.build(),
        _ => PolicyKind::RoundRobin.build(),
    }
}

/// 随机策略
#[derive(Debug, Default)]
pub struct RandomPolicy;

impl Policy for RandomPolicy {
    fn resolve(&self, instances: &[Arc<Instance>]) -> Option<Arc<Instance>> {
        if instances.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..instances.len());
        instances.get(index).cloned()
    }
}

/// 轮询策略
///
/// 计数器单调递增，对当前列表长度取模；实例数量在两次调用间变化时只保证尽力均匀
#[derive(Debug, Default)]
pub struct RoundRobinPolicy {
    next: AtomicUsize,
}

impl RoundRobinPolicy {
    /// 创建新的轮询策略
    pub fn new() -> Self {
        Self::default()
    }
}

impl Policy for RoundRobinPolicy {
    fn resolve(&self, instances: &[Arc<Instance>]) -> Option<Arc<Instance>> {
        if instances.is_empty() {
            return None;
        }
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        instances.get(n % instances.len()).cloned()
    }
}
