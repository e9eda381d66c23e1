//! 后端实例管理
//!
//! 每个解析器持有一个主库管理器和一个从库管理器。管理器负责：
//! - 为配置中的每个地址维护一个 [`Instance`]
//! - 定期重新解析域名，发现新的 IPv4 地址时创建实例
//! - 定期健康检查，移除持续失败的动态实例
//! - 定期输出实例状态日志

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::pool::Connector;
use crate::types::Addr;
use crate::Result;

pub mod dns;
pub mod health;
pub mod instance;
pub mod server;

pub use dns::{HostResolver, SystemHostResolver};
pub use health::{ProbeOutcome, SELECT_VERSION_COMMENT};
pub use instance::{Instance, InstanceRegistry, PoolSnapshot};
pub use server::ServerManagerImpl;

/// 管理器依赖的外部能力
#[derive(Debug, Clone)]
pub struct ManagerContext {
    /// 打开连接池
    pub connector: Arc<dyn Connector>,
    /// 解析主机名
    pub host_resolver: Arc<dyn HostResolver>,
    /// 实例注册表
    pub registry: Arc<InstanceRegistry>,
}

impl ManagerContext {
    /// 使用系统解析器与全局注册表创建上下文
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            host_resolver: Arc::new(SystemHostResolver),
            registry: InstanceRegistry::global(),
        }
    }

    /// 替换主机名解析器
    pub fn with_host_resolver(mut self, host_resolver: Arc<dyn HostResolver>) -> Self {
        self.host_resolver = host_resolver;
        self
    }

    /// 替换实例注册表
    pub fn with_registry(mut self, registry: Arc<InstanceRegistry>) -> Self {
        self.registry = registry;
        self
    }
}

/// 一组同角色后端实例的管理器
#[async_trait]
pub trait ServerManager: Send + Sync + Debug {
    /// 启动后台任务并等待至少一个健康实例，超时返回 [`crate::DbResolverError::StartupTimeout`]
    ///
    /// 重复调用不会重复启动后台任务
    async fn run_and_wait(&self) -> Result<()>;

    /// 标记为主库管理器；主库管理器最多保留一个实例
    fn set_primary(&self, primary: bool);

    /// 设置对端管理器
    fn set_peer_manager(&self, peer: Weak<dyn ServerManager>);

    /// 通知对端移除该地址的实例
    async fn notify_peer(&self, addr: &Addr);

    /// 移除并关闭该地址的实例
    async fn remove(&self, addr: &Addr);

    /// 健康实例，按地址排序
    fn get_instances(&self) -> Vec<Arc<Instance>>;

    /// 所有缓存的实例数（包括不健康的）
    fn instance_count(&self) -> usize;

    /// 实例状态摘要
    fn status_summary(&self) -> String;

    /// 角色标签
    fn role(&self) -> &str;

    /// 停止后台任务并关闭所有实例，只生效一次
    async fn close(&self) -> Result<()>;
}

/// 没有配置任何地址时使用的管理器
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyServerManager;

#[async_trait]
impl ServerManager for EmptyServerManager {
    async fn run_and_wait(&self) -> Result<()> {
        Ok(())
    }

    fn set_primary(&self, _primary: bool) {}

    fn set_peer_manager(&self, _peer: Weak<dyn ServerManager>) {}

    async fn notify_peer(&self, _addr: &Addr) {}

    async fn remove(&self, _addr: &Addr) {}

    fn get_instances(&self) -> Vec<Arc<Instance>> {
        Vec::new()
    }

    fn instance_count(&self) -> usize {
        0
    }

    fn status_summary(&self) -> String {
        String::new()
    }

    fn role(&self) -> &str {
        ""
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_manager() {
        let manager = EmptyServerManager;
        manager.run_and_wait().await.unwrap();
        manager.remove(&Addr::from("10.0.0.1:3306")).await;
        assert!(manager.get_instances().is_empty());
        assert_eq!(manager.instance_count(), 0);
        manager.close().await.unwrap();
        manager.close().await.unwrap();
    }
}
