//! 路由器注册表，用于进程退出前统一关闭所有连接

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::DbRouter;
use crate::error::join_errors;
use crate::Result;

static GLOBAL_ROUTERS: Lazy<Arc<RouterRegistry>> = Lazy::new(|| Arc::new(RouterRegistry::new()));

/// 已注册的路由器列表
#[derive(Debug, Default)]
pub struct RouterRegistry {
    routers: Mutex<Vec<Arc<DbRouter>>>,
}

impl RouterRegistry {
    /// 创建独立的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级默认注册表
    pub fn global() -> Arc<RouterRegistry> {
        GLOBAL_ROUTERS.clone()
    }

    /// 登记路由器
    pub fn register(&self, router: Arc<DbRouter>) {
        self.routers.lock().push(router);
    }

    /// 已登记的路由器数量
    pub fn len(&self) -> usize {
        self.routers.lock().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.routers.lock().is_empty()
    }

    /// 按登记顺序关闭所有路由器并清空注册表，汇总所有错误
    pub async fn close_all(&self) -> Result<()> {
        let routers: Vec<_> = self.routers.lock().drain(..).collect();
        let mut errors = Vec::new();
        for router in routers {
            if let Err(e) = router.close().await {
                errors.push(e);
            }
        }
        join_errors(errors)
    }
}

/// 关闭进程级注册表中的所有路由器
pub async fn close() -> Result<()> {
    RouterRegistry::global().close_all().await
}
