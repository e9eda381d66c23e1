//! RatDbResolver - 数据库读写分离解析器
//!
//! 在查询引擎执行语句前判断语句的读写类型，把写语句路由到主库、读语句路由到从库；
//! 后台定期重新解析数据库域名、检查实例健康状态，并在多个健康实例之间负载均衡。

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod logger;

pub mod config;
pub mod dsn;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod pool;
pub mod resolver;
pub mod router;
pub mod types;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{Config, ConfigBuilder, ConfigError};
pub use dsn::Dsn;
pub use error::{DbResolverError, Result};
pub use manager::{
    EmptyServerManager, HostResolver, Instance, InstanceRegistry, ServerManager, ServerManagerImpl,
    SystemHostResolver,
};
pub use metrics::PoolMetrics;
pub use pool::{ConnPool, Connector, EmptyConnPool, PoolLimits, PoolStats, PreparedStatement};
pub use resolver::{policy_from, Policy, PolicyKind, Resolver};
pub use router::{close, DbRouter, DbRouterBuilder, RouterRegistry, Statement, StatementInterceptor};
pub use types::*;
pub use logger::{enable_debug, init_resolver_logger, init_resolver_logger_silent};

// 重新导出 tracing 基础日志宏到crate根部，供解析器日志宏使用
pub use tracing::{debug, error, info, trace, warn};

/// 便捷宏：快速构建路由器
#[macro_export]
macro_rules! db_router {
    ($connector:expr, [$($config:expr),* $(,)?]) => {
        {
            let builder = $crate::DbRouter::builder().connector($connector);
            $(
                let builder = builder.config($config);
            )*
            builder.build()
        }
    };
}
