//! 读写分离路由器
//!
//! [`DbRouter`] 持有多个 [`Resolver`]：绑定了表名或名称的解析器只处理对应的语句，
//! 没有绑定的解析器作为全局解析器（最多一个）。路由器实现 [`StatementInterceptor`]，
//! 在语句执行前按读写类型替换连接池。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::join_errors;
use crate::manager::{
    EmptyServerManager, HostResolver, InstanceRegistry, ManagerContext, ServerManager,
    ServerManagerImpl,
};
use crate::pool::Connector;
use crate::resolver::Resolver;
use crate::types::{DataSourceType, Operation, StatementKind};
use crate::utils::get_table_from_raw_sql;
use crate::{dbr_error, dbr_info};
use crate::{DbResolverError, Result};

pub mod interceptor;
pub mod registry;
pub mod statement;

pub use interceptor::{classify, StatementInterceptor};
pub use registry::{close, RouterRegistry};
pub use statement::Statement;

/// 拦截器名称
pub const ROUTER_NAME: &str = "db_resolver";

#[derive(Default)]
struct RouterState {
    configs: Vec<Config>,
    resolvers_map: HashMap<String, Arc<Resolver>>,
    resolvers_list: Vec<Arc<Resolver>>,
    global: Option<Arc<Resolver>>,
}

/// 读写分离路由器
pub struct DbRouter {
    ctx: ManagerContext,
    state: RwLock<RouterState>,
    // 注册过程包含等待实例就绪，串行执行
    register_lock: tokio::sync::Mutex<()>,
}

impl fmt::Debug for DbRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("DbRouter")
            .field("resolvers", &state.resolvers_list.len())
            .field("bindings", &state.resolvers_map.keys().collect::<Vec<_>>())
            .field("global", &state.global.is_some())
            .finish()
    }
}

impl DbRouter {
    /// 创建路由器构建器
    pub fn builder() -> DbRouterBuilder {
        DbRouterBuilder::new()
    }

    fn new(ctx: ManagerContext) -> Self {
        Self {
            ctx,
            state: RwLock::new(RouterState::default()),
            register_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 注册一份配置：校验、创建管理器并等待实例就绪
    ///
    /// 没有绑定的配置作为全局解析器，重复注册全局解析器返回
    /// [`DbResolverError::ConflictedGlobalResolver`]
    pub async fn register(&self, config: Config) -> Result<()> {
        if let Err(e) = config.validate() {
            dbr_error!("config err: {}, role={}", e, config.role);
            return Err(e.into());
        }

        let _guard = self.register_lock.lock().await;
        if config.is_global() && self.state.read().global.is_some() {
            return Err(DbResolverError::ConflictedGlobalResolver);
        }

        let resolver = self.compile(&config).await?;

        let mut state = self.state.write();
        if config.is_global() {
            state.global = Some(resolver.clone());
        } else {
            for name in &config.bindings {
                state.resolvers_map.insert(name.clone(), resolver.clone());
            }
        }
        state.resolvers_list.push(resolver);
        state.configs.push(config);
        Ok(())
    }

    async fn compile(&self, config: &Config) -> Result<Arc<Resolver>> {
        let primary: Arc<dyn ServerManager> = if config.sources.is_empty() {
            Arc::new(EmptyServerManager)
        } else {
            let manager = ServerManagerImpl::new(
                config.clone(),
                config.sources.clone(),
                DataSourceType::Source,
                self.ctx.clone(),
            )
            .await;
            manager.set_primary(true);
            Arc::new(manager)
        };

        let replicas: Arc<dyn ServerManager> = if config.replicas.is_empty() {
            primary.clone()
        } else {
            let manager: Arc<dyn ServerManager> = Arc::new(
                ServerManagerImpl::new(
                    config.clone(),
                    config.replicas.clone(),
                    DataSourceType::Replica,
                    self.ctx.clone(),
                )
                .await,
            );
            manager.set_peer_manager(Arc::downgrade(&primary));
            primary.set_peer_manager(Arc::downgrade(&manager));
            manager
        };

        let resolver = Arc::new(Resolver::new(
            config.policy.build(),
            primary,
            replicas,
            config.trace_resolver_mode,
            config.role.clone(),
        ));

        let ready = match resolver.primary_manager().run_and_wait().await {
            Ok(()) => resolver.replicas_manager().run_and_wait().await,
            Err(e) => Err(e),
        };
        if let Err(e) = ready {
            dbr_error!("{}", e);
            let _ = resolver.close().await;
            return Err(e);
        }
        dbr_info!(
            "resolver ready, role={}\tpolicy={:?}\tbindings={:?}",
            config.role,
            config.policy,
            config.bindings
        );
        Ok(resolver)
    }

    /// 拦截器名称
    pub fn name(&self) -> &str {
        ROUTER_NAME
    }

    /// 已注册的配置
    pub fn configs(&self) -> Vec<Config> {
        self.state.read().configs.clone()
    }

    /// 按注册顺序排列的解析器
    pub fn resolvers(&self) -> Vec<Arc<Resolver>> {
        self.state.read().resolvers_list.clone()
    }

    /// 查找处理该语句的解析器
    ///
    /// 依次匹配显式指定的名称、表名、模型表名、原始 SQL 中的表名，都没有时使用全局解析器
    pub fn get_resolver(&self, stmt: &Statement) -> Option<Arc<Resolver>> {
        let state = self.state.read();
        if !state.resolvers_map.is_empty() {
            let raw_table = get_table_from_raw_sql(&stmt.sql);
            let candidates = [
                stmt.hint.as_deref(),
                Some(stmt.table.as_str()),
                Some(stmt.schema_table.as_str()),
                raw_table,
            ];
            for name in candidates.into_iter().flatten() {
                if name.is_empty() {
                    continue;
                }
                if let Some(resolver) = state.resolvers_map.get(name) {
                    return Some(resolver.clone());
                }
            }
        }
        state.global.clone()
    }

    /// 为语句选择连接池；没有匹配的解析器时保持原连接池
    pub fn resolve(&self, stmt: &mut Statement, op: Operation) {
        if let Some(resolver) = self.get_resolver(stmt) {
            stmt.conn_pool = resolver.resolve(stmt, op);
            if let Some(mode) = stmt.resolver_mode {
                tracing::trace!("[{}] {}", mode, stmt.sql);
            }
        }
    }

    /// 写语句：路由到主库
    pub fn switch_source(&self, stmt: &mut Statement) {
        if !stmt.in_transaction() {
            self.resolve(stmt, Operation::Write);
        }
    }

    /// 查询语句：有原始 SQL 时按原始 SQL 推断，否则默认路由到从库
    pub fn switch_replica(&self, stmt: &mut Statement) {
        if !stmt.in_transaction() {
            let op = classify(StatementKind::Query, stmt);
            self.resolve(stmt, op);
        }
    }

    /// 原始语句：按显式标记与 SQL 内容推断
    pub fn switch_guess(&self, stmt: &mut Statement) {
        if !stmt.in_transaction() {
            let op = classify(StatementKind::Raw, stmt);
            self.resolve(stmt, op);
        }
    }

    /// 关闭所有解析器的管理器
    pub async fn close(&self) -> Result<()> {
        let resolvers = self.resolvers();
        let mut errors = Vec::new();
        for resolver in resolvers {
            if let Err(e) = resolver.close().await {
                errors.push(e);
            }
        }
        join_errors(errors)
    }
}

impl StatementInterceptor for DbRouter {
    fn name(&self) -> &str {
        ROUTER_NAME
    }

    fn before_statement(&self, kind: StatementKind, stmt: &mut Statement) {
        match kind {
            StatementKind::Create | StatementKind::Update | StatementKind::Delete => {
                self.switch_source(stmt)
            }
            StatementKind::Query | StatementKind::Row => self.switch_replica(stmt),
            StatementKind::Raw => self.switch_guess(stmt),
        }
    }
}

/// 路由器构建器
///
/// 连接器必须提供；域名解析器默认使用系统解析器，注册表默认使用进程级注册表
#[derive(Debug, Default)]
pub struct DbRouterBuilder {
    connector: Option<Arc<dyn Connector>>,
    host_resolver: Option<Arc<dyn HostResolver>>,
    instance_registry: Option<Arc<InstanceRegistry>>,
    router_registry: Option<Arc<RouterRegistry>>,
    configs: Vec<Config>,
}

impl DbRouterBuilder {
    /// 创建构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置连接器
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// 设置域名解析器
    pub fn host_resolver(mut self, host_resolver: Arc<dyn HostResolver>) -> Self {
        self.host_resolver = Some(host_resolver);
        self
    }

    /// 设置实例注册表
    pub fn instance_registry(mut self, registry: Arc<InstanceRegistry>) -> Self {
        self.instance_registry = Some(registry);
        self
    }

    /// 设置路由器注册表
    pub fn router_registry(mut self, registry: Arc<RouterRegistry>) -> Self {
        self.router_registry = Some(registry);
        self
    }

    /// 添加一份配置
    pub fn config(mut self, config: Config) -> Self {
        self.configs.push(config);
        self
    }

    /// 校验所有配置后依次注册，并把路由器登记到注册表
    pub async fn build(self) -> Result<Arc<DbRouter>> {
        let connector = self
            .connector
            .ok_or_else(|| DbResolverError::InvalidConfig("connector is required".to_string()))?;
        for config in &self.configs {
            if let Err(e) = config.validate() {
                dbr_error!("config err: {}, role={}", e, config.role);
                return Err(e.into());
            }
        }

        let mut ctx = ManagerContext::new(connector);
        if let Some(host_resolver) = self.host_resolver {
            ctx = ctx.with_host_resolver(host_resolver);
        }
        if let Some(registry) = self.instance_registry {
            ctx = ctx.with_registry(registry);
        }

        let router = Arc::new(DbRouter::new(ctx));
        for config in self.configs {
            if let Err(e) = router.register(config).await {
                let _ = router.close().await;
                return Err(e);
            }
        }

        self.router_registry
            .unwrap_or_else(RouterRegistry::global)
            .register(router.clone());
        Ok(router)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigBuilder, ConfigError};
    use crate::dsn::Dsn;
    use crate::pool::ConnPool;
    use crate::testing::{MockConnector, MockHostResolver, MockPool};
    use std::time::Duration;

    fn config(source: &str, replica: Option<&str>, bindings: &[&str]) -> Config {
        let mut builder = ConfigBuilder::new()
            .source(Dsn::new(source, 3306))
            .host_resolve_interval(Duration::from_secs(10))
            .health_check_interval(Duration::from_secs(5))
            .health_check_timeout(Duration::from_secs(1))
            .db_status_log_interval(Duration::from_secs(60))
            .startup_timeout(Duration::from_secs(2));
        if let Some(replica) = replica {
            builder = builder.replica(Dsn::new(replica, 3306));
        }
        for name in bindings {
            builder = builder.bind(*name);
        }
        builder.build().unwrap()
    }

    async fn router(connector: Arc<MockConnector>, configs: Vec<Config>) -> Result<Arc<DbRouter>> {
        let mut builder = DbRouter::builder()
            .connector(connector)
            .host_resolver(MockHostResolver::new())
            .instance_registry(Arc::new(InstanceRegistry::new()))
            .router_registry(Arc::new(RouterRegistry::new()));
        for config in configs {
            builder = builder.config(config);
        }
        builder.build().await
    }

    async fn served_by(stmt: &Statement) -> String {
        let rows = stmt.conn_pool.query(&stmt.sql, &[]).await.unwrap();
        rows[0][0].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_lookup_order() {
        let connector = MockConnector::new();
        let router = router(
            connector,
            vec![
                config("10.0.0.1", None, &[]),
                config("10.0.1.1", None, &["orders"]),
                config("10.0.2.1", None, &["users", "audit"]),
            ],
        )
        .await
        .unwrap();

        let mut stmt = Statement::default().table("orders").sql("SELECT * FROM users");
        router.switch_source(&mut stmt);
        assert_eq!(served_by(&stmt).await, "10.0.1.1:3306");

        let mut stmt = Statement::default().table("orders").using("audit");
        router.switch_source(&mut stmt);
        assert_eq!(served_by(&stmt).await, "10.0.2.1:3306");

        let mut stmt = Statement::default().schema_table("users");
        router.switch_source(&mut stmt);
        assert_eq!(served_by(&stmt).await, "10.0.2.1:3306");

        let mut stmt = Statement::default().sql("UPDATE `users` SET age = 1");
        router.switch_guess(&mut stmt);
        assert_eq!(served_by(&stmt).await, "10.0.2.1:3306");

        let mut stmt = Statement::default().table("payments");
        router.switch_source(&mut stmt);
        assert_eq!(served_by(&stmt).await, "10.0.0.1:3306");
    }

    #[tokio::test]
    async fn test_before_statement_splits_reads() {
        let connector = MockConnector::new();
        let router = router(connector, vec![config("10.0.0.1", Some("10.0.0.2"), &[])])
            .await
            .unwrap();

        let mut stmt = Statement::default().table("users");
        router.before_statement(StatementKind::Query, &mut stmt);
        assert_eq!(served_by(&stmt).await, "10.0.0.2:3306");

        let mut stmt = Statement::default().table("users");
        router.before_statement(StatementKind::Update, &mut stmt);
        assert_eq!(served_by(&stmt).await, "10.0.0.1:3306");

        let mut stmt = Statement::default().sql("SELECT * FROM users WHERE id = 1 FOR UPDATE");
        router.before_statement(StatementKind::Raw, &mut stmt);
        assert_eq!(served_by(&stmt).await, "10.0.0.1:3306");
        assert_eq!(router.name(), "db_resolver");
    }

    #[tokio::test]
    async fn test_source_only_serves_reads() {
        let connector = MockConnector::new();
        let router = router(connector, vec![config("10.0.0.1", None, &[])]).await.unwrap();

        let mut stmt = Statement::default().table("users");
        router.before_statement(StatementKind::Row, &mut stmt);
        assert_eq!(served_by(&stmt).await, "10.0.0.1:3306");
    }

    #[tokio::test]
    async fn test_replica_only_writes_fail_closed() {
        let connector = MockConnector::new();
        let replica_only = ConfigBuilder::new()
            .replica(Dsn::new("10.0.0.2", 3306))
            .host_resolve_interval(Duration::from_secs(10))
            .health_check_interval(Duration::from_secs(5))
            .health_check_timeout(Duration::from_secs(1))
            .db_status_log_interval(Duration::from_secs(60))
            .startup_timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let router = router(connector.clone(), vec![replica_only]).await.unwrap();

        let mut stmt = Statement::default().table("users");
        router.before_statement(StatementKind::Update, &mut stmt);
        assert_eq!(stmt.resolver_mode, None);
        let err = stmt.conn_pool.execute("UPDATE users SET a = 1", &[]).await.unwrap_err();
        assert!(err.is_empty_conn_pool());

        let mut stmt = Statement::default().table("users");
        router.before_statement(StatementKind::Query, &mut stmt);
        assert_eq!(served_by(&stmt).await, "10.0.0.2:3306");
        assert_eq!(connector.open_count("10.0.0.1:3306"), 0);
    }

    #[tokio::test]
    async fn test_no_matching_resolver_keeps_pool() {
        let connector = MockConnector::new();
        let router = router(connector, vec![config("10.0.0.1", None, &["orders"])])
            .await
            .unwrap();

        let original: Arc<dyn ConnPool> = MockPool::new("default");
        let mut stmt = Statement::new(original.clone()).table("users");
        router.before_statement(StatementKind::Query, &mut stmt);
        assert!(Arc::ptr_eq(&stmt.conn_pool, &original));
    }

    #[tokio::test]
    async fn test_conflicted_global_resolver() {
        let connector = MockConnector::new();
        let err = router(
            connector,
            vec![config("10.0.0.1", None, &[]), config("10.0.1.1", None, &[])],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DbResolverError::ConflictedGlobalResolver));
        assert_eq!(err.to_string(), "conflicted global resolver");
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_start() {
        let connector = MockConnector::new();
        let mut bad = config("10.0.0.1", None, &[]);
        bad.replicas.push(Dsn::new("10.0.0.1", 3306));
        let err = router(connector.clone(), vec![bad]).await.unwrap_err();
        assert!(matches!(
            err,
            DbResolverError::Config(ConfigError::SourceEqualsReplica)
        ));
        assert_eq!(connector.open_count("10.0.0.1:3306"), 0);
    }

    #[tokio::test]
    async fn test_register_after_build() {
        let connector = MockConnector::new();
        let router = router(connector, vec![]).await.unwrap();
        assert!(router.get_resolver(&Statement::default()).is_none());

        router.register(config("10.0.0.1", None, &["orders"])).await.unwrap();
        let stmt = Statement::default().table("orders");
        assert!(router.get_resolver(&stmt).is_some());
        assert_eq!(router.resolvers().len(), 1);
        assert_eq!(router.configs().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_connector() {
        let err = DbRouter::builder().build().await.unwrap_err();
        assert!(matches!(err, DbResolverError::InvalidConfig(_)));
    }
}
