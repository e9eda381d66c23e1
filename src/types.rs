//! 核心类型定义

use std::fmt;

use serde::{Deserialize, Serialize};

/// 语句的读写意图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// 写操作，路由到主库
    Write,
    /// 读操作，路由到从库
    Read,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Write => write!(f, "write"),
            Operation::Read => write!(f, "read"),
        }
    }
}

/// 数据源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceType {
    /// 主库
    #[default]
    Source,
    /// 从库
    Replica,
}

impl fmt::Display for DataSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceType::Source => write!(f, "source"),
            DataSourceType::Replica => write!(f, "replica"),
        }
    }
}

/// 语句最终选择的节点模式，开启追踪时写入语句
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverMode {
    /// 走主库
    Source,
    /// 走从库
    Replica,
}

impl fmt::Display for ResolverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverMode::Source => write!(f, "source"),
            ResolverMode::Replica => write!(f, "replica"),
        }
    }
}

/// 查询引擎生命周期钩子对应的语句类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// 插入
    Create,
    /// 结构化查询
    Query,
    /// 更新
    Update,
    /// 删除
    Delete,
    /// 单行/游标查询
    Row,
    /// 原生SQL
    Raw,
}

impl StatementKind {
    /// 全部语句类别，按钩子注册顺序排列
    pub const ALL: [StatementKind; 6] = [
        StatementKind::Create,
        StatementKind::Query,
        StatementKind::Update,
        StatementKind::Delete,
        StatementKind::Row,
        StatementKind::Raw,
    ];
}

/// 数据库实例标识，格式为 `ipv4:port`，例如 `127.0.0.1:3306`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Addr(String);

impl Addr {
    /// 由主机与端口构造地址
    pub fn new(host: &str, port: u16) -> Self {
        Self(format!("{}:{}", host, port))
    }

    /// 字符串形式
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Addr {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
