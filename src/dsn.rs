//! 数据源描述（DSN）
//!
//! 描述一个后端实例的连接参数；主机名形式的 DSN 需要先解析出 IPv4 才有稳定的实例标识

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Addr, DataSourceType};
use crate::utils::{is_ip_literal, normalize_host};

/// 默认端口
pub const DEFAULT_PORT: u16 = 3306;

/// 连接参数缺省时使用的默认值
pub const DEFAULT_CONN_PARAMS: &str = "charset=utf8mb4&parseTime=True&loc=Local";

/// 连接参数未指定 `timeout` 时追加的默认连接超时
pub const DSN_DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// 数据源描述
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dsn {
    /// 服务器地址（IP 或域名）
    pub host: String,
    /// 端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 连接参数，形如 `charset=utf8&parseTime=True`
    #[serde(default)]
    pub params: String,
    /// 数据库名
    #[serde(default)]
    pub dbname: String,
    /// 用户名
    #[serde(default)]
    pub username: String,
    /// 密码
    #[serde(default)]
    pub password: String,
    /// 数据源类型，由所属管理器设置
    #[serde(default, skip_serializing)]
    pub ds_type: DataSourceType,
    /// 解析后的 IPv4 地址
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
}

impl Dsn {
    /// 创建新的数据源描述
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            params: String::new(),
            dbname: String::new(),
            username: String::new(),
            password: String::new(),
            ds_type: DataSourceType::Source,
            ipv4: None,
        }
    }

    /// 设置数据库名
    pub fn with_dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = dbname.into();
        self
    }

    /// 设置用户名和密码
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// 设置连接参数
    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = params.into();
        self
    }

    /// 实例标识 `ipv4:port`；未解析时 IPv4 部分为空
    pub fn addr(&self) -> Addr {
        Addr::new(self.ipv4.as_deref().unwrap_or_default(), self.port)
    }

    /// 主机是否为IP字面量
    pub fn is_ip_literal(&self) -> bool {
        is_ip_literal(&self.host)
    }

    /// 连接参数，未配置时返回默认值
    pub fn conn_params(&self) -> &str {
        if self.params.is_empty() {
            DEFAULT_CONN_PARAMS
        } else {
            &self.params
        }
    }

    /// 生成连接串 `user:pass@tcp(host:port)/db?params`
    ///
    /// 已解析时使用 IPv4 作为主机；参数中没有 `timeout` 时追加默认连接超时
    pub fn conn_string(&self) -> String {
        let host = self.ipv4.as_deref().unwrap_or(&self.host);
        let mut params = self.conn_params().to_string();
        let has_timeout = params
            .split('&')
            .any(|pair| pair.split('=').next() == Some("timeout"));
        if !has_timeout {
            if !params.is_empty() {
                params.push('&');
            }
            params.push_str(&format!("timeout={}s", DSN_DEFAULT_TIMEOUT.as_secs()));
        }
        format!(
            "{}:{}@tcp({}:{})/{}?{}",
            self.username, self.password, host, self.port, self.dbname, params
        )
    }

    /// 判断两个 DSN 是否指向同一地址
    ///
    /// 端口相同且归一化后的主机相同（`localhost`、`127.1` 视为 `127.0.0.1`）
    pub fn equal_addr_to(&self, other: &Dsn) -> bool {
        self.port == other.port && normalize_host(&self.host) == normalize_host(&other.host)
    }

    /// 用于日志的描述信息，不包含密码
    pub fn describe(&self) -> String {
        [
            format!("DataSourceType={}", self.ds_type),
            format!("Host={}", self.host),
            format!("IPv4={}", self.ipv4.as_deref().unwrap_or_default()),
            format!("Port={}", self.port),
            format!("Database={}", self.dbname),
            format!("User={}", self.username),
        ]
        .join("\t")
    }
}

impl fmt::Debug for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dsn")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("params", &self.params)
            .field("dbname", &self.dbname)
            .field("username", &self.username)
            .field("password", &"******")
            .field("ds_type", &self.ds_type)
            .field("ipv4", &self.ipv4)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dsn(host: &str, port: u16) -> Dsn {
        Dsn::new(host, port)
            .with_dbname("mydb")
            .with_credentials("user", "pswd")
    }

    #[test]
    fn test_conn_string_default_timeout() {
        let s = dsn("localhost", 3306).conn_string();
        assert!(s.contains("timeout=3s"), "{}", s);
        assert!(s.starts_with("user:pswd@tcp(localhost:3306)/mydb?charset=utf8mb4"));
    }

    #[test]
    fn test_conn_string_custom_timeout() {
        let s = dsn("localhost", 3306)
            .with_params("charset=utf8&timeout=10s")
            .conn_string();
        assert!(s.contains("timeout=10s"));
        assert!(!s.contains("timeout=3s"));
    }

    #[test]
    fn test_conn_string_prefers_ipv4() {
        let mut d = dsn("db.internal", 3307);
        d.ipv4 = Some("10.0.0.5".to_string());
        assert!(d.conn_string().contains("@tcp(10.0.0.5:3307)/"));
        assert_eq!(d.addr().as_str(), "10.0.0.5:3307");
    }

    #[test]
    fn test_equal_addr_to() {
        assert!(dsn("localhost", 3306).equal_addr_to(&dsn("127.0.0.1", 3306)));
        assert!(dsn("127.1", 3306).equal_addr_to(&dsn("localhost", 3306)));
        assert!(!dsn("127.0.0.1", 3306).equal_addr_to(&dsn("127.0.0.1", 3307)));
        assert!(!dsn("10.0.0.1", 3306).equal_addr_to(&dsn("10.0.0.2", 3306)));
    }

    #[test]
    fn test_debug_hides_password() {
        let d = dsn("localhost", 3306);
        let debug = format!("{:?}", d);
        assert!(!debug.contains("pswd"));
        assert!(!d.describe().contains("pswd"));
    }

    #[test]
    fn test_deserialize_default_port() {
        let d: Dsn = serde_json::from_str(r#"{"host":"db.internal","dbname":"app"}"#).unwrap();
        assert_eq!(d.port, 3306);
        assert!(d.ipv4.is_none());
    }
}
