//! 主机名解析
//!
//! 域名形式的 DSN 定期重新解析，解析到的每个 IPv4 地址对应一个实例

use std::fmt::Debug;
use std::net::IpAddr;

use async_trait::async_trait;

use crate::{DbResolverError, Result};

/// 主机名解析器
#[async_trait]
pub trait HostResolver: Send + Sync + Debug {
    /// 解析主机名（跟随 CNAME），返回所有地址
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>>;
}

/// 使用系统解析器的实现
///
/// 系统解析器会跟随 CNAME 链直到 A/AAAA 记录
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHostResolver;

#[async_trait]
impl HostResolver for SystemHostResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| DbResolverError::Resolve(format!("{}: {}", host, e)))?;
        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in addrs {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }
        Ok(ips)
    }
}

/// 只保留 IPv4 地址
pub fn ipv4_only(ips: &[IpAddr]) -> Vec<IpAddr> {
    ips.iter().copied().filter(IpAddr::is_ipv4).collect()
}
