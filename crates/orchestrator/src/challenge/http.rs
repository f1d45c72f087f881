//! HTTP-01 内置响应服务的端口转发

use crate::firewall::FirewallControl;
use async_trait::async_trait;
use certpilot_common::entities::{Certificate, HttpChallenge, Settings};
use certpilot_common::{LifecycleError, LifecycleResult};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait NameResolver: Send + Sync {
    /// 解析失败时返回空列表
    async fn resolve(&self, name: &str) -> Vec<IpAddr>;
}

/// 使用系统解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl NameResolver for SystemResolver {
    async fn resolve(&self, name: &str) -> Vec<IpAddr> {
        // 末尾的点避免附加搜索域
        let fqdn = format!("{}.", name.trim_end_matches('.'));
        match tokio::net::lookup_host((fqdn.as_str(), 80)).await {
            Ok(addrs) => addrs.map(|a| a.ip()).collect(),
            Err(err) => {
                debug!(name, "resolution failed: {}", err);
                Vec::new()
            }
        }
    }
}

pub struct HttpChallengeProvisioner {
    resolver: Arc<dyn NameResolver>,
    firewall: Arc<dyn FirewallControl>,
}

impl HttpChallengeProvisioner {
    pub fn new(resolver: Arc<dyn NameResolver>, firewall: Arc<dyn FirewallControl>) -> Self {
        Self { resolver, firewall }
    }

    /// 按自动发现、静态列表、接口地址的顺序收集去重后的地址
    pub async fn collect_addresses(
        &self,
        cert: &Certificate,
        http: &HttpChallenge,
        settings: &Settings,
    ) -> Vec<IpAddr> {
        let mut candidates = Vec::new();

        if http.autodiscovery {
            for name in cert.domains() {
                let resolved = self.resolver.resolve(name).await;
                if resolved.is_empty() {
                    debug!(certificate = %cert.name, name, "autodiscovery found no address");
                }
                candidates.extend(resolved);
            }
        }

        for entry in &http.ip_addresses {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match entry.parse::<IpAddr>() {
                Ok(ip) => candidates.push(ip),
                Err(_) => warn!(certificate = %cert.name, entry, "ignoring invalid address"),
            }
        }

        if let Some(interface) = http.interface.as_deref().filter(|i| !i.is_empty()) {
            match settings.interface_address(interface) {
                Some(ip) => candidates.push(ip),
                None => warn!(certificate = %cert.name, interface, "interface has no address"),
            }
        }

        let mut addresses: Vec<IpAddr> = Vec::new();
        for ip in candidates {
            if ip.is_unspecified() || addresses.contains(&ip) {
                continue;
            }
            addresses.push(ip);
        }
        addresses
    }

    /// 安装转发规则；加载失败时立即清除已加载的部分
    pub async fn install(
        &self,
        cert: &Certificate,
        http: &HttpChallenge,
        settings: &Settings,
        scratch_dir: &Path,
    ) -> LifecycleResult<()> {
        let addresses = self.collect_addresses(cert, http, settings).await;
        if addresses.is_empty() {
            return Err(LifecycleError::validation(
                "no IP addresses found to set up a port forward",
            ));
        }

        let ruleset = render_redirect_rules(&addresses, settings.challenge_port);
        if let Err(err) = self.firewall.apply(scratch_dir, &ruleset).await {
            self.flush().await;
            return Err(LifecycleError::validation(format!(
                "unable to set up a port forward: {:#}",
                err
            )));
        }
        debug!(certificate = %cert.name, count = addresses.len(), "port forward installed");
        Ok(())
    }

    /// 清除失败只记录日志
    pub async fn flush(&self) {
        if let Err(err) = self.firewall.flush().await {
            warn!("failed to flush port forward: {:#}", err);
        }
    }
}

/// 每个地址一条把 80 端口转发到本地响应服务的规则
pub fn render_redirect_rules(addresses: &[IpAddr], port: u16) -> String {
    addresses
        .iter()
        .map(|ip| match ip {
            IpAddr::V4(_) => format!(
                "rdr pass inet proto tcp from any to {} port 80 -> 127.0.0.1 port {}\n",
                ip, port
            ),
            IpAddr::V6(_) => format!(
                "rdr pass inet6 proto tcp from any to {} port 80 -> ::1 port {}\n",
                ip, port
            ),
        })
        .collect()
}
