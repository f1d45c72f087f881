use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcmeEnvironment {
    #[default]
    #[serde(rename = "prod")]
    Production,
    #[serde(rename = "stg")]
    Staging,
}

fn default_challenge_port() -> u16 {
    43580
}

/// 设备级设置，与证书、账户一起持久化
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: AcmeEnvironment,
    /// 本机 HTTP-01 响应服务监听端口
    #[serde(default = "default_challenge_port")]
    pub challenge_port: u16,
    /// 接口名到接口地址的映射
    #[serde(default)]
    pub interfaces: BTreeMap<String, IpAddr>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: AcmeEnvironment::default(),
            challenge_port: default_challenge_port(),
            interfaces: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn interface_address(&self, name: &str) -> Option<IpAddr> {
        self.interfaces.get(name).copied()
    }
}
