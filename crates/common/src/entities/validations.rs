use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// HTTP-01 响应方
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpResponder {
    /// 本机内置响应服务，需要临时端口转发
    #[default]
    Internal,
    /// 外部 Web 服务直接提供 challenge 目录
    External,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpChallenge {
    #[serde(default)]
    pub responder: HttpResponder,
    /// 解析证书上的全部域名并为解析结果建立转发
    #[serde(default)]
    pub autodiscovery: bool,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    #[serde(default)]
    pub interface: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsChallenge {
    /// DNS 服务商标识，例如 `dns_cf`
    pub provider: String,
    #[serde(default)]
    pub sleep_secs: u32,
    /// 服务商凭据字段，键名与服务商映射表中的字段名一致
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

impl DnsChallenge {
    /// 读取凭据字段，缺失时为空字符串
    pub fn credential(&self, field: &str) -> &str {
        self.credentials.get(field).map(String::as_str).unwrap_or("")
    }
}

/// 域名验证方式
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Challenge {
    Http01(HttpChallenge),
    Dns01(DnsChallenge),
    /// 无法识别的验证方式，处理时按配置错误对待
    #[serde(other)]
    Unsupported,
}

impl Challenge {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http01(_) => "http01",
            Self::Dns01(_) => "dns01",
            Self::Unsupported => "unsupported",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMethod {
    pub id: Uuid,
    pub name: String,
    pub challenge: Challenge,
}
