use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 主机证书库中的条目
///
/// `refid` 在续期时保持不变，引用该证书的其他服务不会失效。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCertificate {
    pub refid: String,
    pub descr: String,
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub not_after: Option<DateTime<Utc>>,
    /// PEM 编码的完整证书链
    pub crt: String,
    /// PEM 编码的私钥
    pub prv: String,
}
