use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ACME 账户
///
/// `key` 保存 base64 编码的账户私钥，`last_update` 为空表示尚未在 CA 注册。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

impl Account {
    pub fn is_registered(&self) -> bool {
        self.last_update.is_some()
    }

    /// 非空的联系邮箱
    pub fn contact_email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    /// 非空的已存储密钥
    pub fn stored_key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.trim().is_empty())
    }
}
