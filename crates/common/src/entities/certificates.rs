use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 证书最近一次运行的状态码
///
/// 状态码是单向写入的结果记录，不是受校验的状态机，任何阶段都可以写入任意状态。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum StatusCode {
    /// 等待处理 (100)
    #[default]
    Pending,
    /// 签发/续期成功 (200)
    IssuedOrRenewed,
    /// 已吊销 (250)
    Revoked,
    /// 配置错误 (300)
    ConfigError,
    /// 签发/续期/吊销失败 (400)
    OperationFailed,
    /// 内部错误 (500)
    InternalError,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Pending => 100,
            Self::IssuedOrRenewed => 200,
            Self::Revoked => 250,
            Self::ConfigError => 300,
            Self::OperationFailed => 400,
            Self::InternalError => 500,
        }
    }

    pub fn is_error(self) -> bool {
        self.as_u16() >= 300
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> Self {
        code.as_u16()
    }
}

impl TryFrom<u16> for StatusCode {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            100 => Ok(Self::Pending),
            200 => Ok(Self::IssuedOrRenewed),
            250 => Ok(Self::Revoked),
            300 => Ok(Self::ConfigError),
            400 => Ok(Self::OperationFailed),
            500 => Ok(Self::InternalError),
            other => Err(format!("unknown status code {}", other)),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// 续期间隔上限（天）
pub const MAX_RENEW_INTERVAL_DAYS: u32 = 3650;

fn default_renew_interval() -> u32 {
    60
}

fn default_enabled() -> bool {
    true
}

/// 由本工具管理的证书
///
/// 文件系统目录按 `id` 命名而不是按域名，修改域名不会遗留孤立文件。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    /// 主域名
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub alt_names: Vec<String>,
    pub account: Uuid,
    pub validation_method: Uuid,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_renew_interval")]
    pub renew_interval_days: u32,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status_code: StatusCode,
    #[serde(default)]
    pub status_last_update: Option<DateTime<Utc>>,
    /// 证书库中导入条目的引用 id，首次导入成功前为空
    #[serde(default)]
    pub cert_ref_id: Option<String>,
    #[serde(default)]
    pub restart_actions: Vec<Uuid>,
}

impl Certificate {
    /// 主域名在前，其后依次为非空的备用名称
    pub fn domains(&self) -> Vec<&str> {
        std::iter::once(self.name.as_str())
            .chain(
                self.alt_names
                    .iter()
                    .map(|n| n.trim())
                    .filter(|n| !n.is_empty()),
            )
            .collect()
    }

    /// 下一次允许续期的时间，从未签发或超出时间范围时为 `None`
    pub fn next_renewal(&self) -> Option<DateTime<Utc>> {
        let last = self.last_update?;
        TimeDelta::try_days(i64::from(self.renew_interval_days))
            .and_then(|interval| last.checked_add_signed(interval))
    }

    pub fn renew_interval_in_range(&self) -> bool {
        (1..=MAX_RENEW_INTERVAL_DAYS).contains(&self.renew_interval_days)
    }

    /// 是否到达续期时间；从未签发的证书总是到期，续期时间溢出时永不到期
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.last_update.is_none() {
            return true;
        }
        self.next_renewal().is_some_and(|next| now >= next)
    }
}
