use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 调用方请求的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Issue,
    Renew,
    Revoke,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Renew => "renew",
            Self::Revoke => "revoke",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 证书选择方式：`ById` 命中第一个匹配即停止，`All` 扫描全部证书
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    ById(Uuid),
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub action: Action,
    pub selector: Selector,
    /// 忽略续期时间，强制重新签发
    pub force: bool,
    /// 使用 CA 的测试环境
    pub staging: bool,
}

impl RunOptions {
    pub fn new(action: Action, selector: Selector) -> Self {
        Self {
            action,
            selector,
            force: false,
            staging: false,
        }
    }

    pub fn is_revoke(&self) -> bool {
        self.action == Action::Revoke
    }
}
