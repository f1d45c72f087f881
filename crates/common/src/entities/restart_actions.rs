use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartKind {
    RestartGui,
    RestartHaproxy,
    Configd,
    Custom,
    #[serde(other)]
    Unknown,
}

impl RestartKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RestartGui => "restart_gui",
            Self::RestartHaproxy => "restart_haproxy",
            Self::Configd => "configd",
            Self::Custom => "custom",
            Self::Unknown => "unknown",
        }
    }

    /// 该类型是否必须配置命令
    pub fn requires_command(self) -> bool {
        matches!(self, Self::Configd | Self::Custom)
    }
}

fn default_enabled() -> bool {
    true
}

/// 证书签发/续期成功后执行的动作
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartAction {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RestartKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// configd 或自定义命令
    #[serde(default)]
    pub command: String,
    /// 自定义命令超时（秒），为空时使用全局默认值
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl RestartAction {
    pub fn command(&self) -> Option<&str> {
        let command = self.command.trim();
        (!command.is_empty()).then_some(command)
    }
}
