//! 证书生命周期统一错误类型定义
//!
//! 每种错误都对应一个写入证书的状态码，批处理据此记录结果。

use crate::entities::StatusCode;
use thiserror::Error;

/// 重启动作超时时报告的退出码
pub const TIMEOUT_EXIT_CODE: i32 = 99;

/// 证书生命周期统一错误类型
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// 引用无法解析、实体被禁用、未知的验证方式或服务商 (300)
    #[error("配置错误: {0}")]
    Configuration(String),

    /// challenge 准备失败或 ACME 客户端报告验证失败 (400)
    #[error("域名验证失败: {0}")]
    Validation(String),

    /// 账户密钥或注册步骤失败 (400)
    #[error("账户注册失败: {0}")]
    Registration(String),

    /// 证书文件不可读或证书库写入失败 (500)
    #[error("证书导入失败: {0}")]
    Import(String),

    /// 重启动作超时，不写入证书状态
    #[error("执行超时: {0}")]
    Timeout(String),

    /// IO 错误 (500)
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误 (500)
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 其他内部错误 (500)
    #[error("内部错误: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LifecycleError {
    /// 创建配置错误
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 创建验证错误
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// 创建注册错误
    pub fn registration(msg: impl Into<String>) -> Self {
        Self::Registration(msg.into())
    }

    /// 创建导入错误
    pub fn import(msg: impl Into<String>) -> Self {
        Self::Import(msg.into())
    }

    /// 创建超时错误
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// 写入证书的状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration(_) => StatusCode::ConfigError,
            Self::Validation(_) | Self::Registration(_) | Self::Timeout(_) => {
                StatusCode::OperationFailed
            }
            Self::Import(_) | Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => {
                StatusCode::InternalError
            }
        }
    }

    /// 进程退出码，超时使用专用的 99
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Timeout(_) => TIMEOUT_EXIT_CODE,
            _ => 1,
        }
    }

    /// 判断是否为配置类错误
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// 生命周期 Result 类型别名
pub type Result<T> = std::result::Result<T, LifecycleError>;
