pub mod config;
pub mod document;
pub mod entities;
pub mod error;
pub mod models;
pub mod store;
pub mod validation;

// ============ 重新导出常用类型 ============

// 错误处理
pub use error::{LifecycleError, Result as LifecycleResult, TIMEOUT_EXIT_CODE};

// 配置相关
pub use config::AppConfig;

// 持久化
pub use document::{ConfigDocument, Entity};
pub use store::ConfigStore;

// 验证相关
pub use validation::{ConfigIssue, ValidationContext, is_valid_domain};

// 调用参数
pub use models::{Action, RunOptions, Selector};

// 兼容性别名（Result 是更常用的名称）
pub use error::Result;
