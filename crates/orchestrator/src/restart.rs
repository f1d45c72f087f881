use crate::metrics;
use crate::process::{CommandSpec, ProcessExit, ProcessRunner};
use anyhow::Result;
use async_trait::async_trait;
use certpilot_common::entities::{Certificate, RestartAction, RestartKind};
use certpilot_common::{AppConfig, ConfigStore, LifecycleError, TIMEOUT_EXIT_CODE};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

const SHELL: &str = "/bin/sh";

/// 主机服务控制（configd 命令）
#[async_trait]
pub trait ServiceControl: Send + Sync {
    /// 返回命令退出码
    async fn run(&self, command: &str) -> Result<i32>;
}

pub struct ConfigctlService {
    runner: Arc<dyn ProcessRunner>,
    program: PathBuf,
    process_path: String,
    timeout: Duration,
}

impl ConfigctlService {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: &AppConfig) -> Self {
        Self {
            runner,
            program: config.service_bin.clone(),
            process_path: config.process_path.clone(),
            timeout: Duration::from_secs(config.restart_timeout_secs),
        }
    }
}

#[async_trait]
impl ServiceControl for ConfigctlService {
    async fn run(&self, command: &str) -> Result<i32> {
        let spec = CommandSpec::new(&self.program)
            .args(command.split_whitespace())
            .env("PATH", &self.process_path)
            .timeout(Some(self.timeout));
        Ok(self.runner.run(&spec).await?.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartFailure {
    pub action: Uuid,
    pub name: String,
    pub code: i32,
}

/// 一批重启动作的执行结果，记录全部失败项
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestartSummary {
    pub executed: usize,
    pub failures: Vec<RestartFailure>,
}

impl RestartSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn timed_out(&self) -> bool {
        self.failures.iter().any(|f| f.code == TIMEOUT_EXIT_CODE)
    }
}

pub struct RestartActionExecutor {
    store: ConfigStore,
    runner: Arc<dyn ProcessRunner>,
    service: Arc<dyn ServiceControl>,
    process_path: String,
    default_timeout: Duration,
}

impl RestartActionExecutor {
    pub fn new(
        store: ConfigStore,
        runner: Arc<dyn ProcessRunner>,
        service: Arc<dyn ServiceControl>,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            runner,
            service,
            process_path: config.process_path.clone(),
            default_timeout: Duration::from_secs(config.restart_timeout_secs),
        }
    }

    /// 按动作 id 去重，保持首次出现的顺序，同 id 以最后读取的对象为准
    pub async fn collect(&self, certificates: &[Certificate]) -> Vec<RestartAction> {
        let mut actions: Vec<RestartAction> = Vec::new();
        for cert in certificates {
            for id in &cert.restart_actions {
                let Some(action) = self.store.get::<RestartAction>(id).await else {
                    error!(certificate = %cert.name, action = %id, "restart action not found");
                    continue;
                };
                if !action.enabled {
                    continue;
                }
                match actions.iter().position(|a| a.id == action.id) {
                    Some(index) => actions[index] = action,
                    None => actions.push(action),
                }
            }
        }
        actions
    }

    pub async fn execute(&self, certificates: &[Certificate]) -> RestartSummary {
        let mut summary = RestartSummary::default();
        for action in self.collect(certificates).await {
            info!(action = %action.name, kind = action.kind.as_str(), "running restart action");
            let code = self.run_action(&action).await;
            summary.executed += 1;

            let result = match code {
                0 => "ok",
                TIMEOUT_EXIT_CODE => "timeout",
                _ => "failed",
            };
            metrics::record_restart_action(action.kind.as_str(), result);

            if code != 0 {
                summary.failures.push(RestartFailure {
                    action: action.id,
                    name: action.name.clone(),
                    code,
                });
            }
        }
        summary
    }

    async fn run_action(&self, action: &RestartAction) -> i32 {
        match action.kind {
            RestartKind::RestartGui => self.service_command(action, "webgui restart").await,
            RestartKind::RestartHaproxy => self.service_command(action, "haproxy restart").await,
            RestartKind::Configd => match action.command() {
                Some(command) => self.service_command(action, command).await,
                None => {
                    error!(action = %action.name, "no configd command specified for restart action");
                    1
                }
            },
            RestartKind::Custom => match action.command() {
                Some(command) => self.custom_command(action, command).await,
                None => {
                    error!(action = %action.name, "no custom command specified for restart action");
                    1
                }
            },
            RestartKind::Unknown => {
                error!(action = %action.name, "an invalid restart action was specified");
                1
            }
        }
    }

    async fn service_command(&self, action: &RestartAction, command: &str) -> i32 {
        match self.service.run(command).await {
            Ok(0) => 0,
            Ok(code) => {
                warn!(action = %action.name, code, "restart action failed");
                code
            }
            Err(err) => {
                error!(action = %action.name, "unable to run service command: {:#}", err);
                1
            }
        }
    }

    async fn custom_command(&self, action: &RestartAction, command: &str) -> i32 {
        let timeout = action
            .timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);
        let spec = CommandSpec::new(SHELL)
            .arg("-c")
            .arg(command)
            .env("PATH", &self.process_path)
            .timeout(Some(timeout));

        match self.runner.run(&spec).await {
            Ok(output) if output.exit == ProcessExit::TimedOut => {
                let err = LifecycleError::timeout(format!(
                    "restart action {} exceeded {}s",
                    action.name,
                    timeout.as_secs()
                ));
                error!(action = %action.name, "{}", err);
                err.exit_code()
            }
            Ok(output) if !output.success() => {
                warn!(
                    action = %action.name,
                    code = output.code(),
                    stderr = %output.stderr_tail(5),
                    "restart action failed"
                );
                output.code()
            }
            Ok(_) => 0,
            Err(err) => {
                error!(action = %action.name, "unable to initiate restart action: {:#}", err);
                1
            }
        }
    }
}
