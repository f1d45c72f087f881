//! 外部进程执行
//!
//! 子进程只继承显式传入的环境变量，标准输出和标准错误逐行读取并写入 debug 日志。
//! 超时后整个进程组被强制结束，结果记为 `ProcessExit::TimedOut`。

use anyhow::{Context, Result};
use async_trait::async_trait;
use certpilot_common::TIMEOUT_EXIT_CODE;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 超时结束进程后等待输出读取任务的时间
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// 待执行的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// 设置环境变量，同名变量后写入者覆盖先写入者
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.envs.retain(|(k, _)| *k != key);
        self.envs.push((key, value.into()));
        self
    }

    pub fn envs<I>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter().fold(self, |spec, (k, v)| spec.env(k, v))
    }

    pub fn timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.envs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 日志中使用的程序名
    pub fn display_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Code(i32),
    Signal(i32),
    TimedOut,
}

impl ProcessExit {
    pub fn success(self) -> bool {
        self == Self::Code(0)
    }

    /// 数值化的退出码，超时固定为 99，被信号结束时为 128 + 信号值
    pub fn code(self) -> i32 {
        match self {
            Self::Code(code) => code,
            Self::Signal(signal) => 128 + signal,
            Self::TimedOut => TIMEOUT_EXIT_CODE,
        }
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signal(signal);
            }
        }
        Self::Code(-1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit: ProcessExit,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit.success()
    }

    pub fn code(&self) -> i32 {
        self.exit.code()
    }

    /// 标准错误的最后几行，用于失败日志
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join(" | ")
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput>;
}

/// 基于 tokio::process 的执行器
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        let name = spec.display_name();
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .env_clear()
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn {}", spec.program.display()))?;
        let pid = child.id();
        debug!(program = %name, pid = ?pid, "process started");

        let stdout = child
            .stdout
            .take()
            .map(|s| tokio::spawn(drain_lines(s, name.clone(), "stdout")));
        let stderr = child
            .stderr
            .take()
            .map(|s| tokio::spawn(drain_lines(s, name.clone(), "stderr")));

        let exit = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => ProcessExit::from(status?),
                Err(_) => {
                    warn!(program = %name, timeout_secs = limit.as_secs(), "process timed out, killing");
                    terminate(&mut child, pid).await;
                    ProcessExit::TimedOut
                }
            },
            None => ProcessExit::from(child.wait().await?),
        };

        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;
        debug!(program = %name, code = exit.code(), "process finished");

        Ok(ProcessOutput {
            exit,
            stdout,
            stderr,
        })
    }
}

async fn drain_lines<R>(reader: R, program: String, stream: &'static str) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut captured = String::new();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(program = %program, stream, "{}", line);
                captured.push_str(&line);
                captured.push('\n');
            }
            Ok(None) => break,
            Err(err) => {
                debug!(program = %program, stream, "read failed: {}", err);
                break;
            }
        }
    }
    captured
}

/// 后台进程可能继续持有管道，读取任务最多再等待 `DRAIN_GRACE`
async fn collect(task: Option<JoinHandle<String>>) -> String {
    let Some(mut handle) = task else {
        return String::new();
    };
    match tokio::time::timeout(DRAIN_GRACE, &mut handle).await {
        Ok(Ok(captured)) => captured,
        Ok(Err(err)) => {
            debug!("output reader failed: {}", err);
            String::new()
        }
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}

async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()) {
            // SAFETY: kill(2) 只接收整数参数，不涉及内存访问
            let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
            if rc != 0 {
                debug!(pgid, "failed to signal process group");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
    if let Err(err) = child.kill().await {
        debug!("failed to kill child: {}", err);
    }
}
