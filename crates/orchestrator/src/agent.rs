//! 外部 ACME 客户端 (acme.sh) 的调用约定

use crate::layout::AcmeLayout;
use crate::metrics;
use crate::process::{CommandSpec, ProcessOutput, ProcessRunner};
use anyhow::Result;
use certpilot_common::AppConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

const LOG_LEVEL: &str = "2";

/// 每次调用都会带上的可选参数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentFlags {
    pub force: bool,
    pub staging: bool,
}

impl AgentFlags {
    fn to_args(self) -> Vec<&'static str> {
        let mut args = Vec::new();
        if self.force {
            args.push("--force");
        }
        if self.staging {
            args.push("--staging");
        }
        args
    }
}

/// challenge 相关的客户端参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeArgs {
    Webroot(PathBuf),
    Dns { provider: String, sleep_secs: u32 },
}

impl ChallengeArgs {
    fn to_args(&self) -> Vec<String> {
        match self {
            Self::Webroot(path) => vec!["--webroot".to_string(), path.display().to_string()],
            Self::Dns {
                provider,
                sleep_secs,
            } => vec![
                "--dns".to_string(),
                provider.clone(),
                "--dnssleep".to_string(),
                sleep_secs.to_string(),
            ],
        }
    }
}

/// 签发或续期请求
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub certificate: Uuid,
    pub account: Uuid,
    /// 主域名在前
    pub domains: Vec<String>,
    pub renew: bool,
    pub challenge: ChallengeArgs,
    /// DNS 服务商凭据等额外环境变量
    pub env: Vec<(String, String)>,
    pub flags: AgentFlags,
}

impl IssueRequest {
    pub fn operation(&self) -> &'static str {
        if self.renew { "renew" } else { "issue" }
    }
}

pub struct AcmeAgent {
    runner: Arc<dyn ProcessRunner>,
    layout: AcmeLayout,
    program: PathBuf,
    log_file: PathBuf,
    process_path: String,
    key_length: u32,
    account_key_length: u32,
    timeout: Option<Duration>,
}

impl AcmeAgent {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: &AppConfig) -> Self {
        Self {
            runner,
            layout: AcmeLayout::new(&config.base_dir),
            program: config.agent_path.clone(),
            log_file: config.agent_log_file.clone(),
            process_path: config.process_path.clone(),
            key_length: config.key_length,
            account_key_length: config.account_key_length,
            timeout: config.agent_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn layout(&self) -> &AcmeLayout {
        &self.layout
    }

    pub fn log_file(&self) -> &PathBuf {
        &self.log_file
    }

    fn command(&self, flags: AgentFlags) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(flags.to_args())
            .env("PATH", &self.process_path)
            .timeout(self.timeout)
    }

    fn home_args(&self) -> [String; 2] {
        ["--home".to_string(), self.layout.home().display().to_string()]
    }

    fn account_conf_args(&self, account: Uuid) -> [String; 2] {
        [
            "--accountconf".to_string(),
            self.layout.account_conf(account).display().to_string(),
        ]
    }

    pub fn create_account_key_command(&self, account: Uuid, flags: AgentFlags) -> CommandSpec {
        self.command(flags)
            .arg("--createAccountKey")
            .arg("--accountkeylength")
            .arg(self.account_key_length.to_string())
            .args(self.home_args())
            .args(self.account_conf_args(account))
    }

    pub fn register_account_command(&self, account: Uuid, flags: AgentFlags) -> CommandSpec {
        self.command(flags)
            .arg("--registeraccount")
            .arg("--log-level")
            .arg(LOG_LEVEL)
            .args(self.home_args())
            .args(self.account_conf_args(account))
    }

    /// 输出路径全部按证书 id 组织
    pub fn issue_command(&self, request: &IssueRequest) -> CommandSpec {
        let id = request.certificate;
        let mut spec = self
            .command(request.flags)
            .arg(format!("--{}", request.operation()));
        for domain in &request.domains {
            spec = spec.arg("--domain").arg(domain.as_str());
        }
        spec.args(request.challenge.to_args())
            .arg("--log-level")
            .arg(LOG_LEVEL)
            .args(self.home_args())
            .arg("--keylength")
            .arg(self.key_length.to_string())
            .args(self.account_conf_args(request.account))
            .arg("--certpath")
            .arg(self.layout.cert_file(id).display().to_string())
            .arg("--keypath")
            .arg(self.layout.private_key(id).display().to_string())
            .arg("--capath")
            .arg(self.layout.chain_file(id).display().to_string())
            .arg("--fullchainpath")
            .arg(self.layout.fullchain_file(id).display().to_string())
            .envs(request.env.iter().cloned())
    }

    /// 吊销只需要主域名和账户配置，不带任何输出路径
    pub fn revoke_command(&self, domain: &str, account: Uuid, flags: AgentFlags) -> CommandSpec {
        self.command(flags)
            .arg("--revoke")
            .arg("--domain")
            .arg(domain)
            .arg("--log-level")
            .arg(LOG_LEVEL)
            .args(self.home_args())
            .arg("--keylength")
            .arg(self.key_length.to_string())
            .args(self.account_conf_args(account))
    }

    /// 执行一次客户端调用并记录耗时，非零退出码由调用方分类
    pub async fn run(&self, operation: &str, spec: &CommandSpec) -> Result<ProcessOutput> {
        let start = Instant::now();
        let output = self.runner.run(spec).await?;
        metrics::observe_agent_duration(operation, start.elapsed().as_secs_f64());

        if output.success() {
            debug!(operation, "acme agent finished");
        } else {
            warn!(
                operation,
                code = output.code(),
                stderr = %output.stderr_tail(5),
                "acme agent failed"
            );
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::SystemRunner;
    use std::collections::HashMap;

    fn make_agent() -> AcmeAgent {
        let vars: HashMap<String, String> = [("ACME_BASE_DIR", "/acme")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = AppConfig::from_vars(|key| vars.get(key).cloned()).unwrap();
        AcmeAgent::new(Arc::new(SystemRunner), &config)
    }

    fn position(spec: &CommandSpec, flag: &str) -> usize {
        spec.args.iter().position(|a| a == flag).unwrap()
    }

    #[test]
    fn test_issue_command_arguments() {
        let agent = make_agent();
        let cert = Uuid::new_v4();
        let account = Uuid::new_v4();
        let request = IssueRequest {
            certificate: cert,
            account,
            domains: vec!["a.example.com".to_string(), "b.example.com".to_string()],
            renew: false,
            challenge: ChallengeArgs::Webroot(agent.layout().challenges()),
            env: Vec::new(),
            flags: AgentFlags {
                force: true,
                staging: true,
            },
        };
        let spec = agent.issue_command(&request);

        assert_eq!(&spec.args[..3], &["--force", "--staging", "--issue"]);
        let domains: Vec<&str> = spec
            .args
            .windows(2)
            .filter(|w| w[0] == "--domain")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(domains, vec!["a.example.com", "b.example.com"]);
        assert_eq!(spec.args[position(&spec, "--webroot") + 1], "/acme/challenges");
        assert_eq!(
            spec.args[position(&spec, "--certpath") + 1],
            format!("/acme/certs/{}/cert.pem", cert)
        );
        assert_eq!(
            spec.args[position(&spec, "--keypath") + 1],
            format!("/acme/keys/{}/private.key", cert)
        );
        assert_eq!(
            spec.args[position(&spec, "--accountconf") + 1],
            format!("/acme/accounts/{}/account.conf", account)
        );
        assert_eq!(spec.envs.len(), 1, "只允许最小 PATH 环境");
        assert!(spec.env_value("PATH").is_some());
    }

    #[test]
    fn test_dns_arguments_and_env() {
        let agent = make_agent();
        let request = IssueRequest {
            certificate: Uuid::new_v4(),
            account: Uuid::new_v4(),
            domains: vec!["a.example.com".to_string()],
            renew: true,
            challenge: ChallengeArgs::Dns {
                provider: "dns_cf".to_string(),
                sleep_secs: 120,
            },
            env: vec![("CF_Key".to_string(), "k".to_string())],
            flags: AgentFlags::default(),
        };
        let spec = agent.issue_command(&request);

        assert_eq!(spec.args[0], "--renew");
        assert_eq!(spec.args[position(&spec, "--dns") + 1], "dns_cf");
        assert_eq!(spec.args[position(&spec, "--dnssleep") + 1], "120");
        assert_eq!(spec.env_value("CF_Key"), Some("k"));
    }

    #[test]
    fn test_revoke_has_no_output_paths() {
        let agent = make_agent();
        let spec = agent.revoke_command("a.example.com", Uuid::new_v4(), AgentFlags::default());
        assert_eq!(spec.args[0], "--revoke");
        assert!(!spec.args.iter().any(|a| a.ends_with("path")));
        assert_eq!(spec.args.iter().filter(|a| *a == "--domain").count(), 1);
    }

    #[test]
    fn test_account_commands() {
        let agent = make_agent();
        let account = Uuid::new_v4();
        let create = agent.create_account_key_command(account, AgentFlags::default());
        assert_eq!(create.args[0], "--createAccountKey");
        assert_eq!(create.args[position(&create, "--accountkeylength") + 1], "4096");

        let register = agent.register_account_command(account, AgentFlags::default());
        assert_eq!(register.args[0], "--registeraccount");
        assert_eq!(register.args[position(&register, "--home") + 1], "/acme/home");
    }
}
