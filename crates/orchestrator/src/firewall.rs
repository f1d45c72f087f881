use crate::layout::write_private_file;
use crate::process::{CommandSpec, ProcessRunner};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use certpilot_common::AppConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const FIREWALL_TIMEOUT: Duration = Duration::from_secs(60);

/// 临时转发规则的安装与清除
#[async_trait]
pub trait FirewallControl: Send + Sync {
    /// 把规则集写入 `scratch_dir` 并加载
    async fn apply(&self, scratch_dir: &Path, ruleset: &str) -> Result<()>;

    /// 清除全部临时规则
    async fn flush(&self) -> Result<()>;
}

/// 基于 pf anchor 的实现
pub struct PfFirewall {
    runner: Arc<dyn ProcessRunner>,
    program: PathBuf,
    anchor: String,
    process_path: String,
}

impl PfFirewall {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: &AppConfig) -> Self {
        Self {
            runner,
            program: config.firewall_bin.clone(),
            anchor: config.firewall_anchor.clone(),
            process_path: config.process_path.clone(),
        }
    }

    async fn exec(&self, args: &[&str]) -> Result<()> {
        let spec = CommandSpec::new(&self.program)
            .args(args.iter().copied())
            .env("PATH", &self.process_path)
            .timeout(Some(FIREWALL_TIMEOUT));
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            bail!(
                "{} {} exited with code {}: {}",
                self.program.display(),
                args.join(" "),
                output.code(),
                output.stderr_tail(3)
            );
        }
        Ok(())
    }
}

#[async_trait]
impl FirewallControl for PfFirewall {
    async fn apply(&self, scratch_dir: &Path, ruleset: &str) -> Result<()> {
        let setup = scratch_dir.join("acme_anchor_setup");
        let rules = scratch_dir.join("acme_anchor_rules");

        write_private_file(&setup, format!("rdr-anchor \"{}\"\n", self.anchor).as_bytes())
            .with_context(|| format!("failed to write {}", setup.display()))?;
        let setup_arg = setup.display().to_string();
        self.exec(&["-f", setup_arg.as_str()]).await?;

        write_private_file(&rules, ruleset.as_bytes())
            .with_context(|| format!("failed to write {}", rules.display()))?;
        let rules_arg = rules.display().to_string();
        self.exec(&["-a", self.anchor.as_str(), "-f", rules_arg.as_str()]).await?;

        debug!(anchor = %self.anchor, "redirect rules loaded");
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.exec(&["-a", self.anchor.as_str(), "-F", "all"]).await?;
        debug!(anchor = %self.anchor, "redirect rules flushed");
        Ok(())
    }
}
