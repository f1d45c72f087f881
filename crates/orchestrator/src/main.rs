//! certpilot - ACME 证书生命周期管理
//!
//! 按证书签发、续期或吊销，结果以 `{"status": 0|1}` 输出到标准输出。

mod agent;
mod challenge;
mod firewall;
mod importer;
mod layout;
mod metrics;
mod orchestrator;
mod process;
mod registrar;
mod restart;
#[cfg(test)]
mod testing;

use crate::orchestrator::{CertificateOrchestrator, Collaborators};
use anyhow::{Result, bail};
use certpilot_common::{Action, AppConfig, ConfigStore, RunOptions, Selector, ValidationContext};
use clap::{Parser, ValueEnum};
use std::process::ExitCode;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliAction {
    Issue,
    /// issue 的别名
    Sign,
    Renew,
    Revoke,
}

impl From<CliAction> for Action {
    fn from(action: CliAction) -> Self {
        match action {
            CliAction::Issue | CliAction::Sign => Action::Issue,
            CliAction::Renew => Action::Renew,
            CliAction::Revoke => Action::Revoke,
        }
    }
}

/// certpilot - ACME certificate lifecycle orchestrator
#[derive(Parser, Debug)]
#[command(name = "certpilot")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Operation to perform
    #[arg(short = 'a', long = "action", value_enum, required_unless_present = "check")]
    action: Option<CliAction>,

    /// Certificate id
    #[arg(short = 'c', long = "cert")]
    cert: Option<Uuid>,

    /// Process all certificates
    #[arg(short = 'A', long = "all")]
    all: bool,

    /// Cron mode, implies --all
    #[arg(short = 'C', long = "cron")]
    cron: bool,

    /// Ignore the renewal interval
    #[arg(short = 'F', long = "force")]
    force: bool,

    /// Use the CA staging environment
    #[arg(short = 'S', long = "staging")]
    staging: bool,

    /// Lint the configuration document and exit
    #[arg(long = "check")]
    check: bool,
}

impl Cli {
    fn run_options(&self) -> Result<RunOptions> {
        let Some(action) = self.action.map(Action::from) else {
            bail!("an action is required");
        };
        let selector = match self.cert {
            Some(id) => Selector::ById(id),
            None if self.all || self.cron => Selector::All,
            None => bail!("either --cert or --all is required"),
        };
        if action == Action::Revoke && selector == Selector::All {
            bail!("revoke requires --cert");
        }
        let mut opts = RunOptions::new(action, selector);
        opts.force = self.force;
        opts.staging = self.staging;
        Ok(opts)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let status = match execute(&cli).await {
        Ok(true) => 0u8,
        Ok(false) => 1,
        Err(err) => {
            error!("{:#}", err);
            1
        }
    };
    println!("{}", serde_json::json!({ "status": status }));
    ExitCode::from(status)
}

async fn execute(cli: &Cli) -> Result<bool> {
    let opts = if cli.check {
        None
    } else {
        Some(cli.run_options()?)
    };
    let config = AppConfig::from_env()?;
    let store = ConfigStore::open(&config.config_path)?;

    let Some(opts) = opts else {
        return Ok(check(&store).await);
    };
    info!(action = %opts.action, selector = ?opts.selector, "starting run");

    let orchestrator =
        CertificateOrchestrator::new(&config, store, Collaborators::system(&config));
    let report = orchestrator.run(opts).await;

    if let Some(path) = &config.metrics_textfile {
        if let Err(err) = metrics::write_textfile(path) {
            warn!("failed to write metrics to {}: {:#}", path.display(), err);
        }
    }
    Ok(report.success())
}

async fn check(store: &ConfigStore) -> bool {
    let document = store.document().await;
    let issues = ValidationContext::new().validate_document(&document);
    for issue in &issues {
        warn!("{}", issue.description());
    }
    info!(
        certificates = document.certificates.len(),
        issues = issues.len(),
        "configuration checked"
    );
    issues.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("certpilot").chain(args.iter().copied()))
    }

    #[test]
    fn test_sign_is_issue() {
        let id = Uuid::new_v4().to_string();
        let opts = parse(&["-a", "sign", "-c", id.as_str()]).unwrap().run_options().unwrap();
        assert_eq!(opts.action, Action::Issue);
        assert!(matches!(opts.selector, Selector::ById(_)));
    }

    #[test]
    fn test_cron_implies_all() {
        let opts = parse(&["-a", "renew", "-C", "-F", "-S"]).unwrap().run_options().unwrap();
        assert_eq!(opts.selector, Selector::All);
        assert!(opts.force);
        assert!(opts.staging);
    }

    #[test]
    fn test_usage_errors() {
        assert!(parse(&["-a", "renew"]).unwrap().run_options().is_err(), "缺少证书选择");
        assert!(
            parse(&["-a", "revoke", "-A"]).unwrap().run_options().is_err(),
            "吊销必须指定证书"
        );
        assert!(parse(&["-c", "not-a-uuid", "-a", "issue"]).is_err());
        assert!(parse(&["-A"]).is_err(), "缺少操作");
        assert!(parse(&["--check"]).is_ok());
    }
}
