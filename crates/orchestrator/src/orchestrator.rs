//! 证书生命周期编排
//!
//! 每张证书独立处理，任何终止分支都只写入一次状态码。批处理模式下单张证书失败
//! 不会中断后续证书；单证书模式只处理第一个匹配项。

use crate::agent::{AcmeAgent, AgentFlags, IssueRequest};
use crate::challenge::ChallengeProvisioner;
use crate::challenge::http::{HttpChallengeProvisioner, NameResolver, SystemResolver};
use crate::firewall::{FirewallControl, PfFirewall};
use crate::importer::CertificateImporter;
use crate::layout::AcmeLayout;
use crate::metrics;
use crate::process::{ProcessRunner, SystemRunner};
use crate::registrar::AccountRegistrar;
use crate::restart::{ConfigctlService, RestartActionExecutor, RestartSummary, ServiceControl};
use certpilot_common::entities::{
    Account, AcmeEnvironment, Certificate, StatusCode, ValidationMethod,
};
use certpilot_common::{
    AppConfig, ConfigStore, LifecycleError, LifecycleResult, RunOptions, Selector,
    is_valid_domain,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 编排器依赖的外部协作方
#[derive(Clone)]
pub struct Collaborators {
    pub runner: Arc<dyn ProcessRunner>,
    pub firewall: Arc<dyn FirewallControl>,
    pub resolver: Arc<dyn NameResolver>,
    pub service: Arc<dyn ServiceControl>,
}

impl Collaborators {
    /// 使用真实进程、pf 防火墙和系统解析器
    pub fn system(config: &AppConfig) -> Self {
        let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner);
        Self {
            firewall: Arc::new(PfFirewall::new(runner.clone(), config)),
            resolver: Arc::new(SystemResolver),
            service: Arc::new(ConfigctlService::new(runner.clone(), config)),
            runner,
        }
    }
}

/// 单张证书的最终结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateOutcome {
    /// 已写入的状态码
    Status(StatusCode),
    /// 尚未到续期时间，状态不变
    NotDue,
    /// 单证书模式下目标被禁用，状态不变
    Disabled,
}

impl CertificateOutcome {
    pub fn is_failure(self) -> bool {
        match self {
            Self::Status(code) => code.is_error(),
            Self::NotDue => false,
            Self::Disabled => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateResult {
    pub certificate: Uuid,
    pub name: String,
    pub outcome: CertificateOutcome,
}

/// 一次运行的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub results: Vec<CertificateResult>,
    /// 没有证书签发成功时为空
    pub restart: Option<RestartSummary>,
    pub failed: bool,
}

impl RunReport {
    pub fn success(&self) -> bool {
        !self.failed
    }

    pub fn outcome_of(&self, certificate: Uuid) -> Option<CertificateOutcome> {
        self.results
            .iter()
            .find(|r| r.certificate == certificate)
            .map(|r| r.outcome)
    }
}

enum Processed {
    Issued(Certificate),
    Revoked,
    NotDue,
}

pub struct CertificateOrchestrator {
    store: ConfigStore,
    agent: Arc<AcmeAgent>,
    registrar: AccountRegistrar,
    challenges: ChallengeProvisioner,
    importer: CertificateImporter,
    restart: RestartActionExecutor,
    staging: bool,
}

impl CertificateOrchestrator {
    pub fn new(config: &AppConfig, store: ConfigStore, parts: Collaborators) -> Self {
        let agent = Arc::new(AcmeAgent::new(parts.runner.clone(), config));
        let layout = AcmeLayout::new(&config.base_dir);
        Self {
            registrar: AccountRegistrar::new(store.clone(), agent.clone()),
            challenges: ChallengeProvisioner::new(
                layout.clone(),
                HttpChallengeProvisioner::new(parts.resolver, parts.firewall),
            ),
            importer: CertificateImporter::new(store.clone(), Arc::new(store.clone()), layout),
            restart: RestartActionExecutor::new(store.clone(), parts.runner, parts.service, config),
            staging: config.staging,
            agent,
            store,
        }
    }

    pub async fn run(&self, opts: RunOptions) -> RunReport {
        let settings = self.store.settings().await;
        let flags = AgentFlags {
            force: opts.force,
            staging: opts.staging || self.staging || settings.environment == AcmeEnvironment::Staging,
        };

        let mut report = RunReport::default();
        let mut issued = Vec::new();
        match opts.selector {
            Selector::ById(id) => self.run_single(id, opts, flags, &mut report, &mut issued).await,
            Selector::All => self.run_all(opts, flags, &mut report, &mut issued).await,
        }

        report.failed |= report.results.iter().any(|r| r.outcome.is_failure());

        if !issued.is_empty() {
            let summary = self.restart.execute(&issued).await;
            for failure in &summary.failures {
                warn!(action = %failure.name, code = failure.code, "restart action did not succeed");
            }
            report.restart = Some(summary);
        }

        info!(
            action = %opts.action,
            processed = report.results.len(),
            success = report.success(),
            "run finished"
        );
        report
    }

    async fn run_single(
        &self,
        id: Uuid,
        opts: RunOptions,
        flags: AgentFlags,
        report: &mut RunReport,
        issued: &mut Vec<Certificate>,
    ) {
        let Some(cert) = self
            .store
            .all::<Certificate>()
            .await
            .into_iter()
            .find(|c| c.id == id)
        else {
            error!(certificate = %id, "certificate not found");
            report.failed = true;
            return;
        };

        if !cert.enabled {
            error!(certificate = %cert.name, "certificate is disabled");
            report.results.push(CertificateResult {
                certificate: cert.id,
                name: cert.name.clone(),
                outcome: CertificateOutcome::Disabled,
            });
            return;
        }

        let outcome = self.handle(&cert, opts, flags, issued).await;
        report.results.push(CertificateResult {
            certificate: cert.id,
            name: cert.name,
            outcome,
        });
    }

    async fn run_all(
        &self,
        opts: RunOptions,
        flags: AgentFlags,
        report: &mut RunReport,
        issued: &mut Vec<Certificate>,
    ) {
        for cert in self.store.all::<Certificate>().await {
            if !cert.enabled {
                continue;
            }
            let outcome = self.handle(&cert, opts, flags, issued).await;
            report.results.push(CertificateResult {
                certificate: cert.id,
                name: cert.name,
                outcome,
            });
        }
    }

    async fn handle(
        &self,
        cert: &Certificate,
        opts: RunOptions,
        flags: AgentFlags,
        issued: &mut Vec<Certificate>,
    ) -> CertificateOutcome {
        info!(certificate = %cert.name, action = %opts.action, "processing certificate");
        let status = match self.process(cert, opts, flags).await {
            Ok(Processed::NotDue) => {
                metrics::record_certificate_result("not_due");
                return CertificateOutcome::NotDue;
            }
            Ok(Processed::Revoked) => {
                info!(certificate = %cert.name, "certificate revoked");
                StatusCode::Revoked
            }
            Ok(Processed::Issued(updated)) => {
                info!(certificate = %cert.name, "certificate issued");
                issued.push(updated);
                StatusCode::IssuedOrRenewed
            }
            Err(err) => {
                error!(certificate = %cert.name, code = err.status_code().as_u16(), "{}", err);
                err.status_code()
            }
        };
        self.record_status(cert.id, status).await;
        CertificateOutcome::Status(status)
    }

    async fn process(
        &self,
        cert: &Certificate,
        opts: RunOptions,
        flags: AgentFlags,
    ) -> LifecycleResult<Processed> {
        if let Some(invalid) = cert.domains().into_iter().find(|d| !is_valid_domain(d)) {
            return Err(LifecycleError::configuration(format!(
                "invalid domain name {:?}",
                invalid
            )));
        }

        let account = self
            .store
            .get::<Account>(&cert.account)
            .await
            .ok_or_else(|| {
                LifecycleError::configuration(format!("account {} not found", cert.account))
            })?;
        let account = self
            .registrar
            .ensure_registered(&account, opts.action, flags)
            .await?;

        let method = self
            .store
            .get::<ValidationMethod>(&cert.validation_method)
            .await
            .ok_or_else(|| {
                LifecycleError::configuration(format!(
                    "validation method {} not found",
                    cert.validation_method
                ))
            })?;

        if opts.is_revoke() {
            return self.revoke(cert, &account, flags).await;
        }

        if !cert.renew_interval_in_range() {
            return Err(LifecycleError::configuration(format!(
                "renew interval of {} days is out of range",
                cert.renew_interval_days
            )));
        }

        let renew = cert.last_update.is_some() && !opts.force;
        if !opts.force && !cert.is_due(Utc::now()) {
            info!(
                certificate = %cert.name,
                next_renewal = ?cert.next_renewal(),
                "certificate not due for renewal"
            );
            return Ok(Processed::NotDue);
        }

        self.agent.layout().prepare_certificate_dirs(cert.id)?;
        let settings = self.store.settings().await;
        let prepared = self.challenges.prepare(cert, &method, &settings).await?;

        let request = IssueRequest {
            certificate: cert.id,
            account: account.id,
            domains: cert.domains().into_iter().map(str::to_string).collect(),
            renew,
            challenge: prepared.args.clone(),
            env: prepared.env.clone(),
            flags,
        };
        debug!(
            certificate = %cert.name,
            method = method.challenge.kind(),
            operation = request.operation(),
            "invoking acme agent"
        );
        let spec = self.agent.issue_command(&request);
        let result = self.agent.run(request.operation(), &spec).await;
        self.challenges.cleanup(&prepared).await;

        let output = result.map_err(|err| LifecycleError::validation(format!("{:#}", err)))?;
        if !output.success() {
            return Err(LifecycleError::validation(format!(
                "acme agent {} failed with code {}",
                request.operation(),
                output.code()
            )));
        }

        let updated = self.importer.import(cert).await?;
        Ok(Processed::Issued(updated))
    }

    async fn revoke(
        &self,
        cert: &Certificate,
        account: &Account,
        flags: AgentFlags,
    ) -> LifecycleResult<Processed> {
        let spec = self.agent.revoke_command(&cert.name, account.id, flags);
        let output = self
            .agent
            .run("revoke", &spec)
            .await
            .map_err(|err| LifecycleError::validation(format!("{:#}", err)))?;
        if !output.success() {
            return Err(LifecycleError::validation(format!(
                "acme agent revoke failed with code {}",
                output.code()
            )));
        }
        Ok(Processed::Revoked)
    }

    /// 重新读取证书，保留导入阶段写入的字段
    async fn record_status(&self, id: Uuid, status: StatusCode) {
        metrics::record_certificate_result(&status.to_string());
        let Some(mut cert) = self.store.get::<Certificate>(&id).await else {
            warn!(certificate = %id, "certificate disappeared before status update");
            return;
        };
        cert.status_code = status;
        cert.status_last_update = Some(Utc::now());
        self.store.upsert(cert).await;
        if let Err(err) = self.store.save_all().await {
            error!(certificate = %id, "failed to save status: {:#}", err);
        }
    }
}
