pub mod dns;
pub mod http;

use crate::agent::ChallengeArgs;
use crate::layout::AcmeLayout;
use certpilot_common::entities::{Certificate, Challenge, HttpResponder, Settings, ValidationMethod};
use certpilot_common::{LifecycleError, LifecycleResult};
use dns::DnsChallengeProvisioner;
use http::HttpChallengeProvisioner;

/// 已准备好的 challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedChallenge {
    pub args: ChallengeArgs,
    pub env: Vec<(String, String)>,
    /// 客户端退出后需要清除临时转发规则
    pub redirect_installed: bool,
}

/// 按验证方式分派到对应的准备逻辑
pub struct ChallengeProvisioner {
    layout: AcmeLayout,
    http: HttpChallengeProvisioner,
    dns: DnsChallengeProvisioner,
}

impl ChallengeProvisioner {
    pub fn new(layout: AcmeLayout, http: HttpChallengeProvisioner) -> Self {
        Self {
            layout,
            http,
            dns: DnsChallengeProvisioner,
        }
    }

    pub async fn prepare(
        &self,
        cert: &Certificate,
        method: &ValidationMethod,
        settings: &Settings,
    ) -> LifecycleResult<PreparedChallenge> {
        let scratch_dir = self.layout.config_dir(cert.id);
        match &method.challenge {
            Challenge::Http01(http) => {
                let redirect_installed = http.responder == HttpResponder::Internal;
                if redirect_installed {
                    self.http.install(cert, http, settings, &scratch_dir).await?;
                }
                Ok(PreparedChallenge {
                    args: ChallengeArgs::Webroot(self.layout.challenges()),
                    env: Vec::new(),
                    redirect_installed,
                })
            }
            Challenge::Dns01(dns) => {
                let prepared = self.dns.prepare(dns, &scratch_dir)?;
                Ok(PreparedChallenge {
                    args: ChallengeArgs::Dns {
                        provider: prepared.provider,
                        sleep_secs: prepared.sleep_secs,
                    },
                    env: prepared.env,
                    redirect_installed: false,
                })
            }
            Challenge::Unsupported => Err(LifecycleError::configuration(format!(
                "invalid validation method specified for {}",
                method.name
            ))),
        }
    }

    /// 客户端退出后调用，不论成功与否
    pub async fn cleanup(&self, prepared: &PreparedChallenge) {
        if prepared.redirect_installed {
            self.http.flush().await;
        }
    }
}
