//! DNS-01 服务商凭据映射
//!
//! 新增服务商只需要在 `PROVIDERS` 中添加一项。

use crate::layout::write_private_file;
use certpilot_common::entities::DnsChallenge;
use certpilot_common::{LifecycleError, LifecycleResult};
use std::path::Path;
use tracing::debug;

/// 已知传播较慢的服务商的最小等待时间（秒）
const SLOW_PROPAGATION_SECS: u32 = 960;

/// 等待时间下限
#[derive(Debug, Clone, Copy)]
enum SleepFloor {
    None,
    Always(u32),
    /// 凭据字段等于指定值时生效
    WhenField {
        field: &'static str,
        value: &'static str,
        secs: u32,
    },
}

/// 写入证书配置目录的密钥文件，路径通过环境变量传给客户端
#[derive(Debug, Clone, Copy)]
struct SecretFile {
    field: &'static str,
    file_name: &'static str,
    env: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ProviderSpec {
    pub id: &'static str,
    /// (环境变量, 凭据字段)
    vars: &'static [(&'static str, &'static str)],
    sleep_floor: SleepFloor,
    secret: Option<SecretFile>,
}

impl ProviderSpec {
    const fn new(id: &'static str, vars: &'static [(&'static str, &'static str)]) -> Self {
        Self {
            id,
            vars,
            sleep_floor: SleepFloor::None,
            secret: None,
        }
    }

    const fn sleep_floor(mut self, floor: SleepFloor) -> Self {
        self.sleep_floor = floor;
        self
    }

    const fn secret(mut self, secret: SecretFile) -> Self {
        self.secret = Some(secret);
        self
    }

    fn effective_sleep(&self, dns: &DnsChallenge) -> u32 {
        let floor = match self.sleep_floor {
            SleepFloor::None => 0,
            SleepFloor::Always(secs) => secs,
            SleepFloor::WhenField { field, value, secs } => {
                if dns.credential(field) == value {
                    secs
                } else {
                    0
                }
            }
        };
        dns.sleep_secs.max(floor)
    }
}

static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec::new("dns_ad", &[("AD_API_KEY", "dns_ad_key")]),
    ProviderSpec::new(
        "dns_ali",
        &[("Ali_Key", "dns_ali_key"), ("Ali_Secret", "dns_ali_secret")],
    ),
    ProviderSpec::new(
        "dns_aws",
        &[
            ("AWS_ACCESS_KEY_ID", "dns_aws_id"),
            ("AWS_SECRET_ACCESS_KEY", "dns_aws_secret"),
        ],
    ),
    ProviderSpec::new(
        "dns_cf",
        &[("CF_Key", "dns_cf_key"), ("CF_Email", "dns_cf_email")],
    ),
    ProviderSpec::new(
        "dns_cx",
        &[("CX_Key", "dns_cx_key"), ("CX_Secret", "dns_cx_secret")],
    ),
    ProviderSpec::new(
        "dns_cyon",
        &[
            ("CY_Username", "dns_cyon_user"),
            ("CY_Password", "dns_cyon_password"),
        ],
    ),
    ProviderSpec::new(
        "dns_do",
        &[("DO_PID", "dns_do_pid"), ("DO_PW", "dns_do_password")],
    ),
    ProviderSpec::new("dns_dp", &[("DP_Id", "dns_dp_id"), ("DP_Key", "dns_dp_key")]),
    ProviderSpec::new(
        "dns_freedns",
        &[
            ("FREEDNS_User", "dns_freedns_user"),
            ("FREEDNS_Password", "dns_freedns_password"),
        ],
    ),
    ProviderSpec::new(
        "dns_gandi_livedns",
        &[("GANDI_LIVEDNS_KEY", "dns_gandi_livedns_key")],
    ),
    ProviderSpec::new("dns_gd", &[("GD_Key", "dns_gd_key"), ("GD_Secret", "dns_gd_secret")]),
    ProviderSpec::new(
        "dns_ispconfig",
        &[
            ("ISPC_User", "dns_ispconfig_user"),
            ("ISPC_Password", "dns_ispconfig_password"),
            ("ISPC_Api", "dns_ispconfig_api"),
            ("ISPC_Api_Insecure", "dns_ispconfig_insecure"),
        ],
    ),
    ProviderSpec::new(
        "dns_lexicon",
        &[
            ("PROVIDER", "dns_lexicon_provider"),
            ("LEXICON_CLOUDFLARE_USERNAME", "dns_lexicon_user"),
            ("LEXICON_CLOUDFLARE_TOKEN", "dns_lexicon_token"),
            ("LEXICON_NAMESILO_TOKEN", "dns_lexicon_token"),
        ],
    )
    .sleep_floor(SleepFloor::WhenField {
        field: "dns_lexicon_provider",
        value: "namesilo",
        secs: SLOW_PROPAGATION_SECS,
    }),
    ProviderSpec::new("dns_linode", &[("LINODE_API_KEY", "dns_linode_key")])
        .sleep_floor(SleepFloor::Always(SLOW_PROPAGATION_SECS)),
    ProviderSpec::new(
        "dns_lua",
        &[("LUA_Key", "dns_lua_key"), ("LUA_Email", "dns_lua_email")],
    ),
    ProviderSpec::new("dns_me", &[("ME_Key", "dns_me_key"), ("ME_Secret", "dns_me_secret")]),
    ProviderSpec::new("dns_nsupdate", &[("NSUPDATE_SERVER", "dns_nsupdate_server")]).secret(
        SecretFile {
            field: "dns_nsupdate_key",
            file_name: "secret.key",
            env: "NSUPDATE_KEY",
        },
    ),
    ProviderSpec::new(
        "dns_ovh",
        &[
            ("OVH_AK", "dns_ovh_app_key"),
            ("OVH_AS", "dns_ovh_app_secret"),
            ("OVH_CK", "dns_ovh_consumer_key"),
            ("OVH_END_POINT", "dns_ovh_endpoint"),
        ],
    ),
    ProviderSpec::new(
        "dns_pdns",
        &[
            ("PDNS_Url", "dns_pdns_url"),
            ("PDNS_ServerId", "dns_pdns_serverid"),
            ("PDNS_Token", "dns_pdns_token"),
        ],
    ),
];

pub fn lookup_provider(id: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|p| p.id == id)
}

/// 客户端调用所需的 DNS 参数和环境变量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDns {
    pub provider: String,
    pub sleep_secs: u32,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DnsChallengeProvisioner;

impl DnsChallengeProvisioner {
    /// 空凭据原样传递，由客户端自行报告失败
    pub fn prepare(&self, dns: &DnsChallenge, scratch_dir: &Path) -> LifecycleResult<PreparedDns> {
        let provider = lookup_provider(dns.provider.trim()).ok_or_else(|| {
            LifecycleError::configuration(format!(
                "invalid DNS-01 service specified: {}",
                dns.provider
            ))
        })?;

        let mut env: Vec<(String, String)> = provider
            .vars
            .iter()
            .map(|(var, field)| (var.to_string(), dns.credential(field).to_string()))
            .collect();

        if let Some(secret) = provider.secret {
            let path = scratch_dir.join(secret.file_name);
            let content = format!("{}\n", dns.credential(secret.field));
            write_private_file(&path, content.as_bytes()).map_err(|err| {
                LifecycleError::validation(format!("failed to write {}: {}", path.display(), err))
            })?;
            env.push((secret.env.to_string(), path.display().to_string()));
        }

        let sleep_secs = provider.effective_sleep(dns);
        debug!(provider = provider.id, sleep_secs, "dns challenge prepared");

        Ok(PreparedDns {
            provider: provider.id.to_string(),
            sleep_secs,
            env,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashSet};
    use std::fs;
    use tempfile::TempDir;

    fn dns(provider: &str, sleep_secs: u32, fields: &[(&str, &str)]) -> DnsChallenge {
        DnsChallenge {
            provider: provider.to_string(),
            sleep_secs,
            credentials: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_provider_ids_are_unique() {
        let ids: HashSet<&str> = PROVIDERS.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), PROVIDERS.len());
        assert_eq!(PROVIDERS.len(), 19);
    }

    #[test]
    fn test_empty_credentials_are_passed_through() {
        let dir = TempDir::new().unwrap();
        let prepared = DnsChallengeProvisioner
            .prepare(&dns("dns_do", 0, &[("dns_do_pid", ""), ("dns_do_password", "")]), dir.path())
            .unwrap();
        assert_eq!(
            prepared.env,
            vec![
                ("DO_PID".to_string(), String::new()),
                ("DO_PW".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_cyon_password_uses_password_field() {
        let dir = TempDir::new().unwrap();
        let prepared = DnsChallengeProvisioner
            .prepare(
                &dns(
                    "dns_cyon",
                    0,
                    &[("dns_cyon_user", "alice"), ("dns_cyon_password", "hunter2")],
                ),
                dir.path(),
            )
            .unwrap();
        assert!(prepared.env.contains(&("CY_Password".to_string(), "hunter2".to_string())));
    }

    #[test]
    fn test_unknown_provider_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let err = DnsChallengeProvisioner
            .prepare(&dns("dns_unknown", 0, &[]), dir.path())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_sleep_floors() {
        let dir = TempDir::new().unwrap();
        let linode = DnsChallengeProvisioner
            .prepare(&dns("dns_linode", 120, &[]), dir.path())
            .unwrap();
        assert_eq!(linode.sleep_secs, 960);

        let namesilo = DnsChallengeProvisioner
            .prepare(
                &dns("dns_lexicon", 0, &[("dns_lexicon_provider", "namesilo")]),
                dir.path(),
            )
            .unwrap();
        assert_eq!(namesilo.sleep_secs, 960);

        let cloudflare = DnsChallengeProvisioner
            .prepare(
                &dns("dns_lexicon", 30, &[("dns_lexicon_provider", "cloudflare")]),
                dir.path(),
            )
            .unwrap();
        assert_eq!(cloudflare.sleep_secs, 30, "非 namesilo 时使用配置的等待时间");
    }

    #[test]
    fn test_nsupdate_writes_secret_file() {
        let dir = TempDir::new().unwrap();
        let prepared = DnsChallengeProvisioner
            .prepare(
                &dns(
                    "dns_nsupdate",
                    0,
                    &[
                        ("dns_nsupdate_key", "key \"acme\" { secret \"abc\"; };"),
                        ("dns_nsupdate_server", "ns1.example.com"),
                    ],
                ),
                dir.path(),
            )
            .unwrap();

        let path = dir.path().join("secret.key");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "key \"acme\" { secret \"abc\"; };\n"
        );
        assert!(
            prepared
                .env
                .contains(&("NSUPDATE_KEY".to_string(), path.display().to_string()))
        );
        assert!(
            prepared
                .env
                .contains(&("NSUPDATE_SERVER".to_string(), "ns1.example.com".to_string()))
        );
    }
}
