//! 配置检查模块
//!
//! 在调用 ACME 客户端之前发现配置问题，供命令行 `--check` 和编排器共享使用。

use crate::document::ConfigDocument;
use crate::entities::{Account, MAX_RENEW_INTERVAL_DAYS, RestartAction, ValidationMethod};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use uuid::Uuid;

const MAX_DOMAIN_LENGTH: usize = 253;

fn domain_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^(\*\.)?([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$",
            )
            .ok()
        })
        .as_ref()
}

/// 检查域名是否可以安全地交给 ACME 客户端，通配符只允许出现在最左侧
pub fn is_valid_domain(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_DOMAIN_LENGTH {
        return false;
    }
    domain_regex().is_some_and(|re| re.is_match(name))
}

/// 配置问题类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssue {
    /// 非法域名
    InvalidDomain { certificate: Uuid, name: String },

    /// 引用的账户不存在
    MissingAccount { certificate: Uuid, account: Uuid },

    /// 引用的验证方式不存在
    MissingValidation { certificate: Uuid, validation: Uuid },

    /// 引用的重启动作不存在
    MissingRestartAction { certificate: Uuid, action: Uuid },

    /// 续期间隔为 0 或超过上限
    InvalidRenewInterval { certificate: Uuid },

    /// configd/自定义动作缺少命令
    EmptyActionCommand { action: Uuid, kind: &'static str },

    /// 重复的 id
    DuplicateId { id: Uuid },
}

impl ConfigIssue {
    /// 获取问题的详细描述
    pub fn description(&self) -> String {
        match self {
            Self::InvalidDomain { certificate, name } => {
                format!("certificate {} has invalid domain name '{}'", certificate, name)
            }
            Self::MissingAccount {
                certificate,
                account,
            } => {
                format!("certificate {} references missing account {}", certificate, account)
            }
            Self::MissingValidation {
                certificate,
                validation,
            } => {
                format!(
                    "certificate {} references missing validation method {}",
                    certificate, validation
                )
            }
            Self::MissingRestartAction {
                certificate,
                action,
            } => {
                format!(
                    "certificate {} references missing restart action {}",
                    certificate, action
                )
            }
            Self::InvalidRenewInterval { certificate } => {
                format!(
                    "certificate {} renew interval must be between 1 and {} days",
                    certificate, MAX_RENEW_INTERVAL_DAYS
                )
            }
            Self::EmptyActionCommand { action, kind } => {
                format!("restart action {} of type {} has no command", action, kind)
            }
            Self::DuplicateId { id } => format!("duplicate id {}", id),
        }
    }
}

/// 检查上下文
#[derive(Default)]
pub struct ValidationContext;

impl ValidationContext {
    pub fn new() -> Self {
        Self
    }

    /// 检查完整配置文档
    pub fn validate_document(&self, doc: &ConfigDocument) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        self.check_unique_ids(doc, &mut issues);
        self.check_certificates(doc, &mut issues);
        self.check_actions(doc, &mut issues);
        issues
    }

    fn check_unique_ids(&self, doc: &ConfigDocument, issues: &mut Vec<ConfigIssue>) {
        let mut seen: HashSet<Uuid> = HashSet::new();
        let ids = doc
            .accounts
            .iter()
            .map(|a| a.id)
            .chain(doc.certificates.iter().map(|c| c.id))
            .chain(doc.validations.iter().map(|v| v.id))
            .chain(doc.actions.iter().map(|a| a.id));
        for id in ids {
            if !seen.insert(id) {
                issues.push(ConfigIssue::DuplicateId { id });
            }
        }
    }

    fn check_certificates(&self, doc: &ConfigDocument, issues: &mut Vec<ConfigIssue>) {
        for cert in &doc.certificates {
            for name in cert.domains() {
                if !is_valid_domain(name) {
                    issues.push(ConfigIssue::InvalidDomain {
                        certificate: cert.id,
                        name: name.to_string(),
                    });
                }
            }

            if doc.get::<Account>(&cert.account).is_none() {
                issues.push(ConfigIssue::MissingAccount {
                    certificate: cert.id,
                    account: cert.account,
                });
            }

            if doc.get::<ValidationMethod>(&cert.validation_method).is_none() {
                issues.push(ConfigIssue::MissingValidation {
                    certificate: cert.id,
                    validation: cert.validation_method,
                });
            }

            for action in &cert.restart_actions {
                if doc.get::<RestartAction>(action).is_none() {
                    issues.push(ConfigIssue::MissingRestartAction {
                        certificate: cert.id,
                        action: *action,
                    });
                }
            }

            if !cert.renew_interval_in_range() {
                issues.push(ConfigIssue::InvalidRenewInterval {
                    certificate: cert.id,
                });
            }
        }
    }

    fn check_actions(&self, doc: &ConfigDocument, issues: &mut Vec<ConfigIssue>) {
        for action in &doc.actions {
            if action.kind.requires_command() && action.command().is_none() {
                issues.push(ConfigIssue::EmptyActionCommand {
                    action: action.id,
                    kind: action.kind.as_str(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        Certificate, Challenge, HttpChallenge, RestartKind, StatusCode,
    };

    fn make_document() -> (ConfigDocument, Uuid) {
        let account = Account {
            id: Uuid::new_v4(),
            name: "primary".to_string(),
            email: None,
            key: None,
            last_update: None,
        };
        let validation = ValidationMethod {
            id: Uuid::new_v4(),
            name: "http".to_string(),
            challenge: Challenge::Http01(HttpChallenge::default()),
        };
        let cert = Certificate {
            id: Uuid::new_v4(),
            name: "a.example.com".to_string(),
            description: String::new(),
            alt_names: vec!["*.example.com".to_string()],
            account: account.id,
            validation_method: validation.id,
            enabled: true,
            renew_interval_days: 60,
            last_update: None,
            status_code: StatusCode::Pending,
            status_last_update: None,
            cert_ref_id: None,
            restart_actions: Vec::new(),
        };
        let cert_id = cert.id;
        let doc = ConfigDocument {
            accounts: vec![account],
            validations: vec![validation],
            certificates: vec![cert],
            ..Default::default()
        };
        (doc, cert_id)
    }

    #[test]
    fn test_valid_domains() {
        assert!(is_valid_domain("example.com"));
        assert!(is_valid_domain("a-b.example.co.uk"));
        assert!(is_valid_domain("*.example.com"));
        assert!(is_valid_domain("xn--bcher-kva.example"));
    }

    #[test]
    fn test_invalid_domains() {
        assert!(!is_valid_domain(""));
        assert!(!is_valid_domain("localhost"));
        assert!(!is_valid_domain("-bad.example.com"));
        assert!(!is_valid_domain("a.*.example.com"));
        assert!(!is_valid_domain("example.com; rm -rf /"));
        assert!(!is_valid_domain("exa mple.com"));
        assert!(!is_valid_domain(&format!("{}.com", "a".repeat(64))));
    }

    #[test]
    fn test_clean_document_has_no_issues() {
        let (doc, _) = make_document();
        let issues = ValidationContext::new().validate_document(&doc);
        assert!(issues.is_empty(), "合法配置不应有问题: {:?}", issues);
    }

    #[test]
    fn test_dangling_references_detected() {
        let (mut doc, cert_id) = make_document();
        doc.accounts.clear();
        doc.validations.clear();
        doc.certificates[0].restart_actions.push(Uuid::new_v4());

        let issues = ValidationContext::new().validate_document(&doc);
        assert_eq!(issues.len(), 3);
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::MissingAccount { certificate, .. } if *certificate == cert_id)));
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::MissingValidation { .. })));
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::MissingRestartAction { .. })));
    }

    #[test]
    fn test_invalid_domain_and_interval_detected() {
        let (mut doc, _) = make_document();
        doc.certificates[0].alt_names.push("bad name".to_string());
        doc.certificates[0].renew_interval_days = 0;

        let issues = ValidationContext::new().validate_document(&doc);
        assert!(issues.iter().any(
            |i| matches!(i, ConfigIssue::InvalidDomain { name, .. } if name == "bad name")
        ));
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::InvalidRenewInterval { .. })));
    }

    #[test]
    fn test_oversized_interval_detected() {
        let (mut doc, _) = make_document();
        doc.certificates[0].renew_interval_days = 200_000_000;

        let issues = ValidationContext::new().validate_document(&doc);
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::InvalidRenewInterval { .. })));
    }

    #[test]
    fn test_empty_action_command_detected() {
        let (mut doc, _) = make_document();
        doc.actions.push(RestartAction {
            id: Uuid::new_v4(),
            name: "reload".to_string(),
            kind: RestartKind::Custom,
            enabled: true,
            command: "   ".to_string(),
            timeout_secs: None,
        });
        doc.actions.push(RestartAction {
            id: Uuid::new_v4(),
            name: "gui".to_string(),
            kind: RestartKind::RestartGui,
            enabled: true,
            command: String::new(),
            timeout_secs: None,
        });

        let issues = ValidationContext::new().validate_document(&doc);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].description().contains("custom"));
    }

    #[test]
    fn test_duplicate_id_detected() {
        let (mut doc, _) = make_document();
        let mut copy = doc.accounts[0].clone();
        copy.name = "copy".to_string();
        doc.accounts.push(copy);

        let issues = ValidationContext::new().validate_document(&doc);
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::DuplicateId { .. })));
    }
}
