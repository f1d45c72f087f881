use crate::layout::AcmeLayout;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use certpilot_common::entities::{Certificate, StoredCertificate};
use certpilot_common::{ConfigStore, LifecycleError, LifecycleResult};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use x509_parser::pem::parse_x509_pem;

/// 主机证书库
#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn find(&self, refid: &str) -> Option<StoredCertificate>;
    async fn upsert_certificate(&self, entry: StoredCertificate) -> Result<()>;
}

#[async_trait]
impl CertificateStore for ConfigStore {
    async fn find(&self, refid: &str) -> Option<StoredCertificate> {
        self.get::<StoredCertificate>(&refid.to_string()).await
    }

    async fn upsert_certificate(&self, entry: StoredCertificate) -> Result<()> {
        self.upsert(entry).await;
        self.save_all().await
    }
}

/// 从 PEM 证书中提取的描述信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub common_name: String,
    pub serial: String,
    pub not_after: DateTime<Utc>,
}

pub fn summarize_pem(pem: &str) -> Result<CertificateSummary> {
    let (_, pem) = parse_x509_pem(pem.as_bytes())?;
    let cert = pem.parse_x509()?;
    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();
    let not_after = cert.validity().not_after.to_datetime();
    let not_after = DateTime::<Utc>::from_timestamp(not_after.unix_timestamp(), not_after.nanosecond())
        .ok_or_else(|| anyhow!("invalid certificate timestamp"))?;
    Ok(CertificateSummary {
        common_name,
        serial: cert.raw_serial_as_string(),
        not_after,
    })
}

pub struct CertificateImporter {
    store: ConfigStore,
    cert_store: Arc<dyn CertificateStore>,
    layout: AcmeLayout,
}

impl CertificateImporter {
    pub fn new(store: ConfigStore, cert_store: Arc<dyn CertificateStore>, layout: AcmeLayout) -> Self {
        Self {
            store,
            cert_store,
            layout,
        }
    }

    /// 把客户端输出的证书导入证书库。已导入且仍存在的条目原地更新，保持引用 id 不变。
    pub async fn import(&self, cert: &Certificate) -> LifecycleResult<Certificate> {
        let leaf = read_material(&self.layout.cert_file(cert.id))?;
        let key = read_material(&self.layout.private_key(cert.id))?;
        let fullchain = read_material(&self.layout.fullchain_file(cert.id))?;

        let summary = summarize_pem(&leaf).map_err(|err| {
            LifecycleError::import(format!("unable to parse certificate for {}: {:#}", cert.name, err))
        })?;
        let label = if summary.common_name.is_empty() {
            cert.name.as_str()
        } else {
            summary.common_name.as_str()
        };

        let existing = match cert.cert_ref_id.as_deref() {
            Some(refid) => self.cert_store.find(refid).await.map(|e| e.refid),
            None => None,
        };
        let updating = existing.is_some();
        let refid = existing.unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        self.cert_store
            .upsert_certificate(StoredCertificate {
                refid: refid.clone(),
                descr: format!("{} (ACME)", label),
                serial: summary.serial.clone(),
                not_after: Some(summary.not_after),
                crt: fullchain,
                prv: key,
            })
            .await
            .map_err(|err| LifecycleError::import(format!("certificate store rejected entry: {:#}", err)))?;

        let mut updated = cert.clone();
        updated.cert_ref_id = Some(refid.clone());
        updated.last_update = Some(Utc::now());
        self.store.upsert(updated.clone()).await;
        self.store
            .save_all()
            .await
            .map_err(|err| LifecycleError::import(format!("{:#}", err)))?;

        info!(
            certificate = %cert.name,
            refid = %refid,
            serial = %summary.serial,
            "{} ACME certificate: {}",
            if updating { "Updated" } else { "Imported" },
            label
        );
        Ok(updated)
    }
}

fn read_material(path: &Path) -> LifecycleResult<String> {
    fs::read_to_string(path).map_err(|err| {
        LifecycleError::import(format!("unable to read {}: {}", path.display(), err))
    })
}
