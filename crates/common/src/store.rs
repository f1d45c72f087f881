use crate::document::{ConfigDocument, Entity};
use crate::entities::Settings;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// 配置仓库
///
/// 组件通过显式传入的仓库读写实体，不依赖进程级单例。`save_all` 整体重写文档，
/// 没有乐观并发检查，多个进程同时运行需要由调用方串行化。
#[derive(Clone)]
pub struct ConfigStore {
    current: Arc<RwLock<ConfigDocument>>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// 仅存在于内存中的仓库，`save_all` 不落盘
    pub fn in_memory(document: ConfigDocument) -> Self {
        Self {
            current: Arc::new(RwLock::new(document)),
            path: None,
        }
    }

    /// 从 JSON 文件加载仓库
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        let document: ConfigDocument = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse configuration {}", path.display()))?;
        Ok(Self {
            current: Arc::new(RwLock::new(document)),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn document(&self) -> ConfigDocument {
        self.current.read().await.clone()
    }

    pub async fn settings(&self) -> Settings {
        self.current.read().await.settings.clone()
    }

    pub async fn get<E: Entity>(&self, key: &E::Key) -> Option<E> {
        self.current.read().await.get::<E>(key).cloned()
    }

    pub async fn all<E: Entity>(&self) -> Vec<E> {
        E::table(&*self.current.read().await).to_vec()
    }

    pub async fn upsert<E: Entity>(&self, entity: E) {
        self.current.write().await.upsert(entity);
    }

    /// 整体重写配置文件：先写临时文件再原子替换
    pub async fn save_all(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = {
            let document = self.current.read().await;
            serde_json::to_vec_pretty(&*document)?
        };
        write_atomic(path, &json)?;
        debug!("configuration saved to {}", path.display());
        Ok(())
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(&tmp)
        .with_context(|| format!("failed to open {}", tmp.display()))?;
    file.write_all(content)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Account, StoredCertificate};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn make_account(name: &str) -> Account {
        Account {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: None,
            key: None,
            last_update: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_entity() {
        let store = ConfigStore::in_memory(ConfigDocument::default());
        let mut account = make_account("primary");
        store.upsert(account.clone()).await;

        account.email = Some("ops@example.com".to_string());
        store.upsert(account.clone()).await;

        let accounts = store.all::<Account>().await;
        assert_eq!(accounts.len(), 1);
        assert_eq!(
            store.get::<Account>(&account.id).await.unwrap().email.as_deref(),
            Some("ops@example.com")
        );
    }

    #[tokio::test]
    async fn test_lookup_by_string_key() {
        let store = ConfigStore::in_memory(ConfigDocument::default());
        store
            .upsert(StoredCertificate {
                refid: "abc123".to_string(),
                descr: "a.example.com (ACME)".to_string(),
                serial: String::new(),
                not_after: None,
                crt: String::new(),
                prv: String::new(),
            })
            .await;
        assert!(store.get::<StoredCertificate>(&"abc123".to_string()).await.is_some());
        assert!(store.get::<StoredCertificate>(&"missing".to_string()).await.is_none());
    }

    #[tokio::test]
    async fn test_save_all_rewrites_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{}").unwrap();

        let store = ConfigStore::open(&path).unwrap();
        let account = make_account("primary");
        store.upsert(account.clone()).await;
        store.save_all().await.unwrap();

        let reopened = ConfigStore::open(&path).unwrap();
        assert_eq!(reopened.get::<Account>(&account.id).await, Some(account));
        assert!(!dir.path().join("config.json.tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_in_memory_save_is_noop() {
        let store = ConfigStore::in_memory(ConfigDocument::default());
        assert!(store.path().is_none());
        store.save_all().await.unwrap();
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(ConfigStore::open(dir.path().join("absent.json")).is_err());
    }
}
