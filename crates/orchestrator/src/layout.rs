//! ACME 工作目录布局
//!
//! ```text
//! <base>/
//! ├── accounts/<account-id>/{account.conf,account.key}
//! ├── certs/<cert-id>/{cert.pem,chain.pem,fullchain.pem}
//! ├── keys/<cert-id>/private.key
//! ├── configs/<cert-id>/          # 防火墙规则文件、DNS 服务商密钥文件
//! ├── home/                       # ACME 客户端自身的状态目录
//! └── challenges/                 # HTTP-01 webroot
//! ```
//!
//! 所有目录按 id 命名，修改域名不会产生孤立文件。失败时不清理，下一次运行直接覆盖。

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcmeLayout {
    base: PathBuf,
}

impl AcmeLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn home(&self) -> PathBuf {
        self.base.join("home")
    }

    pub fn challenges(&self) -> PathBuf {
        self.base.join("challenges")
    }

    pub fn account_dir(&self, account: Uuid) -> PathBuf {
        self.base.join("accounts").join(account.to_string())
    }

    pub fn account_conf(&self, account: Uuid) -> PathBuf {
        self.account_dir(account).join("account.conf")
    }

    pub fn account_key(&self, account: Uuid) -> PathBuf {
        self.account_dir(account).join("account.key")
    }

    pub fn cert_dir(&self, cert: Uuid) -> PathBuf {
        self.base.join("certs").join(cert.to_string())
    }

    pub fn cert_file(&self, cert: Uuid) -> PathBuf {
        self.cert_dir(cert).join("cert.pem")
    }

    pub fn chain_file(&self, cert: Uuid) -> PathBuf {
        self.cert_dir(cert).join("chain.pem")
    }

    pub fn fullchain_file(&self, cert: Uuid) -> PathBuf {
        self.cert_dir(cert).join("fullchain.pem")
    }

    pub fn key_dir(&self, cert: Uuid) -> PathBuf {
        self.base.join("keys").join(cert.to_string())
    }

    pub fn private_key(&self, cert: Uuid) -> PathBuf {
        self.key_dir(cert).join("private.key")
    }

    pub fn config_dir(&self, cert: Uuid) -> PathBuf {
        self.base.join("configs").join(cert.to_string())
    }

    /// 按需创建证书相关的三个目录
    pub fn prepare_certificate_dirs(&self, cert: Uuid) -> io::Result<()> {
        for dir in [
            self.cert_dir(cert),
            self.key_dir(cert),
            self.config_dir(cert),
        ] {
            ensure_private_dir(&dir)?;
        }
        Ok(())
    }
}

/// 创建目录并设置为仅属主可访问 (0700)
pub fn ensure_private_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// 写入仅属主可读写的文件 (0600)，已存在的文件同样收紧权限
pub fn write_private_file(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(content)?;
    file.sync_all()
}
