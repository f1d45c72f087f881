use crate::agent::{AcmeAgent, AgentFlags};
use crate::layout::{ensure_private_dir, write_private_file};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use certpilot_common::entities::Account;
use certpilot_common::{Action, ConfigStore, LifecycleError, LifecycleResult};
use chrono::Utc;
use std::fs;
use std::sync::Arc;
use tracing::{debug, info};

/// 账户准备：先确保账户密钥存在，再确保账户只注册一次
pub struct AccountRegistrar {
    store: ConfigStore,
    agent: Arc<AcmeAgent>,
}

impl AccountRegistrar {
    pub fn new(store: ConfigStore, agent: Arc<AcmeAgent>) -> Self {
        Self { store, agent }
    }

    /// 返回更新后的账户。吊销请求不会生成新密钥，也不会注册新账户。
    pub async fn ensure_registered(
        &self,
        account: &Account,
        action: Action,
        flags: AgentFlags,
    ) -> LifecycleResult<Account> {
        let mut account = account.clone();
        self.write_account_conf(&account)?;
        self.ensure_key(&mut account, action, flags).await?;
        self.ensure_registration(&mut account, action, flags).await?;
        Ok(account)
    }

    fn write_account_conf(&self, account: &Account) -> LifecycleResult<()> {
        let layout = self.agent.layout();
        let dir = layout.account_dir(account.id);
        let conf = layout.account_conf(account.id);

        let mut lines = vec![
            format!("CERT_HOME={}", shell_quote(&layout.home().display().to_string())),
            format!("LOG_FILE={}", shell_quote(&self.agent.log_file().display().to_string())),
            format!(
                "ACCOUNT_KEY_PATH={}",
                shell_quote(&layout.account_key(account.id).display().to_string())
            ),
        ];
        if let Some(email) = account.contact_email() {
            lines.push(format!("ACCOUNT_EMAIL={}", shell_quote(email)));
        }
        let mut content = lines.join("\n");
        content.push('\n');

        ensure_private_dir(&dir)
            .and_then(|_| write_private_file(&conf, content.as_bytes()))
            .map_err(|err| {
                LifecycleError::registration(format!(
                    "failed to write {}: {}",
                    conf.display(),
                    err
                ))
            })
    }

    async fn ensure_key(
        &self,
        account: &mut Account,
        action: Action,
        flags: AgentFlags,
    ) -> LifecycleResult<()> {
        let key_file = self.agent.layout().account_key(account.id);
        if key_file.is_file() {
            debug!(account = %account.id, "account key found");
            return Ok(());
        }

        if let Some(stored) = account.stored_key() {
            let key = STANDARD.decode(stored).map_err(|err| {
                LifecycleError::registration(format!("stored account key is not valid base64: {}", err))
            })?;
            write_private_file(&key_file, &key).map_err(|err| {
                LifecycleError::registration(format!(
                    "failed to write {}: {}",
                    key_file.display(),
                    err
                ))
            })?;
            debug!(account = %account.id, "exported stored account key");
            return Ok(());
        }

        if action == Action::Revoke {
            return Err(LifecycleError::registration(
                "account key not found, but a revocation was requested",
            ));
        }

        let spec = self.agent.create_account_key_command(account.id, flags);
        let output = self
            .agent
            .run("create_account_key", &spec)
            .await
            .map_err(|err| LifecycleError::registration(format!("{:#}", err)))?;
        if !output.success() {
            return Err(LifecycleError::registration(format!(
                "failed to create a new account key (code {})",
                output.code()
            )));
        }

        let generated = fs::read(&key_file).map_err(|err| {
            LifecycleError::registration(format!(
                "unable to read account key from {}: {}",
                key_file.display(),
                err
            ))
        })?;
        account.key = Some(STANDARD.encode(generated));
        self.store.upsert(account.clone()).await;
        self.store
            .save_all()
            .await
            .map_err(|err| LifecycleError::registration(format!("failed to save account: {:#}", err)))?;
        info!(account = %account.id, "created a new account key");
        Ok(())
    }

    async fn ensure_registration(
        &self,
        account: &mut Account,
        action: Action,
        flags: AgentFlags,
    ) -> LifecycleResult<()> {
        if account.is_registered() {
            debug!(account = %account.id, "account already registered");
            return Ok(());
        }

        if action == Action::Revoke {
            return Err(LifecycleError::registration(
                "account not registered, but a revocation was requested",
            ));
        }

        let spec = self.agent.register_account_command(account.id, flags);
        let output = self
            .agent
            .run("register_account", &spec)
            .await
            .map_err(|err| LifecycleError::registration(format!("{:#}", err)))?;
        if !output.success() {
            return Err(LifecycleError::registration(format!(
                "failed to register account (code {})",
                output.code()
            )));
        }

        account.last_update = Some(Utc::now());
        self.store.upsert(account.clone()).await;
        self.store
            .save_all()
            .await
            .map_err(|err| LifecycleError::registration(format!("failed to save account: {:#}", err)))?;
        info!(account = %account.id, name = %account.name, "registered account");
        Ok(())
    }
}

/// 单引号包裹，供客户端以 shell 方式读取配置文件
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}
