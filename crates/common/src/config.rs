use anyhow::{Result, anyhow};
use std::env;
use std::path::PathBuf;

const DEFAULT_PROCESS_PATH: &str =
    "/sbin:/bin:/usr/sbin:/usr/bin:/usr/games:/usr/local/sbin:/usr/local/bin";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub agent_path: PathBuf,
    pub agent_log_file: PathBuf,
    pub agent_timeout_secs: Option<u64>,
    pub key_length: u32,
    pub account_key_length: u32,
    pub staging: bool,
    pub process_path: String,
    pub firewall_bin: PathBuf,
    pub firewall_anchor: String,
    pub service_bin: PathBuf,
    pub restart_timeout_secs: u64,
    pub metrics_textfile: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        // Load .env early so process env reads pick it up.
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_dir = var("ACME_BASE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/var/etc/acme-client"));
        let config_path = var("ACME_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dir.join("config.json"));
        let agent_path = var("ACME_AGENT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/usr/local/share/acme.sh/acme.sh"));
        let agent_log_file = var("ACME_AGENT_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/var/log/acme.sh.log"));
        let agent_timeout_secs = var("ACME_AGENT_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0);

        let key_length = parse_or(var("ACME_KEY_LENGTH"), 4096);
        let account_key_length = parse_or(var("ACME_ACCOUNT_KEY_LENGTH"), 4096);
        let staging = var("ACME_STAGING")
            .map(|v| is_truthy(&v))
            .unwrap_or(false);
        let process_path =
            var("ACME_PROCESS_PATH").unwrap_or_else(|| DEFAULT_PROCESS_PATH.to_string());

        let firewall_bin = var("ACME_FIREWALL_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/sbin/pfctl"));
        let firewall_anchor =
            var("ACME_FIREWALL_ANCHOR").unwrap_or_else(|| "acme-client".to_string());
        let service_bin = var("ACME_SERVICE_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/usr/local/sbin/configctl"));

        let restart_timeout_secs = parse_or(var("ACME_RESTART_TIMEOUT_SECS"), 600u64);
        if restart_timeout_secs == 0 {
            return Err(anyhow!("ACME_RESTART_TIMEOUT_SECS must be greater than zero"));
        }
        let metrics_textfile = var("ACME_METRICS_TEXTFILE").map(PathBuf::from);

        Ok(Self {
            base_dir,
            config_path,
            agent_path,
            agent_log_file,
            agent_timeout_secs,
            key_length,
            account_key_length,
            staging,
            process_path,
            firewall_bin,
            firewall_anchor,
            service_bin,
            restart_timeout_secs,
            metrics_textfile,
        })
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES")
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}
