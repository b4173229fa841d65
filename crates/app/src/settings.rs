//! Handles settings for the application. Configuration is read from an
//! optional `settings.toml` and from `KWH__*` environment variables, e.g.
//! `KWH__TELEGRAM__TOKEN`.

use config::{Config, ConfigError, Environment, File};
use engine::{Kwh, LedgerPolicy};
use serde::Deserialize;
use workflows::WorkflowSettings;

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    #[default]
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct Telegram {
    pub token: String,
    pub admin_chat_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Ledger {
    pub usage_ceiling: String,
    pub recharge_ceiling: String,
    pub low_balance_threshold: String,
    pub invite_expiry_days: i64,
    pub max_retries: u32,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            usage_ceiling: "10000".to_string(),
            recharge_ceiling: "10000".to_string(),
            low_balance_threshold: "20".to_string(),
            invite_expiry_days: 7,
            max_retries: 3,
        }
    }
}

impl Ledger {
    pub fn policy(&self) -> Result<LedgerPolicy, String> {
        let parse = |field: &str, raw: &str| {
            raw.parse::<Kwh>()
                .map_err(|err| format!("invalid ledger.{field} {raw:?}: {err}"))
        };
        if self.max_retries == 0 {
            return Err("ledger.max_retries must be at least 1".to_string());
        }
        Ok(LedgerPolicy {
            usage_ceiling: parse("usage_ceiling", &self.usage_ceiling)?,
            recharge_ceiling: parse("recharge_ceiling", &self.recharge_ceiling)?,
            low_balance_threshold: parse("low_balance_threshold", &self.low_balance_threshold)?,
            invite_expiry_days: self.invite_expiry_days,
            max_retries: self.max_retries,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Workflows {
    pub idle_timeout_secs: u64,
    pub reap_interval_secs: u64,
    pub invite_codes_enabled: bool,
    pub page_size: usize,
}

impl Default for Workflows {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            reap_interval_secs: 60 * 60,
            invite_codes_enabled: true,
            page_size: 10,
        }
    }
}

impl Workflows {
    pub fn settings(&self, admin_chat_id: Option<i64>) -> Result<WorkflowSettings, String> {
        if self.page_size == 0 {
            return Err("workflows.page_size must be at least 1".to_string());
        }
        if self.reap_interval_secs == 0 {
            return Err("workflows.reap_interval_secs must be at least 1".to_string());
        }
        let idle_timeout = i64::try_from(self.idle_timeout_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| "workflows.idle_timeout_secs is too large".to_string())?;
        Ok(WorkflowSettings {
            idle_timeout,
            reap_interval: std::time::Duration::from_secs(self.reap_interval_secs),
            invite_codes_enabled: self.invite_codes_enabled,
            page_size: self.page_size,
            admin_chat_id,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub database: Database,
    pub telegram: Option<Telegram>,
    #[serde(default)]
    pub ledger: Ledger,
    #[serde(default)]
    pub workflows: Workflows,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(
            Config::builder()
                .add_source(File::with_name("settings").required(false))
                .add_source(Environment::with_prefix("KWH").separator("__"))
                .build()?,
        )
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        config.try_deserialize()
    }
}
