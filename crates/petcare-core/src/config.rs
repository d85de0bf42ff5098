use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHANNEL_ID: &str = "petcare.reminders.v3";
/// Tag carried by every timer installed by the current scheduling scheme.
pub const TIMER_TAG: &str = "petcare-reminder-v2";

/// Top-level config (petcare.toml + PETCARE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PetcareConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Timer engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the engine looks for due timers.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum number of timers claimed per tick.
    #[serde(default = "default_claim_batch")]
    pub claim_batch: usize,
    /// Delay before a fire that asked for a retry runs again.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    /// A timer is dropped after this many failed fire attempts.
    #[serde(default = "default_max_fire_attempts")]
    pub max_fire_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            claim_batch: default_claim_batch(),
            retry_backoff_secs: default_retry_backoff_secs(),
            max_fire_attempts: default_max_fire_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_channel_id")]
    pub channel_id: String,
    #[serde(default = "default_channel_name")]
    pub channel_name: String,
    #[serde(default = "default_channel_description")]
    pub description: String,
    /// Channels created by earlier releases; deleted at startup.
    #[serde(default = "default_legacy_channel_ids")]
    pub legacy_channel_ids: Vec<String>,
    /// Timer tags used by earlier scheduling schemes; cancelled at startup.
    #[serde(default = "default_legacy_timer_tags")]
    pub legacy_timer_tags: Vec<String>,
    /// Whether the user allowed visible notifications.
    /// Override with env var: PETCARE_NOTIFICATIONS__PERMISSION_GRANTED=false
    #[serde(default = "bool_true")]
    pub permission_granted: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_id: default_channel_id(),
            channel_name: default_channel_name(),
            description: default_channel_description(),
            legacy_channel_ids: default_legacy_channel_ids(),
            legacy_timer_tags: default_legacy_timer_tags(),
            permission_granted: true,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_claim_batch() -> usize {
    32
}
fn default_retry_backoff_secs() -> u64 {
    30
}
fn default_max_fire_attempts() -> u32 {
    5
}
fn default_channel_id() -> String {
    DEFAULT_CHANNEL_ID.to_string()
}
fn default_channel_name() -> String {
    "Reminders".to_string()
}
fn default_channel_description() -> String {
    "PetCare reminders".to_string()
}
fn default_legacy_channel_ids() -> Vec<String> {
    [
        "petcare.reminders",
        "PetCare Reminders",
        "reminders",
        "petcare-primary-ch",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_legacy_timer_tags() -> Vec<String> {
    vec!["petcare-reminder".to_string(), "legacy".to_string()]
}
fn default_db_path() -> String {
    format!("{}/petcare.db", data_dir())
}

fn data_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.petcare", home)
}

impl PetcareConfig {
    /// Load config from a TOML file with PETCARE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.petcare/petcare.toml
    ///
    /// Nested keys use a double underscore: `PETCARE_SCHEDULER__POLL_INTERVAL_MS=500`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: PetcareConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PETCARE_").split("__"))
            .extract()
            .map_err(|e| crate::error::PetcareError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    format!("{}/petcare.toml", data_dir())
}
