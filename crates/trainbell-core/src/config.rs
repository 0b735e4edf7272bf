//! Trainbell configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::calendar::ReferenceCalendar;
use crate::error::{Result, TrainbellError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainbellConfig {
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
}

impl TrainbellConfig {
    /// Load config from the default path (~/.trainbell/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TrainbellError::Config(format!("Failed to read {}: {e}", path.display())))?;
        let config = Self::from_toml(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TrainbellError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Write config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| TrainbellError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the state machine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let rules = &self.rules;
        // Demote at <= min, promote at >= threshold: there must be a gap or
        // a slot sitting on the boundary flips back and forth.
        if rules.promotion_threshold <= rules.min_participants {
            return Err(TrainbellError::Config(format!(
                "rules.promotion_threshold ({}) must be greater than rules.min_participants ({})",
                rules.promotion_threshold, rules.min_participants
            )));
        }
        if rules.lookahead_days == 0 || rules.capacity_days == 0 {
            return Err(TrainbellError::Config(
                "rules.lookahead_days and rules.capacity_days must be at least 1".into(),
            ));
        }
        if self.schedule.job_timeout_secs == 0 {
            return Err(TrainbellError::Config("schedule.job_timeout_secs must be > 0".into()));
        }
        self.calendar()?;
        Ok(())
    }

    pub fn calendar(&self) -> Result<ReferenceCalendar> {
        ReferenceCalendar::parse(&self.schedule.utc_offset)
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Trainbell home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".trainbell")
    }
}

/// Thresholds of the slot state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Slots with this many participants or fewer are demoted.
    #[serde(default = "default_min_participants")]
    pub min_participants: usize,
    /// Demoted slots reaching this many participants are promoted back.
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: usize,
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: u32,
    #[serde(default = "default_capacity_days")]
    pub capacity_days: u32,
}

fn default_min_participants() -> usize { 2 }
fn default_promotion_threshold() -> usize { 3 }
fn default_lookahead_days() -> u32 { 2 }
fn default_capacity_days() -> u32 { 1 }

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            min_participants: default_min_participants(),
            promotion_threshold: default_promotion_threshold(),
            lookahead_days: default_lookahead_days(),
            capacity_days: default_capacity_days(),
        }
    }
}

/// When the daily checks fire and how long an invocation may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
    #[serde(default = "default_daily_cron")]
    pub lookahead_cron: String,
    #[serde(default = "default_daily_cron")]
    pub capacity_cron: String,
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_watch_interval_secs")]
    pub watch_interval_secs: u64,
    #[serde(default = "default_watch_batch")]
    pub watch_batch: usize,
    /// A change that keeps failing is dropped after this many attempts.
    #[serde(default = "default_max_change_attempts")]
    pub max_change_attempts: u32,
}

fn default_utc_offset() -> String { "+08:00".into() }
fn default_daily_cron() -> String { "0 18 * * *".into() }
fn default_job_timeout_secs() -> u64 { 60 }
fn default_tick_secs() -> u64 { 30 }
fn default_watch_interval_secs() -> u64 { 5 }
fn default_watch_batch() -> usize { 50 }
fn default_max_change_attempts() -> u32 { 5 }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            utc_offset: default_utc_offset(),
            lookahead_cron: default_daily_cron(),
            capacity_cron: default_daily_cron(),
            job_timeout_secs: default_job_timeout_secs(),
            tick_secs: default_tick_secs(),
            watch_interval_secs: default_watch_interval_secs(),
            watch_batch: default_watch_batch(),
            max_change_attempts: default_max_change_attempts(),
        }
    }
}

/// Record store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String { "~/.trainbell/slots.db".into() }

impl StoreConfig {
    /// Store path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Push channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// "fcm", "webhook" or "log".
    #[serde(default = "default_notify_target")]
    pub target: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_title")]
    pub title: String,
    /// Defaults to the service account key's `project_id`.
    #[serde(default)]
    pub fcm_project_id: String,
    /// Path of a service-account JSON key. Falls back to the
    /// GOOGLE_APPLICATION_CREDENTIALS env var when empty.
    #[serde(default)]
    pub fcm_service_account: String,
    /// Fixed bearer token, only when no service account is configured.
    /// Falls back to the TRAINBELL_FCM_TOKEN env var when empty.
    #[serde(default)]
    pub fcm_access_token: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub webhook_headers: Vec<(String, String)>,
}

fn default_notify_target() -> String { "log".into() }
fn default_topic() -> String { "trainingNotice".into() }
fn default_title() -> String { "訓練通知".into() }

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            target: default_notify_target(),
            topic: default_topic(),
            title: default_title(),
            fcm_project_id: String::new(),
            fcm_service_account: String::new(),
            fcm_access_token: String::new(),
            webhook_url: String::new(),
            webhook_headers: Vec::new(),
        }
    }
}

/// Notification bodies for the three transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    #[serde(default = "default_lookahead_message")]
    pub lookahead: String,
    #[serde(default = "default_shortfall_message")]
    pub shortfall: String,
    #[serde(default = "default_recovery_message")]
    pub recovery: String,
}

fn default_lookahead_message() -> String { "後天有訓練記得登記".into() }
fn default_shortfall_message() -> String { "明天人數不足改自主訓練".into() }
fn default_recovery_message() -> String { "已恢復訓練".into() }

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            lookahead: default_lookahead_message(),
            shortfall: default_shortfall_message(),
            recovery: default_recovery_message(),
        }
    }
}
