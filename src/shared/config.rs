//! Application configuration. Credentials, schedule, retention.
//!
//! `AppConfig` is the raw environment view; `Settings` is the validated, immutable value
//! handed to every constructor.

use crate::domain::DomainError;
use chrono::FixedOffset;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:///./data/bot_data.db";
pub const DEFAULT_RETENTION_HOURS: u32 = 48;
pub const DEFAULT_REPORT_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_REPORT_HOUR: u32 = 10;
pub const DEFAULT_CLEANUP_HOUR: u32 = 2;
pub const DEFAULT_AI_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_AI_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Pause between chats in a delivery run.
pub const STAGGER_DELAY: Duration = Duration::from_secs(5);
/// Wait after a generic channel error before the next attempt.
pub const RETRY_COOLDOWN: Duration = Duration::from_secs(60);
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;
/// Outbound message size limit, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub message_retention_hours: Option<u32>,
    #[serde(default)]
    pub report_retention_days: Option<u32>,
    #[serde(default)]
    pub report_time_hour: Option<u32>,
    #[serde(default)]
    pub cleanup_time_hour: Option<u32>,
    #[serde(default)]
    pub timezone: Option<String>,
    /// Only this user may run admin commands. 0 or unset = nobody.
    #[serde(default)]
    pub admin_user_id: Option<i64>,
    /// Escalation destination for failing report runs. 0 or unset = disabled.
    #[serde(default)]
    pub admin_chat_id: Option<i64>,

    // ─────────────────────────────────────────────────────────────────────────
    // Endpoints
    // ─────────────────────────────────────────────────────────────────────────
    #[serde(default)]
    pub ai_api_url: Option<String>,
    #[serde(default)]
    pub ai_model: Option<String>,
    #[serde(default)]
    pub telegram_api_url: Option<String>,
    #[serde(default)]
    pub health_port: Option<u16>,
}

impl AppConfig {
    /// Read the process environment (after `.env`), plus an optional file named by
    /// `TG_DIGEST_CONFIG`.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        if let Ok(path) = std::env::var("TG_DIGEST_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        c = c.add_source(config::Environment::default().try_parsing(true));
        c.build()?.try_deserialize()
    }
}

/// Validated configuration.
#[derive(Clone)]
pub struct Settings {
    pub telegram_bot_token: String,
    pub anthropic_api_key: String,
    pub database_path: PathBuf,
    pub log_level: String,
    pub message_retention_hours: u32,
    pub report_retention_days: u32,
    pub report_time_hour: u32,
    pub cleanup_time_hour: u32,
    pub timezone: String,
    pub utc_offset: FixedOffset,
    pub admin_user_id: Option<i64>,
    pub admin_chat_id: Option<i64>,
    pub ai_api_url: String,
    pub ai_model: String,
    pub telegram_api_url: String,
    pub health_port: u16,
}

impl Settings {
    /// Load from the environment and validate.
    pub fn load() -> Result<Self, DomainError> {
        let raw = AppConfig::load().map_err(|e| DomainError::Config(e.to_string()))?;
        Self::from_config(raw)
    }

    pub fn from_config(raw: AppConfig) -> Result<Self, DomainError> {
        let telegram_bot_token = required(raw.telegram_bot_token, "TELEGRAM_BOT_TOKEN")?;
        let anthropic_api_key = required(raw.anthropic_api_key, "ANTHROPIC_API_KEY")?;

        let report_time_hour = hour(raw.report_time_hour, DEFAULT_REPORT_HOUR, "REPORT_TIME_HOUR")?;
        let cleanup_time_hour =
            hour(raw.cleanup_time_hour, DEFAULT_CLEANUP_HOUR, "CLEANUP_TIME_HOUR")?;

        let message_retention_hours = raw
            .message_retention_hours
            .unwrap_or(DEFAULT_RETENTION_HOURS);
        if message_retention_hours == 0 {
            return Err(DomainError::Config(
                "MESSAGE_RETENTION_HOURS must be greater than 0".to_string(),
            ));
        }

        let timezone = raw
            .timezone
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "UTC".to_string());
        let utc_offset = parse_utc_offset(&timezone)?;

        let database_url = raw
            .database_url
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        Ok(Self {
            telegram_bot_token,
            anthropic_api_key,
            database_path: database_path(&database_url),
            log_level: raw.log_level.unwrap_or_else(|| "info".to_string()),
            message_retention_hours,
            report_retention_days: raw
                .report_retention_days
                .unwrap_or(DEFAULT_REPORT_RETENTION_DAYS),
            report_time_hour,
            cleanup_time_hour,
            timezone,
            utc_offset,
            admin_user_id: raw.admin_user_id.filter(|id| *id != 0),
            admin_chat_id: raw.admin_chat_id.filter(|id| *id != 0),
            ai_api_url: raw
                .ai_api_url
                .unwrap_or_else(|| DEFAULT_AI_API_URL.to_string()),
            ai_model: raw.ai_model.unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            telegram_api_url: raw
                .telegram_api_url
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string()),
            health_port: raw.health_port.unwrap_or(DEFAULT_HEALTH_PORT),
        })
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("telegram_bot_token", &"<redacted>")
            .field("anthropic_api_key", &"<redacted>")
            .field("database_path", &self.database_path)
            .field("log_level", &self.log_level)
            .field("message_retention_hours", &self.message_retention_hours)
            .field("report_retention_days", &self.report_retention_days)
            .field("report_time_hour", &self.report_time_hour)
            .field("cleanup_time_hour", &self.cleanup_time_hour)
            .field("timezone", &self.timezone)
            .field("admin_user_id", &self.admin_user_id)
            .field("admin_chat_id", &self.admin_chat_id)
            .field("ai_api_url", &self.ai_api_url)
            .field("ai_model", &self.ai_model)
            .field("telegram_api_url", &self.telegram_api_url)
            .field("health_port", &self.health_port)
            .finish()
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, DomainError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DomainError::Config(format!("{name} is required but not set")))
}

fn hour(value: Option<u32>, default: u32, name: &str) -> Result<u32, DomainError> {
    let h = value.unwrap_or(default);
    if h > 23 {
        return Err(DomainError::Config(format!("{name} must be 0-23, got {h}")));
    }
    Ok(h)
}

/// `sqlite:///./data/bot.db`, `sqlite://bot.db` and plain paths all map to a file path.
pub fn database_path(url: &str) -> PathBuf {
    let path = url
        .strip_prefix("sqlite:///")
        .or_else(|| url.strip_prefix("sqlite://"))
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    PathBuf::from(path)
}

/// Parse a fixed-offset timezone label: `UTC`, `GMT`, `Z`, `UTC+3`, `UTC-05:30`, `+0200`.
pub fn parse_utc_offset(label: &str) -> Result<FixedOffset, DomainError> {
    let invalid = || DomainError::Config(format!("unsupported TIMEZONE '{label}'"));
    let s = label.trim();
    let rest = s
        .strip_prefix("UTC")
        .or_else(|| s.strip_prefix("GMT"))
        .unwrap_or(s);
    if rest.is_empty() || rest == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, digits) = match rest.as_bytes()[0] {
        b'+' => (1, &rest[1..]),
        b'-' => (-1, &rest[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
