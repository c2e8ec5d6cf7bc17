use std::path::{Path, PathBuf};

use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
    #[error("Bot token missing: set BOT_TOKEN or bot_token in the config file")]
    MissingToken,
    #[error("Unknown timezone: {0}")]
    BadTimezone(String),
    #[error("Bad weekday in rotation schedule: {0}")]
    BadWeekday(String),
    #[error("Bad wall-clock time {hour:02}:{minute:02}")]
    BadTime { hour: u8, minute: u8 },
}

/// When the weekly rotation trigger fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyAt {
    #[serde(default = "default_rotation_weekday")]
    pub weekday: String,
    #[serde(default)]
    pub hour: u8,
    #[serde(default = "default_rotation_minute")]
    pub minute: u8,
}

fn default_rotation_weekday() -> String {
    "mon".to_string()
}

fn default_rotation_minute() -> u8 {
    5
}

impl Default for WeeklyAt {
    fn default() -> Self {
        Self {
            weekday: default_rotation_weekday(),
            hour: 0,
            minute: default_rotation_minute(),
        }
    }
}

impl WeeklyAt {
    pub fn weekday(&self) -> Result<Weekday, ConfigError> {
        self.weekday
            .parse()
            .map_err(|_| ConfigError::BadWeekday(self.weekday.clone()))
    }

    pub fn time(&self) -> Result<(u8, u8), ConfigError> {
        check_time(self.hour, self.minute)
    }
}

/// When the daily re-plan trigger fires. Must land after midnight and
/// before the earliest bell so the hour-before job is still plannable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyAt {
    #[serde(default = "default_replan_hour")]
    pub hour: u8,
    #[serde(default)]
    pub minute: u8,
}

fn default_replan_hour() -> u8 {
    5
}

impl Default for DailyAt {
    fn default() -> Self {
        Self {
            hour: default_replan_hour(),
            minute: 0,
        }
    }
}

impl DailyAt {
    pub fn time(&self) -> Result<(u8, u8), ConfigError> {
        check_time(self.hour, self.minute)
    }
}

fn check_time(hour: u8, minute: u8) -> Result<(u8, u8), ConfigError> {
    if hour > 23 || minute > 59 {
        return Err(ConfigError::BadTime { hour, minute });
    }
    Ok((hour, minute))
}

/// Top-level bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Telegram bot token; the BOT_TOKEN environment variable wins over
    /// this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    /// IANA timezone all scheduling math runs in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Directory holding practical.json / lecture.json / bells.json.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// SQLite database path; defaults to <config dir>/rozklad.db.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    /// Chat ids allowed to run /reload, /setweek and /autorotate.
    #[serde(default)]
    pub admins: Vec<i64>,
    #[serde(default)]
    pub rotation: WeeklyAt,
    #[serde(default)]
    pub daily_replan: DailyAt,
}

fn default_timezone() -> String {
    "Europe/Kyiv".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            timezone: default_timezone(),
            data_dir: default_data_dir(),
            db_path: None,
            admins: Vec::new(),
            rotation: WeeklyAt::default(),
            daily_replan: DailyAt::default(),
        }
    }
}

impl BotConfig {
    /// Resolve the bot token: environment first, then the config file.
    pub fn token(&self) -> Result<String, ConfigError> {
        if let Ok(token) = std::env::var("BOT_TOKEN") {
            if !token.is_empty() {
                return Ok(token);
            }
        }
        self.bot_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|_| ConfigError::BadTimezone(self.timezone.clone()))
    }

    /// Effective database path.
    pub fn db_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.db_path {
            Some(p) => Ok(p.clone()),
            None => Ok(ensure_config_dir()?.join("rozklad.db")),
        }
    }

    pub fn is_admin(&self, chat_id: i64) -> bool {
        self.admins.contains(&chat_id)
    }
}

/// Resolve the config directory (~/.rozklad/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".rozklad"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.rozklad/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<BotConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<BotConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(BotConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: BotConfig = json5::from_str(&content)?;
    Ok(config)
}

/// Ensure the config directory exists.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = config_dir()?;
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}
