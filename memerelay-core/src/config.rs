//! Configuration document and credentials.
//!
//! The document is deserialized into a lenient raw shape where every field has a
//! default, then validated once into [`Config`]. Feature toggles that are enabled
//! without their required settings are switched off with a warning, so the rest
//! of the relay only ever sees `Option<...Settings>`.

use crate::{ConfigError, SortMode, TopTimeFilter};
use chrono::NaiveTime;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_SEEN_POSTS_PATH: &str = "sent_posts.json";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub reddit: RedditSettings,
    pub filters: FilterSettings,
    pub delivery: DeliverySettings,
    pub schedule: ScheduleSettings,
    pub monitoring: MonitoringSettings,
    pub display: Option<DisplaySettings>,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedditSettings {
    pub subreddits: Vec<String>,
    pub sort_by: SortMode,
    pub top_time_filter: TopTimeFilter,
    pub limit: u32,
    pub min_score: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterSettings {
    pub image_only: bool,
    pub exclude_nsfw: bool,
    pub max_title_length: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliverySettings {
    pub max_posts_per_run: usize,
    pub send_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Interval(Duration),
    TimesOfDay(Vec<NaiveTime>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSettings {
    pub trigger: Trigger,
    pub run_on_startup: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringSettings {
    pub webhook: Option<WebhookSettings>,
    pub daily_report_hour: Option<u32>,
    pub stats_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookKind {
    #[default]
    Slack,
    Discord,
    Generic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookSettings {
    pub url: String,
    pub kind: WebhookKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum PanelModel {
    #[default]
    #[serde(rename = "epd2in13_V3")]
    Epd2in13V3,
    #[serde(rename = "epd2in7")]
    Epd2in7,
}

impl PanelModel {
    /// Landscape (width, height) in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            PanelModel::Epd2in13V3 => (250, 122),
            PanelModel::Epd2in7 => (264, 176),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PanelModel::Epd2in13V3 => "epd2in13_V3",
            PanelModel::Epd2in7 => "epd2in7",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySettings {
    pub model: PanelModel,
    pub frame_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageSettings {
    pub seen_posts_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
    pub debug: bool,
}

// Raw document shape. Everything is optional so partial documents load.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    reddit: RawReddit,
    filters: RawFilters,
    telegram: RawTelegram,
    schedule: RawSchedule,
    monitoring: RawMonitoring,
    display: RawDisplay,
    storage: RawStorage,
    logging: RawLogging,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawReddit {
    subreddits: Vec<String>,
    sort_by: String,
    top_time_filter: TopTimeFilter,
    limit: u32,
    min_score: i64,
}

impl Default for RawReddit {
    fn default() -> Self {
        Self {
            subreddits: vec!["memes".to_string()],
            sort_by: "hot".to_string(),
            top_time_filter: TopTimeFilter::Day,
            limit: 10,
            min_score: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawFilters {
    image_only: bool,
    exclude_nsfw: bool,
    max_title_length: usize,
}

impl Default for RawFilters {
    fn default() -> Self {
        Self {
            image_only: true,
            exclude_nsfw: true,
            max_title_length: 200,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawTelegram {
    max_posts_per_run: usize,
    send_delay_ms: u64,
}

impl Default for RawTelegram {
    fn default() -> Self {
        Self {
            max_posts_per_run: 10,
            send_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawSchedule {
    interval_hours: Option<u64>,
    interval_minutes: Option<u64>,
    times: Vec<String>,
    run_on_startup: bool,
}

impl Default for RawSchedule {
    fn default() -> Self {
        Self {
            interval_hours: None,
            interval_minutes: None,
            times: Vec::new(),
            run_on_startup: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawMonitoring {
    webhook: RawWebhook,
    daily_report_hour: Option<u32>,
    stats_path: Option<PathBuf>,
}

impl Default for RawMonitoring {
    fn default() -> Self {
        Self {
            webhook: RawWebhook::default(),
            daily_report_hour: Some(9),
            stats_path: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawWebhook {
    enabled: bool,
    url: Option<String>,
    #[serde(rename = "type")]
    kind: WebhookKind,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDisplay {
    enabled: bool,
    #[serde(rename = "type")]
    model: PanelModel,
    frame_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawStorage {
    seen_posts_path: PathBuf,
}

impl Default for RawStorage {
    fn default() -> Self {
        Self {
            seen_posts_path: PathBuf::from(DEFAULT_SEEN_POSTS_PATH),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawLogging {
    directory: Option<PathBuf>,
    file_prefix: String,
    debug: bool,
}

impl Default for RawLogging {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: "memerelay.log".to_string(),
            debug: false,
        }
    }
}

impl Config {
    /// Load and validate the document at `path`. `.toml` files are parsed as
    /// TOML, anything else as JSON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            ErrorKind::PermissionDenied => ConfigError::PermissionDenied {
                path: path.display().to_string(),
            },
            _ => ConfigError::InvalidFormat {
                details: format!("{}: {}", path.display(), e),
            },
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let config = if is_toml {
            Self::from_toml_str(&contents)?
        } else {
            Self::from_json_str(&contents)?
        };

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(contents)?;
        Self::validate(raw)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents)?;
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        let subreddits: Vec<String> = raw
            .reddit
            .subreddits
            .iter()
            .map(|name| name.trim().trim_start_matches("r/").to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if subreddits.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "reddit.subreddits must list at least one subreddit".to_string(),
            });
        }

        let sort_by = SortMode::parse(&raw.reddit.sort_by).unwrap_or_else(|| {
            warn!(
                "Unknown reddit.sort_by '{}', falling back to hot",
                raw.reddit.sort_by
            );
            SortMode::Hot
        });

        if raw.reddit.limit == 0 {
            return Err(invalid_value("reddit.limit", raw.reddit.limit));
        }
        if raw.reddit.min_score < 0 {
            return Err(invalid_value("reddit.min_score", raw.reddit.min_score));
        }
        if raw.telegram.max_posts_per_run == 0 {
            return Err(invalid_value(
                "telegram.max_posts_per_run",
                raw.telegram.max_posts_per_run,
            ));
        }

        let schedule = Self::validate_schedule(raw.schedule)?;
        let monitoring = Self::validate_monitoring(raw.monitoring)?;
        let display = Self::validate_display(raw.display);

        Ok(Self {
            reddit: RedditSettings {
                subreddits,
                sort_by,
                top_time_filter: raw.reddit.top_time_filter,
                limit: raw.reddit.limit,
                min_score: raw.reddit.min_score,
            },
            filters: FilterSettings {
                image_only: raw.filters.image_only,
                exclude_nsfw: raw.filters.exclude_nsfw,
                max_title_length: raw.filters.max_title_length,
            },
            delivery: DeliverySettings {
                max_posts_per_run: raw.telegram.max_posts_per_run,
                send_delay: Duration::from_millis(raw.telegram.send_delay_ms),
            },
            schedule,
            monitoring,
            display,
            storage: StorageSettings {
                seen_posts_path: raw.storage.seen_posts_path,
            },
            logging: LoggingSettings {
                directory: raw.logging.directory,
                file_prefix: raw.logging.file_prefix,
                debug: raw.logging.debug,
            },
        })
    }

    fn validate_schedule(raw: RawSchedule) -> Result<ScheduleSettings, ConfigError> {
        let trigger = if !raw.times.is_empty() {
            if raw.interval_hours.is_some() || raw.interval_minutes.is_some() {
                warn!("schedule.times is set, ignoring schedule.interval_*");
            }
            let mut times = raw
                .times
                .iter()
                .map(|value| {
                    NaiveTime::parse_from_str(value.trim(), "%H:%M")
                        .map_err(|_| invalid_value("schedule.times", value))
                })
                .collect::<Result<Vec<_>, _>>()?;
            times.sort();
            times.dedup();
            Trigger::TimesOfDay(times)
        } else {
            let interval = match (raw.interval_minutes, raw.interval_hours) {
                (Some(minutes), _) => Duration::from_secs(minutes * 60),
                (None, Some(hours)) => Duration::from_secs(hours * 3600),
                (None, None) => Duration::from_secs(3600),
            };
            if interval.is_zero() {
                return Err(ConfigError::ValidationFailed {
                    reason: "schedule interval must be positive".to_string(),
                });
            }
            Trigger::Interval(interval)
        };

        Ok(ScheduleSettings {
            trigger,
            run_on_startup: raw.run_on_startup,
        })
    }

    fn validate_monitoring(raw: RawMonitoring) -> Result<MonitoringSettings, ConfigError> {
        if let Some(hour) = raw.daily_report_hour {
            if hour > 23 {
                return Err(invalid_value("monitoring.daily_report_hour", hour));
            }
        }

        let webhook = if raw.webhook.enabled {
            match raw.webhook.url.map(|url| url.trim().to_string()) {
                Some(url) if !url.is_empty() => Some(WebhookSettings {
                    url,
                    kind: raw.webhook.kind,
                }),
                _ => {
                    warn!("Webhook enabled but monitoring.webhook.url is empty, disabling webhook");
                    None
                }
            }
        } else {
            None
        };

        Ok(MonitoringSettings {
            webhook,
            daily_report_hour: raw.daily_report_hour,
            stats_path: raw.stats_path,
        })
    }

    fn validate_display(raw: RawDisplay) -> Option<DisplaySettings> {
        if !raw.enabled {
            return None;
        }
        match raw.frame_path {
            Some(frame_path) if !frame_path.as_os_str().is_empty() => Some(DisplaySettings {
                model: raw.model,
                frame_path,
            }),
            _ => {
                warn!("Display enabled but display.frame_path is empty, disabling display");
                None
            }
        }
    }
}

fn invalid_value(field: &str, value: impl fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Secrets supplied through the environment.
#[derive(Clone)]
pub struct Credentials {
    pub reddit_client_id: String,
    pub reddit_client_secret: String,
    pub reddit_user_agent: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("reddit_client_id", &self.reddit_client_id)
            .field("reddit_client_secret", &"***")
            .field("reddit_user_agent", &self.reddit_user_agent)
            .field("telegram_bot_token", &"***")
            .field("telegram_chat_id", &self.telegram_chat_id)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| -> Result<String, ConfigError> {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                    var_name: name.to_string(),
                })
        };

        Ok(Self {
            reddit_client_id: require("REDDIT_CLIENT_ID")?,
            reddit_client_secret: require("REDDIT_CLIENT_SECRET")?,
            reddit_user_agent: require("REDDIT_USER_AGENT")?,
            telegram_bot_token: require("TELEGRAM_BOT_TOKEN")?,
            telegram_chat_id: require("TELEGRAM_CHAT_ID")?,
        })
    }
}
