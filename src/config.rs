use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::feeds::FeedSource;
use crate::platform::Platform;
use crate::retry::RetryPolicy;
use crate::scheduler::parse_schedule;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Feeds
    pub content_feeds: Vec<FeedSource>,
    pub ingest_interval: Duration,
    pub feed_timeout: Duration,

    // Database
    pub database_path: PathBuf,

    // Jobs
    pub role: Role,
    /// Stable name of this worker process; distinct per process sharing a database
    pub worker_id: String,
    pub worker_concurrency: usize,
    pub job_poll_interval: Duration,
    pub job_retention: Duration,

    // Copy generation
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_api_base: String,
    pub generation_timeout: Duration,
    pub generation_retry: RetryPolicy,
    pub utm_params: String,

    // Publishing
    pub linkedin_client_id: Option<String>,
    pub linkedin_client_secret: Option<String>,
    pub linkedin_redirect_uri: String,
    pub linkedin_oauth_base: String,
    pub linkedin_api_base: String,
    pub publish_timeout: Duration,
    pub publish_retry: RetryPolicy,
    pub token_refresh_skew: Duration,
    pub token_refresh_schedule: String,
    pub token_refresh_window: Duration,

    // Notifications
    pub notify_schedule: String,
    pub notify_lookback: Duration,
    pub notify_platform: Platform,
    pub slack_notifications_enabled: bool,
    pub slack_bot_token: Option<String>,
    pub slack_api_base: String,
    /// Channel that receives one-off announcements
    pub slack_default_channel: Option<String>,
    pub base_url: String,

    // Web Server
    pub web_host: String,
    pub web_port: u16,
}

/// Which halves of the service this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// HTTP API, job worker and scheduler in one process
    All,
    /// HTTP API only; jobs are picked up by a separate worker process
    Web,
    /// Job worker and scheduler only
    Worker,
}

impl Role {
    #[must_use]
    pub fn runs_web(self) -> bool {
        matches!(self, Self::All | Self::Web)
    }

    #[must_use]
    pub fn runs_worker(self) -> bool {
        matches!(self, Self::All | Self::Worker)
    }
}

const SECS_PER_HOUR: u64 = 3600;
const SECS_PER_DAY: u64 = 86_400;

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables are present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let retry_base = Duration::from_millis(parse_env_u64("RETRY_BASE_DELAY_MS", 1000)?);
        let retry_max = Duration::from_millis(parse_env_u64("RETRY_MAX_DELAY_MS", 4000)?);

        Ok(Self {
            // Feeds
            content_feeds: parse_feed_list(&env_or_default("CONTENT_FEEDS", ""))?,
            ingest_interval: Duration::from_secs(parse_env_u64(
                "INGEST_INTERVAL_SECS",
                SECS_PER_HOUR,
            )?),
            feed_timeout: Duration::from_secs(parse_env_u64("FEED_TIMEOUT_SECS", 10)?),

            // Database
            database_path: PathBuf::from(env_or_default(
                "DATABASE_PATH",
                "./data/promoter.sqlite",
            )),

            // Jobs
            role: parse_role(&env_or_default("ROLE", "all"))?,
            worker_id: env_or_default("WORKER_ID", "worker-1"),
            worker_concurrency: parse_env_usize("WORKER_CONCURRENCY", 4)?,
            job_poll_interval: Duration::from_millis(parse_env_u64("JOB_POLL_INTERVAL_MS", 1000)?),
            job_retention: Duration::from_secs(
                parse_env_u64("JOB_RETENTION_HOURS", 24)? * SECS_PER_HOUR,
            ),

            // Copy generation
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            gemini_model: env_or_default("GEMINI_MODEL", "gemini-1.5-pro"),
            gemini_api_base: env_or_default(
                "GEMINI_API_BASE",
                "https://generativelanguage.googleapis.com",
            ),
            generation_timeout: Duration::from_secs(parse_env_u64("GENERATION_TIMEOUT_SECS", 60)?),
            generation_retry: RetryPolicy::new(
                parse_env_u32("GENERATION_MAX_ATTEMPTS", 3)?,
                retry_base,
                retry_max,
            ),
            utm_params: env_or_default("UTM_PARAMS", ""),

            // Publishing
            linkedin_client_id: optional_env("LINKEDIN_CLIENT_ID"),
            linkedin_client_secret: optional_env("LINKEDIN_CLIENT_SECRET"),
            linkedin_redirect_uri: env_or_default(
                "LINKEDIN_REDIRECT_URI",
                "http://localhost:8080/auth/linkedin/callback",
            ),
            linkedin_oauth_base: env_or_default(
                "LINKEDIN_OAUTH_BASE",
                "https://www.linkedin.com/oauth/v2",
            ),
            linkedin_api_base: env_or_default("LINKEDIN_API_BASE", "https://api.linkedin.com/v2"),
            publish_timeout: Duration::from_secs(parse_env_u64("PUBLISH_TIMEOUT_SECS", 30)?),
            publish_retry: RetryPolicy::new(
                parse_env_u32("PUBLISH_MAX_ATTEMPTS", 3)?,
                retry_base,
                retry_max,
            ),
            token_refresh_skew: Duration::from_secs(parse_env_u64("TOKEN_REFRESH_SKEW_SECS", 300)?),
            token_refresh_schedule: env_or_default("TOKEN_REFRESH_SCHEDULE", "0 0 3 * * *"),
            token_refresh_window: Duration::from_secs(
                parse_env_u64("TOKEN_REFRESH_WINDOW_DAYS", 7)? * SECS_PER_DAY,
            ),

            // Notifications
            // Friday 09:00 US Eastern (daylight time)
            notify_schedule: env_or_default("NOTIFY_SCHEDULE", "0 0 13 * * Fri"),
            notify_lookback: Duration::from_secs(
                parse_env_u64("NOTIFY_LOOKBACK_DAYS", 7)? * SECS_PER_DAY,
            ),
            notify_platform: parse_platform(
                "NOTIFY_PLATFORM",
                &env_or_default("NOTIFY_PLATFORM", "linkedin"),
            )?,
            slack_notifications_enabled: parse_env_bool("SLACK_NOTIFICATIONS_ENABLED", true)?,
            slack_bot_token: optional_env("SLACK_BOT_TOKEN"),
            slack_api_base: env_or_default("SLACK_API_BASE", "https://slack.com/api"),
            slack_default_channel: optional_env("SLACK_DEFAULT_CHANNEL_ID"),
            base_url: env_or_default("BASE_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_string(),

            // Web Server
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 8080)?,
        })
    }

    /// Defaults suitable for tests: no external credentials, no retry delays.
    #[must_use]
    pub fn for_testing() -> Self {
        let fast_retry = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO);
        Self {
            content_feeds: Vec::new(),
            ingest_interval: Duration::from_secs(SECS_PER_HOUR),
            feed_timeout: Duration::from_secs(5),
            database_path: PathBuf::from(":memory:"),
            role: Role::All,
            worker_id: "test-worker".to_string(),
            worker_concurrency: 2,
            job_poll_interval: Duration::from_millis(20),
            job_retention: Duration::from_secs(SECS_PER_HOUR),
            gemini_api_key: Some("test-key".to_string()),
            gemini_model: "gemini-test".to_string(),
            gemini_api_base: "http://127.0.0.1:9".to_string(),
            generation_timeout: Duration::from_secs(5),
            generation_retry: fast_retry,
            utm_params: String::new(),
            linkedin_client_id: Some("client-id".to_string()),
            linkedin_client_secret: Some("client-secret".to_string()),
            linkedin_redirect_uri: "http://localhost:8080/auth/linkedin/callback".to_string(),
            linkedin_oauth_base: "http://127.0.0.1:9/oauth/v2".to_string(),
            linkedin_api_base: "http://127.0.0.1:9/v2".to_string(),
            publish_timeout: Duration::from_secs(5),
            publish_retry: fast_retry,
            token_refresh_skew: Duration::from_secs(300),
            token_refresh_schedule: "0 0 3 * * *".to_string(),
            token_refresh_window: Duration::from_secs(7 * SECS_PER_DAY),
            notify_schedule: "0 0 13 * * Fri".to_string(),
            notify_lookback: Duration::from_secs(7 * SECS_PER_DAY),
            notify_platform: Platform::Linkedin,
            slack_notifications_enabled: true,
            slack_bot_token: None,
            slack_api_base: "http://127.0.0.1:9/api".to_string(),
            slack_default_channel: None,
            base_url: "http://localhost:8080".to_string(),
            web_host: "127.0.0.1".to_string(),
            web_port: 0,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "WORKER_ID".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.worker_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: "WORKER_CONCURRENCY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.generation_retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "GENERATION_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.publish_retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "PUBLISH_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.ingest_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "INGEST_INTERVAL_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        parse_schedule(&self.notify_schedule).map_err(|e| ConfigError::InvalidValue {
            name: "NOTIFY_SCHEDULE".to_string(),
            message: e.to_string(),
        })?;
        parse_schedule(&self.token_refresh_schedule).map_err(|e| ConfigError::InvalidValue {
            name: "TOKEN_REFRESH_SCHEDULE".to_string(),
            message: e.to_string(),
        })?;
        if self.role.runs_worker() && self.gemini_api_key.is_none() {
            return Err(ConfigError::MissingEnvVar("GEMINI_API_KEY".to_string()));
        }
        if self.linkedin_client_id.is_some() != self.linkedin_client_secret.is_some() {
            return Err(ConfigError::InvalidValue {
                name: "LINKEDIN_CLIENT_SECRET".to_string(),
                message: "LINKEDIN_CLIENT_ID and LINKEDIN_CLIENT_SECRET must be set together"
                    .to_string(),
            });
        }
        Ok(())
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

fn parse_role(value: &str) -> Result<Role, ConfigError> {
    match value.to_lowercase().as_str() {
        "all" => Ok(Role::All),
        "web" => Ok(Role::Web),
        "worker" => Ok(Role::Worker),
        _ => Err(ConfigError::InvalidValue {
            name: "ROLE".to_string(),
            message: format!("must be 'all', 'web' or 'worker', got '{value}'"),
        }),
    }
}

fn parse_platform(name: &str, value: &str) -> Result<Platform, ConfigError> {
    Platform::parse(value).ok_or_else(|| ConfigError::InvalidValue {
        name: name.to_string(),
        message: format!("unknown platform '{value}'"),
    })
}

/// Parse `CONTENT_FEEDS`: `|`-separated entries of `kind=url` or a bare URL.
fn parse_feed_list(value: &str) -> Result<Vec<FeedSource>, ConfigError> {
    value
        .split('|')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            FeedSource::parse(entry).map_err(|message| ConfigError::InvalidValue {
                name: "CONTENT_FEEDS".to_string(),
                message,
            })
        })
        .collect()
}
