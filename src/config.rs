use std::path::Path;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::scheduler::JobConfig;

pub const BOT_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
pub const CHANNEL_ID_VAR: &str = "TELEGRAM_CHANNEL_ID";
pub const API_KEY_VAR: &str = "PERPLEXITY_API_KEY";

pub const DEFAULT_PROMPT: &str = "Write a brief daily digest (3-5 points):
- Most important news of the day
- Brief, concise points
- Maximum 500 characters for Telegram
- Use emojis for clarity";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_hour")]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_job_id")]
    pub job_id: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hour: default_hour(),
            minute: 0,
            timezone: default_timezone(),
            job_id: default_job_id(),
        }
    }
}

fn default_hour() -> u32 {
    8
}

fn default_timezone() -> String {
    "Europe/Moscow".to_string()
}

fn default_job_id() -> String {
    "daily_perplexity_post".to_string()
}

impl ScheduleConfig {
    /// Validate the raw values and resolve the timezone name.
    pub fn to_job_config(&self) -> Result<JobConfig, ConfigError> {
        if self.hour > 23 {
            return Err(ConfigError::InvalidSchedule(format!(
                "hour must be 0-23, got {}",
                self.hour
            )));
        }
        if self.minute > 59 {
            return Err(ConfigError::InvalidSchedule(format!(
                "minute must be 0-59, got {}",
                self.minute
            )));
        }
        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))?;
        Ok(JobConfig {
            id: self.job_id.clone(),
            hour: self.hour,
            minute: self.minute,
            timezone,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Hard limit for one completion request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            prompt: default_prompt(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.perplexity.ai".to_string()
}

fn default_model() -> String {
    "pplx-70b-online".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    500
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

#[derive(Debug, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_base_url")]
    pub base_url: String,
    /// Telegram `parse_mode`; empty disables rich text.
    #[serde(default = "default_parse_mode")]
    pub parse_mode: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            base_url: default_telegram_base_url(),
            parse_mode: default_parse_mode(),
        }
    }
}

fn default_telegram_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_parse_mode() -> String {
    "Markdown".to_string()
}

/// Secrets read once at startup. Never logged.
#[derive(Clone)]
pub struct Credentials {
    pub bot_token: String,
    pub channel_id: String,
    pub api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("channel_id", &self.channel_id)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Resolve all three secrets; blank values count as missing and every
    /// missing name is reported at once.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let mut get = |name: &'static str| match lookup(name) {
            Some(v) if !v.trim().is_empty() => v,
            _ => {
                missing.push(name);
                String::new()
            }
        };
        let bot_token = get(BOT_TOKEN_VAR);
        let channel_id = get(CHANNEL_ID_VAR);
        let api_key = get(API_KEY_VAR);

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        Ok(Self {
            bot_token,
            channel_id,
            api_key,
        })
    }
}

/// Load the optional TOML config. `None` yields the built-in defaults.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_credentials_all_present() {
        let creds = Credentials::from_lookup(lookup_from(&[
            (BOT_TOKEN_VAR, "123:abc"),
            (CHANNEL_ID_VAR, "@news"),
            (API_KEY_VAR, "pplx-key"),
        ]))
        .unwrap();
        assert_eq!(creds.bot_token, "123:abc");
        assert_eq!(creds.channel_id, "@news");
        assert_eq!(creds.api_key, "pplx-key");
    }

    #[test]
    fn test_credentials_reports_every_missing_name() {
        let err = Credentials::from_lookup(lookup_from(&[(CHANNEL_ID_VAR, "@news")])).unwrap_err();
        match err {
            ConfigError::Missing(names) => assert_eq!(names, vec![BOT_TOKEN_VAR, API_KEY_VAR]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_credentials_blank_counts_as_missing() {
        let err = Credentials::from_lookup(lookup_from(&[
            (BOT_TOKEN_VAR, "123:abc"),
            (CHANNEL_ID_VAR, "  "),
            (API_KEY_VAR, "pplx-key"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(CHANNEL_ID_VAR));
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let creds = Credentials {
            bot_token: "secret-token".into(),
            channel_id: "@news".into(),
            api_key: "secret-key".into(),
        };
        let out = format!("{creds:?}");
        assert!(!out.contains("secret"));
        assert!(out.contains("@news"));
    }

    #[test]
    fn test_defaults_without_file() {
        let cfg = load(None).unwrap();
        assert_eq!(cfg.schedule.hour, 8);
        assert_eq!(cfg.schedule.minute, 0);
        assert_eq!(cfg.schedule.timezone, "Europe/Moscow");
        assert_eq!(cfg.llm.timeout_secs, 30);
        assert_eq!(cfg.llm.max_tokens, 500);
        assert_eq!(cfg.telegram.parse_mode, "Markdown");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("digest.toml");
        std::fs::write(
            &path,
            "[schedule]\nhour = 21\ntimezone = \"Asia/Tokyo\"\n\n[llm]\nmodel = \"sonar\"\n",
        )
        .unwrap();

        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.schedule.hour, 21);
        assert_eq!(cfg.schedule.minute, 0);
        assert_eq!(cfg.schedule.job_id, "daily_perplexity_post");
        assert_eq!(cfg.llm.model, "sonar");
        assert_eq!(cfg.llm.base_url, "https://api.perplexity.ai");
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(load(Some(Path::new("/nonexistent/digest.toml"))).is_err());
    }

    #[test]
    fn test_job_config_validation() {
        let job = ScheduleConfig::default().to_job_config().unwrap();
        assert_eq!(job.timezone, chrono_tz::Europe::Moscow);

        let bad_hour = ScheduleConfig {
            hour: 24,
            ..ScheduleConfig::default()
        };
        assert!(matches!(
            bad_hour.to_job_config(),
            Err(ConfigError::InvalidSchedule(_))
        ));

        let bad_minute = ScheduleConfig {
            minute: 60,
            ..ScheduleConfig::default()
        };
        assert!(matches!(
            bad_minute.to_job_config(),
            Err(ConfigError::InvalidSchedule(_))
        ));

        let bad_tz = ScheduleConfig {
            timezone: "Mars/Olympus".into(),
            ..ScheduleConfig::default()
        };
        assert!(matches!(
            bad_tz.to_job_config(),
            Err(ConfigError::UnknownTimezone(_))
        ));
    }
}
