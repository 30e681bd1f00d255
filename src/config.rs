use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::data::models::ConfigError;
use crate::features::srs::Quality;

/// Runtime settings read from the environment (and `.env`)
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub telegram_token: String,
    pub telegram_api_url: String,
    pub webhook_secret: Option<String>,
    pub admin_ids: Vec<i64>,
    pub reminder_tick: Duration,
    pub quiz_ttl: Duration,
    pub quiz_sweep_interval: Duration,
    pub review_idle_timeout: Duration,
    pub review_sweep_interval: Duration,
    pub default_reminders_per_day: i32,
    pub default_cards_per_session: i32,
    pub quiz_reveal_grade: Option<Quality>, // SRS grade applied on reveal; None disables
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let telegram_token =
            env::var("TELEGRAM_TOKEN").map_err(|_| ConfigError::Missing("TELEGRAM_TOKEN"))?;

        let config = Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "word_reminder.db".into()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".into()),
            telegram_token,
            telegram_api_url: env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| "https://api.telegram.org".into()),
            webhook_secret: env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
            admin_ids: parse_admin_ids(&env::var("ADMIN_IDS").unwrap_or_default())?,
            reminder_tick: seconds("REMINDER_TICK_SECS", 3600)?,
            quiz_ttl: seconds("QUIZ_TTL_SECS", 900)?,
            quiz_sweep_interval: seconds("QUIZ_SWEEP_SECS", 60)?,
            review_idle_timeout: seconds("REVIEW_IDLE_TIMEOUT_SECS", 86_400)?,
            review_sweep_interval: seconds("REVIEW_SWEEP_SECS", 600)?,
            default_reminders_per_day: bounded("DEFAULT_REMINDERS_PER_DAY", 1, 1, 10)?,
            default_cards_per_session: bounded("DEFAULT_CARDS_PER_SESSION", 5, 1, 20)?,
            quiz_reveal_grade: reveal_grade()?,
        };
        Ok(config)
    }

    /// Defaults without touching the environment.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: ":memory:".into(),
            bind_addr: "127.0.0.1:0".into(),
            telegram_token: "test-token".into(),
            telegram_api_url: "http://localhost".into(),
            webhook_secret: None,
            admin_ids: vec![900],
            reminder_tick: Duration::from_secs(3600),
            quiz_ttl: Duration::from_secs(900),
            quiz_sweep_interval: Duration::from_secs(60),
            review_idle_timeout: Duration::from_secs(86_400),
            review_sweep_interval: Duration::from_secs(600),
            default_reminders_per_day: 1,
            default_cards_per_session: 5,
            quiz_reveal_grade: None,
        }
    }
}

fn parse<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        _ => Ok(default),
    }
}

fn seconds(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let secs = parse(name, default)?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn bounded(name: &'static str, default: i32, min: i32, max: i32) -> Result<i32, ConfigError> {
    let value = parse(name, default)?;
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn reveal_grade() -> Result<Option<Quality>, ConfigError> {
    let Some(raw) = env::var("QUIZ_REVEAL_GRADE").ok().filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    let invalid = || ConfigError::Invalid {
        name: "QUIZ_REVEAL_GRADE",
        value: raw.clone(),
    };
    let grade: u8 = raw.trim().parse().map_err(|_| invalid())?;
    Quality::new(grade).map(Some).map_err(|_| invalid())
}

pub fn parse_admin_ids(raw: &str) -> Result<Vec<i64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| ConfigError::Invalid {
                name: "ADMIN_IDS",
                value: s.to_string(),
            })
        })
        .collect()
}
