use std::{fs, path::Path, path::PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dedupe::DedupePolicy;
use crate::utils;
use crate::window::WeekendPolicy;

const DEFAULT_SEARCH_TERM: &str = "events";
const DEFAULT_CITY: &str = "canada--toronto";
const DEFAULT_EVENTBRITE_DOMAIN: &str = "www.eventbrite.ca";
const DEFAULT_TIMEZONE: &str = "America/Toronto";
const DEFAULT_COLLECTOR_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_PAGES: usize = 5;
const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unable to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unable to write config {path:?}: {message}")]
    Write { path: PathBuf, message: String },
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub search_terms: Vec<String>,
    pub city: String,
    pub eventbrite_domain: String,
    pub weekend_policy: WeekendPolicy,
    pub dedupe_policy: DedupePolicy,
    pub collector_timeout_secs: u64,
    pub max_pages: usize,
    pub timezone: String,
    pub output_dir: Option<PathBuf>,
    pub template_path: Option<PathBuf>,
    pub recipient: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub proxy_url: Option<String>,
    pub user_agent: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            search_terms: vec![DEFAULT_SEARCH_TERM.to_string()],
            city: DEFAULT_CITY.to_string(),
            eventbrite_domain: DEFAULT_EVENTBRITE_DOMAIN.to_string(),
            weekend_policy: WeekendPolicy::default(),
            dedupe_policy: DedupePolicy::default(),
            collector_timeout_secs: DEFAULT_COLLECTOR_TIMEOUT_SECS,
            max_pages: DEFAULT_MAX_PAGES,
            timezone: DEFAULT_TIMEZONE.to_string(),
            output_dir: None,
            template_path: None,
            recipient: None,
            smtp_host: None,
            smtp_port: DEFAULT_SMTP_PORT,
            smtp_username: None,
            smtp_password: None,
            smtp_from: None,
            proxy_url: None,
            user_agent: None,
        }
    }
}

impl AppConfig {
    /// Config file (if any) with environment overrides applied on top.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = read_config(path)?;
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(terms) = var("EVENTS_SEARCH_TERMS") {
            self.search_terms = terms
                .split(',')
                .map(|term| term.trim().to_string())
                .filter(|term| !term.is_empty())
                .collect();
        }
        if let Some(city) = var("EVENTS_CITY") {
            self.city = city;
        }
        if let Some(domain) = var("EVENTS_EVENTBRITE_DOMAIN") {
            self.eventbrite_domain = domain;
        }
        if let Some(policy) = var("EVENTS_WEEKEND_POLICY") {
            self.weekend_policy = parse_value("EVENTS_WEEKEND_POLICY", &policy)?;
        }
        if let Some(policy) = var("EVENTS_DEDUPE_POLICY") {
            self.dedupe_policy = parse_value("EVENTS_DEDUPE_POLICY", &policy)?;
        }
        if let Some(secs) = var("EVENTS_TIMEOUT_SECS") {
            self.collector_timeout_secs = parse_value("EVENTS_TIMEOUT_SECS", &secs)?;
        }
        if let Some(pages) = var("EVENTS_MAX_PAGES") {
            self.max_pages = parse_value("EVENTS_MAX_PAGES", &pages)?;
        }
        if let Some(tz) = var("EVENTS_TIMEZONE") {
            self.timezone = tz;
        }
        if let Some(dir) = var("EVENTS_OUTPUT_DIR") {
            self.output_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = var("EVENTS_TEMPLATE") {
            self.template_path = Some(PathBuf::from(path));
        }
        if let Some(recipient) = var("EVENTS_RECIPIENT") {
            self.recipient = Some(recipient);
        }
        if let Some(host) = var("SMTP_HOST") {
            self.smtp_host = Some(host);
        }
        if let Some(port) = var("SMTP_PORT") {
            self.smtp_port = parse_value("SMTP_PORT", &port)?;
        }
        if let Some(username) = var("SMTP_USERNAME") {
            self.smtp_username = Some(username);
        }
        if let Some(password) = var("SMTP_PASSWORD") {
            self.smtp_password = Some(password);
        }
        if let Some(from) = var("SMTP_FROM") {
            self.smtp_from = Some(from);
        }
        if let Some(proxy) = var("SCRAPER_PROXY_URL") {
            self.proxy_url = Some(proxy);
        }
        if let Some(agent) = var("SCRAPER_USER_AGENT") {
            self.user_agent = Some(agent);
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|err| ConfigError::Invalid {
                key: "timezone",
                value: self.timezone.clone(),
                reason: err.to_string(),
            })
    }

    /// The calendar date at `now` in the configured timezone.
    pub fn today_at(&self, now: DateTime<Utc>) -> Result<NaiveDate, ConfigError> {
        Ok(now.with_timezone(&self.timezone()?).date_naive())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(utils::reports_dir)
    }

    pub fn email_enabled(&self) -> bool {
        self.recipient
            .as_deref()
            .is_some_and(|recipient| !recipient.trim().is_empty())
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: err.to_string(),
    })
}

pub fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let write_err = |message: String| ConfigError::Write {
        path: path.to_path_buf(),
        message,
    };
    utils::ensure_parent(path).map_err(|err| write_err(err.to_string()))?;
    let contents = serde_json::to_string_pretty(config).map_err(|err| write_err(err.to_string()))?;
    fs::write(path, contents).map_err(|err| write_err(err.to_string()))
}
