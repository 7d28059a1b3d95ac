use crate::calendar::CalendarMethod;
use crate::constants::{
    DEFAULT_BROWSER_BASE_URL, DEFAULT_MBASIC_BASE_URL, DEFAULT_PROFILE_DIR, PASSWORD_ENV,
    USERNAME_ENV,
};
use crate::error::{Result, ScraperError};
use crate::normalize::RecordPolicy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which session drives discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Headless Chromium with a persistent profile
    Browser,
    /// Plain HTTP against the basic mobile site
    Mbasic,
}

/// How event detail pages are turned into structured records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailFetch {
    /// Reuse the discovery session (cookies, login)
    Session,
    /// Session-less fetch through the generic extractor
    Generic,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub login_secs: u64,
    pub content_wait_secs: u64,
    pub expansion_secs: u64,
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            login_secs: 15,
            content_wait_secs: 30,
            expansion_secs: 20,
            request_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RevealConfig {
    pub max_rounds: u32,
    pub delay_ms: u64,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            delay_ms: 2000,
        }
    }
}

impl RevealConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pages: Vec<String>,
    pub strategy: Strategy,
    /// Unset means the strategy's own default, see [`Config::detail_fetch`]
    pub detail_fetch: Option<DetailFetch>,
    pub record_policy: RecordPolicy,
    pub chrome_path: Option<PathBuf>,
    pub profile_dir: PathBuf,
    pub username: Option<String>,
    pub password: Option<String>,
    pub debug: bool,
    pub output_dir: Option<PathBuf>,
    pub per_page_output: bool,
    pub calendar_method: CalendarMethod,
    pub browser_base_url: String,
    pub mbasic_base_url: String,
    pub timeouts: TimeoutConfig,
    pub reveal: RevealConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            strategy: Strategy::Browser,
            detail_fetch: None,
            record_policy: RecordPolicy::default(),
            chrome_path: None,
            profile_dir: PathBuf::from(DEFAULT_PROFILE_DIR),
            username: None,
            password: None,
            debug: false,
            output_dir: None,
            per_page_output: false,
            calendar_method: CalendarMethod::Request,
            browser_base_url: DEFAULT_BROWSER_BASE_URL.to_string(),
            mbasic_base_url: DEFAULT_MBASIC_BASE_URL.to_string(),
            timeouts: TimeoutConfig::default(),
            reveal: RevealConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&config_content)
    }

    /// Loads `path` when it exists, otherwise starts from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Credentials from the environment take precedence over the file.
    pub fn apply_env(&mut self) {
        if let Ok(username) = std::env::var(USERNAME_ENV) {
            if !username.trim().is_empty() {
                self.username = Some(username);
            }
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            if !password.is_empty() {
                self.password = Some(password);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pages.iter().all(|p| p.trim().is_empty()) {
            return Err(ScraperError::Config("no pages configured".into()));
        }
        let t = &self.timeouts;
        if t.login_secs == 0 || t.content_wait_secs == 0 || t.request_secs == 0 {
            return Err(ScraperError::Config("timeouts must be non-zero".into()));
        }
        if self.per_page_output && self.output_dir.is_none() {
            return Err(ScraperError::Config(
                "per_page_output requires output_dir".into(),
            ));
        }
        Ok(())
    }

    /// Both username and password, or nothing.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u, p)),
            _ => None,
        }
    }

    /// Detail pages go through the discovery session for `mbasic`, so they
    /// carry its consent cookies and login. The browser hands them to the
    /// generic extractor.
    pub fn detail_fetch(&self) -> DetailFetch {
        self.detail_fetch.unwrap_or(match self.strategy {
            Strategy::Browser => DetailFetch::Generic,
            Strategy::Mbasic => DetailFetch::Session,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::from_toml("").unwrap();
        assert!(config.pages.is_empty());
        assert_eq!(config.strategy, Strategy::Browser);
        assert_eq!(config.detail_fetch, None);
        assert_eq!(config.detail_fetch(), DetailFetch::Generic);
        assert_eq!(config.timeouts.login_secs, 15);
        assert_eq!(config.reveal.max_rounds, 3);
        assert!(!config.debug);
        assert!(config.chrome_path.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            pages = ["examplepage", "otherpage"]
            strategy = "mbasic"
            detail_fetch = "session"
            record_policy = "first_record"
            chrome_path = "/usr/bin/chromium"
            username = "me@example.com"
            password = "hunter2"
            debug = true
            output_dir = "out"
            per_page_output = true
            calendar_method = "publish"

            [timeouts]
            login_secs = 5

            [reveal]
            max_rounds = 6
            delay_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.pages, vec!["examplepage", "otherpage"]);
        assert_eq!(config.strategy, Strategy::Mbasic);
        assert_eq!(config.detail_fetch, Some(DetailFetch::Session));
        assert_eq!(config.record_policy, RecordPolicy::FirstRecord);
        assert_eq!(config.calendar_method, CalendarMethod::Publish);
        assert_eq!(config.timeouts.login_secs, 5);
        assert_eq!(config.timeouts.content_wait_secs, 30);
        assert_eq!(config.reveal.max_rounds, 6);
        assert_eq!(config.reveal.delay(), Duration::from_millis(500));
        assert_eq!(config.credentials(), Some(("me@example.com", "hunter2")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_detail_fetch_follows_strategy_unless_set() {
        let mbasic = Config::from_toml(r#"strategy = "mbasic""#).unwrap();
        assert_eq!(mbasic.detail_fetch(), DetailFetch::Session);

        let browser = Config::from_toml(r#"strategy = "browser""#).unwrap();
        assert_eq!(browser.detail_fetch(), DetailFetch::Generic);

        let overridden =
            Config::from_toml("strategy = \"mbasic\"\ndetail_fetch = \"generic\"").unwrap();
        assert_eq!(overridden.detail_fetch(), DetailFetch::Generic);
    }

    #[test]
    fn test_validate_rejects_missing_pages() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(ScraperError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_per_page_without_output_dir() {
        let config = Config {
            pages: vec!["examplepage".into()],
            per_page_output: true,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_credentials_are_ignored() {
        let config = Config {
            username: Some("me".into()),
            ..Config::default()
        };
        assert_eq!(config.credentials(), None);
    }

    #[test]
    fn test_unknown_strategy_is_an_error() {
        let result = Config::from_toml(r#"strategy = "carrier_pigeon""#);
        assert!(matches!(result, Err(ScraperError::Toml(_))));
    }
}
