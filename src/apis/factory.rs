use super::browser::{BrowserOptions, BrowserSource};
use super::mbasic::MbasicSource;
use crate::config::{Config, Strategy};
use crate::error::Result;
use crate::types::EventSource;
use std::time::Duration;
use tracing::info;

impl From<&Config> for BrowserOptions {
    fn from(config: &Config) -> Self {
        Self {
            executable: config.chrome_path.clone(),
            profile_dir: config.profile_dir.clone(),
            debug: config.debug,
            base_url: config.browser_base_url.clone(),
            content_wait: Duration::from_secs(config.timeouts.content_wait_secs),
            expansion_timeout: Duration::from_secs(config.timeouts.expansion_secs),
            request_timeout: config.request_timeout(),
            reveal: config.reveal.clone(),
        }
    }
}

/// Open the session selected by `config.strategy`.
pub async fn open_source(config: &Config) -> Result<Box<dyn EventSource>> {
    let source: Box<dyn EventSource> = match config.strategy {
        Strategy::Browser => Box::new(BrowserSource::open(BrowserOptions::from(config)).await?),
        Strategy::Mbasic => Box::new(MbasicSource::new(
            &config.mbasic_base_url,
            config.request_timeout(),
        )?),
    };
    info!(source = source.source_name(), "session opened");
    Ok(source)
}
