//! Chromium-driven source using chromiumoxide.

use crate::config::RevealConfig;
use crate::constants::{
    BROWSER_SOURCE, CONTENT_CONTAINER_SELECTOR, DEBUG_SCREENSHOT_FILE, DEFAULT_CHROME_PATH,
    DISMISS_CONSENT_SCRIPT, LOGIN_EMAIL_SELECTOR, LOGIN_PASSWORD_SELECTOR, LOGIN_SUBMIT_SELECTOR,
    REVEAL_MORE_SCRIPT,
};
use crate::discovery::{
    collect_event_links, page_url, EventsView, RevealObservation, Settle, SettleTracker,
};
use crate::error::{AuthError, DiscoveryError, FetchError, Result, ScraperError};
use crate::types::{EventLink, EventLinkSet, EventSource};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::js_protocol::runtime::{
    EventConsoleApiCalled, EventExceptionThrown, RemoteObject,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

const CONTAINER_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Everything needed to launch the browser session
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub executable: Option<PathBuf>,
    pub profile_dir: PathBuf,
    pub debug: bool,
    pub base_url: String,
    pub content_wait: Duration,
    pub expansion_timeout: Duration,
    pub request_timeout: Duration,
    pub reveal: RevealConfig,
}

/// Locate a Chrome/Chromium binary.
///
/// A configured path must exist. Otherwise PATH is searched, then the usual
/// install locations.
pub fn find_chrome(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return path.exists().then(|| path.to_path_buf());
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    let mut fallbacks = vec![PathBuf::from(DEFAULT_CHROME_PATH)];
    if cfg!(target_os = "macos") {
        fallbacks.push(PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        ));
    }
    fallbacks.into_iter().find(|p| p.exists())
}

/// Headless Chromium bound to a persistent profile directory, so cookies and
/// login survive between runs.
pub struct BrowserSource {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    traces: Vec<JoinHandle<()>>,
    base: Url,
    options: BrowserOptions,
}

impl BrowserSource {
    #[instrument(skip(options), fields(profile = %options.profile_dir.display(), debug = options.debug))]
    pub async fn open(options: BrowserOptions) -> Result<Self> {
        let base = Url::parse(&options.base_url).map_err(|e| {
            ScraperError::Config(format!("invalid browser base url '{}': {e}", options.base_url))
        })?;
        let executable = find_chrome(options.executable.as_deref()).ok_or_else(|| {
            ScraperError::SessionOpen(match &options.executable {
                Some(p) => format!("browser executable {} not found", p.display()),
                None => "no Chrome or Chromium executable found".to_string(),
            })
        })?;
        std::fs::create_dir_all(&options.profile_dir)?;

        let config = BrowserConfig::builder()
            .chrome_executable(&executable)
            .user_data_dir(&options.profile_dir)
            .request_timeout(options.request_timeout)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .build()
            .map_err(ScraperError::SessionOpen)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScraperError::SessionOpen(format!("failed to launch browser: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler.abort();
                return Err(ScraperError::SessionOpen(format!("failed to open tab: {e}")));
            }
        };

        let traces = if options.debug {
            attach_traces(&page).await.unwrap_or_else(|e| {
                warn!(error = %e, "could not attach browser console tracing");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        info!(executable = %executable.display(), "browser session opened");
        Ok(Self {
            browser,
            page,
            handler,
            traces,
            base,
            options,
        })
    }

    async fn navigate(&self, url: &Url) -> std::result::Result<(), String> {
        match tokio::time::timeout(self.options.content_wait, self.page.goto(url.as_str())).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "navigation timed out after {}s",
                self.options.content_wait.as_secs()
            )),
        }
    }

    async fn wait_for_container(&self, url: &Url) -> std::result::Result<(), DiscoveryError> {
        let deadline = Instant::now() + self.options.content_wait;
        loop {
            if self.page.find_element(CONTENT_CONTAINER_SELECTOR).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DiscoveryError::Timeout {
                    url: url.to_string(),
                    secs: self.options.content_wait.as_secs(),
                });
            }
            tokio::time::sleep(CONTAINER_POLL_INTERVAL).await;
        }
    }

    /// Click "See more" until the listing stops growing. Never fails: on
    /// script errors or timeout we continue with whatever has loaded.
    async fn expand(&self) {
        let reveal = &self.options.reveal;
        let mut tracker = SettleTracker::new(reveal.max_rounds);

        let rounds = async {
            loop {
                let observation = match self.page.evaluate(REVEAL_MORE_SCRIPT).await {
                    Ok(result) => match result.into_value::<RevealObservation>() {
                        Ok(obs) => obs,
                        Err(e) => {
                            warn!(error = %e, "unexpected reveal script result");
                            return;
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "reveal script failed");
                        return;
                    }
                };
                debug!(present = observation.present, anchors = observation.anchors, "reveal round");

                match tracker.observe(observation) {
                    Settle::Continue => tokio::time::sleep(reveal.delay()).await,
                    Settle::Settled(reason) => {
                        debug!(?reason, rounds = tracker.rounds(), "content settled");
                        if reason.clicked_last_round() {
                            // let the last click's content land
                            tokio::time::sleep(reveal.delay()).await;
                        }
                        return;
                    }
                }
            }
        };

        if tokio::time::timeout(self.options.expansion_timeout, rounds)
            .await
            .is_err()
        {
            warn!(
                "content expansion timed out after {}s; using what has loaded",
                self.options.expansion_timeout.as_secs()
            );
        }
    }

    async fn save_debug_screenshot(&self) {
        let params = ScreenshotParams::builder().full_page(true).build();
        match self.page.save_screenshot(params, DEBUG_SCREENSHOT_FILE).await {
            Ok(_) => info!(file = DEBUG_SCREENSHOT_FILE, "saved debug screenshot"),
            Err(e) => warn!(error = %e, "could not save debug screenshot"),
        }
    }

    async fn login_sequence(
        &self,
        login_url: &Url,
        username: &str,
        password: &str,
    ) -> std::result::Result<(), CdpError> {
        self.page.goto(login_url.as_str()).await?;

        let dismissed = self
            .page
            .evaluate(DISMISS_CONSENT_SCRIPT)
            .await?
            .into_value::<bool>()
            .unwrap_or(false);
        debug!(dismissed, "cookie consent interstitial");

        self.page
            .find_element(LOGIN_EMAIL_SELECTOR)
            .await?
            .click()
            .await?
            .type_str(username)
            .await?;
        self.page
            .find_element(LOGIN_PASSWORD_SELECTOR)
            .await?
            .click()
            .await?
            .type_str(password)
            .await?;
        self.page
            .find_element(LOGIN_SUBMIT_SELECTOR)
            .await?
            .click()
            .await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }
}

async fn attach_traces(page: &Page) -> std::result::Result<Vec<JoinHandle<()>>, CdpError> {
    let mut console = page.event_listener::<EventConsoleApiCalled>().await?;
    let mut exceptions = page.event_listener::<EventExceptionThrown>().await?;

    let console_task = tokio::spawn(async move {
        while let Some(event) = console.next().await {
            let message = event
                .args
                .iter()
                .map(remote_object_text)
                .collect::<Vec<_>>()
                .join(" ");
            debug!(target: "browser_console", kind = ?event.r#type, %message, "console");
        }
    });
    let exception_task = tokio::spawn(async move {
        while let Some(event) = exceptions.next().await {
            let details = &event.exception_details;
            warn!(
                target: "browser_console",
                text = %details.text,
                url = details.url.as_deref().unwrap_or(""),
                line = details.line_number,
                column = details.column_number,
                "uncaught exception"
            );
        }
    });
    Ok(vec![console_task, exception_task])
}

fn remote_object_text(object: &RemoteObject) -> String {
    match &object.value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => object.description.clone().unwrap_or_default(),
    }
}

#[async_trait::async_trait]
impl EventSource for BrowserSource {
    fn source_name(&self) -> &'static str {
        BROWSER_SOURCE
    }

    #[instrument(skip(self, username, password))]
    async fn login(
        &mut self,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> std::result::Result<(), AuthError> {
        let login_url = self
            .base
            .join("/login/")
            .map_err(|e| AuthError::Failed(e.to_string()))?;

        match tokio::time::timeout(timeout, self.login_sequence(&login_url, username, password))
            .await
        {
            Err(_) => Err(AuthError::Timeout(timeout.as_secs())),
            Ok(Err(e)) => Err(AuthError::Failed(e.to_string())),
            Ok(Ok(())) => {
                let current = self.page.url().await.ok().flatten().unwrap_or_default();
                if current.contains("/login") {
                    return Err(AuthError::Failed("still on the login page".into()));
                }
                info!("logged in");
                Ok(())
            }
        }
    }

    #[instrument(skip(self))]
    async fn discover_event_links(
        &mut self,
        page: &str,
    ) -> std::result::Result<EventLinkSet, DiscoveryError> {
        let url = page_url(&self.base, page, EventsView::Path)?;
        self.navigate(&url)
            .await
            .map_err(|message| DiscoveryError::Navigation {
                url: url.to_string(),
                message,
            })?;
        self.wait_for_container(&url).await?;
        self.expand().await;

        if self.options.debug {
            self.save_debug_screenshot().await;
        }

        let html = self
            .page
            .content()
            .await
            .map_err(|e| DiscoveryError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let links = collect_event_links(&html, Some(CONTENT_CONTAINER_SELECTOR), &url, &self.base);
        info!("Found {} event links on {}", links.len(), url);
        Ok(links)
    }

    async fn fetch_event_page(
        &mut self,
        link: &EventLink,
    ) -> std::result::Result<String, FetchError> {
        let browser_error = |message: String| FetchError::Browser {
            url: link.url().to_string(),
            message,
        };
        self.navigate(link.url()).await.map_err(browser_error)?;
        self.page
            .content()
            .await
            .map_err(|e| browser_error(e.to_string()))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let BrowserSource {
            mut browser,
            page,
            handler,
            traces,
            ..
        } = *self;

        for task in traces {
            task.abort();
        }
        let _ = page.close().await;
        let closed = browser.close().await;
        let _ = browser.wait().await;
        handler.abort();

        closed
            .map(|_| debug!(source = BROWSER_SOURCE, "browser closed"))
            .map_err(|e| ScraperError::Teardown(e.to_string()))
    }
}
