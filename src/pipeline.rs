use crate::apis::open_source;
use crate::calendar::{page_calendar_path, Calendar, CalendarMethod};
use crate::config::{Config, DetailFetch};
use crate::constants::RUN_CALENDAR_FILE;
use crate::error::{DiscoveryError, FetchError, Result, ScraperError};
use crate::normalize::{normalize_with, RecordPolicy};
use crate::parser::{extract_structured_records, GenericExtractor};
use crate::types::{Event, EventLink, EventLinkSet, EventSource, RawStructuredRecord};
use metrics::{counter, histogram};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Per-page statistics of a run
#[derive(Debug, Clone, Default)]
pub struct PageReport {
    pub page: String,
    pub links_found: usize,
    pub events_added: usize,
    pub skipped_events: usize,
    pub failed: bool,
    pub errors: Vec<String>,
}

/// Result of a complete pipeline run
#[derive(Debug)]
pub struct RunReport {
    pub calendar: Calendar,
    pub page_calendars: Vec<(String, Calendar)>,
    pub pages: Vec<PageReport>,
}

impl RunReport {
    pub fn total_events(&self) -> usize {
        self.calendar.len()
    }

    pub fn failed_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.failed).count()
    }
}

/// How detail pages become structured records, plus what to do with them
#[derive(Clone)]
pub struct RunOptions {
    pub detail_fetch: DetailFetch,
    pub record_policy: RecordPolicy,
    pub calendar_method: CalendarMethod,
    pub request_timeout: Duration,
}

impl From<&Config> for RunOptions {
    fn from(config: &Config) -> Self {
        Self {
            detail_fetch: config.detail_fetch(),
            record_policy: config.record_policy,
            calendar_method: config.calendar_method,
            request_timeout: config.request_timeout(),
        }
    }
}

enum RecordFetcher {
    Session,
    Generic(GenericExtractor),
}

impl RecordFetcher {
    fn new(options: &RunOptions) -> Self {
        match options.detail_fetch {
            DetailFetch::Session => RecordFetcher::Session,
            DetailFetch::Generic => {
                RecordFetcher::Generic(GenericExtractor::new(options.request_timeout))
            }
        }
    }

    async fn fetch(
        &self,
        source: &mut dyn EventSource,
        link: &EventLink,
    ) -> std::result::Result<Vec<RawStructuredRecord>, FetchError> {
        match self {
            RecordFetcher::Session => {
                let html = source.fetch_event_page(link).await?;
                Ok(extract_structured_records(&html))
            }
            RecordFetcher::Generic(extractor) => extractor.fetch(link.url().as_str()).await,
        }
    }
}

pub struct Pipeline;

impl Pipeline {
    /// Open the configured session, scrape every page and close the session.
    ///
    /// Only session open and teardown failures are returned as errors;
    /// everything else is recorded in the report.
    #[instrument(skip(config), fields(strategy = ?config.strategy, pages = config.pages.len()))]
    pub async fn run(config: &Config) -> Result<RunReport> {
        let source = open_source(config).await?;
        Self::run_session(source, config).await
    }

    /// Log in when credentials are configured, scrape every page and close
    /// `source`. The source is closed exactly once whatever happened before.
    pub async fn run_session(
        mut source: Box<dyn EventSource>,
        config: &Config,
    ) -> Result<RunReport> {
        Self::login(source.as_mut(), config).await;

        let report =
            Self::run_with_source(source.as_mut(), &config.pages, &RunOptions::from(config)).await;

        source.close().await?;
        Ok(report)
    }

    /// Discovery only: the event links of every page, in page order.
    #[instrument(skip(config), fields(strategy = ?config.strategy))]
    pub async fn links(
        config: &Config,
    ) -> Result<Vec<(String, std::result::Result<EventLinkSet, DiscoveryError>)>> {
        let mut source = open_source(config).await?;
        Self::login(source.as_mut(), config).await;

        let mut results = Vec::with_capacity(config.pages.len());
        for page in &config.pages {
            let links = source.discover_event_links(page).await;
            if let Err(e) = &links {
                error!(%page, "discovery failed: {}", e);
            }
            results.push((page.clone(), links));
        }

        source.close().await?;
        Ok(results)
    }

    async fn login(source: &mut dyn EventSource, config: &Config) {
        match config.credentials() {
            Some((username, password)) => {
                let timeout = Duration::from_secs(config.timeouts.login_secs);
                if let Err(e) = source.login(username, password, timeout).await {
                    warn!("Login failed, continuing unauthenticated: {}", e);
                }
            }
            None => info!("No credentials configured, skipping login"),
        }
    }

    /// Scrape `pages` through an already open session.
    pub async fn run_with_source(
        source: &mut dyn EventSource,
        pages: &[String],
        options: &RunOptions,
    ) -> RunReport {
        let source_name = source.source_name();
        let fetcher = RecordFetcher::new(options);
        let mut calendar = Calendar::new(options.calendar_method);
        let mut page_calendars = Vec::with_capacity(pages.len());
        let mut reports = Vec::with_capacity(pages.len());
        // path -> event, None when the link already failed once
        let mut seen: HashMap<String, Option<Event>> = HashMap::new();

        counter!("event_feed_runs_total", "source" => source_name).increment(1);

        for page in pages {
            info!("🚀 Processing page {}", page);
            let started = Instant::now();
            let mut page_calendar = Calendar::named(page.clone(), options.calendar_method);
            let mut report = PageReport {
                page: page.clone(),
                ..PageReport::default()
            };

            let links = match source.discover_event_links(page).await {
                Ok(links) => links,
                Err(e) => {
                    error!(%page, "❌ Discovery failed: {}", e);
                    counter!("event_feed_pages_failed_total", "source" => source_name).increment(1);
                    report.failed = true;
                    report.errors.push(e.to_string());
                    reports.push(report);
                    page_calendars.push((page.clone(), page_calendar));
                    continue;
                }
            };
            report.links_found = links.len();
            counter!("event_feed_links_discovered_total", "source" => source_name)
                .increment(links.len() as u64);

            for link in &links {
                if let Some(previous) = seen.get(link.path()) {
                    match previous {
                        Some(event) => {
                            debug!(path = link.path(), "already fetched on an earlier page");
                            page_calendar.push(event.clone());
                            report.events_added += 1;
                        }
                        None => report.skipped_events += 1,
                    }
                    continue;
                }

                match Self::process_link(source, &fetcher, link, options.record_policy).await {
                    Ok(event) => {
                        debug!(id = %event.id, name = %event.name, "normalized event");
                        calendar.push(event.clone());
                        page_calendar.push(event.clone());
                        seen.insert(link.path().to_string(), Some(event));
                        report.events_added += 1;
                        counter!("event_feed_events_normalized_total", "source" => source_name)
                            .increment(1);
                    }
                    Err(e) => {
                        warn!(url = %link.url(), "Skipping event: {}", e);
                        seen.insert(link.path().to_string(), None);
                        report.skipped_events += 1;
                        report.errors.push(format!("{}: {}", link.url(), e));
                        counter!("event_feed_events_skipped_total", "source" => source_name)
                            .increment(1);
                    }
                }
            }

            counter!("event_feed_pages_processed_total", "source" => source_name).increment(1);
            histogram!("event_feed_page_duration_seconds", "source" => source_name)
                .record(started.elapsed().as_secs_f64());
            info!(
                "✅ {}: {} links, {} events, {} skipped",
                page, report.links_found, report.events_added, report.skipped_events
            );
            reports.push(report);
            page_calendars.push((page.clone(), page_calendar));
        }

        RunReport {
            calendar,
            page_calendars,
            pages: reports,
        }
    }

    async fn process_link(
        source: &mut dyn EventSource,
        fetcher: &RecordFetcher,
        link: &EventLink,
        policy: RecordPolicy,
    ) -> Result<Event> {
        let records = fetcher.fetch(source, link).await?;
        debug!(url = %link.url(), records = records.len(), "extracted structured data");
        let event = normalize_with(&records, link.url().as_str(), policy)?;
        Ok(event)
    }

    /// Write the run calendar (and per-page calendars when enabled) under
    /// `output_dir`, or print the run calendar to stdout when no directory is
    /// configured. Returns the files written.
    pub fn emit(report: &RunReport, config: &Config) -> Result<Vec<PathBuf>> {
        let Some(dir) = config.output_dir.as_deref() else {
            print!("{}", report.calendar.to_ics());
            return Ok(Vec::new());
        };

        let mut outputs = vec![(dir.join(RUN_CALENDAR_FILE), &report.calendar)];
        if config.per_page_output {
            for (page, calendar) in &report.page_calendars {
                let path = page_calendar_path(dir, page);
                if outputs.iter().any(|(used, _)| *used == path) {
                    return Err(ScraperError::Config(format!(
                        "page '{}' maps to an output file that is already used: {}",
                        page,
                        path.display()
                    )));
                }
                outputs.push((path, calendar));
            }
        }

        let mut written = Vec::with_capacity(outputs.len());
        for (path, calendar) in outputs {
            calendar.write_to(&path)?;
            written.push(path);
        }
        Ok(written)
    }
}
