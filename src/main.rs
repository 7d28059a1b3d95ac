use clap::{Parser, Subcommand};
use event_feed_scraper::config::{Config, Strategy};
use event_feed_scraper::constants::DEFAULT_CONFIG_FILE;
use event_feed_scraper::logging;
use event_feed_scraper::pipeline::Pipeline;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "event-feed")]
#[command(about = "Scrapes page event listings into an iCalendar feed")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Page to scrape (repeatable). Replaces the pages from the config file
    #[arg(long = "page", global = true)]
    pages: Vec<String>,

    #[arg(long, global = true, value_enum)]
    strategy: Option<Strategy>,

    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Verbose logging, browser console traces and a debug screenshot
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, fetch and normalize events, then write the calendar
    Run,
    /// Only discover event links and print them per page
    Links,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load_or_default(&self.config)?;
        config.apply_env();
        if !self.pages.is_empty() {
            config.pages = self.pages.clone();
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = Some(dir.clone());
        }
        config.debug |= self.debug;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = cli.load_config()?;
    logging::init_logging(config.debug);
    config.validate()?;

    match cli.command {
        Commands::Run => {
            eprintln!("🚀 Scraping {} page(s)...", config.pages.len());
            let report = match Pipeline::run(&config).await {
                Ok(report) => report,
                Err(e) => {
                    error!("Run failed: {}", e);
                    return Err(e.into());
                }
            };

            for page in &report.pages {
                eprintln!("\n📊 Results for {}:", page.page);
                if page.failed {
                    eprintln!("   ❌ Discovery failed");
                } else {
                    eprintln!("   Links found: {}", page.links_found);
                    eprintln!("   Events added: {}", page.events_added);
                    eprintln!("   Skipped: {}", page.skipped_events);
                }
                if !page.errors.is_empty() {
                    warn!("{} errors encountered on {}", page.errors.len(), page.page);
                    eprintln!("\n⚠️  Errors encountered:");
                    for error in &page.errors {
                        eprintln!("   - {}", error);
                    }
                }
            }

            let written = Pipeline::emit(&report, &config)?;
            for path in &written {
                eprintln!("   Output file: {}", path.display());
            }
            info!(
                events = report.total_events(),
                failed_pages = report.failed_pages(),
                "run finished"
            );
            eprintln!("✅ {} event(s) in the calendar", report.total_events());
        }
        Commands::Links => {
            for (page, links) in Pipeline::links(&config).await? {
                match links {
                    Ok(links) => {
                        println!("{} ({} links)", page, links.len());
                        for link in &links {
                            println!("   {}", link.url());
                        }
                    }
                    Err(e) => println!("{}: ❌ {}", page, e),
                }
            }
        }
    }
    Ok(())
}
