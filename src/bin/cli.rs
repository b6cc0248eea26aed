//! Guide crawler CLI
//!
//! Local execution entry point. For AWS Lambda, use `guide-crawler-lambda`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use guide_crawler::{
    error::{AppError, Result},
    models::{Config, GuideKey},
    pipeline,
    services::ListingParser,
};

/// IMSS clinical practice guideline crawler
#[derive(Parser, Debug)]
#[command(
    name = "guide-crawler",
    version,
    about = "Mirrors the IMSS clinical guide listing into blob storage and a catalog table"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the listing and reconcile every guide into both stores
    Crawl {
        /// Stop after this many listing pages
        #[arg(long)]
        max_pages: Option<u32>,

        /// First listing page to fetch
        #[arg(long)]
        start_page: Option<u32>,

        /// Log planned writes without performing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Compare blob storage with the index and report drift
    Audit,

    /// Validate configuration and selectors
    Validate,

    /// Print the derived document name for a link label
    Key {
        /// Link text as shown on the listing, e.g. "GER 1.Example Title"
        label: String,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::Key { label } = &cli.command {
        println!("{}", GuideKey::from_label(label)?.name());
        return Ok(());
    }

    log::info!("Guide crawler starting...");

    let mut config = Config::load_or_default(&cli.config);
    config.apply_env();
    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Crawl {
            max_pages,
            start_page,
            dry_run,
        } => {
            if max_pages.is_some() {
                config.crawler.max_pages = max_pages;
            }
            if let Some(start_page) = start_page {
                config.crawler.start_page = start_page;
            }
            if dry_run {
                config.reconcile.dry_run = true;
            }
            config.validate()?;

            let summary = pipeline::run_pipeline(&config).await?;
            if summary.crawl_failed() {
                return Err(AppError::crawl(
                    "listing",
                    "crawl stopped on a page that could not be loaded",
                ));
            }

            log::info!("Crawl complete!");
        }

        Command::Audit => {
            config.validate()?;
            let report = pipeline::run_audit_pipeline(&config).await?;
            if !report.is_consistent() {
                log::warn!("Stores have drifted; run 'crawl' to repair");
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");

            ListingParser::new(&config.selectors)?;
            log::info!("✓ Selectors OK");

            log::info!("All validations passed!");
        }

        Command::Key { .. } => {}
    }

    log::info!("Done!");

    Ok(())
}
