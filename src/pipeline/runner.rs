// src/pipeline/runner.rs

//! Configured entry points.
//!
//! These construct every long-lived resource (HTTP client, blob client,
//! database pool) from the configuration, hand them to the pipeline by
//! reference and release the pool before returning.

use crate::error::Result;
use crate::models::Config;
use crate::pipeline::{DriftReport, IngestSummary, Reconciler, run_audit, run_ingest};
use crate::services::{CrawlOptions, ListingCrawler, ListingParser};
use crate::storage::{open_blob_store, open_index};
use crate::utils::http::HttpClient;

/// Run the full crawl and reconciliation.
pub async fn run_pipeline(config: &Config) -> Result<IngestSummary> {
    let http = HttpClient::from_config(&config.crawler)?;
    let parser = ListingParser::new(&config.selectors)?;
    let crawler = ListingCrawler::new(
        &http,
        parser,
        &config.crawler.base_url,
        CrawlOptions::from(&config.crawler),
    )?;

    let blobs = open_blob_store(&config.storage).await?;
    let index = open_index(&config.index).await?;

    log::info!("Crawling {}", config.crawler.base_url);
    let mut reconciler = Reconciler::new(blobs.as_ref(), index.as_ref(), &http)
        .dry_run(config.reconcile.dry_run);
    let summary = run_ingest(&crawler, &mut reconciler, config.reconcile.retry_passes).await;

    index.close().await;
    summary.log();
    Ok(summary)
}

/// Report drift between the configured stores.
pub async fn run_audit_pipeline(config: &Config) -> Result<DriftReport> {
    let blobs = open_blob_store(&config.storage).await?;
    let index = open_index(&config.index).await?;

    let report = run_audit(blobs.as_ref(), index.as_ref()).await;
    index.close().await;

    let report = report?;
    report.log();
    Ok(report)
}
