// src/pipeline/ingest.rs

//! Crawl-and-reconcile driver.

use std::pin::pin;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;

use crate::models::DiscoveredGuide;
use crate::pipeline::reconcile::{Outcome, Plan, Reconciler};
use crate::services::ListingCrawler;

/// Why the crawl stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// A page came back with no items
    Exhausted { page: u32 },
    /// The configured page limit was reached
    PageLimit { pages: u32 },
    /// A page could not be loaded
    PageFailed { page: u32, error: String },
}

/// A guide left incomplete after all passes.
#[derive(Debug, Clone, Serialize)]
pub struct FailedGuide {
    pub name: String,
    pub source_url: String,
    pub stage: String,
    /// Whether any attempt in this run stored the blob
    pub blob_written: bool,
    pub error: String,
}

/// Totals of one ingest run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages: u32,
    pub links_seen: usize,
    /// Links whose label could not be turned into a name
    pub links_skipped: usize,
    pub already_complete: usize,
    pub blobs_uploaded: usize,
    pub rows_inserted: usize,
    /// Dry-run plans that were not executed
    pub planned: usize,
    pub collisions: usize,
    /// Guides completed by the retry pass
    pub recovered: usize,
    pub failures: Vec<FailedGuide>,
    pub termination: Termination,
}

impl IngestSummary {
    fn new(start_page: u32) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            pages: 0,
            links_seen: 0,
            links_skipped: 0,
            already_complete: 0,
            blobs_uploaded: 0,
            rows_inserted: 0,
            planned: 0,
            collisions: 0,
            recovered: 0,
            failures: Vec::new(),
            termination: Termination::Exhausted { page: start_page },
        }
    }

    pub fn crawl_failed(&self) -> bool {
        matches!(self.termination, Termination::PageFailed { .. })
    }

    /// Count an outcome.
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::AlreadyComplete => self.already_complete += 1,
            Outcome::Completed { plan } => self.record_writes(*plan),
            Outcome::Planned { .. } => self.planned += 1,
            Outcome::Collision { .. } => self.collisions += 1,
            Outcome::Failed { blob_written, .. } => {
                if *blob_written {
                    self.blobs_uploaded += 1;
                }
            }
        }
    }

    fn record_writes(&mut self, plan: Plan) {
        if plan.uploads() {
            self.blobs_uploaded += 1;
        }
        if plan.inserts() {
            self.rows_inserted += 1;
        }
    }

    /// Log the summary block.
    pub fn log(&self) {
        log::info!("Ingest summary");
        log::info!("    Pages crawled: {}", self.pages);
        log::info!(
            "    Links: {} seen, {} skipped",
            self.links_seen,
            self.links_skipped
        );
        log::info!("    Already complete: {}", self.already_complete);
        log::info!("    Blobs uploaded: {}", self.blobs_uploaded);
        log::info!("    Rows inserted: {}", self.rows_inserted);
        if self.planned > 0 {
            log::info!("    Planned (dry run): {}", self.planned);
        }
        if self.collisions > 0 {
            log::warn!("    Name collisions: {}", self.collisions);
        }
        if self.recovered > 0 {
            log::info!("    Recovered on retry: {}", self.recovered);
        }
        for failure in &self.failures {
            log::warn!(
                "    Incomplete: {} ({} failed: {})",
                failure.name,
                failure.stage,
                failure.error
            );
        }
        match &self.termination {
            Termination::Exhausted { page } => {
                log::info!("    Stopped: page {} had no items", page)
            }
            Termination::PageLimit { pages } => {
                log::info!("    Stopped: page limit of {} reached", pages)
            }
            Termination::PageFailed { page, error } => {
                log::error!("    Stopped: page {} failed: {}", page, error)
            }
        }
        log::info!(
            "    Elapsed: {}s",
            (self.finished_at - self.started_at).num_seconds()
        );
    }
}

impl FailedGuide {
    fn from_outcome(guide: &DiscoveredGuide, outcome: &Outcome) -> Option<Self> {
        let Outcome::Failed {
            stage,
            blob_written,
            error,
        } = outcome
        else {
            return None;
        };
        Some(Self {
            name: guide.name.clone(),
            source_url: guide.source_url.clone(),
            stage: stage.to_string(),
            blob_written: *blob_written,
            error: error.to_string(),
        })
    }
}

/// Crawl the listing and reconcile every PDF link, then retry failures.
pub async fn run_ingest(
    crawler: &ListingCrawler<'_>,
    reconciler: &mut Reconciler<'_>,
    retry_passes: u32,
) -> IngestSummary {
    let start_page = crawler.options().start_page;
    let mut summary = IngestSummary::new(start_page);
    let mut pending: Vec<(DiscoveredGuide, FailedGuide)> = Vec::new();
    let mut next_page = start_page;
    let mut ended_empty = false;

    let mut pages = pin!(crawler.pages());
    while let Some(result) = pages.next().await {
        let page = match result {
            Ok(page) => page,
            Err(e) => {
                summary.termination = Termination::PageFailed {
                    page: next_page,
                    error: e.to_string(),
                };
                break;
            }
        };
        summary.pages += 1;
        next_page = page.index + 1;

        if page.is_empty() {
            summary.termination = Termination::Exhausted { page: page.index };
            ended_empty = true;
            break;
        }

        for entry in &page.entries {
            for link in &entry.links {
                summary.links_seen += 1;
                let guide = match DiscoveredGuide::from_link(entry, link) {
                    Ok(guide) => guide,
                    Err(e) => {
                        summary.links_skipped += 1;
                        log::warn!("Skipping link {}: {}", link.href, e);
                        continue;
                    }
                };

                let outcome = reconciler.reconcile(&guide).await;
                summary.record(&outcome);
                if let Some(failure) = FailedGuide::from_outcome(&guide, &outcome) {
                    pending.push((guide, failure));
                }
            }
        }
    }

    if !ended_empty && !summary.crawl_failed() {
        summary.termination = Termination::PageLimit {
            pages: summary.pages,
        };
    }

    if !reconciler.is_dry_run() {
        pending = retry_pending(reconciler, pending, retry_passes, &mut summary).await;
    }

    summary.failures = pending.into_iter().map(|(_, failure)| failure).collect();
    summary.finished_at = Utc::now();
    summary
}

/// Re-reconcile incomplete guides. Reconciliation is idempotent, so each pass
/// only performs the half that is still missing. Returns what is left.
async fn retry_pending(
    reconciler: &mut Reconciler<'_>,
    mut pending: Vec<(DiscoveredGuide, FailedGuide)>,
    passes: u32,
    summary: &mut IngestSummary,
) -> Vec<(DiscoveredGuide, FailedGuide)> {
    for pass in 1..=passes {
        if pending.is_empty() {
            break;
        }
        log::info!(
            "Retry pass {}/{}: {} incomplete guides",
            pass,
            passes,
            pending.len()
        );

        let mut still_pending = Vec::new();
        for (guide, earlier) in pending {
            let outcome = reconciler.reconcile(&guide).await;
            if let Some(mut failure) = FailedGuide::from_outcome(&guide, &outcome) {
                summary.record(&outcome);
                failure.blob_written |= earlier.blob_written;
                still_pending.push((guide, failure));
                continue;
            }
            if let Outcome::Completed { plan } = outcome {
                summary.record_writes(plan);
            }
            summary.recovered += 1;
        }
        pending = still_pending;
    }
    pending
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::ListingSelectors;
    use crate::services::{CrawlOptions, ListingParser};
    use crate::testing::{
        Journal, MemoryBlobStore, MemoryIndex, Op, ScriptedPages, StaticFetcher, listing_html,
    };

    const BASE: &str = "https://example.com/guias?field_categoria_gs_value=All";

    fn options() -> CrawlOptions {
        CrawlOptions {
            start_page: 0,
            max_pages: None,
            page_delay: Duration::ZERO,
            page_retries: 0,
            retry_delay: Duration::ZERO,
        }
    }

    fn crawler<'a>(source: &'a ScriptedPages, options: CrawlOptions) -> ListingCrawler<'a> {
        let parser = ListingParser::new(&ListingSelectors::default()).unwrap();
        ListingCrawler::new(source, parser, BASE, options).unwrap()
    }

    fn two_guides() -> Vec<std::result::Result<String, u16>> {
        vec![
            Ok(listing_html(&[
                ("GER 1.Asma", "/pdf/1GER.pdf"),
                ("GRR 1.Asma", "/pdf/1GRR.pdf"),
            ])),
            Ok(listing_html(&[])),
        ]
    }

    #[tokio::test]
    async fn test_ingest_fills_both_stores() {
        let journal = Journal::default();
        let blobs = MemoryBlobStore::new(&journal);
        let index = MemoryIndex::new(&journal);
        let fetcher = StaticFetcher::new(&journal);
        let source = ScriptedPages::new(two_guides());

        let crawler = crawler(&source, options());
        let mut reconciler = Reconciler::new(&blobs, &index, &fetcher);
        let summary = run_ingest(&crawler, &mut reconciler, 1).await;

        assert_eq!(summary.pages, 2);
        assert_eq!(summary.links_seen, 2);
        assert_eq!(summary.blobs_uploaded, 2);
        assert_eq!(summary.rows_inserted, 2);
        assert!(summary.failures.is_empty());
        assert_eq!(summary.termination, Termination::Exhausted { page: 1 });
        assert_eq!(blobs.keys(), vec!["GER-1.Asma.pdf", "GRR-1.Asma.pdf"]);
        assert_eq!(
            journal.ops()[0],
            Op::Download("https://example.com/pdf/1GER.pdf".to_string())
        );
    }

    #[tokio::test]
    async fn test_second_ingest_is_noop() {
        let journal = Journal::default();
        let blobs = MemoryBlobStore::new(&journal);
        let index = MemoryIndex::new(&journal);
        let fetcher = StaticFetcher::new(&journal);

        let first_source = ScriptedPages::new(two_guides());
        let mut reconciler = Reconciler::new(&blobs, &index, &fetcher);
        run_ingest(&crawler(&first_source, options()), &mut reconciler, 1).await;
        journal.clear();

        let second_source = ScriptedPages::new(two_guides());
        let mut reconciler = Reconciler::new(&blobs, &index, &fetcher);
        let summary = run_ingest(&crawler(&second_source, options()), &mut reconciler, 1).await;

        assert_eq!(summary.already_complete, 2);
        assert_eq!(summary.blobs_uploaded + summary.rows_inserted, 0);
        assert!(journal.ops().is_empty());
        assert_eq!(index.rows().len(), 2);
    }

    #[tokio::test]
    async fn test_page_failure_is_reported() {
        let journal = Journal::default();
        let blobs = MemoryBlobStore::new(&journal);
        let index = MemoryIndex::new(&journal);
        let fetcher = StaticFetcher::new(&journal);
        let source = ScriptedPages::new(vec![
            Ok(listing_html(&[("GER 1.Asma", "/pdf/1GER.pdf")])),
            Err(502),
        ]);

        let crawler = crawler(&source, options());
        let mut reconciler = Reconciler::new(&blobs, &index, &fetcher);
        let summary = run_ingest(&crawler, &mut reconciler, 1).await;

        assert!(summary.crawl_failed());
        assert!(matches!(
            summary.termination,
            Termination::PageFailed { page: 1, .. }
        ));
        assert_eq!(summary.pages, 1);
        assert_eq!(summary.rows_inserted, 1);
    }

    #[tokio::test]
    async fn test_unrecognised_page_is_not_end_of_listing() {
        let journal = Journal::default();
        let blobs = MemoryBlobStore::new(&journal);
        let index = MemoryIndex::new(&journal);
        let fetcher = StaticFetcher::new(&journal);
        let maintenance = "<html><body><h1>Servicio no disponible</h1></body></html>";
        let source = ScriptedPages::new(vec![
            Ok(listing_html(&[("GER 1.Asma", "/pdf/1GER.pdf")])),
            Ok(maintenance.to_string()),
            Ok(maintenance.to_string()),
            Ok(maintenance.to_string()),
            Ok(listing_html(&[("GER 2.Otra", "/pdf/2GER.pdf")])),
        ]);

        let crawler = crawler(
            &source,
            CrawlOptions {
                page_retries: 2,
                ..options()
            },
        );
        let mut reconciler = Reconciler::new(&blobs, &index, &fetcher);
        let summary = run_ingest(&crawler, &mut reconciler, 1).await;

        assert!(summary.crawl_failed());
        assert!(matches!(
            summary.termination,
            Termination::PageFailed { page: 1, .. }
        ));
        assert_eq!(summary.pages, 1);
        assert_eq!(source.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_retry_pass_recovers_failed_download() {
        let journal = Journal::default();
        let blobs = MemoryBlobStore::new(&journal);
        let index = MemoryIndex::new(&journal);
        let fetcher = StaticFetcher::new(&journal);
        fetcher.fail_times("https://example.com/pdf/1GER.pdf", 1);
        let source = ScriptedPages::new(two_guides());

        let crawler = crawler(&source, options());
        let mut reconciler = Reconciler::new(&blobs, &index, &fetcher);
        let summary = run_ingest(&crawler, &mut reconciler, 1).await;

        assert_eq!(summary.recovered, 1);
        assert!(summary.failures.is_empty());
        assert_eq!(summary.blobs_uploaded, 2);
        assert_eq!(summary.rows_inserted, 2);
        assert_eq!(index.rows().len(), 2);
    }

    #[tokio::test]
    async fn test_persistent_failure_is_listed() {
        let journal = Journal::default();
        let blobs = MemoryBlobStore::new(&journal);
        let index = MemoryIndex::new(&journal);
        index.fail_inserts_for("GRR-1.Asma.pdf");
        let fetcher = StaticFetcher::new(&journal);
        let source = ScriptedPages::new(two_guides());

        let crawler = crawler(&source, options());
        let mut reconciler = Reconciler::new(&blobs, &index, &fetcher);
        let summary = run_ingest(&crawler, &mut reconciler, 2).await;

        assert_eq!(summary.failures.len(), 1);
        let failure = &summary.failures[0];
        assert_eq!(failure.name, "GRR-1.Asma.pdf");
        assert_eq!(failure.stage, "index insert");
        // The blob from the first attempt is still stored: a half-written pair.
        assert!(failure.blob_written);
        assert_eq!(blobs.keys(), vec!["GER-1.Asma.pdf", "GRR-1.Asma.pdf"]);
        // Uploaded once on the first attempt, never re-downloaded.
        assert_eq!(summary.blobs_uploaded, 2);
        let downloads = journal
            .ops()
            .into_iter()
            .filter(|op| matches!(op, Op::Download(_)))
            .count();
        assert_eq!(downloads, 2);
    }

    #[tokio::test]
    async fn test_unparseable_label_skipped() {
        let journal = Journal::default();
        let blobs = MemoryBlobStore::new(&journal);
        let index = MemoryIndex::new(&journal);
        let fetcher = StaticFetcher::new(&journal);
        let source = ScriptedPages::new(vec![
            Ok(listing_html(&[("PDF", "/pdf/x.pdf"), ("GER 2.Otra", "/pdf/2.pdf")])),
            Ok(listing_html(&[])),
        ]);

        let crawler = crawler(&source, options());
        let mut reconciler = Reconciler::new(&blobs, &index, &fetcher);
        let summary = run_ingest(&crawler, &mut reconciler, 0).await;

        assert_eq!(summary.links_seen, 2);
        assert_eq!(summary.links_skipped, 1);
        assert_eq!(index.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_page_limit_termination() {
        let journal = Journal::default();
        let blobs = MemoryBlobStore::new(&journal);
        let index = MemoryIndex::new(&journal);
        let fetcher = StaticFetcher::new(&journal);
        let source = ScriptedPages::new(vec![
            Ok(listing_html(&[("GER 1.Uno", "/1.pdf")])),
            Ok(listing_html(&[("GER 2.Dos", "/2.pdf")])),
        ]);

        let crawler = crawler(
            &source,
            CrawlOptions {
                max_pages: Some(1),
                ..options()
            },
        );
        let mut reconciler = Reconciler::new(&blobs, &index, &fetcher).dry_run(true);
        let summary = run_ingest(&crawler, &mut reconciler, 1).await;

        assert_eq!(summary.termination, Termination::PageLimit { pages: 1 });
        assert_eq!(summary.planned, 1);
        assert!(journal.ops().is_empty());
        assert_eq!(source.requests().len(), 1);
    }
}
