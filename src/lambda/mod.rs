// src/lambda/mod.rs

//! AWS Lambda handler for scheduled ingestion.
//!
//! Each invocation:
//! 1. Builds the configuration from defaults and the environment
//! 2. Crawls the listing
//! 3. Reconciles every guide into S3 and Postgres
//! 4. Returns a summary of the run

use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::error::Result;
use crate::models::{Config, IndexBackend, StorageBackend};
use crate::pipeline::{IngestSummary, Termination, run_pipeline};

/// Lambda invocation payload.
#[derive(Debug, Default, Deserialize)]
pub struct IngestRequest {
    /// Stop after this many listing pages
    #[serde(default)]
    pub max_pages: Option<u32>,

    /// Plan only, write nothing
    #[serde(default)]
    pub dry_run: bool,
}

/// Lambda response payload.
#[derive(Debug, Default, Serialize)]
pub struct IngestResponse {
    /// Whether the crawl ran to the end of the listing (or its page limit)
    pub success: bool,

    pub pages: u32,
    pub already_complete: usize,
    pub blobs_uploaded: usize,
    pub rows_inserted: usize,

    /// Guides left incomplete
    pub incomplete: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,

    /// Error message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl From<&IngestSummary> for IngestResponse {
    fn from(summary: &IngestSummary) -> Self {
        Self {
            success: !summary.crawl_failed(),
            pages: summary.pages,
            already_complete: summary.already_complete,
            blobs_uploaded: summary.blobs_uploaded,
            rows_inserted: summary.rows_inserted,
            incomplete: summary.failures.len(),
            termination: Some(summary.termination.clone()),
            error: None,
            execution_time_ms: 0,
        }
    }
}

/// Main Lambda handler function.
#[instrument(skip(event))]
pub async fn handler(
    event: LambdaEvent<IngestRequest>,
) -> std::result::Result<IngestResponse, LambdaError> {
    let start = std::time::Instant::now();
    let (request, _context) = event.into_parts();

    info!(
        "Starting ingest: max_pages={:?}, dry_run={}",
        request.max_pages, request.dry_run
    );

    let result = async {
        let config = load_lambda_config(&request, |key| std::env::var(key).ok())?;
        run_pipeline(&config).await
    }
    .await;

    let elapsed = start.elapsed().as_millis() as u64;
    match result {
        Ok(summary) => {
            let response = IngestResponse {
                execution_time_ms: elapsed,
                ..IngestResponse::from(&summary)
            };
            info!(
                "Ingest finished: {} pages, {} uploads, {} inserts in {}ms",
                response.pages, response.blobs_uploaded, response.rows_inserted, elapsed
            );
            Ok(response)
        }
        Err(e) => {
            error!("Ingest failed: {}", e);
            Ok(IngestResponse {
                error: Some(e.to_string()),
                execution_time_ms: elapsed,
                ..Default::default()
            })
        }
    }
}

/// Configuration for the Lambda environment: S3 and Postgres, tuned by
/// environment variables and the request.
fn load_lambda_config<F>(request: &IngestRequest, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::default();
    config.storage.backend = StorageBackend::S3;
    config.index.backend = IndexBackend::Postgres;
    config.index.url = String::new();
    config.apply_env_with(&lookup);

    if let Some(delay) = lookup("PAGE_DELAY_MS").and_then(|v| v.parse().ok()) {
        config.crawler.page_delay_ms = delay;
    }
    if let Some(timeout) = lookup("CRAWL_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.crawler.timeout_secs = timeout;
    }
    if let Some(max_pages) = lookup("MAX_PAGES").and_then(|v| v.parse().ok()) {
        config.crawler.max_pages = Some(max_pages);
    }

    if request.max_pages.is_some() {
        config.crawler.max_pages = request.max_pages;
    }
    config.reconcile.dry_run = request.dry_run;

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_request_defaults() {
        let req: IngestRequest = serde_json::from_str("{}").unwrap();
        assert!(req.max_pages.is_none());
        assert!(!req.dry_run);
    }

    #[test]
    fn test_lambda_config_requires_database_url() {
        let result = load_lambda_config(&IngestRequest::default(), |_| None);
        assert!(result.is_err());
    }

    #[test]
    fn test_lambda_config_from_env_and_request() {
        let request = IngestRequest {
            max_pages: Some(2),
            dry_run: true,
        };
        let config = load_lambda_config(&request, |key| match key {
            "DATABASE_URL" => Some("postgres://db/guides".to_string()),
            "S3_BUCKET" => Some("guides-prod".to_string()),
            "PAGE_DELAY_MS" => Some("500".to_string()),
            "MAX_PAGES" => Some("9".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.bucket, "guides-prod");
        assert_eq!(config.index.backend, IndexBackend::Postgres);
        assert_eq!(config.crawler.page_delay_ms, 500);
        assert_eq!(config.crawler.max_pages, Some(2));
        assert!(config.reconcile.dry_run);
    }
}
