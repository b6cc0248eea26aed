// src/services/crawler.rs

//! Paginated listing crawler.
//!
//! [`ListingCrawler::pages`] yields listing pages lazily, one request per
//! poll. The stream ends on the first empty page, on the page limit, or right
//! after yielding the error of a page that could not be loaded.

use std::time::Duration;

use futures::stream::{self, Stream};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{CrawlerConfig, ListingPage};
use crate::services::ListingParser;
use crate::utils::http::PageSource;
use crate::utils::page_url;

/// Pagination behavior of a crawl.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub start_page: u32,
    pub max_pages: Option<u32>,
    pub page_delay: Duration,
    pub page_retries: u32,
    pub retry_delay: Duration,
}

impl From<&CrawlerConfig> for CrawlOptions {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            start_page: config.start_page,
            max_pages: config.max_pages,
            page_delay: Duration::from_millis(config.page_delay_ms),
            page_retries: config.page_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

enum Cursor {
    Next { index: u32, fetched: u32 },
    Done,
}

/// Crawler over the paginated guide listing.
pub struct ListingCrawler<'a> {
    source: &'a dyn PageSource,
    parser: ListingParser,
    base_url: Url,
    options: CrawlOptions,
}

impl<'a> ListingCrawler<'a> {
    pub fn new(
        source: &'a dyn PageSource,
        parser: ListingParser,
        base_url: &str,
        options: CrawlOptions,
    ) -> Result<Self> {
        Ok(Self {
            source,
            parser,
            base_url: Url::parse(base_url)?,
            options,
        })
    }

    pub fn options(&self) -> &CrawlOptions {
        &self.options
    }

    /// Lazily fetch listing pages starting at the configured page.
    pub fn pages(&self) -> impl Stream<Item = Result<ListingPage>> + '_ {
        let start = Cursor::Next {
            index: self.options.start_page,
            fetched: 0,
        };

        stream::unfold(start, move |cursor| async move {
            let Cursor::Next { index, fetched } = cursor else {
                return None;
            };
            if self.options.max_pages.is_some_and(|limit| fetched >= limit) {
                log::info!("Page limit reached after {} pages", fetched);
                return None;
            }
            if fetched > 0 && !self.options.page_delay.is_zero() {
                tokio::time::sleep(self.options.page_delay).await;
            }

            match self.fetch_page(index).await {
                Ok(page) if page.is_empty() => {
                    log::info!("Page {} has no items, end of listing", index);
                    Some((Ok(page), Cursor::Done))
                }
                Ok(page) => {
                    let next = Cursor::Next {
                        index: index + 1,
                        fetched: fetched + 1,
                    };
                    Some((Ok(page), next))
                }
                Err(e) => Some((Err(e), Cursor::Done)),
            }
        })
    }

    /// Fetch and parse one page, retrying failed loads and unrecognised
    /// markup.
    pub async fn fetch_page(&self, index: u32) -> Result<ListingPage> {
        let url = page_url(&self.base_url, index);
        let mut attempt = 0;

        loop {
            let loaded = match self.source.fetch_html(url.as_str()).await {
                Ok(html) => self.parser.parse(&html, &url),
                Err(e) => Err(e),
            };

            match loaded {
                Ok(entries) => {
                    log::info!("Page {}: {} items ({})", index, entries.len(), url);
                    return Ok(ListingPage {
                        index,
                        url: url.to_string(),
                        entries,
                    });
                }
                Err(e) if attempt < self.options.page_retries => {
                    attempt += 1;
                    log::warn!(
                        "Failed to load page {} (attempt {}/{}): {}",
                        index,
                        attempt,
                        self.options.page_retries + 1,
                        e
                    );
                    if !self.options.retry_delay.is_zero() {
                        tokio::time::sleep(self.options.retry_delay).await;
                    }
                }
                Err(e) => {
                    return Err(AppError::crawl(format!("listing page {index}"), e));
                }
            }
        }
    }
}
