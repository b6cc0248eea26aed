//! Service layer for the guide crawler.
//!
//! - Listing parsing (`ListingParser`)
//! - Paginated crawling (`ListingCrawler`)

mod crawler;
mod listing;

pub use crawler::{CrawlOptions, ListingCrawler};
pub use listing::{ListingParser, description_from_heading};
