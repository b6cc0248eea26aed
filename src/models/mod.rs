// src/models/mod.rs

//! Domain models for the guide crawler.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod guide;
mod listing;

// Re-export all public types
pub use config::{
    Config, CrawlerConfig, IndexBackend, IndexConfig, ListingSelectors, ReconcileConfig,
    StorageBackend, StorageConfig,
};
pub use guide::{ClinicalGuideRecord, DiscoveredGuide, GuideKey, PDF_CONTENT_TYPE};
pub use listing::{ListingEntry, ListingLink, ListingPage};
