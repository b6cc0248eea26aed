//! Items scraped from the guide listing.

use serde::Serialize;

/// A PDF anchor inside a listing item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingLink {
    /// Absolute URL of the PDF
    pub href: String,
    /// Visible link text, e.g. `"GER 1.Example Title"`
    pub label: String,
}

/// One item of the listing: a guide heading with its PDF variants.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ListingEntry {
    pub category: String,
    pub description: String,
    pub links: Vec<ListingLink>,
}

/// A fetched listing page.
#[derive(Debug, Clone, Serialize)]
pub struct ListingPage {
    pub index: u32,
    pub url: String,
    pub entries: Vec<ListingEntry>,
}

impl ListingPage {
    /// An empty page marks the end of the listing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn link_count(&self) -> usize {
        self.entries.iter().map(|e| e.links.len()).sum()
    }
}
