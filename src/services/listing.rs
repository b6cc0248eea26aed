//! Listing page parser.
//!
//! Turns the HTML of one listing page into [`ListingEntry`] values using the
//! configured selectors. A page whose content region or item list is missing
//! is an error; a list with no items is an empty listing.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ListingEntry, ListingLink, ListingSelectors};
use crate::utils::{normalize_whitespace, resolve_url};

/// Compiled listing selectors.
#[derive(Debug, Clone)]
pub struct ListingParser {
    content: Selector,
    list: Selector,
    item: Selector,
    heading: Selector,
    category: Selector,
    pdf_link: Selector,
}

impl ListingParser {
    /// Compile the configured selectors.
    pub fn new(selectors: &ListingSelectors) -> Result<Self> {
        Ok(Self {
            content: parse_selector(&selectors.content)?,
            list: parse_selector(&selectors.list)?,
            item: parse_selector(&selectors.item)?,
            heading: parse_selector(&selectors.heading)?,
            category: parse_selector(&selectors.category)?,
            pdf_link: parse_selector(&selectors.pdf_link)?,
        })
    }

    /// Parse a listing page. Relative links resolve against `page_url`.
    ///
    /// Fails when the page lacks the content region or the item list, so an
    /// error or maintenance page is never read as the end of the listing.
    pub fn parse(&self, html: &str, page_url: &Url) -> Result<Vec<ListingEntry>> {
        let document = Html::parse_document(html);

        let content = document
            .select(&self.content)
            .next()
            .ok_or_else(|| {
                AppError::crawl(page_url.as_str(), "no content region in listing markup")
            })?;
        let list = content
            .select(&self.list)
            .next()
            .ok_or_else(|| {
                AppError::crawl(page_url.as_str(), "no item list in listing markup")
            })?;

        Ok(list
            .select(&self.item)
            .map(|item| self.parse_item(item, page_url))
            .collect())
    }

    fn parse_item(&self, item: ElementRef<'_>, page_url: &Url) -> ListingEntry {
        let description = item
            .select(&self.heading)
            .next()
            .map(|h| description_from_heading(&element_text(h)))
            .unwrap_or_default();

        let category = item
            .select(&self.category)
            .next()
            .map(element_text)
            .unwrap_or_default();

        let links = item
            .select(&self.pdf_link)
            .filter_map(|anchor| {
                let href = anchor.value().attr("href")?.trim();
                if href.is_empty() {
                    return None;
                }
                Some(ListingLink {
                    href: resolve_url(page_url, href),
                    label: element_text(anchor),
                })
            })
            .collect();

        ListingEntry {
            category,
            description,
            links,
        }
    }
}

/// Description part of an item heading.
///
/// Headings read `"<code>, <description>"`; everything after the first
/// comma is the description. A heading without a comma has none.
pub fn description_from_heading(heading: &str) -> String {
    heading
        .split_once(',')
        .map(|(_, rest)| rest.trim().to_string())
        .unwrap_or_default()
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
