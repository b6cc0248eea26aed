//! Clinical guide identity and the catalog record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{ListingEntry, ListingLink};
use crate::utils::normalize_whitespace;

/// Content type every guide is stored with.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Width of the classification code at the start of a link label.
const TYPE_CODE_LEN: usize = 3;

/// Derived identity of a guide, built from its link label.
///
/// A label such as `"GER 1.Example Title"` carries a three character type
/// code, one separator character and the title. The derived name
/// (`"GER-1.Example Title.pdf"`) is the object key in blob storage and the
/// lookup key in the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuideKey {
    type_code: String,
    title: String,
}

impl GuideKey {
    /// Parse a link label into a key.
    ///
    /// Positions count characters, not bytes, so accented titles split the
    /// same way they read.
    pub fn from_label(label: &str) -> Result<Self> {
        let label = normalize_whitespace(label);
        let type_code: String = label.chars().take(TYPE_CODE_LEN).collect();
        let title: String = label.chars().skip(TYPE_CODE_LEN + 1).collect();

        if type_code.chars().count() < TYPE_CODE_LEN || title.is_empty() {
            return Err(AppError::validation(format!(
                "link label '{label}' has no type code and title"
            )));
        }

        Ok(Self { type_code, title })
    }

    pub fn type_code(&self) -> &str {
        &self.type_code
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Derived document name: `{type}-{title}.pdf`.
    pub fn name(&self) -> String {
        format!("{}-{}.pdf", self.type_code, self.title)
    }
}

impl fmt::Display for GuideKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A PDF link found on the listing, with the metadata of its listing item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredGuide {
    pub key: GuideKey,
    /// Derived name, cached from `key`
    pub name: String,
    /// Where the PDF bytes are downloaded from
    pub source_url: String,
    pub description: String,
    pub category: String,
}

impl DiscoveredGuide {
    /// Build a guide from one link of a listing entry.
    pub fn from_link(entry: &ListingEntry, link: &ListingLink) -> Result<Self> {
        let key = GuideKey::from_label(&link.label)?;
        Ok(Self {
            name: key.name(),
            key,
            source_url: link.href.clone(),
            description: entry.description.clone(),
            category: entry.category.clone(),
        })
    }

    /// Create the catalog record pointing at the stored blob.
    pub fn to_record(&self, url: impl Into<String>) -> ClinicalGuideRecord {
        ClinicalGuideRecord {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            guide_type: self.key.type_code().to_string(),
            description: self.description.clone(),
            category: self.category.clone(),
            url: url.into(),
            created_at: Utc::now(),
        }
    }
}

/// A row of the `clinical_guides` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalGuideRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub guide_type: String,
    pub description: String,
    pub category: String,
    /// Blob storage locator
    pub url: String,
    pub created_at: DateTime<Utc>,
}
