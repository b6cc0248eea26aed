//! Cross-store drift audit.
//!
//! Lists both stores and reports names present in only one of them. This is
//! the check for pairs left half-written by an earlier run; it never writes.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::Result;
use crate::storage::{BlobStore, GuideIndex};

/// Names held by exactly one store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub blob_count: usize,
    pub row_count: usize,
    /// Indexed guides whose PDF is missing
    pub rows_without_blob: Vec<String>,
    /// Stored PDFs with no index row
    pub blobs_without_row: Vec<String>,
}

impl DriftReport {
    pub fn is_consistent(&self) -> bool {
        self.rows_without_blob.is_empty() && self.blobs_without_row.is_empty()
    }

    pub fn log(&self) {
        log::info!(
            "Audit: {} blobs, {} index names",
            self.blob_count,
            self.row_count
        );
        if self.is_consistent() {
            log::info!("Blob storage and index agree");
            return;
        }
        for name in &self.rows_without_blob {
            log::warn!("    Missing blob: {}", name);
        }
        for name in &self.blobs_without_row {
            log::warn!("    Missing index row: {}", name);
        }
    }
}

/// Compare the keys of both stores.
pub async fn run_audit(blobs: &dyn BlobStore, index: &dyn GuideIndex) -> Result<DriftReport> {
    let blob_keys: BTreeSet<String> = blobs.list_keys().await?.into_iter().collect();
    let names: BTreeSet<String> = index.list_names().await?.into_iter().collect();

    Ok(DriftReport {
        blob_count: blob_keys.len(),
        row_count: names.len(),
        rows_without_blob: names.difference(&blob_keys).cloned().collect(),
        blobs_without_row: blob_keys.difference(&names).cloned().collect(),
    })
}
