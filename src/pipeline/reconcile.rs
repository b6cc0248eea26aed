// src/pipeline/reconcile.rs

//! Two-store reconciliation.
//!
//! For each discovered guide the reconciler checks both stores and performs
//! only the writes needed to bring them into agreement:
//!
//! | blob | row | plan               |
//! |------|-----|--------------------|
//! | yes  | yes | nothing            |
//! | no   | yes | upload blob        |
//! | yes  | no  | insert row         |
//! | no   | no  | upload, then insert |
//!
//! The two writes are not transactional. A failure stops the remaining steps
//! for that guide and is reported in the [`Outcome`]; re-running the
//! reconciliation performs only the half that is still missing.

use std::collections::HashMap;
use std::fmt;

use crate::error::AppError;
use crate::models::{DiscoveredGuide, PDF_CONTENT_TYPE};
use crate::storage::{BlobStore, GuideIndex};
use crate::utils::http::DocumentFetcher;

/// Writes required for one guide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Nothing,
    UploadBlob,
    InsertRow,
    UploadThenInsert,
}

impl Plan {
    pub fn from_presence(blob_exists: bool, row_exists: bool) -> Self {
        match (blob_exists, row_exists) {
            (true, true) => Plan::Nothing,
            (false, true) => Plan::UploadBlob,
            (true, false) => Plan::InsertRow,
            (false, false) => Plan::UploadThenInsert,
        }
    }

    pub fn uploads(self) -> bool {
        matches!(self, Plan::UploadBlob | Plan::UploadThenInsert)
    }

    pub fn inserts(self) -> bool {
        matches!(self, Plan::InsertRow | Plan::UploadThenInsert)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Plan::Nothing => "nothing",
            Plan::UploadBlob => "upload blob",
            Plan::InsertRow => "insert row",
            Plan::UploadThenInsert => "upload blob, insert row",
        };
        f.write_str(s)
    }
}

/// Step at which a reconciliation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckBlob,
    CheckRow,
    Download,
    Upload,
    Insert,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::CheckBlob => "blob check",
            Stage::CheckRow => "index check",
            Stage::Download => "download",
            Stage::Upload => "upload",
            Stage::Insert => "index insert",
        };
        f.write_str(s)
    }
}

/// Result of reconciling one guide.
#[derive(Debug)]
pub enum Outcome {
    /// Both stores already hold the guide
    AlreadyComplete,
    /// The plan's writes all succeeded
    Completed { plan: Plan },
    /// Dry run: the plan that would have run
    Planned { plan: Plan },
    /// Another source URL already claimed this name in this run
    Collision { claimed_by: String },
    Failed {
        stage: Stage,
        /// Whether this attempt stored the blob before failing
        blob_written: bool,
        error: AppError,
    },
}

/// Brings blob storage and the index into agreement, one guide at a time.
pub struct Reconciler<'a> {
    blobs: &'a dyn BlobStore,
    index: &'a dyn GuideIndex,
    fetcher: &'a dyn DocumentFetcher,
    dry_run: bool,
    /// name -> source URL of the first guide seen under it
    claims: HashMap<String, String>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        blobs: &'a dyn BlobStore,
        index: &'a dyn GuideIndex,
        fetcher: &'a dyn DocumentFetcher,
    ) -> Self {
        Self {
            blobs,
            index,
            fetcher,
            dry_run: false,
            claims: HashMap::new(),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Reconcile one guide across both stores.
    pub async fn reconcile(&mut self, guide: &DiscoveredGuide) -> Outcome {
        let name = guide.name.as_str();

        if let Some(claimed_by) = self.claim(guide) {
            log::warn!(
                "Name collision for {}: {} already claimed by {}, skipping",
                name,
                guide.source_url,
                claimed_by
            );
            return Outcome::Collision { claimed_by };
        }

        let blob_exists = match self.blobs.exists(name).await {
            Ok(exists) => exists,
            Err(error) => return failed(name, Stage::CheckBlob, false, error),
        };
        let row_exists = match self.index.contains(name).await {
            Ok(exists) => exists,
            Err(error) => return failed(name, Stage::CheckRow, false, error),
        };

        let plan = Plan::from_presence(blob_exists, row_exists);
        match plan {
            Plan::Nothing => {
                log::info!("Exists in blob storage and index: {}", name);
                return Outcome::AlreadyComplete;
            }
            Plan::UploadBlob => log::info!("Exists in index only: {}", name),
            Plan::InsertRow => log::info!("Exists in blob storage only: {}", name),
            Plan::UploadThenInsert => log::info!("New guide: {}", name),
        }

        if self.dry_run {
            log::info!("[dry-run] {}: would {}", name, plan);
            return Outcome::Planned { plan };
        }

        let mut blob_written = false;
        if plan.uploads() {
            let bytes = match self.fetcher.fetch_bytes(&guide.source_url).await {
                Ok(bytes) => bytes,
                Err(error) => return failed(name, Stage::Download, false, error),
            };
            if let Err(error) = self.blobs.put(name, bytes, PDF_CONTENT_TYPE).await {
                return failed(name, Stage::Upload, false, error);
            }
            blob_written = true;
            log::info!("Uploaded {} to {}", name, self.blobs.locator(name));
        }

        if plan.inserts() {
            let record = guide.to_record(self.blobs.locator(name));
            if let Err(error) = self.index.insert(&record).await {
                return failed(name, Stage::Insert, blob_written, error);
            }
            log::info!("Saved {} to index", name);
        }

        Outcome::Completed { plan }
    }

    /// Record the first source URL seen for a name. Returns the earlier claim
    /// when a different source arrives under the same name.
    fn claim(&mut self, guide: &DiscoveredGuide) -> Option<String> {
        match self.claims.get(&guide.name) {
            Some(source) if *source != guide.source_url => Some(source.clone()),
            Some(_) => None,
            None => {
                self.claims
                    .insert(guide.name.clone(), guide.source_url.clone());
                None
            }
        }
    }
}

fn failed(name: &str, stage: Stage, blob_written: bool, error: AppError) -> Outcome {
    if blob_written {
        log::error!(
            "{} failed for {} after the blob was stored: {}",
            stage,
            name,
            error
        );
    } else {
        log::error!("{} failed for {}: {}", stage, name, error);
    }
    Outcome::Failed {
        stage,
        blob_written,
        error,
    }
}
