//! Pipeline entry points.
//!
//! - `run_pipeline`: crawl the listing and reconcile every guide
//! - `run_audit_pipeline`: report drift between blob storage and the index

pub mod audit;
pub mod ingest;
pub mod reconcile;
mod runner;

pub use audit::{DriftReport, run_audit};
pub use ingest::{FailedGuide, IngestSummary, Termination, run_ingest};
pub use reconcile::{Outcome, Plan, Reconciler, Stage};
pub use runner::{run_audit_pipeline, run_pipeline};
