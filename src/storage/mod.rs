//! Persistence adapters.
//!
//! Two independent stores hold each guide:
//!
//! - a [`BlobStore`] keeps the PDF bytes under the derived name;
//! - a [`GuideIndex`] keeps one `clinical_guides` row per name.
//!
//! Neither store knows about the other. Keeping them in agreement is the
//! reconciler's job.
//!
//! ```text
//! Blob storage                    clinical_guides
//! ├── GER-081 Vaginitis.pdf  <->  name = 'GER-081 Vaginitis.pdf', url = locator
//! └── GRR-081 Vaginitis.pdf  <->  name = 'GRR-081 Vaginitis.pdf', url = locator
//! ```

pub mod local;
pub mod postgres;
#[cfg(feature = "s3")]
pub mod s3;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{ClinicalGuideRecord, IndexBackend, IndexConfig, StorageBackend, StorageConfig};

// Re-export for convenience
pub use local::LocalBlobStore;
pub use postgres::PgGuideIndex;
#[cfg(feature = "s3")]
pub use s3::S3BlobStore;
pub use sqlite::SqliteGuideIndex;

/// Object storage addressed by key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether an object exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Write `bytes` under `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Canonical locator string for `key`, stored as the record url.
    fn locator(&self, key: &str) -> String;

    /// All keys currently stored.
    async fn list_keys(&self) -> Result<Vec<String>>;
}

/// Insert-only catalog of guides keyed by name.
#[async_trait]
pub trait GuideIndex: Send + Sync {
    /// Whether a row with this name exists.
    async fn contains(&self, name: &str) -> Result<bool>;

    /// Insert a full record. No update path exists.
    async fn insert(&self, record: &ClinicalGuideRecord) -> Result<()>;

    /// First row stored under `name`.
    async fn get(&self, name: &str) -> Result<Option<ClinicalGuideRecord>>;

    /// Distinct names of all rows.
    async fn list_names(&self) -> Result<Vec<String>>;

    /// Release the underlying connections.
    async fn close(&self);
}

/// Open the configured blob store.
pub async fn open_blob_store(config: &StorageConfig) -> Result<Box<dyn BlobStore>> {
    match config.backend {
        StorageBackend::Local => {
            log::info!("Using local blob storage at {}", config.local_dir.display());
            Ok(Box::new(LocalBlobStore::new(&config.local_dir)))
        }
        #[cfg(feature = "s3")]
        StorageBackend::S3 => {
            log::info!("Using S3 bucket {}", config.bucket);
            Ok(Box::new(
                S3BlobStore::from_env(&config.bucket, &config.prefix).await,
            ))
        }
        #[cfg(not(feature = "s3"))]
        StorageBackend::S3 => Err(AppError::config(
            "storage.backend = \"s3\" requires the `s3` feature",
        )),
    }
}

/// Connect to the configured index.
pub async fn open_index(config: &IndexConfig) -> Result<Box<dyn GuideIndex>> {
    if config.url.trim().is_empty() {
        return Err(AppError::config("index.url is empty (set DATABASE_URL)"));
    }
    match config.backend {
        IndexBackend::Postgres => Ok(Box::new(
            PgGuideIndex::connect(&config.url, config.max_connections).await?,
        )),
        IndexBackend::Sqlite => Ok(Box::new(
            SqliteGuideIndex::connect(&config.url, config.max_connections).await?,
        )),
    }
}
