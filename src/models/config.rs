//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and pagination settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// CSS selectors for the listing markup
    #[serde(default)]
    pub selectors: ListingSelectors,

    /// Blob storage backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Relational index backend
    #[serde(default)]
    pub index: IndexConfig,

    /// Reconciliation behavior
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// `DATABASE_URL` wins over `NEON_CONNECTION_STRING`; blank values are
    /// ignored. A database URL from the environment also selects the index
    /// backend by its scheme.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL").or_else(|| get("NEON_CONNECTION_STRING")) {
            if let Some(backend) = IndexBackend::from_url(&url) {
                self.index.backend = backend;
            }
            self.index.url = url;
        }
        if let Some(bucket) = get("S3_BUCKET") {
            self.storage.bucket = bucket;
        }
        if let Some(prefix) = get("S3_PREFIX") {
            self.storage.prefix = prefix;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.crawler.base_url)?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(AppError::validation(format!(
                "crawler.base_url must be http(s), got '{}'",
                base.scheme()
            )));
        }
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_pages == Some(0) {
            return Err(AppError::validation("crawler.max_pages must be > 0"));
        }

        match self.storage.backend {
            StorageBackend::S3 if self.storage.bucket.trim().is_empty() => {
                return Err(AppError::validation("storage.bucket is empty"));
            }
            StorageBackend::Local if self.storage.local_dir.as_os_str().is_empty() => {
                return Err(AppError::validation("storage.local_dir is empty"));
            }
            _ => {}
        }

        if IndexBackend::from_url(&self.index.url) != Some(self.index.backend) {
            return Err(AppError::validation(format!(
                "index.url does not match the {:?} backend",
                self.index.backend
            )));
        }
        if self.index.max_connections == 0 {
            return Err(AppError::validation("index.max_connections must be > 0"));
        }

        Ok(())
    }
}

/// HTTP client and pagination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Listing URL for page 0
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between listing page loads in milliseconds
    #[serde(default = "defaults::page_delay")]
    pub page_delay_ms: u64,

    /// Extra attempts for a listing page that fails to load
    #[serde(default = "defaults::page_retries")]
    pub page_retries: u32,

    /// Delay between attempts in milliseconds
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_ms: u64,

    /// Stop after this many pages
    #[serde(default)]
    pub max_pages: Option<u32>,

    /// First page index to fetch
    #[serde(default)]
    pub start_page: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            page_delay_ms: defaults::page_delay(),
            page_retries: defaults::page_retries(),
            retry_delay_ms: defaults::retry_delay(),
            max_pages: None,
            start_page: 0,
        }
    }
}

/// CSS selectors describing the listing markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSelectors {
    /// Region holding the result list
    #[serde(default = "defaults::content_selector")]
    pub content: String,

    /// List inside the content region; the first match is used
    #[serde(default = "defaults::list_selector")]
    pub list: String,

    /// Items of the list
    #[serde(default = "defaults::item_selector")]
    pub item: String,

    /// Heading of an item
    #[serde(default = "defaults::heading_selector")]
    pub heading: String,

    /// Specialty label of an item
    #[serde(default = "defaults::category_selector")]
    pub category: String,

    /// PDF anchors of an item
    #[serde(default = "defaults::pdf_link_selector")]
    pub pdf_link: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            content: defaults::content_selector(),
            list: defaults::list_selector(),
            item: defaults::item_selector(),
            heading: defaults::heading_selector(),
            category: defaults::category_selector(),
            pdf_link: defaults::pdf_link_selector(),
        }
    }
}

/// Where PDF bytes are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    S3,
}

/// Blob storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Root directory for the local backend
    #[serde(default = "defaults::local_dir")]
    pub local_dir: PathBuf,

    /// Bucket for the S3 backend
    #[serde(default = "defaults::bucket")]
    pub bucket: String,

    /// Optional key prefix inside the bucket
    #[serde(default)]
    pub prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            local_dir: defaults::local_dir(),
            bucket: defaults::bucket(),
            prefix: String::new(),
        }
    }
}

/// Which database holds the `clinical_guides` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Postgres,
    #[default]
    Sqlite,
}

impl IndexBackend {
    /// Backend named by a connection string's scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let url = url.trim();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if url.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else {
            None
        }
    }
}

/// Relational index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,

    /// Connection string; `DATABASE_URL` overrides it
    #[serde(default = "defaults::index_url")]
    pub url: String,

    #[serde(default = "defaults::max_connections")]
    pub max_connections: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            url: defaults::index_url(),
            max_connections: defaults::max_connections(),
        }
    }
}

/// Reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Passes over failed documents after the crawl
    #[serde(default = "defaults::retry_passes")]
    pub retry_passes: u32,

    /// Log planned actions without writing
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            retry_passes: defaults::retry_passes(),
            dry_run: false,
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Crawler defaults
    pub fn base_url() -> String {
        "https://www.imss.gob.mx/guias_practicaclinica?field_categoria_gs_value=All".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; guide-crawler/0.1)".into()
    }
    pub fn timeout() -> u64 {
        60
    }
    pub fn page_delay() -> u64 {
        3000
    }
    pub fn page_retries() -> u32 {
        2
    }
    pub fn retry_delay() -> u64 {
        5000
    }

    // Selector defaults
    pub fn content_selector() -> String {
        ".view-content".into()
    }
    pub fn list_selector() -> String {
        ".item-list ul".into()
    }
    pub fn item_selector() -> String {
        "li".into()
    }
    pub fn heading_selector() -> String {
        "h2".into()
    }
    pub fn category_selector() -> String {
        ".field-name-field-categoria-gs .field-items".into()
    }
    pub fn pdf_link_selector() -> String {
        r#"a[href*=".pdf"]"#.into()
    }

    // Storage defaults
    pub fn local_dir() -> PathBuf {
        PathBuf::from("data/blobs")
    }
    pub fn bucket() -> String {
        "clinical-guides".into()
    }

    // Index defaults
    pub fn index_url() -> String {
        "sqlite://data/clinical_guides.db".into()
    }
    pub fn max_connections() -> u32 {
        1
    }

    // Reconcile defaults
    pub fn retry_passes() -> u32 {
        1
    }
}
