//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::ClinicalGuideRecord;
use crate::storage::{BlobStore, GuideIndex};
use crate::utils::http::{DocumentFetcher, PageSource};

/// Side effect observed by a test double.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Download(String),
    Put(String),
    Insert(String),
}

/// Shared, ordered log of side effects.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Op>>>);

impl Journal {
    fn push(&self, op: Op) {
        self.0.lock().unwrap().push(op);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.0.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Op> {
        self.ops()
            .into_iter()
            .filter(|op| !matches!(op, Op::Download(_)))
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Blob store held in a map.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing_puts: Mutex<HashSet<String>>,
    failing_exists: Mutex<bool>,
    journal: Journal,
}

impl MemoryBlobStore {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            ..Self::default()
        }
    }

    pub fn seed(&self, key: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), b"%PDF".to_vec());
    }

    pub fn fail_puts_for(&self, key: &str) {
        self.failing_puts.lock().unwrap().insert(key.to_string());
    }

    /// Make every `exists` call fail until healed.
    pub fn fail_exists(&self) {
        *self.failing_exists.lock().unwrap() = true;
    }

    pub fn heal(&self) {
        self.failing_puts.lock().unwrap().clear();
        *self.failing_exists.lock().unwrap() = false;
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        if *self.failing_exists.lock().unwrap() {
            return Err(AppError::blob(format!("head failed for {key}")));
        }
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        if self.failing_puts.lock().unwrap().contains(key) {
            return Err(AppError::blob(format!("put rejected for {key}")));
        }
        self.journal.push(Op::Put(key.to_string()));
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    fn locator(&self, key: &str) -> String {
        format!("mem://guides/{key}")
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.keys())
    }
}

/// Index held in a vector.
#[derive(Default)]
pub struct MemoryIndex {
    rows: Mutex<Vec<ClinicalGuideRecord>>,
    failing_inserts: Mutex<HashSet<String>>,
    failing_contains: Mutex<bool>,
    journal: Journal,
}

impl MemoryIndex {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            ..Self::default()
        }
    }

    pub fn seed(&self, name: &str) {
        let record = ClinicalGuideRecord {
            id: uuid::Uuid::new_v4(),
            name: name.to_string(),
            guide_type: name.chars().take(3).collect(),
            description: String::new(),
            category: String::new(),
            url: format!("mem://guides/{name}"),
            created_at: chrono::Utc::now(),
        };
        self.rows.lock().unwrap().push(record);
    }

    pub fn fail_inserts_for(&self, name: &str) {
        self.failing_inserts.lock().unwrap().insert(name.to_string());
    }

    /// Make every `contains` call fail until healed.
    pub fn fail_contains(&self) {
        *self.failing_contains.lock().unwrap() = true;
    }

    pub fn heal(&self) {
        self.failing_inserts.lock().unwrap().clear();
        *self.failing_contains.lock().unwrap() = false;
    }

    pub fn rows(&self) -> Vec<ClinicalGuideRecord> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl GuideIndex for MemoryIndex {
    async fn contains(&self, name: &str) -> Result<bool> {
        if *self.failing_contains.lock().unwrap() {
            return Err(AppError::validation(format!("lookup failed for {name}")));
        }
        Ok(self.rows.lock().unwrap().iter().any(|r| r.name == name))
    }

    async fn insert(&self, record: &ClinicalGuideRecord) -> Result<()> {
        if self.failing_inserts.lock().unwrap().contains(&record.name) {
            return Err(AppError::validation(format!("insert rejected for {}", record.name)));
        }
        self.journal.push(Op::Insert(record.name.clone()));
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<ClinicalGuideRecord>> {
        Ok(self.rows.lock().unwrap().iter().find(|r| r.name == name).cloned())
    }

    async fn list_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<_> = self.rows.lock().unwrap().iter().map(|r| r.name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn close(&self) {}
}

/// Fetcher returning fixed bytes, failing for chosen URLs.
#[derive(Default)]
pub struct StaticFetcher {
    /// url -> remaining failures
    failing: Mutex<HashMap<String, u32>>,
    journal: Journal,
}

impl StaticFetcher {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            ..Self::default()
        }
    }

    pub fn fail_for(&self, url: &str) {
        self.fail_times(url, u32::MAX);
    }

    pub fn fail_times(&self, url: &str, times: u32) {
        self.failing.lock().unwrap().insert(url.to_string(), times);
    }
}

#[async_trait]
impl DocumentFetcher for StaticFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.journal.push(Op::Download(url.to_string()));
        let mut failing = self.failing.lock().unwrap();
        if let Some(remaining) = failing.get_mut(url).filter(|n| **n > 0) {
            *remaining -= 1;
            return Err(AppError::Status {
                url: url.to_string(),
                status: 404,
            });
        }
        Ok(b"%PDF-1.4 test".to_vec())
    }
}

/// Page source answering requests in order from a script.
///
/// `Err(status)` entries fail with that HTTP status. Once the script runs
/// out, every request gets an empty listing.
pub struct ScriptedPages {
    script: Mutex<VecDeque<std::result::Result<String, u16>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedPages {
    pub fn new(script: Vec<std::result::Result<String, u16>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for ScriptedPages {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.requests.lock().unwrap().push(url.to_string());
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(html)) => Ok(html),
            Some(Err(status)) => Err(AppError::Status {
                url: url.to_string(),
                status,
            }),
            None => Ok(listing_html(&[])),
        }
    }
}

/// Listing markup with one item per `(label, href)` link.
pub fn listing_html(links: &[(&str, &str)]) -> String {
    let items: String = links
        .iter()
        .map(|(label, href)| {
            format!(
                r#"<li>
                    <h2>IMSS-000, Guía {label}</h2>
                    <div class="field-name-field-categoria-gs"><div class="field-items">Medicina</div></div>
                    <a href="{href}">{label}</a>
                </li>"#
            )
        })
        .collect();

    format!(
        r#"<html><body><div class="view-content"><div class="item-list"><ul>{items}</ul></div></div></body></html>"#
    )
}
