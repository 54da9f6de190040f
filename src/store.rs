// src/store.rs
//! Persisted collections. Reads never fail; writes replace the whole file.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;

use crate::model::ApprovedEntry;
use crate::quota::{count_period, PeriodKey};

/// Full history of one collection.
///
/// Stored elements that do not fit [`ApprovedEntry`] (hand edits, older
/// tools) are kept in `opaque` and written back unchanged after the sorted
/// entries. Their `fingerprint`, `asin` and period tags still count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    pub entries: Vec<ApprovedEntry>,
    pub opaque: Vec<Value>,
}

impl Collection {
    pub fn len(&self) -> usize {
        self.entries.len() + self.opaque.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn opaque_str<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.opaque
            .iter()
            .filter_map(move |v| v.get(field).and_then(Value::as_str))
    }

    /// Fingerprints already present (blank legacy ids ignored).
    pub fn fingerprints(&self) -> HashSet<String> {
        self.entries
            .iter()
            .map(|e| e.fingerprint.as_str())
            .chain(self.opaque_str("fingerprint"))
            .filter(|fp| !fp.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn asins(&self) -> HashSet<String> {
        self.entries
            .iter()
            .filter_map(|e| e.asin.as_deref())
            .chain(self.opaque_str("asin"))
            .map(str::to_string)
            .collect()
    }

    /// Entries tagged with `key`, opaque elements included.
    pub fn count_period(&self, key: &PeriodKey) -> usize {
        let tag = key.tag();
        count_period(&self.entries, key) + self.opaque_str(key.field()).filter(|t| *t == tag).count()
    }
}

impl From<Vec<ApprovedEntry>> for Collection {
    fn from(entries: Vec<ApprovedEntry>) -> Self {
        Self {
            entries,
            opaque: Vec::new(),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Element<'a> {
    Entry(&'a ApprovedEntry),
    Opaque(&'a Value),
}

fn to_pretty_json(collection: &Collection) -> Result<String> {
    let elements: Vec<Element<'_>> = collection
        .entries
        .iter()
        .map(Element::Entry)
        .chain(collection.opaque.iter().map(Element::Opaque))
        .collect();
    let mut json = serde_json::to_string_pretty(&elements).context("serializing collection")?;
    json.push('\n');
    Ok(json)
}

#[async_trait::async_trait]
pub trait CollectionStore: Send + Sync {
    /// Full history, or empty when absent/corrupt.
    async fn load(&self) -> Collection;
    /// Replace the full collection.
    async fn save(&self, collection: &Collection) -> Result<()>;
    fn describe(&self) -> String;
}

/// Pretty JSON array on disk, e.g. `public/data/observations.json`.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse a stored collection. Anything but a JSON array yields empty;
/// array elements that do not fit the entry shape are kept as opaque.
pub fn parse_collection(raw: &str) -> Collection {
    let values: Vec<Value> = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(v)) => v,
        Ok(_) => {
            tracing::warn!(target: "store", "collection is not a JSON array; treating as empty");
            return Collection::default();
        }
        Err(e) => {
            tracing::warn!(target: "store", error = %e, "corrupt collection; treating as empty");
            return Collection::default();
        }
    };

    let mut out = Collection::default();
    for v in values {
        match serde_json::from_value::<ApprovedEntry>(v.clone()) {
            Ok(entry) => out.entries.push(entry),
            Err(_) => out.opaque.push(v),
        }
    }
    if !out.opaque.is_empty() {
        tracing::warn!(
            target: "store",
            opaque = out.opaque.len(),
            "entries not in the expected shape; carried through unchanged"
        );
    }
    out
}

#[async_trait::async_trait]
impl CollectionStore for JsonFileStore {
    async fn load(&self) -> Collection {
        match fs::read_to_string(&self.path).await {
            Ok(s) => parse_collection(&s),
            Err(e) => {
                tracing::info!(
                    target: "store",
                    path = %self.path.display(),
                    error = %e,
                    "no readable collection; starting empty"
                );
                Collection::default()
            }
        }
    }

    async fn save(&self, collection: &Collection) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = to_pretty_json(collection)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes())
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory store for tests and dry runs. Records every save.
#[derive(Default)]
pub struct MemoryStore {
    collection: Mutex<Collection>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(collection: impl Into<Collection>) -> Self {
        Self {
            collection: Mutex::new(collection.into()),
            saves: Mutex::new(0),
        }
    }

    /// Parsed entries, newest first.
    pub fn snapshot(&self) -> Vec<ApprovedEntry> {
        self.collection().entries
    }

    pub fn collection(&self) -> Collection {
        self.collection.lock().expect("store mutex poisoned").clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().expect("store mutex poisoned")
    }
}

#[async_trait::async_trait]
impl CollectionStore for MemoryStore {
    async fn load(&self) -> Collection {
        self.collection()
    }

    async fn save(&self, collection: &Collection) -> Result<()> {
        *self.collection.lock().expect("store mutex poisoned") = collection.clone();
        *self.saves.lock().expect("store mutex poisoned") += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
