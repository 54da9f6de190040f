// src/model.rs
//! Persisted record shape shared by both collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ingest::types::RawItem;

/// Which persisted collection an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Observations,
    Objects,
}

impl Bucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Observations => "observations",
            Bucket::Objects => "objects",
        }
    }
}

/// A raw item plus its fingerprint; lives only within one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateItem {
    pub item: RawItem,
    pub fingerprint: String,
}

/// One approved, persisted entry. Created once, never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovedEntry {
    /// Sole dedup key within the collection.
    #[serde(default)]
    pub fingerprint: String,
    pub source: String,
    #[serde(default)]
    pub title: String,
    #[serde(alias = "url")]
    pub link: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub micro_judgment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub micro_judgment_it: Option<String>,

    /// Admission day (`YYYY-MM-DD`), used for daily caps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
    /// ISO week (`YYYY-Www`), preview objects only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_eur: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Fields written by other tools are carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApprovedEntry {
    /// Promote a candidate. Commentary and tags are attached by the caller.
    pub fn from_candidate(c: CandidateItem) -> Self {
        Self {
            fingerprint: c.fingerprint,
            source: c.item.source,
            title: c.item.title,
            link: c.item.link,
            published_at: c.item.published_at,
            micro_judgment: None,
            micro_judgment_it: None,
            day: None,
            week: None,
            price_eur: None,
            image: None,
            asin: None,
            note: None,
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_entry_with_url_and_unknown_fields_roundtrips() {
        let raw = r#"{
            "source": "Amazon",
            "url": "https://www.amazon.it/dp/B000",
            "title": "Apribottiglie",
            "published_at": "2026-10-12T08:00:00Z",
            "asin": "B000",
            "price_eur": 9.9,
            "curated_by": "hand"
        }"#;
        let e: ApprovedEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(e.link, "https://www.amazon.it/dp/B000");
        assert!(e.fingerprint.is_empty());
        assert_eq!(e.micro_judgment, None);
        assert_eq!(e.extra.get("curated_by"), Some(&Value::from("hand")));

        let back = serde_json::to_value(&e).unwrap();
        assert_eq!(back["link"], "https://www.amazon.it/dp/B000");
        assert_eq!(back["curated_by"], "hand");
        assert!(back["micro_judgment"].is_null());
        assert!(back.get("week").is_none());
    }
}
