// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

/// One item as produced by a feed, before any curation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawItem {
    pub source: String, // display label of the feed, e.g. "Designboom"
    pub title: String,  // normalized, may be empty
    pub link: String,   // may be empty; rejected at admission
    pub published_at: DateTime<Utc>, // fetch time when the origin omits it
    /// RSS `<description>` / Atom `<summary>`, tags stripped. Context for commentary.
    #[serde(default)]
    pub summary: Option<String>,
}

#[async_trait::async_trait]
pub trait FeedProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>>;
    fn name(&self) -> &str;
}
