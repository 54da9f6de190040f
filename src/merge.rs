// src/merge.rs
//! Fingerprint dedup against full history, newest-first ordering, and the
//! write-only-if-changed persistence step.

use anyhow::Result;

use crate::model::ApprovedEntry;
use crate::store::{Collection, CollectionStore};

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub collection: Collection,
    pub added: usize,
    pub duplicates: usize,
}

/// Append every candidate whose fingerprint is new (to history and to the
/// batch), then stable-sort the entries by `published_at` descending.
/// Existing entries and opaque elements are carried over unchanged.
pub fn merge(existing: impl Into<Collection>, candidates: Vec<ApprovedEntry>) -> MergeOutcome {
    let mut collection = existing.into();
    let mut seen = collection.fingerprints();
    let mut added = 0usize;
    let mut duplicates = 0usize;

    for c in candidates {
        if !seen.insert(c.fingerprint.clone()) {
            duplicates += 1;
            continue;
        }
        collection.entries.push(c);
        added += 1;
    }

    collection
        .entries
        .sort_by(|a, b| b.published_at.cmp(&a.published_at));

    MergeOutcome {
        collection,
        added,
        duplicates,
    }
}

/// Persist the merged collection, unless nothing was added (quiet day).
/// Returns whether a write happened. Write errors are fatal to the run.
pub async fn persist_if_changed(store: &dyn CollectionStore, outcome: &MergeOutcome) -> Result<bool> {
    if outcome.added == 0 {
        tracing::info!(target: "pipeline", store = %store.describe(), "[quiet-day] no new entries; no changes");
        return Ok(false);
    }
    store.save(&outcome.collection).await?;
    tracing::info!(
        target: "pipeline",
        store = %store.describe(),
        added = outcome.added,
        total = outcome.collection.len(),
        "[publish] collection written"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use serde_json::Map;

    fn e(fp: &str, hour: u32) -> ApprovedEntry {
        ApprovedEntry {
            fingerprint: fp.into(),
            source: "s".into(),
            title: fp.into(),
            link: format!("https://x/{fp}"),
            published_at: Utc.with_ymd_and_hms(2026, 10, 16, hour, 0, 0).unwrap(),
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

    #[test]
    fn merge_dedups_against_history_and_batch_and_sorts() {
        let existing = vec![e("a", 5), e("b", 1)];
        let out = merge(existing, vec![e("a", 9), e("c", 3), e("c", 4), e("d", 8)]);
        assert_eq!(out.added, 2);
        assert_eq!(out.duplicates, 2);
        let order: Vec<&str> = out.collection.entries.iter().map(|x| x.fingerprint.as_str()).collect();
        assert_eq!(order, vec!["d", "a", "c", "b"]);
        // history entry kept as it was, not replaced by the newer duplicate
        assert_eq!(out.collection.entries[1].published_at.format("%H").to_string(), "05");
    }

    #[test]
    fn merge_is_idempotent() {
        let batch = vec![e("a", 1), e("b", 2)];
        let first = merge(Collection::default(), batch.clone());
        let second = merge(first.collection.clone(), batch);
        assert_eq!(second.added, 0);
        assert_eq!(second.collection.len(), first.collection.len());
    }

    #[test]
    fn ties_keep_insertion_order() {
        let out = merge(vec![e("x", 2)], vec![e("y", 2), e("z", 2)]);
        let order: Vec<&str> = out.collection.entries.iter().map(|x| x.fingerprint.as_str()).collect();
        assert_eq!(order, vec!["x", "y", "z"]);
    }

    #[test]
    fn opaque_history_blocks_its_fingerprint_and_stays_last() {
        let existing = Collection {
            entries: vec![e("a", 1)],
            opaque: vec![serde_json::json!({"fingerprint": "old", "published_at": "2025-01-01"})],
        };
        let out = merge(existing.clone(), vec![e("old", 9), e("b", 3)]);
        assert_eq!(out.added, 1);
        assert_eq!(out.duplicates, 1);
        assert_eq!(out.collection.opaque, existing.opaque);
        assert_eq!(out.collection.len(), 3);
    }

    #[tokio::test]
    async fn quiet_day_does_not_write() {
        let store = MemoryStore::new();
        let quiet = merge(Collection::default(), Vec::new());
        assert!(!persist_if_changed(&store, &quiet).await.unwrap());
        assert_eq!(store.save_count(), 0);

        let busy = merge(Collection::default(), vec![e("a", 1)]);
        assert!(persist_if_changed(&store, &busy).await.unwrap());
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.snapshot().len(), 1);
    }
}
