// src/quota.rs
//! Per-period admission caps derived from what is already persisted.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::fmt;

use crate::model::ApprovedEntry;

/// A day or an ISO week, matched against the entry's `day` / `week` tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PeriodKey {
    Day(NaiveDate),
    Week(String),
}

impl PeriodKey {
    pub fn day(now: DateTime<Utc>) -> Self {
        PeriodKey::Day(now.date_naive())
    }

    pub fn week(now: DateTime<Utc>) -> Self {
        PeriodKey::Week(week_label(now.date_naive()))
    }

    /// Tag value as written on entries.
    pub fn tag(&self) -> String {
        match self {
            PeriodKey::Day(d) => d.format("%Y-%m-%d").to_string(),
            PeriodKey::Week(w) => w.clone(),
        }
    }

    /// Entry field carrying the tag.
    pub fn field(&self) -> &'static str {
        match self {
            PeriodKey::Day(_) => "day",
            PeriodKey::Week(_) => "week",
        }
    }

    fn matches(&self, entry: &ApprovedEntry) -> bool {
        let tag = match self {
            PeriodKey::Day(_) => entry.day.as_deref(),
            PeriodKey::Week(_) => entry.week.as_deref(),
        };
        tag == Some(self.tag().as_str())
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

/// ISO 8601 week label, e.g. `2026-W42`. Year is the ISO week-year.
pub fn week_label(date: NaiveDate) -> String {
    let w = date.iso_week();
    format!("{}-W{:02}", w.year(), w.week())
}

/// Entries of `collection` tagged with `key`, over the whole history.
pub fn count_period(collection: &[ApprovedEntry], key: &PeriodKey) -> usize {
    collection.iter().filter(|e| key.matches(e)).count()
}

pub fn remaining(cap: usize, used: usize) -> usize {
    cap.saturating_sub(used)
}
