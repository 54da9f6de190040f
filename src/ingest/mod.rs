// src/ingest/mod.rs
pub mod config;
pub mod providers;
pub mod types;

use crate::ingest::types::{FeedProvider, RawItem};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up once a recorder is installed).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_events_total", "Total items parsed from feeds.");
        describe_counter!(
            "ingest_truncated_total",
            "Items dropped by the per-feed fetch ceiling."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Feed fetch/parse errors."
        );
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Normalize a title: decode entities, strip tags, ASCII quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 500 chars
    if out.chars().count() > 500 {
        out = out.chars().take(500).collect();
    }

    out
}

/// Result of one sequential sweep over all feeds.
#[derive(Debug, Default)]
pub struct FetchSummary {
    pub items: Vec<RawItem>,
    pub failed_feeds: Vec<String>,
}

/// Fetch every provider in order, one at a time. A failing feed is logged and
/// skipped; it never aborts the sweep. At most `max_per_feed` items are taken
/// from each feed (0 = unlimited).
pub async fn fetch_all(providers: &[Box<dyn FeedProvider>], max_per_feed: usize) -> FetchSummary {
    ensure_metrics_described();

    let mut summary = FetchSummary::default();
    for p in providers {
        match p.fetch_latest().await {
            Ok(mut v) => {
                if max_per_feed > 0 && v.len() > max_per_feed {
                    counter!("ingest_truncated_total").increment((v.len() - max_per_feed) as u64);
                    v.truncate(max_per_feed);
                }
                tracing::debug!(target: "ingest", feed = p.name(), items = v.len(), "feed fetched");
                summary.items.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, feed = p.name(), "feed error");
                counter!("ingest_provider_errors_total").increment(1);
                summary.failed_feeds.push(p.name().to_string());
            }
        }
    }
    summary
}
