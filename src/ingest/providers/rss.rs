// src/ingest/providers/rss.rs
//! Generic RSS 2.0 / Atom provider. One instance per configured feed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::config::FeedSpec;
use crate::ingest::normalize_text;
use crate::ingest::types::{FeedProvider, RawItem};

pub const USER_AGENT: &str = "KETOGO/1.0 (+quiet editor)";
pub const FEED_TIMEOUT_SECS: u64 = 20;

/* ---- RSS 2.0 ---- */

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<TextNode>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<TextNode>,
}

/* ---- Atom ---- */

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    title: Option<TextNode>,
    #[serde(default)]
    link: Vec<AtomLink>,
    id: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<TextNode>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// Element whose attributes we ignore (`<guid isPermaLink=..>`, `<title type="html">`).
/// Stray child elements are skipped too.
#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}

impl Entry {
    fn alternate_link(&self) -> Option<&str> {
        self.link
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| self.link.first())
            .and_then(|l| l.href.as_deref())
    }
}

fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    let parsed = OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok()?;
    DateTime::from_timestamp(parsed.unix_timestamp(), parsed.nanosecond())
}

struct Parsed {
    title: String,
    link: String,
    date: Option<String>,
    summary: Option<String>,
}

/// Parse an RSS or Atom document into raw items labelled with `source`.
/// Items without a timestamp get `fetched_at`. Items with neither title nor
/// link are dropped here; everything else is left to the admission policies.
pub fn parse_feed(xml: &str, source: &str, fetched_at: DateTime<Utc>) -> Result<Vec<RawItem>> {
    let xml_clean = scrub_html_entities_for_xml(xml);

    let raw: Vec<Parsed> = match from_str::<Rss>(&xml_clean) {
        Ok(rss) => rss
            .channel
            .item
            .into_iter()
            .map(|it| {
                let link = it
                    .link
                    .filter(|l| !l.trim().is_empty())
                    .or(it.guid.map(|g| g.value))
                    .unwrap_or_default();
                Parsed {
                    title: it.title.unwrap_or_default(),
                    link,
                    date: it.pub_date,
                    summary: it.description.map(|d| d.value),
                }
            })
            .collect(),
        Err(rss_err) if xml_clean.contains("<feed") => {
            let atom: AtomFeed = from_str(&xml_clean)
                .with_context(|| format!("parsing {source} feed (not RSS: {rss_err})"))?;
            atom.entry
                .into_iter()
                .map(|e| {
                    let link = e
                        .alternate_link()
                        .map(str::to_string)
                        .or_else(|| e.id.clone())
                        .unwrap_or_default();
                    Parsed {
                        title: e.title.map(|t| t.value).unwrap_or_default(),
                        link,
                        date: e.published.or(e.updated),
                        summary: e.summary.map(|s| s.value),
                    }
                })
                .collect()
        }
        Err(rss_err) => {
            return Err(anyhow::Error::new(rss_err).context(format!("parsing {source} feed")))
        }
    };

    let mut out = Vec::with_capacity(raw.len());
    for p in raw {
        let title = normalize_text(&p.title);
        let link = p.link.trim().to_string();
        if title.is_empty() && link.is_empty() {
            continue;
        }
        out.push(RawItem {
            source: source.to_string(),
            title,
            link,
            published_at: p.date.as_deref().and_then(parse_timestamp).unwrap_or(fetched_at),
            summary: p
                .summary
                .map(|s| normalize_text(&s))
                .filter(|s| !s.is_empty()),
        });
    }
    Ok(out)
}

pub struct RssFeed {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssFeed {
    /// Parse from an in-memory document; no network.
    pub fn from_fixture(name: &str, content: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Fixture(content.to_string()),
        }
    }

    pub fn from_spec(spec: &FeedSpec) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(FEED_TIMEOUT_SECS))
            .build()
            .context("building feed http client")?;
        Ok(Self {
            name: spec.name.clone(),
            mode: Mode::Http {
                url: spec.url.clone(),
                client,
            },
        })
    }

    fn parse_items_from_str(&self, s: &str) -> Result<Vec<RawItem>> {
        let t0 = std::time::Instant::now();
        let out = parse_feed(s, &self.name, Utc::now())?;

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_events_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl FeedProvider for RssFeed {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("{} http get()", self.name))?
                    .error_for_status()
                    .with_context(|| format!("{} http status", self.name))?
                    .text()
                    .await
                    .with_context(|| format!("{} http .text()", self.name))?;
                self.parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-16T06:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn rss_guid_is_link_fallback() {
        let xml = r#"<rss version="2.0"><channel><title>t</title>
            <item><title>Odd chair</title><guid isPermaLink="true">https://a/1</guid></item>
        </channel></rss>"#;
        let items = parse_feed(xml, "A", fetched()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://a/1");
        assert_eq!(items[0].published_at, fetched());
        assert_eq!(items[0].summary, None);
    }

    #[test]
    fn description_and_summary_become_plain_text() {
        let rss = r#"<rss version="2.0"><channel><title>t</title>
            <item><title>Odd chair</title><link>https://a/1</link>
              <description><![CDATA[<p>A chair with <b>three</b> legs.</p>]]></description></item>
        </channel></rss>"#;
        let items = parse_feed(rss, "A", fetched()).unwrap();
        assert_eq!(items[0].summary.as_deref(), Some("A chair with three legs."));

        let atom = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <entry><title>Lamp</title><link href="https://a/2"/>
              <summary type="text">Shaped like a cloud</summary></entry>
        </feed>"#;
        let items = parse_feed(atom, "Atom", fetched()).unwrap();
        assert_eq!(items[0].summary.as_deref(), Some("Shaped like a cloud"));
    }

    #[test]
    fn atom_prefers_alternate_link() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <entry>
              <title type="html">A &amp; B</title>
              <link rel="self" href="https://a/self"/>
              <link rel="alternate" href="https://a/post"/>
              <updated>2026-10-15T08:30:00+00:00</updated>
            </entry>
        </feed>"#;
        let items = parse_feed(xml, "Atom", fetched()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "A & B");
        assert_eq!(items[0].link, "https://a/post");
        assert_eq!(items[0].published_at.to_rfc3339(), "2026-10-15T08:30:00+00:00");
    }

    #[test]
    fn bad_timestamp_falls_back_to_fetch_time() {
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("Thu, 15 Oct 2026 10:00:00 +0000").is_some());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_feed("<html><body>nope</body></html>", "X", fetched()).is_err());
    }
}
