// src/pipeline.rs
//! One curation run, end to end:
//! fetch → fingerprint → admission → cap → commentary → merge → persist.
//!
//! Runs are sequential and write each collection at most once. Every run
//! returns a [`RunReport`] that the binary logs and can print as JSON.

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::admission::{Admission, PolicyKind, Reason};
use crate::commentary::Commentator;
use crate::config::{CuratorConfig, ObjectsMode};
use crate::fingerprint::{fingerprint, Namespace};
use crate::ingest::fetch_all;
use crate::ingest::types::{FeedProvider, RawItem};
use crate::merge::{merge, persist_if_changed};
use crate::model::{ApprovedEntry, Bucket, CandidateItem};
use crate::products::ProductSearch;
use crate::quota::{remaining, PeriodKey};
use crate::rotation::pick_queries;
use crate::store::{Collection, CollectionStore};

pub const AMAZON_SOURCE: &str = "Amazon";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("curator_fetched_total", "Raw items considered per bucket.");
        describe_counter!("curator_admitted_total", "Entries appended to a collection.");
        describe_counter!("curator_rejected_total", "Items rejected, by reason.");
        describe_counter!("curator_duplicates_total", "Items already present in history.");
        describe_counter!("curator_capped_total", "Admitted items dropped by a cap.");
    });
}

/// Outcome of one bucket within one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub bucket: Bucket,
    pub fetched: usize,
    pub admitted: usize,
    pub duplicates: usize,
    pub rejected: BTreeMap<Reason, usize>,
    pub capped: usize,
    pub quiet_day: bool,
    /// The run did not happen (e.g. missing credentials).
    pub skipped: bool,
}

impl RunReport {
    pub fn new(bucket: Bucket) -> Self {
        Self {
            bucket,
            fetched: 0,
            admitted: 0,
            duplicates: 0,
            rejected: BTreeMap::new(),
            capped: 0,
            quiet_day: false,
            skipped: false,
        }
    }

    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    fn reject(&mut self, reason: Reason) {
        *self.rejected.entry(reason).or_insert(0) += 1;
        counter!("curator_rejected_total", "bucket" => self.bucket.as_str(), "reason" => reason.as_str())
            .increment(1);
    }

    fn log(&self) {
        info!(
            target: "pipeline",
            bucket = self.bucket.as_str(),
            fetched = self.fetched,
            admitted = self.admitted,
            duplicates = self.duplicates,
            rejected = self.rejected_total(),
            capped = self.capped,
            quiet_day = self.quiet_day,
            skipped = self.skipped,
            "run finished"
        );
    }
}

/// How many new entries a bucket may take in this run.
#[derive(Debug, Clone)]
enum Cap {
    PerRun(usize),
    /// Counted over persisted entries tagged with the period.
    PerPeriod { key: PeriodKey, cap: usize },
}

impl Cap {
    fn budget(&self, existing: &Collection) -> usize {
        match self {
            Cap::PerRun(n) => *n,
            Cap::PerPeriod { key, cap } => remaining(*cap, existing.count_period(key)),
        }
    }

    fn stamp(&self, entry: &mut ApprovedEntry) {
        if let Cap::PerPeriod { key, .. } = self {
            match key {
                PeriodKey::Day(_) => entry.day = Some(key.tag()),
                PeriodKey::Week(_) => entry.week = Some(key.tag()),
            }
        }
    }
}

struct FeedBucket<'a> {
    bucket: Bucket,
    policy: PolicyKind,
    cap: Cap,
    note: Option<&'a str>,
}

/// Daily run: one fetch sweep feeding the observations collection and, unless
/// objects mode is `off`, the objects collection.
pub async fn run_daily(
    providers: &[Box<dyn FeedProvider>],
    observations: &dyn CollectionStore,
    objects: &dyn CollectionStore,
    commentator: &dyn Commentator,
    cfg: &CuratorConfig,
    now: DateTime<Utc>,
) -> Result<Vec<RunReport>> {
    ensure_metrics_described();

    let sweep = fetch_all(providers, cfg.caps.max_items_per_feed).await;
    if !sweep.failed_feeds.is_empty() {
        warn!(target: "pipeline", failed = ?sweep.failed_feeds, "some feeds were skipped");
    }
    let items: Vec<RawItem> = sweep
        .items
        .into_iter()
        .filter(|i| !(i.title.trim().is_empty() && i.link.trim().is_empty()))
        .collect();
    info!(target: "pipeline", items = items.len(), feeds = providers.len(), "fetch sweep done");

    let admission = Admission::new(&cfg.admission);
    let mut reports = Vec::with_capacity(2);

    let obs = FeedBucket {
        bucket: Bucket::Observations,
        policy: PolicyKind::Observation,
        cap: Cap::PerPeriod {
            key: PeriodKey::day(now),
            cap: cfg.caps.observations_per_day,
        },
        note: None,
    };
    reports.push(curate_feed_bucket(&items, &obs, &admission, commentator, observations).await?);

    let objects_plan = match cfg.objects.mode {
        ObjectsMode::Open => Some(FeedBucket {
            bucket: Bucket::Objects,
            policy: PolicyKind::Object,
            cap: Cap::PerRun(cfg.caps.objects_per_run),
            note: cfg.objects.note.as_deref(),
        }),
        ObjectsMode::Preview => Some(FeedBucket {
            bucket: Bucket::Objects,
            policy: PolicyKind::PreviewObject,
            cap: Cap::PerPeriod {
                key: PeriodKey::week(now),
                cap: cfg.caps.preview_per_week,
            },
            note: cfg.objects.note.as_deref(),
        }),
        ObjectsMode::Off => {
            info!(target: "pipeline", "objects mode is off; objects collection untouched");
            None
        }
    };
    if let Some(plan) = objects_plan {
        reports.push(curate_feed_bucket(&items, &plan, &admission, commentator, objects).await?);
    }

    Ok(reports)
}

async fn curate_feed_bucket(
    items: &[RawItem],
    plan: &FeedBucket<'_>,
    admission: &Admission,
    commentator: &dyn Commentator,
    store: &dyn CollectionStore,
) -> Result<RunReport> {
    let mut report = RunReport::new(plan.bucket);
    report.fetched = items.len();
    counter!("curator_fetched_total", "bucket" => plan.bucket.as_str()).increment(items.len() as u64);

    let existing = store.load().await;
    let mut seen = existing.fingerprints();
    let budget = plan.cap.budget(&existing);
    let mut accepted: Vec<ApprovedEntry> = Vec::new();

    for item in items {
        let fp = fingerprint(plan.policy.namespace(), &item.source, &item.link);
        if seen.contains(&fp) {
            report.duplicates += 1;
            continue;
        }

        let verdict = admission.decide(plan.policy, item);
        if !verdict.admit {
            report.reject(verdict.reason);
            continue;
        }

        if accepted.len() >= budget {
            report.capped += 1;
            continue;
        }

        seen.insert(fp.clone());
        let mut entry = ApprovedEntry::from_candidate(CandidateItem {
            item: item.clone(),
            fingerprint: fp,
        });
        if let Some(c) = commentator.comment(&entry.title, item.summary.as_deref()).await {
            entry.micro_judgment = Some(c.primary);
            entry.micro_judgment_it = c.secondary;
        }
        plan.cap.stamp(&mut entry);
        entry.note = plan.note.map(str::to_string);
        accepted.push(entry);
    }

    finish(report, store, existing, accepted).await
}

/// Weekly Amazon run: rotation → product search → filter → dedup → cap.
/// `search` is `None` when the integration is not configured.
pub async fn run_weekly_objects(
    search: Option<&dyn ProductSearch>,
    store: &dyn CollectionStore,
    cfg: &CuratorConfig,
    now: DateTime<Utc>,
) -> Result<RunReport> {
    ensure_metrics_described();

    let mut report = RunReport::new(Bucket::Objects);
    let Some(search) = search else {
        info!(target: "pipeline", "product search credentials missing; skipping weekly objects");
        report.skipped = true;
        report.log();
        return Ok(report);
    };

    let amazon = &cfg.amazon;
    let queries = pick_queries(now.date_naive(), amazon.queries_per_week, &amazon.query_pool);
    info!(target: "pipeline", queries = ?queries, "weekly rotation");

    let existing = store.load().await;
    let mut seen = existing.fingerprints();
    let mut seen_asins = existing.asins();
    let mut accepted: Vec<ApprovedEntry> = Vec::new();

    for q in &queries {
        let hits = match search.search(q).await {
            Ok(h) => h,
            Err(e) => {
                warn!(target: "pipeline", error = ?e, query = %q, provider = search.name(), "product search failed");
                continue;
            }
        };
        report.fetched += hits.len();
        counter!("curator_fetched_total", "bucket" => report.bucket.as_str()).increment(hits.len() as u64);

        for hit in hits {
            let fp = fingerprint(Namespace::Amazon, AMAZON_SOURCE, &hit.asin);
            if seen.contains(&fp) || seen_asins.contains(&hit.asin) {
                report.duplicates += 1;
                continue;
            }
            if hit.link.trim().is_empty() {
                report.reject(Reason::NoLink);
                continue;
            }
            if !amazon.filter.accepts(&hit.title, hit.price_eur) {
                report.reject(Reason::Filtered);
                continue;
            }
            if accepted.len() >= amazon.picks_per_run {
                report.capped += 1;
                continue;
            }

            seen.insert(fp.clone());
            seen_asins.insert(hit.asin.clone());
            let mut entry = ApprovedEntry::from_candidate(CandidateItem {
                item: RawItem {
                    source: AMAZON_SOURCE.to_string(),
                    title: hit.title,
                    link: hit.link,
                    published_at: now,
                    summary: None,
                },
                fingerprint: fp,
            });
            entry.asin = Some(hit.asin);
            entry.price_eur = hit.price_eur;
            entry.image = hit.image;
            entry.note = cfg.objects.note.clone();
            accepted.push(entry);
        }
    }

    finish(report, store, existing, accepted).await
}

async fn finish(
    mut report: RunReport,
    store: &dyn CollectionStore,
    existing: Collection,
    accepted: Vec<ApprovedEntry>,
) -> Result<RunReport> {
    let outcome = merge(existing, accepted);
    report.admitted = outcome.added;
    report.duplicates += outcome.duplicates;
    counter!("curator_admitted_total", "bucket" => report.bucket.as_str()).increment(outcome.added as u64);
    counter!("curator_duplicates_total", "bucket" => report.bucket.as_str())
        .increment(report.duplicates as u64);
    if report.capped > 0 {
        counter!("curator_capped_total", "bucket" => report.bucket.as_str()).increment(report.capped as u64);
    }

    report.quiet_day = !persist_if_changed(store, &outcome).await?;
    report.log();
    Ok(report)
}
